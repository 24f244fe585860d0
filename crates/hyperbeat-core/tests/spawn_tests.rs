use hyperbeat_core::geometry::{TargetDefinition, TargetShape};
use hyperbeat_core::{
    PerspectiveProjector, ProjectionParams, SpawnSystem, TargetState, Vec4,
};

fn node(id: u64, due_beat: f32) -> TargetDefinition {
    TargetDefinition {
        id,
        shape: TargetShape::Node {
            position: Vec4::new(0.1, -0.2, 0.3, 0.1),
        },
        radius: 0.15,
        due_beat,
        behavior: "vertex".to_string(),
    }
}

fn step(system: &mut SpawnSystem, dt: f32) {
    system.update(dt, &PerspectiveProjector, &ProjectionParams::default(), 1.0);
}

#[test]
fn test_impact_timing_follows_the_beat_grid() {
    let mut system = SpawnSystem::new();
    // Due 3 beats out at 0.5s per beat
    system.handle_beat(1, 0.5, vec![node(1, 4.0)]);

    let target = &system.targets()[0];
    assert!((target.time_to_impact - 1.5).abs() < 1e-6);
    assert!((target.lifespan - (1.5 + 0.625)).abs() < 1e-6);
    assert_eq!(target.state, TargetState::Incoming);
}

#[test]
fn test_past_due_definitions_still_get_one_beat() {
    let mut system = SpawnSystem::new();
    // Scheduled behind the current beat; clamped to one full interval
    system.handle_beat(10, 0.5, vec![node(1, 8.0)]);
    assert!((system.targets()[0].time_to_impact - 0.5).abs() < 1e-6);
}

#[test]
fn test_telegraph_promotion_and_expiry() {
    let mut system = SpawnSystem::new();
    system.handle_beat(1, 0.5, vec![node(1, 3.0)]);
    // tti = 1.0s, telegraph threshold at 0.35s, lifespan 1.625s

    step(&mut system, 0.3);
    assert_eq!(system.targets()[0].state, TargetState::Incoming);

    step(&mut system, 0.1);
    assert_eq!(system.targets()[0].state, TargetState::Active);

    step(&mut system, 1.3);
    assert_eq!(system.targets()[0].state, TargetState::Expired);

    // Expired targets are reported once, then dropped
    step(&mut system, 0.016);
    assert!(system.targets().is_empty());
}

#[test]
fn test_tempo_scale_accelerates_the_lifecycle() {
    let mut fast = SpawnSystem::new();
    fast.set_tempo_scale(2.0);
    fast.handle_beat(1, 0.5, vec![node(1, 3.0)]);

    // 0.2s of wall time is 0.4s of lifecycle time, past the 0.35s telegraph
    step(&mut fast, 0.2);
    assert_eq!(fast.targets()[0].state, TargetState::Active);

    // Clamp: requests outside [0.35, 2.5] are pinned
    fast.set_tempo_scale(99.0);
    assert!((fast.tempo_scale() - 2.5).abs() < 1e-6);
    fast.set_tempo_scale(0.0);
    assert!((fast.tempo_scale() - 0.35).abs() < 1e-6);
}

#[test]
fn test_glitch_jitter_is_bounded() {
    let baseline = {
        let mut system = SpawnSystem::new();
        system.handle_beat(1, 0.5, vec![node(1, 3.0)]);
        step(&mut system, 0.016);
        system.targets()[0].screen.clone()
    };

    let mut glitched = SpawnSystem::new();
    glitched.handle_beat(1, 0.5, vec![node(1, 3.0)]);
    glitched.set_glitch(1.6, 5.0);
    for _ in 0..50 {
        step(&mut glitched, 0.016);
        let screen = &glitched.targets()[0].screen;
        assert_eq!(screen.len(), baseline.len());
        for (a, b) in screen.iter().zip(&baseline) {
            assert!((a.x - b.x).abs() <= 0.04 * 1.6 + 1e-4);
            assert!((a.y - b.y).abs() <= 0.04 * 1.6 + 1e-4);
        }
    }
}

#[test]
fn test_reverse_swaps_lane_endpoints() {
    let lane = TargetDefinition {
        id: 7,
        shape: TargetShape::Lane {
            a: Vec4::new(-0.5, 0.0, 0.2, 0.0),
            b: Vec4::new(0.5, 0.3, 0.2, 0.0),
        },
        radius: 0.1,
        due_beat: 3.0,
        behavior: "flow".to_string(),
    };

    let mut normal = SpawnSystem::new();
    normal.handle_beat(1, 0.5, vec![lane.clone()]);
    step(&mut normal, 0.016);
    let forward = normal.targets()[0].screen.clone();

    let mut reversed = SpawnSystem::new();
    reversed.handle_beat(1, 0.5, vec![lane]);
    reversed.trigger_reverse(3.0);
    step(&mut reversed, 0.016);
    let backward = reversed.targets()[0].screen.clone();

    assert_eq!(forward[0], backward[1]);
    assert_eq!(forward[1], backward[0]);
}

#[test]
fn test_injected_event_targets_get_distinct_ids() {
    let mut system = SpawnSystem::new();
    system.handle_beat(1, 0.5, vec![node(1, 3.0), node(2, 3.5)]);

    let mut quick = node(0, 2.0);
    quick.behavior = "quick-draw".to_string();
    let id = system.inject_event_target(1, 0.5, quick, "quick-draw");

    assert!(id >= 1 << 32);
    assert_eq!(system.targets().len(), 3);
    let injected = system.targets().iter().find(|t| t.id == id).unwrap();
    assert_eq!(injected.event_tag.as_deref(), Some("quick-draw"));

    // Removal by id is precise and idempotent
    system.remove_target(id);
    system.remove_target(id);
    assert_eq!(system.targets().len(), 2);
}
