use hyperbeat_core::audio::AudioFeatureBundle;
use hyperbeat_core::{DifficultyConfig, GeometryArchetype, GeometryController};

fn energetic_difficulty() -> DifficultyConfig {
    DifficultyConfig {
        density: 1.2,
        speed: 1.0,
        chaos: 0.3,
        audio: AudioFeatureBundle {
            bass: 0.6,
            mid: 0.4,
            high: 0.3,
            energy: 0.8,
            silence: false,
        },
    }
}

#[test]
fn test_same_seed_reproduces_the_run() {
    let difficulty = energetic_difficulty();
    let mut a = GeometryController::new(42, 2.0);
    let mut b = GeometryController::new(42, 2.0);

    for beat in 1..=10 {
        let batch_a = a.generate_targets(beat, &difficulty);
        let batch_b = b.generate_targets(beat, &difficulty);
        assert_eq!(batch_a, batch_b, "diverged at beat {}", beat);
    }
}

#[test]
fn test_different_seeds_diverge() {
    let difficulty = energetic_difficulty();
    let mut a = GeometryController::new(1, 2.0);
    let mut b = GeometryController::new(2, 2.0);

    let mut diverged = false;
    for beat in 1..=10 {
        if a.generate_targets(beat, &difficulty) != b.generate_targets(beat, &difficulty) {
            diverged = true;
            break;
        }
    }
    assert!(diverged);
}

#[test]
fn test_every_archetype_generates_under_energy() {
    let difficulty = energetic_difficulty();
    for (i, archetype) in GeometryArchetype::ALL.iter().enumerate() {
        let mut controller = GeometryController::new(9, i as f32);
        assert_eq!(controller.geometry_id(), *archetype);

        let targets = controller.generate_targets(1, &difficulty);
        assert!(!targets.is_empty(), "{:?} generated nothing", archetype);
        for target in &targets {
            assert!(
                target.due_beat >= 2.0,
                "{:?} scheduled inside the current beat",
                archetype
            );
            assert!(target.radius > 0.0);
        }
    }
}

#[test]
fn test_ids_are_unique_and_monotonic_across_beats() {
    let difficulty = energetic_difficulty();
    let mut controller = GeometryController::new(3, 0.0);

    let mut last_id = 0u64;
    for beat in 1..=6 {
        for target in controller.generate_targets(beat, &difficulty) {
            assert!(target.id > last_id);
            last_id = target.id;
        }
    }
    assert!(last_id > 0);
}

#[test]
fn test_sustained_silence_starves_generation() {
    let mut difficulty = energetic_difficulty();
    let mut controller = GeometryController::new(5, 1.0);

    // Warm up on loud audio, then cut it
    controller.generate_targets(1, &difficulty);
    difficulty.audio.energy = 0.0;
    difficulty.audio.bass = 0.0;
    difficulty.audio.silence = true;

    let mut counts = Vec::new();
    for beat in 2..=12 {
        counts.push(controller.generate_targets(beat, &difficulty).len());
    }
    // Hush saturates after eight silent beats; generation must bottom out
    assert_eq!(*counts.last().unwrap(), 0);
}
