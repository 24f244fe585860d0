//! Live target lifecycle: telegraph, activation, expiry, and short-lived
//! visual perturbations.
//!
//! Targets enter in state `Incoming` (visible but not yet resolvable), become
//! `Active` after a telegraph window of 35% of their time-to-impact, and
//! expire once their lifespan elapses. States only ever move forward.

use crate::geometry::{TargetDefinition, TargetShape};
use glam::{Vec2, Vec4};
use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

/// Tempo scale clamp range.
const TEMPO_MIN: f32 = 0.35;
const TEMPO_MAX: f32 = 2.5;

/// Fraction of time-to-impact spent in the telegraph window.
const TELEGRAPH_FRACTION: f32 = 0.35;

/// Lifecycle state of a spawned target. Forward-only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TargetState {
    /// Telegraphed but not yet resolvable
    Incoming,
    /// Resolvable by the player
    Active,
    /// Lifespan elapsed; reported once, then removed
    Expired,
}

/// Projection parameters handed to the 4D projector each tick.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ProjectionParams {
    /// Camera distance along the w axis
    pub w_distance: f32,
    /// Camera distance along the z axis
    pub z_distance: f32,
    /// Uniform screen scale
    pub scale: f32,
}

impl Default for ProjectionParams {
    fn default() -> Self {
        Self {
            w_distance: 2.2,
            z_distance: 3.0,
            scale: 1.0,
        }
    }
}

/// Injected 4D→2D projection seam; the renderer owns the real camera.
pub trait Projector4D {
    /// Project one 4-space point to normalized screen space.
    fn project(&self, point: Vec4, params: &ProjectionParams, aspect: f32) -> Vec2;
}

/// Default double-perspective projection: w-divide to 3-space, then z-divide
/// to the screen plane.
pub struct PerspectiveProjector;

impl Projector4D for PerspectiveProjector {
    fn project(&self, point: Vec4, params: &ProjectionParams, aspect: f32) -> Vec2 {
        let wf = params.w_distance / (params.w_distance - point.w).max(0.1);
        let x = point.x * wf;
        let y = point.y * wf;
        let z = point.z * wf;

        let zf = params.z_distance / (params.z_distance - z).max(0.1);
        Vec2::new(
            x * zf * params.scale / aspect.max(0.1),
            y * zf * params.scale,
        )
    }
}

/// A live target owned by the spawn system.
#[derive(Debug, Clone)]
pub struct SpawnTarget {
    /// Stable id (generator-assigned, or event-counter for injected targets)
    pub id: u64,
    /// Spatial shape in 4-space
    pub shape: TargetShape,
    /// Resolve radius
    pub radius: f32,
    /// Beat-grid coordinate the target is due at
    pub due_beat: f32,
    /// Geometry-specific behavior tag
    pub behavior: String,
    /// Lifecycle state; never regresses
    pub state: TargetState,
    /// Monotonic, tempo-scaled timer in seconds
    pub timer: f32,
    /// Seconds from enqueue to the due beat
    pub time_to_impact: f32,
    /// Seconds from enqueue to expiry
    pub lifespan: f32,
    /// Screen-space projection of each node/endpoint/child, insertion order
    pub screen: Vec<Vec2>,
    /// Tag linking this target to a director-issued event (e.g. quick-draw)
    pub event_tag: Option<String>,
}

impl SpawnTarget {
    /// Fraction of the approach already elapsed, in [0, 1].
    pub fn progress(&self) -> f32 {
        if self.time_to_impact <= 0.0 {
            1.0
        } else {
            (self.timer / self.time_to_impact).min(1.0)
        }
    }
}

/// Owns the live-target lifecycle and its perturbation timers.
pub struct SpawnSystem {
    targets: Vec<SpawnTarget>,
    tempo_scale: f32,
    glitch_level: f32,
    glitch_timer: f32,
    reverse_timer: f32,
    event_id_counter: u64,
}

impl SpawnSystem {
    /// Create an empty spawn system.
    pub fn new() -> Self {
        Self {
            targets: Vec::new(),
            tempo_scale: 1.0,
            glitch_level: 0.0,
            glitch_timer: 0.0,
            reverse_timer: 0.0,
            event_id_counter: 1 << 32,
        }
    }

    /// Live targets in insertion order.
    pub fn targets(&self) -> &[SpawnTarget] {
        &self.targets
    }

    /// Current tempo scale.
    pub fn tempo_scale(&self) -> f32 {
        self.tempo_scale
    }

    /// Current glitch intensity.
    pub fn glitch_level(&self) -> f32 {
        self.glitch_level
    }

    /// Whether lane reversal is currently applied globally.
    pub fn reverse_active(&self) -> bool {
        self.reverse_timer > 0.0
    }

    /// Enqueue this beat's generated batch.
    pub fn handle_beat(&mut self, beat: u64, interval: f32, defs: Vec<TargetDefinition>) {
        let spawned = defs.len();
        for d in defs {
            self.enqueue(beat, interval, d, None);
        }
        if spawned > 0 {
            trace!("Beat {}: {} targets enqueued", beat, spawned);
        }
    }

    /// Insert an ad-hoc target outside the beat cadence, tagged with the
    /// director event that issued it. Same lifecycle rules apply.
    pub fn inject_event_target(
        &mut self,
        beat: u64,
        interval: f32,
        mut def: TargetDefinition,
        tag: impl Into<String>,
    ) -> u64 {
        if def.id == 0 {
            def.id = self.event_id_counter;
            self.event_id_counter += 1;
        }
        let id = def.id;
        self.enqueue(beat, interval, def, Some(tag.into()));
        debug!("Event target {} injected", id);
        id
    }

    fn enqueue(&mut self, beat: u64, interval: f32, def: TargetDefinition, tag: Option<String>) {
        let time_to_impact = (def.due_beat - beat as f32).max(1.0) * interval;
        let lifespan = time_to_impact + interval * 1.25;
        self.targets.push(SpawnTarget {
            id: def.id,
            shape: def.shape,
            radius: def.radius,
            due_beat: def.due_beat,
            behavior: def.behavior,
            state: TargetState::Incoming,
            timer: 0.0,
            time_to_impact,
            lifespan,
            screen: Vec::new(),
            event_tag: tag,
        });
    }

    /// Set the tempo scale, clamped to [0.35, 2.5].
    pub fn set_tempo_scale(&mut self, scale: f32) {
        self.tempo_scale = scale.clamp(TEMPO_MIN, TEMPO_MAX);
    }

    /// Raise glitch jitter. Takes the max of current and requested values so
    /// an active perturbation is never shortened.
    pub fn set_glitch(&mut self, level: f32, duration: f32) {
        self.glitch_level = self.glitch_level.max(level.max(0.0));
        self.glitch_timer = self.glitch_timer.max(duration.max(0.0));
    }

    /// Reverse lane endpoints globally for `duration` seconds. Max-merges
    /// with any active reversal.
    pub fn trigger_reverse(&mut self, duration: f32) {
        self.reverse_timer = self.reverse_timer.max(duration.max(0.0));
    }

    /// Remove a target by id. No-op when the id is absent.
    pub fn remove_target(&mut self, id: u64) {
        self.targets.retain(|t| t.id != id);
    }

    /// Advance timers, promote/expire targets, and refresh screen-space
    /// projections. Targets reported `Expired` last tick are dropped first.
    pub fn update(
        &mut self,
        dt: f32,
        projector: &dyn Projector4D,
        params: &ProjectionParams,
        aspect: f32,
    ) {
        self.targets.retain(|t| t.state != TargetState::Expired);

        self.glitch_timer = (self.glitch_timer - dt).max(0.0);
        if self.glitch_timer <= 0.0 {
            self.glitch_level = 0.0;
        }
        self.reverse_timer = (self.reverse_timer - dt).max(0.0);

        let reverse_all = self.reverse_timer > 0.0;
        let glitch = self.glitch_level;
        let mut rng = rand::rng();

        for target in &mut self.targets {
            target.timer += dt * self.tempo_scale;

            if target.state == TargetState::Incoming
                && target.timer > TELEGRAPH_FRACTION * target.time_to_impact
            {
                target.state = TargetState::Active;
            }
            if target.timer > target.lifespan {
                target.state = TargetState::Expired;
            }

            let reversed = reverse_all || target.behavior == "reverse";

            target.screen.clear();
            let mut push = |point: Vec4, screen: &mut Vec<Vec2>| {
                let mut p = projector.project(point, params, aspect);
                if glitch > 0.0 {
                    // Bounded jitter proportional to glitch intensity
                    p.x += (rng.random::<f32>() - 0.5) * 0.08 * glitch;
                    p.y += (rng.random::<f32>() - 0.5) * 0.08 * glitch;
                }
                screen.push(p);
            };

            match &target.shape {
                TargetShape::Node { position } => push(*position, &mut target.screen),
                TargetShape::Lane { a, b } => {
                    let (first, second) = if reversed { (*b, *a) } else { (*a, *b) };
                    push(first, &mut target.screen);
                    push(second, &mut target.screen);
                }
                TargetShape::Cluster { children } => {
                    for (position, _) in children {
                        push(*position, &mut target.screen);
                    }
                }
            }
        }
    }
}

impl Default for SpawnSystem {
    fn default() -> Self {
        Self::new()
    }
}
