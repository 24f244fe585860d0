//! Seeded procedural generation of spatial spawn targets.
//!
//! A [`GeometryController`] owns a seeded RNG and dispatches to one
//! [`TargetGenerator`] per geometry archetype. The same seed and the same
//! (beat, difficulty) input sequence always yields the same target sequence;
//! replays and tests depend on it.

use crate::audio::AudioFeatureBundle;
use glam::Vec4;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::f32::consts::{PI, TAU};
use tracing::debug;

/// The eight canonical geometry archetypes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum GeometryArchetype {
    /// 4-simplex vertices
    Tetra,
    /// Tesseract corner lattice
    Cube,
    /// Hypersphere surface
    Sphere,
    /// Tube lanes on a torus
    Torus,
    /// Figure-8 Klein immersion
    Klein,
    /// Shrinking cluster rings
    Fractal,
    /// Traveling wave crests
    Wave,
    /// Axis-snapped lattice nodes
    Crystal,
}

/// Fixed category lookup mapping the wider holographic variant index (0..32)
/// down to the eight archetypes.
const VARIANT_CATEGORIES: [GeometryArchetype; 32] = [
    GeometryArchetype::Tetra,
    GeometryArchetype::Tetra,
    GeometryArchetype::Cube,
    GeometryArchetype::Cube,
    GeometryArchetype::Sphere,
    GeometryArchetype::Sphere,
    GeometryArchetype::Sphere,
    GeometryArchetype::Torus,
    GeometryArchetype::Torus,
    GeometryArchetype::Torus,
    GeometryArchetype::Klein,
    GeometryArchetype::Klein,
    GeometryArchetype::Fractal,
    GeometryArchetype::Fractal,
    GeometryArchetype::Fractal,
    GeometryArchetype::Fractal,
    GeometryArchetype::Wave,
    GeometryArchetype::Wave,
    GeometryArchetype::Wave,
    GeometryArchetype::Crystal,
    GeometryArchetype::Crystal,
    GeometryArchetype::Crystal,
    GeometryArchetype::Tetra,
    GeometryArchetype::Cube,
    GeometryArchetype::Sphere,
    GeometryArchetype::Torus,
    GeometryArchetype::Klein,
    GeometryArchetype::Fractal,
    GeometryArchetype::Wave,
    GeometryArchetype::Crystal,
    GeometryArchetype::Sphere,
    GeometryArchetype::Fractal,
];

impl GeometryArchetype {
    /// All archetypes in canonical order.
    pub const ALL: [GeometryArchetype; 8] = [
        GeometryArchetype::Tetra,
        GeometryArchetype::Cube,
        GeometryArchetype::Sphere,
        GeometryArchetype::Torus,
        GeometryArchetype::Klein,
        GeometryArchetype::Fractal,
        GeometryArchetype::Wave,
        GeometryArchetype::Crystal,
    ];

    /// Resolve a continuous geometry/variant index to an archetype.
    pub fn from_index(index: f32) -> Self {
        let i = (index.floor() as i64).rem_euclid(8) as usize;
        Self::ALL[i]
    }

    /// Map a wider holographic variant index down via the fixed category
    /// lookup.
    pub fn from_variant(variant: usize) -> Self {
        VARIANT_CATEGORIES[variant % VARIANT_CATEGORIES.len()]
    }

    /// Fixed per-archetype rendering bias.
    pub fn parameter_bias(&self) -> ParameterBias {
        match self {
            GeometryArchetype::Tetra => ParameterBias::new(0.0, 0.8, 1.0),
            GeometryArchetype::Cube => ParameterBias::new(36.0, 0.9, 0.95),
            GeometryArchetype::Sphere => ParameterBias::new(200.0, 0.7, 1.1),
            GeometryArchetype::Torus => ParameterBias::new(150.0, 1.0, 1.2),
            GeometryArchetype::Klein => ParameterBias::new(280.0, 1.3, 0.9),
            GeometryArchetype::Fractal => ParameterBias::new(310.0, 1.5, 0.85),
            GeometryArchetype::Wave => ParameterBias::new(180.0, 1.1, 1.35),
            GeometryArchetype::Crystal => ParameterBias::new(60.0, 0.6, 1.05),
        }
    }
}

/// Per-archetype rendering bias consumed by the visual collaborator.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ParameterBias {
    /// Hue rotation in degrees
    pub hue_shift: f32,
    /// Multiplier on the chaos parameter
    pub chaos_mult: f32,
    /// Multiplier on the speed parameter
    pub speed_mult: f32,
}

impl ParameterBias {
    const fn new(hue_shift: f32, chaos_mult: f32, speed_mult: f32) -> Self {
        Self {
            hue_shift,
            chaos_mult,
            speed_mult,
        }
    }
}

/// Difficulty payload driving target generation.
///
/// Unrecognized fields in a deserialized payload are ignored; absent fields
/// fall back to defaults.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DifficultyConfig {
    /// Baseline targets per beat before audio scaling
    pub density: f32,
    /// Approach speed multiplier
    pub speed: f32,
    /// Positional disorder in [0, 1]
    pub chaos: f32,
    /// Live audio feature snapshot
    pub audio: AudioFeatureBundle,
}

impl Default for DifficultyConfig {
    fn default() -> Self {
        Self {
            density: 1.0,
            speed: 1.0,
            chaos: 0.2,
            audio: AudioFeatureBundle::default(),
        }
    }
}

/// The spatial shape of a target definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum TargetShape {
    /// A single 4-space point
    Node {
        /// Position in 4-space
        position: Vec4,
    },
    /// A line segment between two 4-space endpoints
    Lane {
        /// First endpoint
        a: Vec4,
        /// Second endpoint
        b: Vec4,
    },
    /// A group of child points resolved together
    Cluster {
        /// Child positions with per-child radii
        children: Vec<(Vec4, f32)>,
    },
}

/// One generated target, prior to spawn-system scheduling.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TargetDefinition {
    /// Stable id assigned by the controller
    pub id: u64,
    /// Spatial shape
    pub shape: TargetShape,
    /// Resolve radius
    pub radius: f32,
    /// Beat-grid coordinate (fractional; carries swing) the target is due at
    pub due_beat: f32,
    /// Geometry-specific behavior tag
    pub behavior: String,
}

/// Normalized audio feature vector handed to the generators.
#[derive(Debug, Clone, Copy, Default)]
pub struct FeatureVector {
    /// Low band energy
    pub bass: f32,
    /// Mid band energy
    pub mid: f32,
    /// High band energy
    pub high: f32,
    /// Overall intensity
    pub energy: f32,
    /// Attack strength from |Δintensity| with a positive-trend bias
    pub accent: f32,
    /// Normalized silence duration in [0, 1]
    pub hush: f32,
    /// Smoothed energy trend (signed)
    pub trend: f32,
    /// Raw energy delta since the previous call
    pub delta: f32,
}

/// Inputs common to every archetype generator.
#[derive(Debug, Clone, Copy)]
pub struct GenContext {
    /// Approach speed multiplier
    pub speed: f32,
    /// Positional disorder in [0, 1]
    pub chaos: f32,
    /// Derived audio features
    pub audio: FeatureVector,
    /// Beat-grid coordinate the target should resolve at
    pub due_beat: f32,
    /// Active archetype
    pub mode: GeometryArchetype,
}

/// One archetype's mapping from features to a target definition.
///
/// Implementations must be pure: the same RNG state, beat, and context always
/// produce the same definition.
pub trait TargetGenerator {
    /// The archetype this generator serves.
    fn archetype(&self) -> GeometryArchetype;

    /// Generate one target definition. The id is stamped by the controller.
    fn generate(&self, rng: &mut StdRng, beat: u64, ctx: &GenContext) -> TargetDefinition;
}

fn def(shape: TargetShape, radius: f32, ctx: &GenContext, behavior: &str) -> TargetDefinition {
    TargetDefinition {
        id: 0,
        shape,
        radius,
        due_beat: ctx.due_beat,
        behavior: behavior.to_string(),
    }
}

fn jitter(rng: &mut StdRng, chaos: f32) -> Vec4 {
    Vec4::new(
        (rng.random::<f32>() - 0.5) * chaos,
        (rng.random::<f32>() - 0.5) * chaos,
        (rng.random::<f32>() - 0.5) * chaos,
        (rng.random::<f32>() - 0.5) * chaos * 0.5,
    )
}

fn base_radius(rng: &mut StdRng, energy: f32) -> f32 {
    0.12 + 0.1 * energy + rng.random::<f32>() * 0.06
}

/// Vertices of the 4-simplex.
struct TetraGenerator;

impl TargetGenerator for TetraGenerator {
    fn archetype(&self) -> GeometryArchetype {
        GeometryArchetype::Tetra
    }

    fn generate(&self, rng: &mut StdRng, _beat: u64, ctx: &GenContext) -> TargetDefinition {
        const VERTS: [[f32; 4]; 5] = [
            [1.0, 1.0, 1.0, -0.5],
            [1.0, -1.0, -1.0, -0.5],
            [-1.0, 1.0, -1.0, -0.5],
            [-1.0, -1.0, 1.0, -0.5],
            [0.0, 0.0, 0.0, 1.2],
        ];
        let v = VERTS[rng.random_range(0..VERTS.len())];
        let position =
            Vec4::from_array(v) * (0.55 + 0.25 * ctx.audio.energy) + jitter(rng, ctx.chaos * 0.4);
        let radius = base_radius(rng, ctx.audio.energy);
        def(TargetShape::Node { position }, radius, ctx, "vertex")
    }
}

/// Tesseract corners, scale breathing with energy.
struct CubeGenerator;

impl TargetGenerator for CubeGenerator {
    fn archetype(&self) -> GeometryArchetype {
        GeometryArchetype::Cube
    }

    fn generate(&self, rng: &mut StdRng, _beat: u64, ctx: &GenContext) -> TargetDefinition {
        let bits: u8 = rng.random_range(0..16);
        let corner = Vec4::new(
            if bits & 1 != 0 { 1.0 } else { -1.0 },
            if bits & 2 != 0 { 1.0 } else { -1.0 },
            if bits & 4 != 0 { 1.0 } else { -1.0 },
            if bits & 8 != 0 { 0.7 } else { -0.7 },
        );
        let position =
            corner * (0.5 + 0.3 * ctx.audio.energy) + jitter(rng, ctx.chaos * 0.35);
        let radius = base_radius(rng, ctx.audio.energy);
        def(TargetShape::Node { position }, radius, ctx, "corner")
    }
}

/// Spherical coordinates with high-band elevation bias and bass-driven
/// radius.
struct SphereGenerator;

impl TargetGenerator for SphereGenerator {
    fn archetype(&self) -> GeometryArchetype {
        GeometryArchetype::Sphere
    }

    fn generate(&self, rng: &mut StdRng, _beat: u64, ctx: &GenContext) -> TargetDefinition {
        let phi = rng.random::<f32>() * TAU;
        // High-band energy pulls spawns toward the poles
        let pole_bias = 1.0 + ctx.audio.high * 1.5;
        let theta = (rng.random::<f32>().powf(pole_bias)) * PI;
        let r = 0.5 + 0.45 * ctx.audio.bass;
        let w = (rng.random::<f32>() - 0.5) * ctx.chaos;

        let position = Vec4::new(
            r * theta.sin() * phi.cos(),
            r * theta.cos(),
            r * theta.sin() * phi.sin(),
            w,
        );
        let radius = base_radius(rng, ctx.audio.energy);
        def(TargetShape::Node { position }, radius, ctx, "orbit")
    }
}

/// Lane pairs along a torus tube with a trend-driven phase offset.
struct TorusGenerator;

impl TargetGenerator for TorusGenerator {
    fn archetype(&self) -> GeometryArchetype {
        GeometryArchetype::Torus
    }

    fn generate(&self, rng: &mut StdRng, _beat: u64, ctx: &GenContext) -> TargetDefinition {
        let major = 0.8;
        let minor = 0.3 + 0.2 * ctx.audio.mid;
        let t0 = rng.random::<f32>() * TAU;
        let phase = 0.8 + ctx.audio.trend * 1.2;
        let v = rng.random::<f32>() * TAU;

        let point = |t: f32| {
            Vec4::new(
                (major + minor * v.cos()) * t.cos(),
                (major + minor * v.cos()) * t.sin(),
                minor * v.sin(),
                (t * 2.0).sin() * ctx.chaos * 0.4,
            )
        };
        let behavior = if ctx.audio.trend < -0.15 {
            "reverse"
        } else {
            "flow"
        };
        let radius = base_radius(rng, ctx.audio.energy) * 0.9;
        def(
            TargetShape::Lane {
                a: point(t0),
                b: point(t0 + phase),
            },
            radius,
            ctx,
            behavior,
        )
    }
}

/// Figure-8 Klein immersion.
struct KleinGenerator;

impl TargetGenerator for KleinGenerator {
    fn archetype(&self) -> GeometryArchetype {
        GeometryArchetype::Klein
    }

    fn generate(&self, rng: &mut StdRng, _beat: u64, ctx: &GenContext) -> TargetDefinition {
        let u = rng.random::<f32>() * TAU;
        let v = rng.random::<f32>() * TAU;
        let r = 0.45 + 0.2 * ctx.audio.energy;

        let cos_half = (u / 2.0).cos();
        let sin_half = (u / 2.0).sin();
        let figure = v.sin() * (2.0 * v).sin() * 0.5;

        let position = Vec4::new(
            (r + cos_half * v.sin() - sin_half * figure) * u.cos(),
            (r + cos_half * v.sin() - sin_half * figure) * u.sin(),
            sin_half * v.sin() + cos_half * figure,
            (u - PI) * 0.2 * ctx.chaos,
        );
        let radius = base_radius(rng, ctx.audio.energy);
        def(TargetShape::Node { position }, radius, ctx, "twist")
    }
}

/// Rings of shrinking children; depth rides accent and chaos.
struct FractalGenerator;

impl TargetGenerator for FractalGenerator {
    fn archetype(&self) -> GeometryArchetype {
        GeometryArchetype::Fractal
    }

    fn generate(&self, rng: &mut StdRng, _beat: u64, ctx: &GenContext) -> TargetDefinition {
        let depth =
            (2.0 + (ctx.audio.accent * 2.5 + ctx.chaos * 2.0)).round().clamp(2.0, 6.0) as usize;

        let center = jitter(rng, 0.8);
        let base = base_radius(rng, ctx.audio.energy);
        let mut children = Vec::with_capacity(depth * 6);

        // 2 * depth * 3 children: `depth` rings of six, shrinking outward
        for ring in 0..depth {
            let ring_r = 0.35 * 0.82f32.powi(ring as i32);
            let child_r = base * 0.7 * 0.78f32.powi(ring as i32);
            let spin = rng.random::<f32>() * TAU;
            for k in 0..6 {
                let a = spin + k as f32 * TAU / 6.0;
                let offset = Vec4::new(
                    ring_r * a.cos(),
                    ring_r * a.sin(),
                    (ring as f32 - depth as f32 / 2.0) * 0.12,
                    (rng.random::<f32>() - 0.5) * ctx.chaos * 0.3,
                );
                children.push((center + offset, child_r));
            }
        }

        def(TargetShape::Cluster { children }, base, ctx, "bloom")
    }
}

/// Lanes riding a traveling wave crest.
struct WaveGenerator;

impl TargetGenerator for WaveGenerator {
    fn archetype(&self) -> GeometryArchetype {
        GeometryArchetype::Wave
    }

    fn generate(&self, rng: &mut StdRng, beat: u64, ctx: &GenContext) -> TargetDefinition {
        let phase = beat as f32 * 0.6 * ctx.speed;
        let x0 = rng.random::<f32>() * 2.0 - 1.0;
        let span = 0.5 + 0.4 * ctx.audio.energy;
        let amp = 0.4 + 0.3 * ctx.audio.mid;

        let point = |x: f32| {
            Vec4::new(
                x,
                (x * 3.0 + phase).sin() * amp,
                (x * 2.0 - phase * 0.5).cos() * 0.3,
                (x + phase).sin() * ctx.chaos * 0.3,
            )
        };
        let radius = base_radius(rng, ctx.audio.energy) * 0.9;
        def(
            TargetShape::Lane {
                a: point(x0),
                b: point(x0 + span),
            },
            radius,
            ctx,
            "crest",
        )
    }
}

/// Nodes snapped to a quantized axis lattice.
struct CrystalGenerator;

impl TargetGenerator for CrystalGenerator {
    fn archetype(&self) -> GeometryArchetype {
        GeometryArchetype::Crystal
    }

    fn generate(&self, rng: &mut StdRng, _beat: u64, ctx: &GenContext) -> TargetDefinition {
        let axis = rng.random_range(0..4);
        let steps = rng.random_range(1..=3) as f32;
        let sign = if rng.random::<bool>() { 1.0 } else { -1.0 };
        let magnitude = steps * 0.35 * sign * (0.8 + 0.4 * ctx.audio.energy);

        let mut position = jitter(rng, ctx.chaos * 0.25);
        position[axis] += magnitude;
        let radius = base_radius(rng, ctx.audio.energy) * 1.1;
        def(TargetShape::Node { position }, radius, ctx, "facet")
    }
}

fn generator_for(archetype: GeometryArchetype) -> &'static dyn TargetGenerator {
    match archetype {
        GeometryArchetype::Tetra => &TetraGenerator,
        GeometryArchetype::Cube => &CubeGenerator,
        GeometryArchetype::Sphere => &SphereGenerator,
        GeometryArchetype::Torus => &TorusGenerator,
        GeometryArchetype::Klein => &KleinGenerator,
        GeometryArchetype::Fractal => &FractalGenerator,
        GeometryArchetype::Wave => &WaveGenerator,
        GeometryArchetype::Crystal => &CrystalGenerator,
    }
}

/// Seeded, deterministic target generator for one geometry archetype.
pub struct GeometryController {
    archetype: GeometryArchetype,
    rng: StdRng,
    next_id: u64,

    // Rolling state behind accent/hush/trend derivation
    prev_energy: f32,
    trend: f32,
    silence_beats: f32,
}

impl GeometryController {
    /// Create a controller for the archetype resolved from a continuous
    /// geometry index.
    pub fn new(seed: u64, geometry_index: f32) -> Self {
        let archetype = GeometryArchetype::from_index(geometry_index);
        debug!("GeometryController: seed={}, archetype={:?}", seed, archetype);
        Self {
            archetype,
            rng: StdRng::seed_from_u64(seed),
            next_id: 1,
            prev_energy: 0.0,
            trend: 0.0,
            silence_beats: 0.0,
        }
    }

    /// The resolved archetype.
    pub fn geometry_id(&self) -> GeometryArchetype {
        self.archetype
    }

    /// Switch archetype mid-run; generation state carries over.
    pub fn set_archetype(&mut self, archetype: GeometryArchetype) {
        self.archetype = archetype;
    }

    /// Fixed rendering bias for the active archetype.
    pub fn parameter_bias(&self) -> ParameterBias {
        self.archetype.parameter_bias()
    }

    /// Derive the normalized feature vector from a difficulty payload.
    fn features(&mut self, audio: &AudioFeatureBundle) -> FeatureVector {
        let delta = audio.energy - self.prev_energy;
        self.prev_energy = audio.energy;
        self.trend = self.trend * 0.6 + delta * 0.4;

        // Accents weigh rising energy heavier than falling
        let accent =
            (delta.abs() * if delta > 0.0 { 6.0 } else { 2.5 }).clamp(0.0, 1.0);

        if audio.silence {
            self.silence_beats += 1.0;
        } else {
            self.silence_beats = (self.silence_beats - 2.0).max(0.0);
        }
        let hush = (self.silence_beats / 8.0).min(1.0);

        FeatureVector {
            bass: audio.bass,
            mid: audio.mid,
            high: audio.high,
            energy: audio.energy,
            accent,
            hush,
            trend: self.trend,
            delta,
        }
    }

    /// Generate this beat's target batch.
    ///
    /// `amount = round(density · (0.32 + 1.85·energy) · (1 − 0.65·hush))`;
    /// each target is offset by a small fractional-beat swing so simultaneous
    /// targets never stack exactly on-beat.
    pub fn generate_targets(
        &mut self,
        beat: u64,
        difficulty: &DifficultyConfig,
    ) -> Vec<TargetDefinition> {
        let features = self.features(&difficulty.audio);

        let amount_factor = 0.32 + 1.85 * features.energy;
        let hush_penalty = 1.0 - 0.65 * features.hush;
        let amount = (difficulty.density * amount_factor * hush_penalty)
            .round()
            .max(0.0) as usize;

        let generator = generator_for(self.archetype);
        let mut targets = Vec::with_capacity(amount);

        for _ in 0..amount {
            // Lead of 1-2 beats, shortened as speed climbs
            let lead = 1.0 + self.rng.random::<f32>() * (1.6 / difficulty.speed.max(0.25)).min(2.0);
            let swing =
                (self.rng.random::<f32>() - 0.5) * 0.4 * (0.3 + features.trend.abs().min(1.0));
            let due_beat = (beat as f32 + lead + swing).max(beat as f32 + 1.0);

            let ctx = GenContext {
                speed: difficulty.speed,
                chaos: difficulty.chaos,
                audio: features,
                due_beat,
                mode: self.archetype,
            };
            let mut target = generator.generate(&mut self.rng, beat, &ctx);
            target.id = self.next_id;
            self.next_id += 1;
            targets.push(target);
        }

        targets
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_index_wraps() {
        assert_eq!(GeometryArchetype::from_index(0.0), GeometryArchetype::Tetra);
        assert_eq!(GeometryArchetype::from_index(3.7), GeometryArchetype::Torus);
        assert_eq!(GeometryArchetype::from_index(8.0), GeometryArchetype::Tetra);
        assert_eq!(
            GeometryArchetype::from_index(-1.0),
            GeometryArchetype::Crystal
        );
    }

    #[test]
    fn test_variant_lookup_covers_all_archetypes() {
        let mut seen = std::collections::HashSet::new();
        for v in 0..64 {
            seen.insert(GeometryArchetype::from_variant(v));
        }
        assert_eq!(seen.len(), 8);
    }

    #[test]
    fn test_torus_emits_lanes_and_fractal_emits_clusters() {
        let mut difficulty = DifficultyConfig::default();
        difficulty.audio.energy = 0.8;

        let mut torus = GeometryController::new(7, 3.0);
        let targets = torus.generate_targets(1, &difficulty);
        assert!(!targets.is_empty());
        assert!(targets
            .iter()
            .all(|t| matches!(t.shape, TargetShape::Lane { .. })));

        let mut fractal = GeometryController::new(7, 5.0);
        for target in fractal.generate_targets(1, &difficulty) {
            match &target.shape {
                TargetShape::Cluster { children } => {
                    // depth rings of six children, depth in [2, 6]
                    assert_eq!(children.len() % 6, 0);
                    let depth = children.len() / 6;
                    assert!((2..=6).contains(&depth));
                }
                other => panic!("fractal produced {:?}", other),
            }
        }
    }

    #[test]
    fn test_due_beat_is_always_ahead() {
        let mut difficulty = DifficultyConfig::default();
        difficulty.audio.energy = 1.0;
        difficulty.density = 3.0;

        let mut controller = GeometryController::new(42, 2.0);
        for beat in 1..20u64 {
            for target in controller.generate_targets(beat, &difficulty) {
                assert!(target.due_beat >= beat as f32 + 1.0);
                assert!(target.radius > 0.0);
            }
        }
    }

    #[test]
    fn test_hush_suppresses_density() {
        let mut loud = DifficultyConfig::default();
        loud.density = 4.0;
        loud.audio.energy = 0.9;

        let mut quiet = loud.clone();
        quiet.audio.silence = true;
        quiet.audio.energy = 0.9;

        let mut a = GeometryController::new(1, 2.0);
        let mut b = GeometryController::new(1, 2.0);

        // Let hush accumulate on the silent controller
        for beat in 1..12u64 {
            a.generate_targets(beat, &loud);
            b.generate_targets(beat, &quiet);
        }
        let loud_count = a.generate_targets(12, &loud).len();
        let quiet_count = b.generate_targets(12, &quiet).len();
        assert!(quiet_count < loud_count);
    }
}
