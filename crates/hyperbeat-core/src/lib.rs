//! Hyperbeat Core - Audio-Reactive Direction Engine
//!
//! This crate contains the rhythm direction engine for Hyperbeat:
//! - Audio analysis (FFT bands, spectral centroid, debounced beat detection)
//! - Seeded procedural generation of spatial spawn targets
//! - Live target lifecycle (telegraph, activation, expiry, perturbations)
//! - Rogue-lite meta-progression director (stages, modifiers, directives)
//!
//! Rendering, control panels, and input classification are external
//! collaborators; the engine only emits target lifecycle records, typed HUD
//! events, and audio frames for them to consume.

#![warn(missing_docs)]

pub use glam::{Vec2, Vec4};
use thiserror::Error;

pub mod audio;
pub mod director;
pub mod geometry;
pub mod logging;
pub mod scores;
pub mod session;
pub mod spawn;

// --- Re-exports grouped by category ---

// Audio System
pub use audio::{
    AudioAnalyzer, AudioConfig, AudioCues, AudioFeatureBundle, AudioFrame, AudioSource,
    BufferSource, CueTracker, FrequencyBand,
};
#[cfg(feature = "audio")]
pub use audio::MicSource;

// Procedural Geometry
pub use geometry::{
    DifficultyConfig, GenContext, GeometryArchetype, GeometryController, ParameterBias,
    TargetDefinition, TargetGenerator, TargetShape,
};

// Spawn Lifecycle
pub use spawn::{
    PerspectiveProjector, ProjectionParams, Projector4D, SpawnSystem, SpawnTarget, TargetState,
};

// Director & Meta-Progression
pub use director::{
    ActiveEffect, CalloutVariant, DirectiveKind, DirectiveOutcome, DirectorEvent, DirectorFrame,
    EffectKind, GameState, ModifierKind, RogueLiteDirector, RunState, RunSummary, RunTemplate,
    SpawnEventKind, SpawnModifiers, StageConfig, TransientBoost,
};

// Session & Persistence
pub use logging::LogConfig;
pub use scores::{JsonScoreStore, LevelRecord, ScoreBoard, ScoreStore};
pub use session::{Session, SessionConfig, TickReport};

/// Core error types
#[derive(Error, Debug)]
pub enum CoreError {
    /// No audio source could be acquired (no device, stream failed, etc.)
    #[error("Audio unavailable: {0}")]
    AudioUnavailable(String),

    /// Score persistence failed
    #[error("Score storage error: {0}")]
    Storage(String),
}

/// Result type for core operations
pub type Result<T> = std::result::Result<T, CoreError>;
