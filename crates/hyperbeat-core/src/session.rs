//! Session orchestration: one place that owns the analyzer, cue tracker,
//! director, generator, and spawn system, and drives them in the right
//! order every tick.
//!
//! Tick order matters: audio frame first, cues from the frame, director
//! rules from the cues, generation on the beat edge, spawn-system advance
//! last so injected targets live for at least one full frame.

use crate::audio::{AudioAnalyzer, AudioConfig, AudioCues, AudioFeatureBundle, AudioFrame, AudioSource, CueTracker};
use crate::director::{
    DirectiveOutcome, DirectorEvent, DirectorFrame, GameState, RogueLiteDirector, RunState,
    RunSummary, RunTemplate, SpawnEventKind,
};
use crate::geometry::{DifficultyConfig, GeometryArchetype, GeometryController};
use crate::spawn::{PerspectiveProjector, ProjectionParams, SpawnSystem};
use crate::Result;
use tracing::{debug, trace};

/// Seed estimate for the beat interval before two real beats have landed.
const DEFAULT_BEAT_INTERVAL: f32 = 0.5;
/// Plausible beat-interval band; measurements outside it are discarded.
const BEAT_INTERVAL_MIN: f32 = 0.25;
const BEAT_INTERVAL_MAX: f32 = 2.0;

/// Construction parameters for a [`Session`].
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Seed for deterministic target generation
    pub seed: u64,
    /// Continuous geometry index resolved to an archetype
    pub geometry_index: f32,
    /// Viewport width / height
    pub aspect: f32,
    /// 4D-to-2D projection parameters
    pub projection: ProjectionParams,
    /// Audio analysis configuration
    pub audio: AudioConfig,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            seed: 0,
            geometry_index: 0.0,
            aspect: 16.0 / 9.0,
            projection: ProjectionParams::default(),
            audio: AudioConfig::default(),
        }
    }
}

/// Everything a host loop needs from one tick.
#[derive(Debug, Clone)]
pub struct TickReport {
    /// Latest analyzed audio frame
    pub frame: AudioFrame,
    /// Musical cues derived this tick
    pub cues: AudioCues,
    /// Director output, including drained events
    pub director: DirectorFrame,
    /// Whether a beat landed this tick
    pub beat: bool,
    /// Beat counter since session start
    pub beat_count: u64,
    /// Current beat interval estimate in seconds
    pub beat_interval: f32,
    /// Targets generated this tick
    pub spawned: usize,
}

/// Owns and sequences the full direction pipeline.
pub struct Session {
    analyzer: AudioAnalyzer,
    cue_tracker: CueTracker,
    director: RogueLiteDirector,
    geometry: GeometryController,
    spawn: SpawnSystem,
    projector: PerspectiveProjector,
    game: GameState,
    config: SessionConfig,

    clock: f64,
    beat_count: u64,
    beats_in_stage: u32,
    beat_interval: f32,
    last_beat_at: Option<f64>,
}

impl Session {
    /// Create a session; no audio source is attached yet.
    pub fn new(config: SessionConfig) -> Self {
        Self {
            analyzer: AudioAnalyzer::new(config.audio.clone()),
            cue_tracker: CueTracker::new(),
            director: RogueLiteDirector::new(),
            geometry: GeometryController::new(config.seed, config.geometry_index),
            spawn: SpawnSystem::new(),
            projector: PerspectiveProjector,
            game: GameState {
                lives: 3,
                phase_energy: 0.5,
                ..GameState::default()
            },
            config,
            clock: 0.0,
            beat_count: 0,
            beats_in_stage: 0,
            beat_interval: DEFAULT_BEAT_INTERVAL,
            last_beat_at: None,
        }
    }

    /// Create a session over an explicit audio source (files, tests).
    pub fn with_source(config: SessionConfig, source: Box<dyn AudioSource>) -> Self {
        let mut session = Self::new(config);
        session.analyzer.attach_source(source);
        session
    }

    /// Open the default capture device if no source is attached yet.
    pub fn initialize_audio(&mut self) -> Result<()> {
        self.analyzer.initialize()
    }

    /// Begin a run; resets the per-stage beat counter.
    pub fn start_run(&mut self, template: RunTemplate) {
        let stage = self.director.start_run(template);
        self.beats_in_stage = 0;
        self.game = GameState {
            lives: 3,
            phase_energy: 0.5,
            ..GameState::default()
        };
        debug!(
            "Session run started: density={:.2}, beat_length={}",
            stage.density, stage.beat_length
        );
    }

    /// End the run, if any, and return its summary.
    pub fn complete_run(&mut self) -> Option<RunSummary> {
        self.director.complete_run(&self.game)
    }

    /// Forward a classified directive outcome to the director.
    pub fn resolve_directive(&mut self, outcome: DirectiveOutcome) {
        self.director.handle_directive_outcome(outcome, &mut self.game);
    }

    /// Resolve a spawned target. A hit builds combo and score; a miss breaks
    /// the combo. Unknown ids only break the combo path they claim.
    pub fn resolve_target(&mut self, id: u64, hit: bool) {
        self.spawn.remove_target(id);
        if hit {
            self.game.combo += 1;
            self.game.max_combo = self.game.max_combo.max(self.game.combo);
            let stage = self.director.run_state().map(|r| r.stage).unwrap_or(1);
            self.game.score += (50 + 10 * self.game.combo as u64) * stage as u64;
            self.game.phase_energy = (self.game.phase_energy + 0.02).min(1.0);
        } else {
            self.game.combo = 0;
            self.game.phase_energy = (self.game.phase_energy - 0.05).max(0.0);
        }
    }

    /// Player-facing state.
    pub fn game_state(&self) -> &GameState {
        &self.game
    }

    /// Run state for persistence, if a run is active.
    pub fn run_state(&self) -> Option<&RunState> {
        self.director.run_state()
    }

    /// Restore a serialized run.
    pub fn resume_run(&mut self, state: RunState, template: RunTemplate) {
        self.beats_in_stage = 0;
        self.director.resume_run(state, template);
    }

    /// Live spawn targets, post-projection.
    pub fn targets(&self) -> &[crate::spawn::SpawnTarget] {
        self.spawn.targets()
    }

    /// Inject a manual audio frame (visualization scrubbing, tests).
    pub fn set_manual_frame(&mut self, frame: Option<AudioFrame>) {
        self.analyzer.set_manual_frame(frame);
    }

    /// Advance the whole pipeline by `dt` seconds.
    pub fn tick(&mut self, dt: f32) -> TickReport {
        self.clock += dt as f64;

        let frame = self.analyzer.update(self.clock);
        let cues = self.cue_tracker.update(&frame, self.clock);
        let director = self.director.update(dt, &cues, &mut self.game);
        let modifiers = &director.spawn_modifiers;

        // Fold the director's bundle into the spawn system. Glitch and
        // reverse are refreshed every tick for as long as the effect holds.
        self.spawn
            .set_tempo_scale(modifiers.tempo_multiplier * self.stage_speed());
        if modifiers.glitch_level > 0.0 {
            self.spawn.set_glitch(modifiers.glitch_level, dt * 2.0);
        }
        if modifiers.reverse_controls {
            self.spawn.trigger_reverse(dt * 2.0);
        }
        self.game.phase_energy =
            (self.game.phase_energy + modifiers.phase_regen_bonus * dt).min(1.0);

        let beat = frame.beat;
        let mut spawned = 0;
        if beat {
            self.beat_count += 1;
            self.track_beat_interval();
            spawned = self.on_beat(&frame, &director);
        }

        for event in &director.events {
            if let DirectorEvent::SpawnEvent {
                event: SpawnEventKind::QuickDraw,
            } = event
            {
                let def = RogueLiteDirector::quick_draw_target(self.beat_count);
                self.spawn
                    .inject_event_target(self.beat_count, self.beat_interval, def, "quick-draw");
            }
        }

        self.spawn.update(
            dt,
            &self.projector,
            &self.config.projection,
            self.config.aspect,
        );

        TickReport {
            frame,
            cues,
            beat,
            beat_count: self.beat_count,
            beat_interval: self.beat_interval,
            spawned,
            director,
        }
    }

    fn stage_speed(&self) -> f32 {
        self.director
            .current_stage_config()
            .map(|s| s.speed)
            .unwrap_or(1.0)
    }

    /// Smooth the live beat-interval estimate, discarding implausible gaps.
    fn track_beat_interval(&mut self) {
        if let Some(last) = self.last_beat_at {
            let measured = (self.clock - last) as f32;
            if (BEAT_INTERVAL_MIN..=BEAT_INTERVAL_MAX).contains(&measured) {
                self.beat_interval = self.beat_interval * 0.7 + measured * 0.3;
            }
        }
        self.last_beat_at = Some(self.clock);
    }

    fn on_beat(&mut self, frame: &AudioFrame, director: &DirectorFrame) -> usize {
        let Some(stage) = self.director.current_stage_config() else {
            return 0;
        };
        let modifiers = &director.spawn_modifiers;

        let mut audio = AudioFeatureBundle::from(frame);
        audio.bass = (audio.bass * (1.0 + modifiers.bass_bias)).min(1.0);

        let difficulty = DifficultyConfig {
            density: stage.density * (1.0 + modifiers.density_boost),
            speed: stage.speed,
            chaos: (stage.chaos + modifiers.chaos_boost).clamp(0.0, 1.5),
            audio,
        };

        // Cluster bias periodically re-aims generation at the cluster
        // archetype without losing the configured one.
        let home = self.geometry.geometry_id();
        let biased = modifiers.cluster_bias > 0.0 && self.beat_count % 4 == 0;
        if biased {
            self.geometry.set_archetype(GeometryArchetype::Fractal);
        }
        let targets = self.geometry.generate_targets(self.beat_count, &difficulty);
        if biased {
            self.geometry.set_archetype(home);
        }

        let spawned = targets.len();
        self.spawn
            .handle_beat(self.beat_count, self.beat_interval, targets);
        trace!(
            "Beat {}: {} spawned, interval={:.3}",
            self.beat_count,
            spawned,
            self.beat_interval
        );

        self.beats_in_stage += 1;
        if self.beats_in_stage >= stage.beat_length {
            self.beats_in_stage = 0;
            self.director.advance_stage(&mut self.game);
        }

        spawned
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn beat_frame(intensity: f32) -> AudioFrame {
        AudioFrame {
            intensity,
            volume: intensity,
            beat: true,
            ..AudioFrame::default()
        }
    }

    #[test]
    fn test_tick_without_run_is_quiet() {
        let mut session = Session::new(SessionConfig::default());
        let report = session.tick(0.016);
        assert_eq!(report.director.stage, 0);
        assert_eq!(report.spawned, 0);
        assert!(session.targets().is_empty());
    }

    #[test]
    fn test_beats_drive_generation() {
        let mut session = Session::new(SessionConfig {
            seed: 11,
            ..SessionConfig::default()
        });
        session.start_run(RunTemplate::default());

        session.set_manual_frame(Some(beat_frame(0.8)));
        let report = session.tick(0.016);
        assert!(report.beat);
        assert_eq!(report.beat_count, 1);
        assert!(report.spawned > 0);
        assert_eq!(session.targets().len(), report.spawned);
    }

    #[test]
    fn test_beat_interval_estimate_tracks_cadence() {
        let mut session = Session::new(SessionConfig::default());
        session.start_run(RunTemplate::default());

        // Two beats 0.6s apart; estimate moves from the 0.5s seed toward 0.6
        session.set_manual_frame(Some(beat_frame(0.7)));
        session.tick(0.016);
        session.set_manual_frame(Some(AudioFrame {
            intensity: 0.7,
            beat: false,
            ..AudioFrame::default()
        }));
        for _ in 0..36 {
            session.tick(0.0164);
        }
        session.set_manual_frame(Some(beat_frame(0.7)));
        let report = session.tick(0.016);
        assert!(report.beat_interval > 0.5);
        assert!(report.beat_interval < 0.6);
    }

    #[test]
    fn test_resolve_target_builds_and_breaks_combo() {
        let mut session = Session::new(SessionConfig::default());
        session.start_run(RunTemplate::default());

        session.resolve_target(1, true);
        session.resolve_target(2, true);
        assert_eq!(session.game_state().combo, 2);
        assert!(session.game_state().score > 0);

        session.resolve_target(3, false);
        assert_eq!(session.game_state().combo, 0);
        assert_eq!(session.game_state().max_combo, 2);
    }
}
