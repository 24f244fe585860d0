//! Rogue-lite meta-progression director.
//!
//! One run at a time: stage escalation, a random-unlock modifier pool,
//! cooldown-gated effect activation from audio cues, a single-slot directive
//! (mini-challenge) state machine, and a bounded event queue drained exactly
//! once per tick. Every public operation returns a valid, possibly-degraded
//! result; a missed cue must never stall the rhythm loop.

use crate::audio::AudioCues;
use crate::geometry::{TargetDefinition, TargetShape};
use crossbeam_channel::{bounded, Receiver, Sender};
use glam::Vec4;
use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::{debug, trace, warn};

// Rule-table cooldowns, in seconds.
const DROP_COOLDOWN: f32 = 8.0;
const LULL_COOLDOWN: f32 = 12.0;
const SILENCE_COOLDOWN: f32 = 14.0;
const FLUX_COOLDOWN: f32 = 10.0;
const QUICK_DRAW_COOLDOWN: f32 = 10.0;
const DROP_DIRECTIVE_REARM: f32 = 6.0;
const STAGE_DIRECTIVE_REARM: f32 = 5.0;

/// Flux magnitude gate for the tempo-shift rule.
const FLUX_GATE: f32 = 0.3;

/// Charge bounds.
const MIN_CHARGES: u8 = 1;
const MAX_CHARGES: u8 = 3;

/// Activatable gameplay effects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EffectKind {
    /// Screen-space jitter on projected targets
    Glitch,
    /// Global lane-endpoint reversal
    Reverse,
    /// Tempo scale perturbation
    TempoShift,
}

/// One active, timed effect.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActiveEffect {
    /// Effect id
    pub kind: EffectKind,
    /// HUD label
    pub label: String,
    /// HUD variant hint
    pub variant: CalloutVariant,
    /// Total duration in seconds
    pub duration: f32,
    /// Seconds remaining
    pub remaining: f32,
    /// Effect-specific magnitude (glitch intensity, tempo multiplier, ...)
    pub magnitude: f32,
}

/// Timed mini-challenges. At most one is active at a time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DirectiveKind {
    /// Clear a burst of targets inside the window
    PulseBlast,
    /// Hold phase energy above a floor
    PhaseHold,
    /// Match a swipe pattern to the rhythm
    SwipeSync,
    /// Score nothing during an enforced hush
    SilenceFreeze,
    /// Echo a pulse pattern back on-beat
    EchoPulse,
}

/// Player-input requirement class for a directive. Classification of the raw
/// input signal lives with the input collaborator; the director only consumes
/// pre-classified outcomes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DirectiveRequirement {
    /// Resolve N targets
    Hits,
    /// Sustain a state for the duration
    Hold,
    /// Swipe-classified input
    Swipe,
    /// Precision-timed pulses
    PulsePrecision,
}

/// Designer-tunable numbers for one directive.
#[derive(Debug, Clone, Copy)]
pub struct DirectiveDef {
    /// HUD label
    pub label: &'static str,
    /// Callout shown when the directive is issued
    pub callout: &'static str,
    /// Input requirement class
    pub requirement: DirectiveRequirement,
    /// Goal count (targets, pulses) where applicable
    pub goal: u32,
    /// Challenge window in seconds
    pub duration: f32,
    /// Base score reward, multiplied by stage
    pub reward_score: u32,
    /// Grant a special charge on success
    pub reward_charge: bool,
    /// Grant a life on success
    pub reward_life: bool,
    /// Phase energy granted on success
    pub reward_phase: f32,
    /// Tempo-boost effect granted on success: (magnitude, duration)
    pub reward_tempo: Option<(f32, f32)>,
    /// Transient boost template granted on success
    pub reward_transient: Option<TransientBoost>,
    /// Penalty effect on failure: (kind, magnitude, duration)
    pub penalty_effect: Option<(EffectKind, f32, f32)>,
    /// Drain a charge on failure
    pub penalty_charge: bool,
    /// Directive cooldown re-armed on resolution, in seconds
    pub cooldown: f32,
}

impl DirectiveKind {
    /// Static definition table.
    pub fn def(self) -> &'static DirectiveDef {
        match self {
            DirectiveKind::PulseBlast => &DirectiveDef {
                label: "Pulse Blast",
                callout: "PULSE BLAST: clear the burst!",
                requirement: DirectiveRequirement::Hits,
                goal: 6,
                duration: 8.0,
                reward_score: 400,
                reward_charge: true,
                reward_life: false,
                reward_phase: 0.0,
                reward_tempo: None,
                reward_transient: Some(TransientBoost {
                    density: 0.35,
                    chaos: 0.1,
                    tempo: 0.0,
                    remaining: 10.0,
                    duration: 10.0,
                }),
                penalty_effect: Some((EffectKind::Glitch, 0.9, 3.0)),
                penalty_charge: false,
                cooldown: 5.0,
            },
            DirectiveKind::PhaseHold => &DirectiveDef {
                label: "Phase Hold",
                callout: "PHASE HOLD: keep the meter up!",
                requirement: DirectiveRequirement::Hold,
                goal: 0,
                duration: 6.0,
                reward_score: 250,
                reward_charge: false,
                reward_life: false,
                reward_phase: 0.4,
                reward_tempo: None,
                reward_transient: None,
                penalty_effect: Some((EffectKind::Reverse, 1.0, 4.0)),
                penalty_charge: false,
                cooldown: 3.5,
            },
            DirectiveKind::SwipeSync => &DirectiveDef {
                label: "Swipe Sync",
                callout: "SWIPE SYNC: ride the shift!",
                requirement: DirectiveRequirement::Swipe,
                goal: 4,
                duration: 7.0,
                reward_score: 300,
                reward_charge: false,
                reward_life: false,
                reward_phase: 0.2,
                reward_tempo: Some((1.25, 6.0)),
                reward_transient: None,
                penalty_effect: Some((EffectKind::TempoShift, 0.8, 4.0)),
                penalty_charge: true,
                cooldown: 6.0,
            },
            DirectiveKind::SilenceFreeze => &DirectiveDef {
                label: "Silence Freeze",
                callout: "FREEZE: hold fire in the hush!",
                requirement: DirectiveRequirement::Hold,
                goal: 0,
                duration: 4.0,
                reward_score: 200,
                reward_charge: false,
                reward_life: true,
                reward_phase: 0.0,
                reward_tempo: None,
                reward_transient: None,
                penalty_effect: Some((EffectKind::Glitch, 0.7, 2.5)),
                penalty_charge: true,
                cooldown: 7.0,
            },
            DirectiveKind::EchoPulse => &DirectiveDef {
                label: "Echo Pulse",
                callout: "ECHO PULSE: answer the call!",
                requirement: DirectiveRequirement::PulsePrecision,
                goal: 3,
                duration: 6.0,
                reward_score: 350,
                reward_charge: false,
                reward_life: false,
                reward_phase: 0.3,
                reward_tempo: None,
                reward_transient: Some(TransientBoost {
                    density: 0.2,
                    chaos: 0.25,
                    tempo: 0.1,
                    remaining: 8.0,
                    duration: 8.0,
                }),
                penalty_effect: None,
                penalty_charge: true,
                cooldown: 4.5,
            },
        }
    }
}

/// Persistent per-run gameplay modifiers unlocked on stage-up.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ModifierKind {
    /// Drops additionally spawn quick-draw challenges
    DropQuickDraw,
    /// Raises baseline spawn density
    DenseLattice,
    /// Biases generation toward cluster shapes
    ClusterBloom,
    /// Passive phase-energy regeneration
    PhaseSiphon,
    /// Low-band energy weighs heavier in generation
    BassConduit,
    /// Raises baseline chaos and density together
    ChaosEngine,
}

/// Effect deltas carried by one modifier.
#[derive(Debug, Clone, Copy)]
pub struct ModifierDef {
    /// HUD label
    pub label: &'static str,
    /// Additive density boost
    pub density_boost: f32,
    /// Additive chaos boost
    pub chaos_boost: f32,
    /// Additive cluster-shape bias
    pub cluster_bias: f32,
    /// Additive phase regeneration per second
    pub phase_regen_bonus: f32,
    /// Additive low-band weighting
    pub bass_bias: f32,
    /// Unlocks the drop quick-draw rule
    pub drop_quick_draw: bool,
}

impl ModifierKind {
    /// The full unlock pool, in canonical order.
    pub const POOL: [ModifierKind; 6] = [
        ModifierKind::DropQuickDraw,
        ModifierKind::DenseLattice,
        ModifierKind::ClusterBloom,
        ModifierKind::PhaseSiphon,
        ModifierKind::BassConduit,
        ModifierKind::ChaosEngine,
    ];

    /// Static definition table.
    pub fn def(self) -> &'static ModifierDef {
        match self {
            ModifierKind::DropQuickDraw => &ModifierDef {
                label: "Drop Quick-Draw",
                density_boost: 0.0,
                chaos_boost: 0.0,
                cluster_bias: 0.0,
                phase_regen_bonus: 0.0,
                bass_bias: 0.0,
                drop_quick_draw: true,
            },
            ModifierKind::DenseLattice => &ModifierDef {
                label: "Dense Lattice",
                density_boost: 0.25,
                chaos_boost: 0.0,
                cluster_bias: 0.0,
                phase_regen_bonus: 0.0,
                bass_bias: 0.0,
                drop_quick_draw: false,
            },
            ModifierKind::ClusterBloom => &ModifierDef {
                label: "Cluster Bloom",
                density_boost: 0.0,
                chaos_boost: 0.0,
                cluster_bias: 0.4,
                phase_regen_bonus: 0.0,
                bass_bias: 0.0,
                drop_quick_draw: false,
            },
            ModifierKind::PhaseSiphon => &ModifierDef {
                label: "Phase Siphon",
                density_boost: 0.0,
                chaos_boost: 0.0,
                cluster_bias: 0.0,
                phase_regen_bonus: 0.05,
                bass_bias: 0.0,
                drop_quick_draw: false,
            },
            ModifierKind::BassConduit => &ModifierDef {
                label: "Bass Conduit",
                density_boost: 0.0,
                chaos_boost: 0.0,
                cluster_bias: 0.0,
                phase_regen_bonus: 0.0,
                bass_bias: 0.35,
                drop_quick_draw: false,
            },
            ModifierKind::ChaosEngine => &ModifierDef {
                label: "Chaos Engine",
                density_boost: 0.15,
                chaos_boost: 0.2,
                cluster_bias: 0.0,
                phase_regen_bonus: 0.0,
                bass_bias: 0.0,
                drop_quick_draw: false,
            },
        }
    }
}

/// Time-decaying density/chaos/tempo bonus granted by directive success.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TransientBoost {
    /// Density bonus at full strength
    pub density: f32,
    /// Chaos bonus at full strength
    pub chaos: f32,
    /// Tempo bonus at full strength
    pub tempo: f32,
    /// Seconds remaining
    pub remaining: f32,
    /// Total duration
    pub duration: f32,
}

impl TransientBoost {
    /// Linear decay factor in [0, 1].
    pub fn strength(&self) -> f32 {
        if self.duration <= 0.0 {
            0.0
        } else {
            (self.remaining / self.duration).clamp(0.0, 1.0)
        }
    }
}

/// Named cooldown timers, floored at zero.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Cooldowns {
    /// Drop rule
    pub drop: f32,
    /// Lull rule
    pub lull: f32,
    /// Silence rule
    pub silence: f32,
    /// Flux rule
    pub flux: f32,
    /// Directive slot
    pub directive: f32,
    /// Drop quick-draw modifier rule
    pub quick_draw: f32,
}

impl Cooldowns {
    fn tick(&mut self, dt: f32) {
        self.drop = (self.drop - dt).max(0.0);
        self.lull = (self.lull - dt).max(0.0);
        self.silence = (self.silence - dt).max(0.0);
        self.flux = (self.flux - dt).max(0.0);
        self.directive = (self.directive - dt).max(0.0);
        self.quick_draw = (self.quick_draw - dt).max(0.0);
    }
}

/// Serializable state of one run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunState {
    /// Current stage, starting at 1
    pub stage: u32,
    /// Unique id of this run
    pub run_id: u64,
    /// Unlocked modifiers, in unlock order, unique per run
    pub modifiers: Vec<ModifierKind>,
    /// Special charges, always within [1, 3]
    pub charges: u8,
    /// Currently active timed effects
    pub effects: Vec<ActiveEffect>,
    /// Named cooldown timers
    pub cooldowns: Cooldowns,
    /// At most one active directive
    pub active_directive: Option<DirectiveKind>,
    /// Decaying success bonus, if any
    pub transient: Option<TransientBoost>,
}

/// Mutable player-facing state owned by the host game loop.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct GameState {
    /// Accumulated score
    pub score: u64,
    /// Lives remaining
    pub lives: u32,
    /// Current combo
    pub combo: u32,
    /// Best combo this run
    pub max_combo: u32,
    /// Phase energy meter in [0, 1]
    pub phase_energy: f32,
}

/// Template describing what to start a run from.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RunTemplate {
    /// Level/base id the run is played on
    pub base_id: String,
    /// Baseline difficulty before stage scaling
    pub difficulty: crate::geometry::DifficultyConfig,
    /// Starting charges, clamped to [1, 3]
    pub charges: u8,
}

impl Default for RunTemplate {
    fn default() -> Self {
        Self {
            base_id: "default".to_string(),
            difficulty: crate::geometry::DifficultyConfig::default(),
            charges: 1,
        }
    }
}

/// Per-stage difficulty configuration handed to the generator.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StageConfig {
    /// Scaled density
    pub density: f32,
    /// Scaled chaos
    pub chaos: f32,
    /// Scaled speed
    pub speed: f32,
    /// Target length of the stage in beats
    pub beat_length: u32,
}

/// Summary returned when a run completes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunSummary {
    /// Level/base id
    pub base_id: String,
    /// Run id
    pub run_id: u64,
    /// Final stage reached
    pub stage: u32,
    /// Final score
    pub score: u64,
    /// Best combo
    pub max_combo: u32,
    /// Completion time, unix millis
    pub timestamp: i64,
}

/// HUD callout severity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CalloutVariant {
    /// Neutral information
    Info,
    /// Positive surge moment
    Surge,
    /// Player should be careful
    Warning,
    /// Reward granted
    Reward,
}

/// Ad-hoc spawn events issued by the director.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SpawnEventKind {
    /// Single short-lived target the player must hit immediately
    QuickDraw,
}

/// Typed events for the HUD collaborator, drained once per tick.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum DirectorEvent {
    /// Transient HUD text
    Callout {
        /// Display text
        text: String,
        /// Severity
        variant: CalloutVariant,
        /// Display time in seconds
        duration: f32,
    },
    /// A timed effect began
    EffectStart {
        /// Effect id
        kind: EffectKind,
        /// HUD label
        label: String,
        /// Magnitude
        magnitude: f32,
        /// Duration in seconds
        duration: f32,
    },
    /// A timed effect expired
    EffectEnd {
        /// Effect id
        kind: EffectKind,
    },
    /// A directive was issued
    Directive {
        /// Which directive
        directive: DirectiveKind,
    },
    /// The spawn system should inject an ad-hoc target
    SpawnEvent {
        /// Which event
        event: SpawnEventKind,
    },
}

/// Outcome of a resolved directive, classified by the input collaborator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirectiveOutcome {
    /// Which directive resolved
    pub directive: DirectiveKind,
    /// Whether the player met the goal
    pub success: bool,
}

/// Spawn modifier bundle folded from modifiers, effects, and transient
/// boosts; consumed every tick by the generator and spawn system.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpawnModifiers {
    /// Overall intensity passthrough
    pub energy: f32,
    /// Low band passthrough
    pub bass: f32,
    /// Mid band passthrough
    pub mid: f32,
    /// High band passthrough
    pub high: f32,
    /// Spectral flux passthrough
    pub flux: f32,
    /// Multiplier on the spawn-system tempo scale
    pub tempo_multiplier: f32,
    /// Glitch jitter intensity (0 when inactive)
    pub glitch_level: f32,
    /// Whether lane controls are reversed
    pub reverse_controls: bool,
    /// Additive density boost
    pub density_boost: f32,
    /// Additive chaos boost
    pub chaos_boost: f32,
    /// Additive phase regeneration per second
    pub phase_regen_bonus: f32,
    /// Additive low-band weighting
    pub bass_bias: f32,
    /// Additive cluster-shape bias
    pub cluster_bias: f32,
    /// Drop quick-draw rule unlocked
    pub drop_quick_draw: bool,
    /// Labels of active effects and directive, for the HUD
    pub flags: Vec<String>,
}

/// Per-tick output of the director.
#[derive(Debug, Clone)]
pub struct DirectorFrame {
    /// Current stage (0 when idle)
    pub stage: u32,
    /// Snapshot of active effects
    pub effects: Vec<ActiveEffect>,
    /// Unlocked modifiers
    pub persistent_modifiers: Vec<ModifierKind>,
    /// Folded spawn modifier bundle
    pub spawn_modifiers: SpawnModifiers,
    /// Events drained this tick
    pub events: Vec<DirectorEvent>,
}

/// The meta-game controller. `idle` until [`RogueLiteDirector::start_run`],
/// back to `idle` on [`RogueLiteDirector::complete_run`].
pub struct RogueLiteDirector {
    run: Option<RunState>,
    template: RunTemplate,
    next_run_id: u64,
    events_tx: Sender<DirectorEvent>,
    events_rx: Receiver<DirectorEvent>,
}

impl RogueLiteDirector {
    /// Create an idle director.
    pub fn new() -> Self {
        let (events_tx, events_rx) = bounded(64);
        Self {
            run: None,
            template: RunTemplate::default(),
            next_run_id: 1,
            events_tx,
            events_rx,
        }
    }

    /// Whether a run is active.
    pub fn is_running(&self) -> bool {
        self.run.is_some()
    }

    /// Read access to the live run state (for serialization).
    pub fn run_state(&self) -> Option<&RunState> {
        self.run.as_ref()
    }

    /// Restore a serialized run (replay/resume). Replaces any active run.
    pub fn resume_run(&mut self, state: RunState, template: RunTemplate) {
        self.next_run_id = self.next_run_id.max(state.run_id + 1);
        self.template = template;
        self.run = Some(state);
    }

    /// Begin a run at stage 1 and return its stage configuration.
    pub fn start_run(&mut self, template: RunTemplate) -> StageConfig {
        let run_id = self.next_run_id;
        self.next_run_id += 1;

        let state = RunState {
            stage: 1,
            run_id,
            modifiers: Vec::new(),
            charges: template.charges.clamp(MIN_CHARGES, MAX_CHARGES),
            effects: Vec::new(),
            cooldowns: Cooldowns::default(),
            active_directive: None,
            transient: None,
        };
        debug!("Run {} started on '{}'", run_id, template.base_id);

        self.push_event(DirectorEvent::Callout {
            text: format!("RUN {} // STAGE 1", run_id),
            variant: CalloutVariant::Info,
            duration: 2.5,
        });

        self.template = template;
        let config = Self::stage_config(&self.template, 1);
        self.run = Some(state);
        config
    }

    /// Stage configuration for the given stage number.
    pub fn stage_config(template: &RunTemplate, stage: u32) -> StageConfig {
        let s = stage.max(1) as f32 - 1.0;
        StageConfig {
            density: template.difficulty.density * (1.0 + 0.18 * s),
            chaos: template.difficulty.chaos * (1.0 + 0.14 * s),
            speed: template.difficulty.speed * (1.0 + 0.10 * s),
            beat_length: (64 + 8 * stage.max(1)).min(180),
        }
    }

    /// Stage configuration of the active run, if any.
    pub fn current_stage_config(&self) -> Option<StageConfig> {
        self.run
            .as_ref()
            .map(|run| Self::stage_config(&self.template, run.stage))
    }

    /// Advance to the next stage: unlock one unused modifier at random (None
    /// once the pool is exhausted), grant a bonus life every 3rd stage when
    /// below the cap, and re-arm the directive cooldown.
    pub fn advance_stage(&mut self, game: &mut GameState) -> Option<ModifierKind> {
        let Some(run) = &mut self.run else {
            warn!("advance_stage with no active run");
            return None;
        };

        run.stage += 1;
        run.cooldowns.directive = run.cooldowns.directive.max(STAGE_DIRECTIVE_REARM);

        if run.stage % 3 == 0 && game.lives < 3 {
            game.lives += 1;
            let _ = self.events_tx.try_send(DirectorEvent::Callout {
                text: "+1 LIFE".to_string(),
                variant: CalloutVariant::Reward,
                duration: 2.0,
            });
        }

        let remaining: Vec<ModifierKind> = ModifierKind::POOL
            .iter()
            .copied()
            .filter(|m| !run.modifiers.contains(m))
            .collect();
        let unlocked = if remaining.is_empty() {
            None
        } else {
            let pick = remaining[rand::rng().random_range(0..remaining.len())];
            run.modifiers.push(pick);
            Some(pick)
        };

        debug!(
            "Stage {} reached; unlocked {:?}",
            run.stage, unlocked
        );
        if let Some(modifier) = unlocked {
            let _ = self.events_tx.try_send(DirectorEvent::Callout {
                text: format!("UNLOCKED: {}", modifier.def().label),
                variant: CalloutVariant::Reward,
                duration: 3.0,
            });
        }
        unlocked
    }

    /// Advance timers, run the audio-cue rule table, and emit this tick's
    /// frame. Safe to call while idle; returns a degraded frame.
    pub fn update(&mut self, dt: f32, cues: &AudioCues, _game: &mut GameState) -> DirectorFrame {
        if self.run.is_none() {
            return DirectorFrame {
                stage: 0,
                effects: Vec::new(),
                persistent_modifiers: Vec::new(),
                spawn_modifiers: self.compute_spawn_modifiers(cues),
                events: self.drain_events(),
            };
        }

        self.tick_timers(dt);
        self.run_rule_table(cues);

        let (stage, effects, modifiers) = match &self.run {
            Some(run) => (run.stage, run.effects.clone(), run.modifiers.clone()),
            None => (0, Vec::new(), Vec::new()),
        };
        DirectorFrame {
            stage,
            effects,
            persistent_modifiers: modifiers,
            spawn_modifiers: self.compute_spawn_modifiers(cues),
            events: self.drain_events(),
        }
    }

    fn tick_timers(&mut self, dt: f32) {
        let Some(run) = &mut self.run else { return };
        run.cooldowns.tick(dt);

        let mut ended = Vec::new();
        run.effects.retain_mut(|effect| {
            effect.remaining -= dt;
            if effect.remaining <= 0.0 {
                ended.push(effect.kind);
                false
            } else {
                true
            }
        });
        for kind in ended {
            let _ = self.events_tx.try_send(DirectorEvent::EffectEnd { kind });
        }

        if let Some(boost) = &mut run.transient {
            boost.remaining -= dt;
            if boost.remaining <= 0.0 {
                run.transient = None;
            }
        }
    }

    /// The cooldown-gated audio-event rule table. At most one directive can
    /// be queued per tick, and section cues yield to the primary rules.
    fn run_rule_table(&mut self, cues: &AudioCues) {
        let Some(run) = self.run.as_ref() else { return };
        let stage = run.stage;
        let has_quick_draw = run
            .modifiers
            .iter()
            .any(|m| m.def().drop_quick_draw);

        let mut directive_fired = false;

        if cues.drop && self.cooldown(|c| c.drop) <= 0.0 {
            self.set_cooldown(|c| &mut c.drop, DROP_COOLDOWN);
            let magnitude = (0.85 + 0.15 * stage as f32).min(1.6);
            self.activate_effect(EffectKind::Glitch, "Glitch Surge", magnitude, 3.0);

            if has_quick_draw && self.cooldown(|c| c.quick_draw) <= 0.0 {
                self.set_cooldown(|c| &mut c.quick_draw, QUICK_DRAW_COOLDOWN);
                self.push_event(DirectorEvent::SpawnEvent {
                    event: SpawnEventKind::QuickDraw,
                });
            }

            if self.directive_slot_open() {
                directive_fired = self.queue_directive(DirectiveKind::PulseBlast);
                if directive_fired {
                    self.set_cooldown(|c| &mut c.directive, DROP_DIRECTIVE_REARM);
                }
            }
        }

        if cues.lull && self.cooldown(|c| c.lull) <= 0.0 {
            self.set_cooldown(|c| &mut c.lull, LULL_COOLDOWN);
            self.activate_effect(EffectKind::Reverse, "Reverse Tide", 1.0, 6.0);
            if !directive_fired && self.directive_slot_open() {
                directive_fired = self.queue_directive(DirectiveKind::PhaseHold);
            }
        }

        if cues.silence && self.cooldown(|c| c.silence) <= 0.0 {
            self.set_cooldown(|c| &mut c.silence, SILENCE_COOLDOWN);
            self.push_event(DirectorEvent::SpawnEvent {
                event: SpawnEventKind::QuickDraw,
            });
            if !directive_fired && self.directive_slot_open() {
                directive_fired = self.queue_directive(DirectiveKind::SilenceFreeze);
            }
        }

        // Section cues only fire when nothing above claimed the slot this tick
        if !directive_fired && self.directive_slot_open() {
            if cues.bridge {
                directive_fired = self.queue_directive(DirectiveKind::PhaseHold);
            } else if cues.rhythm_shift && stage >= 2 {
                directive_fired = self.queue_directive(DirectiveKind::SwipeSync);
            } else if cues.vocal {
                directive_fired = self.queue_directive(DirectiveKind::EchoPulse);
            }
        }
        let _ = directive_fired;

        if cues.flux > FLUX_GATE && stage >= 2 && self.cooldown(|c| c.flux) <= 0.0 {
            self.set_cooldown(|c| &mut c.flux, FLUX_COOLDOWN);
            let magnitude = (1.0 + (cues.flux - FLUX_GATE) * 1.5).min(1.6);
            self.activate_effect(EffectKind::TempoShift, "Tempo Shift", magnitude, 4.0);
        }
    }

    fn cooldown(&self, f: impl Fn(&Cooldowns) -> f32) -> f32 {
        self.run.as_ref().map(|r| f(&r.cooldowns)).unwrap_or(f32::MAX)
    }

    fn set_cooldown(&mut self, f: impl Fn(&mut Cooldowns) -> &mut f32, value: f32) {
        if let Some(run) = &mut self.run {
            *f(&mut run.cooldowns) = value;
        }
    }

    fn directive_slot_open(&self) -> bool {
        self.run
            .as_ref()
            .map(|r| r.active_directive.is_none() && r.cooldowns.directive <= 0.0)
            .unwrap_or(false)
    }

    /// Occupy the directive slot. No-op (returns false) while one is active.
    pub fn queue_directive(&mut self, directive: DirectiveKind) -> bool {
        let Some(run) = &mut self.run else { return false };
        if run.active_directive.is_some() {
            trace!("Directive slot busy; {:?} dropped", directive);
            return false;
        }
        run.active_directive = Some(directive);
        let def = directive.def();
        debug!("Directive issued: {:?}", directive);
        let _ = self.events_tx.try_send(DirectorEvent::Directive { directive });
        let _ = self.events_tx.try_send(DirectorEvent::Callout {
            text: def.callout.to_string(),
            variant: CalloutVariant::Warning,
            duration: def.duration.min(4.0),
        });
        true
    }

    /// Activate or refresh a timed effect. Re-entrant: an already-active kind
    /// keeps the stronger magnitude and the longer remaining time.
    fn activate_effect(&mut self, kind: EffectKind, label: &str, magnitude: f32, duration: f32) {
        let Some(run) = &mut self.run else { return };

        if let Some(existing) = run.effects.iter_mut().find(|e| e.kind == kind) {
            existing.magnitude = existing.magnitude.max(magnitude);
            existing.remaining = existing.remaining.max(duration);
            existing.duration = existing.duration.max(duration);
        } else {
            run.effects.push(ActiveEffect {
                kind,
                label: label.to_string(),
                variant: CalloutVariant::Warning,
                duration,
                remaining: duration,
                magnitude,
            });
        }
        let _ = self.events_tx.try_send(DirectorEvent::EffectStart {
            kind,
            label: label.to_string(),
            magnitude,
            duration,
        });
    }

    /// Resolve the active directive. Unknown or stale outcomes are silent
    /// no-ops.
    pub fn handle_directive_outcome(&mut self, outcome: DirectiveOutcome, game: &mut GameState) {
        let Some(run) = &mut self.run else { return };
        if run.active_directive != Some(outcome.directive) {
            trace!("Stale directive outcome {:?} ignored", outcome.directive);
            return;
        }

        let def = outcome.directive.def();
        let stage = run.stage;

        if outcome.success {
            game.score += def.reward_score as u64 * stage as u64;
            if def.reward_charge {
                run.charges = (run.charges + 1).min(MAX_CHARGES);
            }
            if def.reward_life && game.lives < 3 {
                game.lives += 1;
            }
            game.phase_energy = (game.phase_energy + def.reward_phase).min(1.0);
            if let Some(boost) = def.reward_transient {
                run.transient = Some(boost);
            }
            run.active_directive = None;
            run.cooldowns.directive = def.cooldown;
            if let Some((magnitude, duration)) = def.reward_tempo {
                self.activate_effect(EffectKind::TempoShift, "Tempo Boost", magnitude, duration);
            }
            let _ = self.events_tx.try_send(DirectorEvent::Callout {
                text: format!("{} COMPLETE", def.label.to_uppercase()),
                variant: CalloutVariant::Reward,
                duration: 2.5,
            });
        } else {
            if def.penalty_charge {
                run.charges = run.charges.saturating_sub(1).max(MIN_CHARGES);
            }
            run.active_directive = None;
            run.cooldowns.directive = def.cooldown;
            if let Some((kind, magnitude, duration)) = def.penalty_effect {
                let label = match kind {
                    EffectKind::Glitch => "Glitch Backlash",
                    EffectKind::Reverse => "Reverse Backlash",
                    EffectKind::TempoShift => "Tempo Drag",
                };
                self.activate_effect(kind, label, magnitude, duration);
            }
            let _ = self.events_tx.try_send(DirectorEvent::Callout {
                text: format!("{} FAILED", def.label.to_uppercase()),
                variant: CalloutVariant::Warning,
                duration: 2.5,
            });
        }
        debug!(
            "Directive {:?} resolved, success={}",
            outcome.directive, outcome.success
        );
    }

    /// Fold unlocked modifiers, active effects, and the decaying transient
    /// boost into one bundle. Pure over (run state, cues).
    pub fn compute_spawn_modifiers(&self, cues: &AudioCues) -> SpawnModifiers {
        let mut out = SpawnModifiers {
            energy: cues.energy,
            bass: cues.bass,
            mid: cues.mid,
            high: cues.high,
            flux: cues.flux,
            tempo_multiplier: 1.0,
            glitch_level: 0.0,
            reverse_controls: false,
            density_boost: 0.0,
            chaos_boost: 0.0,
            phase_regen_bonus: 0.0,
            bass_bias: 0.0,
            cluster_bias: 0.0,
            drop_quick_draw: false,
            flags: Vec::new(),
        };
        let Some(run) = &self.run else { return out };

        for modifier in &run.modifiers {
            let def = modifier.def();
            out.density_boost += def.density_boost;
            out.chaos_boost += def.chaos_boost;
            out.cluster_bias += def.cluster_bias;
            out.phase_regen_bonus += def.phase_regen_bonus;
            out.bass_bias += def.bass_bias;
            out.drop_quick_draw |= def.drop_quick_draw;
        }

        for effect in &run.effects {
            match effect.kind {
                EffectKind::Glitch => {
                    out.glitch_level = out.glitch_level.max(effect.magnitude)
                }
                EffectKind::Reverse => out.reverse_controls = true,
                EffectKind::TempoShift => out.tempo_multiplier *= effect.magnitude,
            }
            out.flags.push(effect.label.clone());
        }

        if let Some(boost) = &run.transient {
            let strength = boost.strength();
            out.density_boost += boost.density * strength;
            out.chaos_boost += boost.chaos * strength;
            out.tempo_multiplier *= 1.0 + boost.tempo * strength;
        }

        if let Some(directive) = run.active_directive {
            out.flags.push(directive.def().label.to_string());
        }

        out
    }

    /// Build the ad-hoc target for a quick-draw spawn event: one node near
    /// the origin, due on the next beat.
    pub fn quick_draw_target(beat: u64) -> TargetDefinition {
        TargetDefinition {
            id: 0,
            shape: TargetShape::Node {
                position: Vec4::new(0.0, 0.0, 0.2, 0.0),
            },
            radius: 0.2,
            due_beat: beat as f32 + 1.0,
            behavior: "quick-draw".to_string(),
        }
    }

    /// End the run and return its summary; the director goes idle.
    pub fn complete_run(&mut self, game: &GameState) -> Option<RunSummary> {
        let run = self.run.take()?;
        let summary = RunSummary {
            base_id: self.template.base_id.clone(),
            run_id: run.run_id,
            stage: run.stage,
            score: game.score,
            max_combo: game.max_combo,
            timestamp: chrono::Utc::now().timestamp_millis(),
        };
        debug!(
            "Run {} complete: stage={}, score={}",
            summary.run_id, summary.stage, summary.score
        );
        Some(summary)
    }

    fn push_event(&self, event: DirectorEvent) {
        // Bounded queue: drop events rather than block the loop
        let _ = self.events_tx.try_send(event);
    }

    fn drain_events(&self) -> Vec<DirectorEvent> {
        let mut events = Vec::new();
        while let Ok(event) = self.events_rx.try_recv() {
            events.push(event);
        }
        events
    }
}

impl Default for RogueLiteDirector {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_idle_update_is_a_noop() {
        let mut director = RogueLiteDirector::new();
        let mut game = GameState::default();
        let frame = director.update(0.016, &AudioCues::default(), &mut game);
        assert_eq!(frame.stage, 0);
        assert!(frame.effects.is_empty());
    }

    #[test]
    fn test_start_run_clamps_charges() {
        let mut director = RogueLiteDirector::new();
        let template = RunTemplate {
            charges: 9,
            ..RunTemplate::default()
        };
        director.start_run(template);
        assert_eq!(director.run_state().unwrap().charges, 3);
    }

    #[test]
    fn test_modifier_pool_exhaustion_is_silent() {
        let mut director = RogueLiteDirector::new();
        let mut game = GameState::default();
        director.start_run(RunTemplate::default());

        let mut unlocked = 0;
        for _ in 0..10 {
            if director.advance_stage(&mut game).is_some() {
                unlocked += 1;
            }
        }
        assert_eq!(unlocked, ModifierKind::POOL.len());

        // Pool exhausted: no repeats, no panic
        let run = director.run_state().unwrap();
        assert_eq!(run.modifiers.len(), ModifierKind::POOL.len());
        let unique: std::collections::HashSet<_> = run.modifiers.iter().collect();
        assert_eq!(unique.len(), run.modifiers.len());
    }

    #[test]
    fn test_bonus_life_every_third_stage() {
        let mut director = RogueLiteDirector::new();
        let mut game = GameState {
            lives: 1,
            ..GameState::default()
        };
        director.start_run(RunTemplate::default());
        director.advance_stage(&mut game); // stage 2
        assert_eq!(game.lives, 1);
        director.advance_stage(&mut game); // stage 3
        assert_eq!(game.lives, 2);
    }

    #[test]
    fn test_effect_end_event_emitted_on_expiry() {
        let mut director = RogueLiteDirector::new();
        let mut game = GameState::default();
        director.start_run(RunTemplate::default());

        let cues = AudioCues {
            drop: true,
            energy: 0.9,
            bass: 0.6,
            ..AudioCues::default()
        };
        director.update(0.016, &cues, &mut game);
        assert!(!director.run_state().unwrap().effects.is_empty());

        // Let the glitch effect run out
        let frame = director.update(5.0, &AudioCues::default(), &mut game);
        assert!(frame
            .events
            .iter()
            .any(|e| matches!(e, DirectorEvent::EffectEnd { kind: EffectKind::Glitch })));
        assert!(director.run_state().unwrap().effects.is_empty());
    }

    #[test]
    fn test_complete_run_goes_idle() {
        let mut director = RogueLiteDirector::new();
        let game = GameState {
            score: 1234,
            ..GameState::default()
        };
        director.start_run(RunTemplate {
            base_id: "level-7".to_string(),
            ..RunTemplate::default()
        });
        let summary = director.complete_run(&game).unwrap();
        assert_eq!(summary.base_id, "level-7");
        assert_eq!(summary.score, 1234);
        assert!(!director.is_running());
        assert!(director.complete_run(&game).is_none());
    }
}
