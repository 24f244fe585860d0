//! Section-cue derivation for the director.
//!
//! The director reacts to musical events (drops, lulls, silence, bridges,
//! rhythm shifts, vocal sections) rather than raw frames. `CueTracker` folds
//! successive [`AudioFrame`]s into one [`AudioCues`] record per tick using the
//! same rolling-mean heuristics as the beat detector.

use super::{AudioFrame, FrequencyBand};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use tracing::trace;

/// Derived musical cues consumed by the director once per tick.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioCues {
    /// Overall intensity
    pub energy: f32,
    /// Low band energy
    pub bass: f32,
    /// Mid band energy
    pub mid: f32,
    /// High band energy
    pub high: f32,
    /// Smoothed |Δenergy| between ticks
    pub flux: f32,
    /// Bass-led energy spike on a beat
    pub drop: bool,
    /// Sustained low-energy stretch
    pub lull: bool,
    /// Sustained near-zero intensity
    pub silence: bool,
    /// Stable mid-heavy section
    pub bridge: bool,
    /// Beat spacing discontinuity
    pub rhythm_shift: bool,
    /// Centroid sitting in the vocal register with mid dominance
    pub vocal: bool,
}

/// Rolling state behind cue derivation.
pub struct CueTracker {
    energy_window: VecDeque<f32>,
    prev_energy: f32,
    flux: f32,
    silence_since: Option<f64>,
    low_since: Option<f64>,
    stable_since: Option<f64>,
    last_beat_at: Option<f64>,
    prev_beat_interval: Option<f64>,
}

/// Window length for the rolling energy mean.
const ENERGY_WINDOW: usize = 48;
/// Silence must hold this long before the cue fires, in seconds.
const SILENCE_HOLD: f64 = 0.8;
/// Low energy must hold this long before a lull fires, in seconds.
const LULL_HOLD: f64 = 2.0;
/// Intensity ceiling for a lull.
const LULL_LEVEL: f32 = 0.12;
/// Flat flux must hold this long before a bridge fires, in seconds.
const BRIDGE_HOLD: f64 = 3.0;

impl CueTracker {
    /// Create an empty tracker.
    pub fn new() -> Self {
        Self {
            energy_window: VecDeque::with_capacity(ENERGY_WINDOW),
            prev_energy: 0.0,
            flux: 0.0,
            silence_since: None,
            low_since: None,
            stable_since: None,
            last_beat_at: None,
            prev_beat_interval: None,
        }
    }

    /// Fold one frame into the rolling state and derive this tick's cues.
    pub fn update(&mut self, frame: &AudioFrame, now: f64) -> AudioCues {
        let energy = frame.intensity;

        self.flux = self.flux * 0.7 + (energy - self.prev_energy).abs() * 0.3;
        self.prev_energy = energy;

        self.energy_window.push_back(energy);
        if self.energy_window.len() > ENERGY_WINDOW {
            self.energy_window.pop_front();
        }
        let mean =
            self.energy_window.iter().sum::<f32>() / self.energy_window.len().max(1) as f32;

        // Drop: a beat whose energy clearly overshoots the rolling mean, led
        // by the low band
        let drop = frame.beat
            && self.energy_window.len() >= 16
            && energy > mean * 1.35
            && frame.band_energies.low >= frame.band_energies.high;

        // Silence: held, not instantaneous
        let silence = if frame.silence {
            let since = *self.silence_since.get_or_insert(now);
            now - since >= SILENCE_HOLD
        } else {
            self.silence_since = None;
            false
        };

        // Lull: audible but sustained near the floor
        let lull = if !frame.silence && energy < LULL_LEVEL {
            let since = *self.low_since.get_or_insert(now);
            now - since >= LULL_HOLD
        } else {
            self.low_since = None;
            false
        };

        // Bridge: flat dynamics with the mid band carrying the section
        let stable = self.flux < 0.02 && !frame.silence;
        let bridge = if stable && frame.dominant_band == FrequencyBand::Mid {
            let since = *self.stable_since.get_or_insert(now);
            now - since >= BRIDGE_HOLD
        } else {
            if !stable {
                self.stable_since = None;
            }
            false
        };

        // Rhythm shift: consecutive beat intervals disagreeing by >25%
        let mut rhythm_shift = false;
        if frame.beat {
            if let Some(last) = self.last_beat_at {
                let interval = now - last;
                if let Some(prev) = self.prev_beat_interval {
                    if prev > 1e-3 && (interval - prev).abs() / prev > 0.25 {
                        rhythm_shift = true;
                    }
                }
                self.prev_beat_interval = Some(interval);
            }
            self.last_beat_at = Some(now);
        }

        // Vocal register: centroid in the speech band and mids dominating
        let vocal = frame.dominant_band == FrequencyBand::Mid
            && frame.spectral_centroid > 300.0
            && frame.spectral_centroid < 3200.0
            && energy > mean;

        let cues = AudioCues {
            energy,
            bass: frame.band_energies.low,
            mid: frame.band_energies.mid,
            high: frame.band_energies.high,
            flux: self.flux,
            drop,
            lull,
            silence,
            bridge,
            rhythm_shift,
            vocal,
        };

        if drop || lull || silence || rhythm_shift {
            trace!(
                "Cues at {:.2}s: drop={} lull={} silence={} shift={}",
                now,
                drop,
                lull,
                silence,
                rhythm_shift
            );
        }

        cues
    }
}

impl Default for CueTracker {
    fn default() -> Self {
        Self::new()
    }
}
