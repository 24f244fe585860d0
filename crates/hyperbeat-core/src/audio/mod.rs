//! Audio analysis: feature frames, sources, the FFT analyzer, and section cues.

use serde::{Deserialize, Serialize};

pub mod analyzer;
pub mod cues;
pub mod source;

pub use analyzer::AudioAnalyzer;
pub use cues::{AudioCues, CueTracker};
#[cfg(feature = "audio")]
pub use source::MicSource;
pub use source::{AudioSource, BufferSource};

/// Coarse frequency bands used by the direction engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FrequencyBand {
    /// < 220 Hz
    Low,
    /// 220 Hz - 2 kHz
    Mid,
    /// > 2 kHz
    High,
}

/// Average magnitude per coarse band, each normalized to roughly [0, 1].
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct BandEnergies {
    /// Low band energy
    pub low: f32,
    /// Mid band energy
    pub mid: f32,
    /// High band energy
    pub high: f32,
}

impl BandEnergies {
    /// The band carrying the most energy.
    pub fn dominant(&self) -> FrequencyBand {
        if self.low >= self.mid && self.low >= self.high {
            FrequencyBand::Low
        } else if self.mid >= self.high {
            FrequencyBand::Mid
        } else {
            FrequencyBand::High
        }
    }
}

/// One normalized feature frame, recomputed every tick.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AudioFrame {
    /// Smoothed RMS of the time-domain samples, clipped to [0, 1]
    pub intensity: f32,
    /// Alias of `intensity` kept for renderer compatibility
    pub volume: f32,
    /// Beat fired this frame (refractory-debounced)
    pub beat: bool,
    /// Spectral centroid in Hz (0 when the spectrum is empty)
    pub spectral_centroid: f32,
    /// Frequency of the strongest FFT bin in Hz
    pub dominant_frequency: f32,
    /// Band with the most energy
    pub dominant_band: FrequencyBand,
    /// Per-band average magnitudes
    pub band_energies: BandEnergies,
    /// Intensity below the silence floor
    pub silence: bool,
    /// Host-supplied monotonic timestamp in seconds
    pub timestamp: f64,
}

impl Default for AudioFrame {
    fn default() -> Self {
        Self {
            intensity: 0.0,
            volume: 0.0,
            beat: false,
            spectral_centroid: 0.0,
            dominant_frequency: 0.0,
            dominant_band: FrequencyBand::Low,
            band_energies: BandEnergies::default(),
            silence: true,
            timestamp: 0.0,
        }
    }
}

/// Audio feature snapshot carried inside a difficulty payload.
///
/// Absent fields deserialize to zero, which reads as "feature disabled":
/// the generator then falls back to manual density/chaos alone.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioFeatureBundle {
    /// Low band energy
    pub bass: f32,
    /// Mid band energy
    pub mid: f32,
    /// High band energy
    pub high: f32,
    /// Overall intensity
    pub energy: f32,
    /// Silence flag from the analyzer
    pub silence: bool,
}

impl From<&AudioFrame> for AudioFeatureBundle {
    fn from(frame: &AudioFrame) -> Self {
        Self {
            bass: frame.band_energies.low,
            mid: frame.band_energies.mid,
            high: frame.band_energies.high,
            energy: frame.intensity,
            silence: frame.silence,
        }
    }
}

/// Configuration for the audio analyzer.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioConfig {
    /// FFT size (power of 2, typically 512-2048)
    pub fft_size: usize,
    /// Sample rate of the audio source
    pub sample_rate: u32,
    /// Exponential smoothing factor for intensity
    pub smoothing: f32,
    /// Beat threshold multiplier over the rolling intensity mean
    pub beat_sensitivity: f32,
    /// Additive floor over the rolling mean; whichever threshold is higher wins
    pub beat_floor: f32,
    /// Refractory interval between beats, in seconds
    pub min_beat_interval: f64,
    /// Intensity below this level reads as silence
    pub min_silence_level: f32,
    /// Length of the rolling intensity window used for beat thresholds
    pub intensity_window: usize,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            fft_size: 1024,
            sample_rate: 44100,
            smoothing: 0.65,
            beat_sensitivity: 1.45,
            beat_floor: 0.05,
            min_beat_interval: 0.12,
            min_silence_level: 0.04,
            intensity_window: 48,
        }
    }
}
