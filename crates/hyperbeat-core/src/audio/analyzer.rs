//! FFT-based audio feature extraction with debounced beat detection.
//!
//! The analyzer pulls raw time-domain samples from an [`AudioSource`] once per
//! tick, keeps them in a windowed ring buffer, and derives one [`AudioFrame`]
//! per update: smoothed RMS intensity, three coarse band energies, spectral
//! centroid, dominant frequency, a refractory-debounced beat flag, and a
//! silence flag.

use super::{AudioConfig, AudioFrame, AudioSource, BandEnergies};
use crate::Result;
use num_complex::Complex;
use rustfft::{Fft, FftPlanner};
use std::collections::VecDeque;
use std::sync::Arc;
use tracing::{debug, trace};

/// Upper edge of the low band in Hz.
const LOW_BAND_HZ: f32 = 220.0;
/// Upper edge of the mid band in Hz.
const MID_BAND_HZ: f32 = 2000.0;

/// Live audio analyzer producing one normalized feature frame per tick.
pub struct AudioAnalyzer {
    config: AudioConfig,

    source: Option<Box<dyn AudioSource>>,
    initialized: bool,

    fft: Arc<dyn Fft<f32>>,
    fft_buffer: Vec<Complex<f32>>,
    scratch_buffer: Vec<Complex<f32>>,
    window: Vec<f32>,
    magnitudes: Vec<f32>,

    // Ring buffer of the most recent fft_size samples
    input_buffer: Vec<f32>,
    write_pos: usize,
    total_samples: u64,

    pull_scratch: Vec<f32>,

    intensity: f32,
    intensity_window: VecDeque<f32>,
    last_beat_at: f64,

    manual_frame: Option<AudioFrame>,
    latest: AudioFrame,
    update_count: u64,
}

impl AudioAnalyzer {
    /// Create an analyzer with no source attached yet.
    pub fn new(config: AudioConfig) -> Self {
        let fft_size = config.fft_size;
        let mut planner = FftPlanner::new();
        let fft = planner.plan_fft_forward(fft_size);

        // Pre-compute Hann window
        let window: Vec<f32> = (0..fft_size)
            .map(|i| {
                let t = i as f32 / (fft_size - 1) as f32;
                0.5 * (1.0 - (2.0 * std::f32::consts::PI * t).cos())
            })
            .collect();

        Self {
            fft,
            fft_buffer: vec![Complex::new(0.0, 0.0); fft_size],
            scratch_buffer: vec![Complex::new(0.0, 0.0); fft_size],
            window,
            magnitudes: vec![0.0; fft_size / 2],
            input_buffer: vec![0.0; fft_size],
            write_pos: 0,
            total_samples: 0,
            pull_scratch: Vec::with_capacity(fft_size),
            intensity: 0.0,
            intensity_window: VecDeque::with_capacity(config.intensity_window),
            last_beat_at: f64::NEG_INFINITY,
            manual_frame: None,
            latest: AudioFrame::default(),
            update_count: 0,
            source: None,
            initialized: false,
            config,
        }
    }

    /// Create an analyzer with an externally supplied source already attached.
    pub fn with_source(config: AudioConfig, source: Box<dyn AudioSource>) -> Self {
        let mut analyzer = Self::new(config);
        analyzer.attach_source(source);
        analyzer
    }

    /// Attach (or replace) the audio source.
    pub fn attach_source(&mut self, source: Box<dyn AudioSource>) {
        self.config.sample_rate = source.sample_rate();
        self.source = Some(source);
        self.initialized = true;
        debug!(
            "AudioAnalyzer source attached: sample_rate={}, fft_size={}",
            self.config.sample_rate, self.config.fft_size
        );
    }

    /// Acquire an audio source.
    ///
    /// Uses the already-attached source when present (idempotent), otherwise
    /// requests live microphone capture. Fails with
    /// [`CoreError::AudioUnavailable`] when no source can be obtained.
    pub fn initialize(&mut self) -> Result<()> {
        if self.initialized {
            return Ok(());
        }

        #[cfg(feature = "audio")]
        {
            let mic = super::MicSource::open()?;
            self.attach_source(Box::new(mic));
            Ok(())
        }

        #[cfg(not(feature = "audio"))]
        Err(crate::CoreError::AudioUnavailable(
            "built without the `audio` feature and no source attached".into(),
        ))
    }

    /// Whether a source is currently attached.
    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    /// Override live analysis with an injected frame; `None` clears the
    /// override and resumes analysis.
    pub fn set_manual_frame(&mut self, frame: Option<AudioFrame>) {
        self.manual_frame = frame;
    }

    /// Release the audio source.
    pub fn destroy(&mut self) {
        self.source = None;
        self.initialized = false;
        debug!("AudioAnalyzer destroyed");
    }

    /// The most recent frame, without recomputing.
    pub fn latest(&self) -> &AudioFrame {
        &self.latest
    }

    /// Pull pending samples and compute the feature frame for this tick.
    pub fn update(&mut self, now: f64) -> AudioFrame {
        self.update_count += 1;

        if let Some(manual) = &self.manual_frame {
            let mut frame = manual.clone();
            frame.timestamp = now;
            frame.volume = frame.intensity;
            // Manual frames still feed the beat threshold window so scripted
            // playback exercises the same debounce path
            frame.beat = self.debounce_beat(frame.intensity, frame.beat, now);
            self.latest = frame.clone();
            return frame;
        }

        if !self.initialized {
            // Degrade toward a silent frame rather than raising
            self.intensity *= self.config.smoothing;
            if self.intensity < 1e-4 {
                self.intensity = 0.0;
            }
            let frame = AudioFrame {
                intensity: self.intensity,
                volume: self.intensity,
                silence: self.intensity < self.config.min_silence_level,
                timestamp: now,
                ..AudioFrame::default()
            };
            self.latest = frame.clone();
            return frame;
        }

        // 1. Drain the source
        self.pull_scratch.clear();
        if let Some(source) = &mut self.source {
            source.pull(&mut self.pull_scratch);
        }

        // 2. Sanitize and feed the ring buffer; NaN/Inf would poison every
        // downstream metric
        let mut sum_sq = 0.0f32;
        for i in 0..self.pull_scratch.len() {
            let sample = self.pull_scratch[i];
            let sample = if sample.is_finite() { sample } else { 0.0 };
            sum_sq += sample * sample;
            self.input_buffer[self.write_pos] = sample;
            self.write_pos = (self.write_pos + 1) % self.config.fft_size;
            self.total_samples += 1;
        }

        // 3. Smoothed RMS intensity
        let rms = if self.pull_scratch.is_empty() {
            0.0
        } else {
            (sum_sq / self.pull_scratch.len() as f32).sqrt().min(1.0)
        };
        self.intensity =
            self.intensity * self.config.smoothing + rms * (1.0 - self.config.smoothing);

        // 4. Spectrum, once the ring holds a full window
        if self.total_samples >= self.config.fft_size as u64 {
            self.compute_spectrum();
        }

        let (band_energies, spectral_centroid, dominant_frequency) = self.spectral_features();

        // 5. Beat and silence flags
        let beat = self.detect_beat(now);
        let silence = self.intensity < self.config.min_silence_level;

        if self.update_count % 600 == 0 {
            trace!(
                "Audio: intensity={:.3} bands=({:.3},{:.3},{:.3}) centroid={:.0}Hz",
                self.intensity,
                band_energies.low,
                band_energies.mid,
                band_energies.high,
                spectral_centroid
            );
        }

        let frame = AudioFrame {
            intensity: self.intensity,
            volume: self.intensity,
            beat,
            spectral_centroid,
            dominant_frequency,
            dominant_band: band_energies.dominant(),
            band_energies,
            silence,
            timestamp: now,
        };
        self.latest = frame.clone();
        frame
    }

    /// Windowed FFT over the unwrapped ring buffer.
    fn compute_spectrum(&mut self) {
        let fft_size = self.config.fft_size;
        for i in 0..fft_size {
            let src_idx = (self.write_pos + i) % fft_size;
            let windowed = self.input_buffer[src_idx] * self.window[i];
            self.fft_buffer[i] = Complex::new(windowed, 0.0);
        }

        self.fft
            .process_with_scratch(&mut self.fft_buffer, &mut self.scratch_buffer);

        let norm = 1.0 / (fft_size as f32).sqrt();
        for i in 0..self.magnitudes.len() {
            self.magnitudes[i] = self.fft_buffer[i].norm() * norm;
        }
    }

    /// Band energies, spectral centroid, and dominant frequency from the
    /// current magnitude spectrum.
    fn spectral_features(&self) -> (BandEnergies, f32, f32) {
        let bin_hz = self.config.sample_rate as f32 / self.config.fft_size as f32;

        let mut sums = [0.0f32; 3];
        let mut counts = [0u32; 3];
        let mut weighted = 0.0f32;
        let mut total = 0.0f32;
        let mut peak_bin = 0usize;
        let mut peak_mag = 0.0f32;

        // Skip the DC bin
        for (i, &mag) in self.magnitudes.iter().enumerate().skip(1) {
            let freq = i as f32 * bin_hz;
            let band = if freq < LOW_BAND_HZ {
                0
            } else if freq < MID_BAND_HZ {
                1
            } else {
                2
            };
            sums[band] += mag;
            counts[band] += 1;
            weighted += mag * freq;
            total += mag;
            if mag > peak_mag {
                peak_mag = mag;
                peak_bin = i;
            }
        }

        let avg = |band: usize| {
            if counts[band] > 0 {
                (sums[band] / counts[band] as f32).min(1.0)
            } else {
                0.0
            }
        };
        let bands = BandEnergies {
            low: avg(0),
            mid: avg(1),
            high: avg(2),
        };
        let centroid = if total > 0.0 { weighted / total } else { 0.0 };
        let dominant = if peak_mag > 0.0 {
            peak_bin as f32 * bin_hz
        } else {
            0.0
        };

        (bands, centroid, dominant)
    }

    /// Rolling-window beat detection with a mandatory refractory interval.
    fn detect_beat(&mut self, now: f64) -> bool {
        self.intensity_window.push_back(self.intensity);
        if self.intensity_window.len() > self.config.intensity_window {
            self.intensity_window.pop_front();
        }

        if self.intensity_window.len() < 8 {
            return false;
        }

        let mean: f32 =
            self.intensity_window.iter().sum::<f32>() / self.intensity_window.len() as f32;
        let threshold = (mean * self.config.beat_sensitivity).max(mean + self.config.beat_floor);

        let fired = self.intensity > threshold
            && now - self.last_beat_at >= self.config.min_beat_interval;
        if fired {
            self.last_beat_at = now;
            trace!("Beat at {:.3}s, intensity={:.3}", now, self.intensity);
        }
        fired
    }

    /// Debounce path shared with manual frames.
    fn debounce_beat(&mut self, intensity: f32, requested: bool, now: f64) -> bool {
        self.intensity_window.push_back(intensity);
        if self.intensity_window.len() > self.config.intensity_window {
            self.intensity_window.pop_front();
        }
        let fired = requested && now - self.last_beat_at >= self.config.min_beat_interval;
        if fired {
            self.last_beat_at = now;
        }
        fired
    }

    /// Current sample rate.
    pub fn sample_rate(&self) -> u32 {
        self.config.sample_rate
    }
}
