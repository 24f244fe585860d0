//! Audio sample sources: pre-decoded buffers and live microphone capture.

#[cfg(feature = "audio")]
use crate::{CoreError, Result};
#[cfg(feature = "audio")]
use tracing::debug;

/// A supplier of raw time-domain samples for the analyzer.
///
/// Sources are pulled synchronously once per tick; they hand over whatever
/// samples accumulated since the previous pull.
pub trait AudioSource {
    /// Sample rate of the delivered samples, in Hz.
    fn sample_rate(&self) -> u32;

    /// Append all pending samples to `out`, returning how many were added.
    fn pull(&mut self, out: &mut Vec<f32>) -> usize;
}

/// A source backed by a pre-decoded sample buffer, delivered in fixed chunks.
///
/// Used for scripted playback and tests; loops by default so a short clip can
/// drive an arbitrarily long session.
pub struct BufferSource {
    samples: Vec<f32>,
    cursor: usize,
    chunk_size: usize,
    sample_rate: u32,
    looping: bool,
}

impl BufferSource {
    /// Create a buffer source delivering `chunk_size` samples per pull.
    pub fn new(samples: Vec<f32>, sample_rate: u32, chunk_size: usize) -> Self {
        Self {
            samples,
            cursor: 0,
            chunk_size: chunk_size.max(1),
            sample_rate,
            looping: true,
        }
    }

    /// Stop at the end of the buffer instead of looping.
    pub fn once(mut self) -> Self {
        self.looping = false;
        self
    }
}

impl AudioSource for BufferSource {
    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn pull(&mut self, out: &mut Vec<f32>) -> usize {
        if self.samples.is_empty() {
            return 0;
        }

        let mut delivered = 0;
        while delivered < self.chunk_size {
            if self.cursor >= self.samples.len() {
                if !self.looping {
                    break;
                }
                self.cursor = 0;
            }
            let end = (self.cursor + self.chunk_size - delivered).min(self.samples.len());
            out.extend_from_slice(&self.samples[self.cursor..end]);
            delivered += end - self.cursor;
            self.cursor = end;
        }
        delivered
    }
}

/// Live microphone capture via cpal.
///
/// The input stream callback pushes mono-mixed samples over a bounded channel;
/// the engine drains them on its own tick. Dropping the source releases the
/// stream.
#[cfg(feature = "audio")]
pub struct MicSource {
    receiver: crossbeam_channel::Receiver<f32>,
    sample_rate: u32,
    // Kept alive until dropped; dropping stops capture.
    _stream: cpal::Stream,
}

#[cfg(feature = "audio")]
impl MicSource {
    /// Open the default input device and start capturing.
    pub fn open() -> Result<Self> {
        use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};

        let host = cpal::default_host();
        let device = host
            .default_input_device()
            .ok_or_else(|| CoreError::AudioUnavailable("no input device".into()))?;
        let config = device
            .default_input_config()
            .map_err(|e| CoreError::AudioUnavailable(format!("no input config: {e}")))?;

        let sample_rate = config.sample_rate().0;
        let channels = config.channels() as usize;

        // Enough headroom for ~0.5s of audio between pulls
        let (sender, receiver) = crossbeam_channel::bounded::<f32>(sample_rate as usize / 2);

        let stream = device
            .build_input_stream(
                &config.into(),
                move |data: &[f32], _| {
                    for frame in data.chunks(channels) {
                        let mono = frame.iter().sum::<f32>() / channels as f32;
                        // Drop samples on overflow rather than block the callback
                        let _ = sender.try_send(mono);
                    }
                },
                |e| tracing::warn!("Input stream error: {e}"),
                None,
            )
            .map_err(|e| CoreError::AudioUnavailable(format!("stream build failed: {e}")))?;

        stream
            .play()
            .map_err(|e| CoreError::AudioUnavailable(format!("stream start failed: {e}")))?;

        debug!(
            "MicSource opened: sample_rate={}, channels={}",
            sample_rate, channels
        );

        Ok(Self {
            receiver,
            sample_rate,
            _stream: stream,
        })
    }
}

#[cfg(feature = "audio")]
impl AudioSource for MicSource {
    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn pull(&mut self, out: &mut Vec<f32>) -> usize {
        let before = out.len();
        while let Ok(sample) = self.receiver.try_recv() {
            out.push(sample);
        }
        out.len() - before
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_buffer_source_chunks() {
        let mut source = BufferSource::new(vec![1.0; 100], 44100, 32);
        let mut out = Vec::new();
        assert_eq!(source.pull(&mut out), 32);
        assert_eq!(out.len(), 32);
    }

    #[test]
    fn test_buffer_source_loops() {
        let mut source = BufferSource::new(vec![0.5; 10], 44100, 32);
        let mut out = Vec::new();
        // Wraps around the 10-sample buffer to fill the chunk
        assert_eq!(source.pull(&mut out), 32);
    }

    #[test]
    fn test_buffer_source_once_stops() {
        let mut source = BufferSource::new(vec![0.5; 10], 44100, 32).once();
        let mut out = Vec::new();
        assert_eq!(source.pull(&mut out), 10);
        assert_eq!(source.pull(&mut out), 0);
    }

    #[test]
    fn test_empty_buffer() {
        let mut source = BufferSource::new(Vec::new(), 44100, 32);
        let mut out = Vec::new();
        assert_eq!(source.pull(&mut out), 0);
    }
}
