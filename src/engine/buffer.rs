//! Audio Buffer Management
//!
//! Non-interleaved 32-bit float buffers shared by the decoder output and the
//! mixdown accumulator. Samples are nominally in [-1.0, 1.0] but nothing here
//! clamps them; clipping happens only when a buffer is serialized.

use crate::error::{MultitakeError, Result};

// ============================================================================
// Level Helpers
// ============================================================================

/// Convert linear amplitude to decibels
///
/// Returns -f32::INFINITY for zero input.
#[inline]
pub fn linear_to_db(linear: f32) -> f32 {
    if linear <= 0.0 {
        f32::NEG_INFINITY
    } else {
        20.0 * linear.log10()
    }
}

/// Calculate the peak absolute sample value of a buffer (linear)
pub fn calculate_peak(buffer: &AudioBuffer) -> f32 {
    buffer
        .samples
        .iter()
        .flat_map(|channel| channel.iter())
        .map(|&s| s.abs())
        .fold(0.0_f32, f32::max)
}

/// Count samples that fall outside [-1.0, 1.0] and will clip on export
pub fn count_clipped(buffer: &AudioBuffer) -> usize {
    buffer
        .samples
        .iter()
        .flat_map(|channel| channel.iter())
        .filter(|&&s| s.abs() > 1.0)
        .count()
}

// ============================================================================
// Audio Buffer
// ============================================================================

/// Planar float audio: one `Vec<f32>` per channel, all the same length
///
/// # Example
/// ```
/// use multitake::engine::AudioBuffer;
///
/// let buffer = AudioBuffer::new(2, 48000, 48000);
/// assert_eq!(buffer.channels(), 2);
/// assert_eq!(buffer.len(), 48000);
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct AudioBuffer {
    /// Sample data: outer Vec is channels, inner Vec is frames
    pub samples: Vec<Vec<f32>>,
    /// Sample rate in Hz
    pub sample_rate: u32,
}

/// A take decoded into PCM by the platform decoder. Read-only to the engine.
pub type DecodedBuffer = AudioBuffer;

/// The transient accumulator produced by a mixdown.
pub type MixBuffer = AudioBuffer;

impl AudioBuffer {
    /// Create a silent buffer with `channels` channels of `frames` frames
    pub fn new(channels: usize, frames: usize, sample_rate: u32) -> Self {
        Self {
            samples: vec![vec![0.0_f32; frames]; channels],
            sample_rate,
        }
    }

    /// Build a buffer from per-channel sample vectors
    ///
    /// # Errors
    /// * `InvalidBuffer` - if there are no channels or channel lengths differ
    pub fn from_channels(samples: Vec<Vec<f32>>, sample_rate: u32) -> Result<Self> {
        let Some(first) = samples.first() else {
            return Err(MultitakeError::InvalidBuffer {
                reason: "a buffer needs at least one channel".to_string(),
            });
        };

        let frames = first.len();
        if let Some((ch, data)) = samples
            .iter()
            .enumerate()
            .find(|(_, data)| data.len() != frames)
        {
            return Err(MultitakeError::InvalidBuffer {
                reason: format!(
                    "channel {} has {} frames, channel 0 has {}",
                    ch,
                    data.len(),
                    frames
                ),
            });
        }

        Ok(Self {
            samples,
            sample_rate,
        })
    }

    /// Create a mono buffer from a slice of samples
    pub fn mono(samples: &[f32], sample_rate: u32) -> Self {
        Self {
            samples: vec![samples.to_vec()],
            sample_rate,
        }
    }

    /// Create an audio buffer from interleaved sample data
    ///
    /// # Errors
    /// * `InvalidBuffer` - if `channels` is zero or the data length is not a
    ///   multiple of it
    pub fn from_interleaved(interleaved: &[f32], channels: usize, sample_rate: u32) -> Result<Self> {
        if channels == 0 {
            return Err(MultitakeError::InvalidBuffer {
                reason: "a buffer needs at least one channel".to_string(),
            });
        }

        if interleaved.len() % channels != 0 {
            return Err(MultitakeError::InvalidBuffer {
                reason: format!(
                    "Interleaved data length {} is not divisible by channel count {}",
                    interleaved.len(),
                    channels
                ),
            });
        }

        let frames = interleaved.len() / channels;
        let mut samples = vec![Vec::with_capacity(frames); channels];

        for frame in interleaved.chunks_exact(channels) {
            for (ch, &sample) in frame.iter().enumerate() {
                samples[ch].push(sample);
            }
        }

        Ok(Self {
            samples,
            sample_rate,
        })
    }

    /// Convert the buffer to interleaved order (ch0, ch1, ..., ch0, ...)
    pub fn to_interleaved(&self) -> Vec<f32> {
        let channels = self.channels();
        let frames = self.len();

        let mut interleaved = Vec::with_capacity(channels * frames);
        for frame in 0..frames {
            for channel in &self.samples {
                interleaved.push(channel[frame]);
            }
        }

        interleaved
    }

    /// Get the number of channels
    #[inline]
    pub fn channels(&self) -> usize {
        self.samples.len()
    }

    /// Get the number of frames (samples per channel)
    #[inline]
    pub fn len(&self) -> usize {
        self.samples.first().map(|ch| ch.len()).unwrap_or(0)
    }

    /// Check if the buffer holds no frames
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Get the duration in seconds
    #[inline]
    pub fn duration_secs(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.len() as f64 / self.sample_rate as f64
    }

    /// Get immutable access to a channel's samples
    ///
    /// # Panics
    /// Panics if the channel index is out of bounds
    #[inline]
    pub fn channel(&self, index: usize) -> &[f32] {
        &self.samples[index]
    }
}

// ============================================================================
// Tests
// ============================================================================
