//! Audio Buffer Management
//!
//! Provides the in-memory audio buffer every effect consumes and produces.
//! Samples are stored as non-interleaved 32-bit floats at the source file's
//! own sample rate; nothing is resampled on load.

use crate::error::{PipelineError, Result};

// ============================================================================
// Constants
// ============================================================================

/// Full-scale amplitude (0 dBFS) of the float representation
pub const FULL_SCALE: f32 = 1.0;

/// Upper bound on samples per channel an effect may produce (~13.5h at 44.1kHz)
pub const MAX_OUTPUT_SAMPLES: usize = 1 << 31;

// ============================================================================
// Helper Functions
// ============================================================================

/// Convert decibels to linear amplitude
///
/// # Arguments
/// * `db` - Value in decibels
///
/// # Returns
/// Linear amplitude (0.0 to 1.0+ range)
#[inline]
pub fn db_to_linear(db: f32) -> f32 {
    10.0_f32.powf(db / 20.0)
}

/// Convert linear amplitude to decibels
///
/// # Arguments
/// * `linear` - Linear amplitude value
///
/// # Returns
/// Value in decibels. Returns -f32::INFINITY for zero input.
#[inline]
pub fn linear_to_db(linear: f32) -> f32 {
    if linear <= 0.0 {
        f32::NEG_INFINITY
    } else {
        20.0 * linear.log10()
    }
}

/// Calculate the peak level of an audio buffer in dB
///
/// Returns -f32::INFINITY for empty or silent buffers.
pub fn calculate_peak(buffer: &AudioBuffer) -> f32 {
    linear_to_db(buffer.peak())
}

// ============================================================================
// Audio Buffer
// ============================================================================

/// Decoded audio plus the metadata needed to interpret it
///
/// Stores audio as non-interleaved 32-bit floating point samples.
/// Each channel is a separate Vec<f32>, and all channels have equal length.
///
/// # Example
/// ```
/// use augmenta::engine::AudioBuffer;
///
/// // One second of stereo silence at 48kHz
/// let buffer = AudioBuffer::new(2, 48000, 48000);
/// assert_eq!(buffer.channels(), 2);
/// assert_eq!(buffer.duration_ms(), 1000.0);
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct AudioBuffer {
    /// Sample data: outer Vec is channels, inner Vec is samples
    pub samples: Vec<Vec<f32>>,
    /// Sample rate in Hz
    pub sample_rate: u32,
}

impl AudioBuffer {
    /// Create a new silent buffer
    ///
    /// # Arguments
    /// * `channels` - Number of channels
    /// * `num_samples` - Number of samples per channel
    /// * `sample_rate` - Sample rate in Hz
    pub fn new(channels: usize, num_samples: usize, sample_rate: u32) -> Self {
        Self {
            samples: vec![vec![0.0_f32; num_samples]; channels],
            sample_rate,
        }
    }

    /// Create a buffer from per-channel sample vectors
    ///
    /// # Returns
    /// Error if there are no channels or the channels differ in length
    pub fn from_channels(samples: Vec<Vec<f32>>, sample_rate: u32) -> Result<Self> {
        if samples.is_empty() {
            return Err(PipelineError::codec("<memory>", "buffer has no channels"));
        }
        let len = samples[0].len();
        if samples.iter().any(|ch| ch.len() != len) {
            return Err(PipelineError::codec(
                "<memory>",
                "channels have different lengths",
            ));
        }
        if sample_rate == 0 {
            return Err(PipelineError::codec("<memory>", "sample rate is zero"));
        }
        Ok(Self {
            samples,
            sample_rate,
        })
    }

    /// Create an audio buffer from interleaved sample data
    ///
    /// # Arguments
    /// * `interleaved` - Interleaved sample data (L, R, L, R, ... for stereo)
    /// * `channels` - Channel count
    /// * `sample_rate` - Sample rate in Hz
    ///
    /// # Returns
    /// Result containing the AudioBuffer, or error if data length doesn't match
    pub fn from_interleaved(interleaved: &[f32], channels: usize, sample_rate: u32) -> Result<Self> {
        if channels == 0 {
            return Err(PipelineError::codec("<memory>", "channel count is zero"));
        }

        if interleaved.len() % channels != 0 {
            return Err(PipelineError::codec(
                "<memory>",
                format!(
                    "interleaved data length {} is not divisible by channel count {}",
                    interleaved.len(),
                    channels
                ),
            ));
        }

        let num_samples = interleaved.len() / channels;
        let mut samples = vec![Vec::with_capacity(num_samples); channels];

        for frame in interleaved.chunks_exact(channels) {
            for (ch, &sample) in frame.iter().enumerate() {
                samples[ch].push(sample);
            }
        }

        Self::from_channels(samples, sample_rate)
    }

    /// Convert the buffer to interleaved format
    pub fn to_interleaved(&self) -> Vec<f32> {
        let num_channels = self.channels();
        let num_samples = self.len();

        let mut interleaved = Vec::with_capacity(num_channels * num_samples);

        for sample_idx in 0..num_samples {
            for channel in &self.samples {
                interleaved.push(channel[sample_idx]);
            }
        }

        interleaved
    }

    /// Get the number of channels
    #[inline]
    pub fn channels(&self) -> usize {
        self.samples.len()
    }

    /// Get the number of samples per channel
    #[inline]
    pub fn len(&self) -> usize {
        self.samples.first().map(|ch| ch.len()).unwrap_or(0)
    }

    /// Check if the buffer is empty (no samples)
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

    /// Get the duration in milliseconds
    #[inline]
    pub fn duration_ms(&self) -> f64 {
        self.duration_secs() * 1000.0
    }

    /// Number of samples per channel covering `ms` milliseconds, clamped to the buffer
    pub fn ms_to_samples(&self, ms: u64) -> usize {
        let samples = ms as u128 * self.sample_rate as u128 / 1000;
        samples.min(self.len() as u128) as usize
    }

    /// Get immutable access to a channel's samples
    ///
    /// # Panics
    /// Panics if the channel index is out of bounds
    #[inline]
    pub fn channel(&self, index: usize) -> &[f32] {
        &self.samples[index]
    }

    /// Largest absolute sample value across all channels
    pub fn peak(&self) -> f32 {
        self.samples
            .iter()
            .flat_map(|channel| channel.iter())
            .map(|&s| s.abs())
            .fold(0.0_f32, f32::max)
    }

    /// Check if all samples are finite (not NaN or Infinity)
    pub fn is_finite(&self) -> bool {
        self.samples
            .iter()
            .flat_map(|ch| ch.iter())
            .all(|s| s.is_finite())
    }

    /// Multiply every sample by a linear factor
    pub fn scale(&mut self, factor: f32) {
        for channel in &mut self.samples {
            for sample in channel.iter_mut() {
                *sample *= factor;
            }
        }
    }

    /// Duplicate a mono buffer onto `channels` channels
    fn upmixed(&self, channels: usize) -> AudioBuffer {
        AudioBuffer {
            samples: vec![self.samples[0].clone(); channels],
            sample_rate: self.sample_rate,
        }
    }

    /// Bring `other` to this buffer's layout, upmixing whichever side is mono
    ///
    /// # Returns
    /// The conformed copy of `other`, or an error if sample rates differ or
    /// neither side is mono
    fn conform(&mut self, other: &AudioBuffer) -> Result<AudioBuffer> {
        if self.sample_rate != other.sample_rate {
            return Err(PipelineError::codec(
                "<memory>",
                format!(
                    "sample rates differ ({} Hz vs {} Hz)",
                    self.sample_rate, other.sample_rate
                ),
            ));
        }

        match (self.channels(), other.channels()) {
            (a, b) if a == b => Ok(other.clone()),
            (1, b) => {
                *self = self.upmixed(b);
                Ok(other.clone())
            }
            (a, 1) => Ok(other.upmixed(a)),
            (a, b) => Err(PipelineError::codec(
                "<memory>",
                format!("cannot combine {}-channel and {}-channel audio", a, b),
            )),
        }
    }

    /// Sum `other` into this buffer, keeping this buffer's length
    ///
    /// Samples of `other` past the end are dropped; a shorter `other` leaves
    /// the tail untouched. No clipping is applied.
    pub fn overlay(&mut self, other: &AudioBuffer) -> Result<()> {
        let other = self.conform(other)?;
        for (channel, incoming) in self.samples.iter_mut().zip(other.samples.iter()) {
            for (sample, add) in channel.iter_mut().zip(incoming.iter()) {
                *sample += add;
            }
        }
        Ok(())
    }

    /// Append `other` after the end of this buffer
    pub fn append(&mut self, other: &AudioBuffer) -> Result<()> {
        let other = self.conform(other)?;
        if self.len() + other.len() > MAX_OUTPUT_SAMPLES {
            return Err(PipelineError::codec(
                "<memory>",
                "combined audio exceeds the maximum length",
            ));
        }
        for (channel, incoming) in self.samples.iter_mut().zip(other.samples) {
            channel.extend(incoming);
        }
        Ok(())
    }

    /// Largest per-sample difference against another buffer of the same shape
    ///
    /// Returns `None` if the shapes or sample rates differ.
    pub fn max_abs_diff(&self, other: &AudioBuffer) -> Option<f32> {
        if self.sample_rate != other.sample_rate
            || self.channels() != other.channels()
            || self.len() != other.len()
        {
            return None;
        }
        let diff = self
            .samples
            .iter()
            .zip(other.samples.iter())
            .flat_map(|(a, b)| a.iter().zip(b.iter()))
            .map(|(x, y)| (x - y).abs())
            .fold(0.0_f32, f32::max);
        Some(diff)
    }
}

// ============================================================================
// Tests
// ============================================================================
