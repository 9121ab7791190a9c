//! Speed Effect
//!
//! Playback-rate change: tempo and pitch move together, as when a tape is
//! played faster or slower. Implemented as linear-interpolation resampling
//! that keeps the buffer's sample rate.

use crate::dsp::effect::AudioEffect;
use crate::engine::buffer::MAX_OUTPUT_SAMPLES;
use crate::engine::AudioBuffer;
use crate::error::{PipelineError, Result};

/// Changes playback speed by `factor` (1.0 = unchanged, 2.0 = twice as fast)
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Speed {
    /// Playback-rate multiplier, strictly positive
    pub factor: f64,
}

impl Speed {
    pub const NAME: &'static str = "speed";

    /// Create a validated speed effect
    pub fn new(factor: f64) -> Result<Self> {
        let speed = Self { factor };
        speed.validate()?;
        Ok(speed)
    }

    /// Number of samples per channel after the speed change
    pub fn output_len(&self, input_len: usize) -> usize {
        if input_len == 0 {
            return 0;
        }
        ((input_len as f64) / self.factor).ceil() as usize
    }
}

impl Default for Speed {
    fn default() -> Self {
        Self { factor: 1.0 }
    }
}

impl AudioEffect for Speed {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn validate(&self) -> Result<()> {
        if !self.factor.is_finite() || self.factor <= 0.0 {
            return Err(PipelineError::invalid_param(
                Self::NAME,
                "factor",
                format!("must be a finite number > 0, got {}", self.factor),
            ));
        }
        Ok(())
    }

    fn apply(&self, mut buffer: AudioBuffer) -> Result<AudioBuffer> {
        self.validate()?;

        if self.factor == 1.0 {
            return Ok(buffer);
        }

        let target_len = self.output_len(buffer.len());
        if target_len > MAX_OUTPUT_SAMPLES {
            return Err(PipelineError::invalid_param(
                Self::NAME,
                "factor",
                format!(
                    "factor {} would produce {} samples per channel (limit {})",
                    self.factor, target_len, MAX_OUTPUT_SAMPLES
                ),
            ));
        }

        for channel in buffer.samples.iter_mut() {
            *channel = resample_linear(channel, self.factor, target_len);
        }

        Ok(buffer)
    }
}

/// Linear interpolation resampling
///
/// Output sample `i` reads the source at position `i * step`.
fn resample_linear(samples: &[f32], step: f64, target_len: usize) -> Vec<f32> {
    let source_len = samples.len();
    let mut output = Vec::with_capacity(target_len);

    for i in 0..target_len {
        let src_pos = i as f64 * step;
        let src_idx = src_pos.floor() as usize;
        let frac = (src_pos - src_idx as f64) as f32;

        let sample = if src_idx + 1 < source_len {
            samples[src_idx] * (1.0 - frac) + samples[src_idx + 1] * frac
        } else if src_idx < source_len {
            samples[src_idx]
        } else {
            0.0
        };

        output.push(sample);
    }

    output
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    fn ramp(len: usize) -> AudioBuffer {
        let samples = (0..len).map(|i| i as f32 / len as f32).collect();
        AudioBuffer::from_channels(vec![samples], 1000).unwrap()
    }

    #[test]
    fn test_speed_unity_is_noop() {
        let input = ramp(1000);
        assert_eq!(Speed::default().apply(input.clone()).unwrap(), input);
    }

    #[test_case(2.0, 500 ; "double speed halves length")]
    #[test_case(0.5, 2000 ; "half speed doubles length")]
    #[test_case(4.0, 250 ; "quadruple speed")]
    fn test_speed_changes_duration(factor: f64, expected_len: usize) {
        let out = Speed::new(factor).unwrap().apply(ramp(1000)).unwrap();
        assert_eq!(out.len(), expected_len);
        assert_eq!(out.sample_rate, 1000);
    }

    #[test]
    fn test_speed_preserves_ramp_shape() {
        let out = Speed::new(2.0).unwrap().apply(ramp(1000)).unwrap();
        // Sample i of the output reads sample 2i of the input
        assert!((out.channel(0)[100] - 0.2).abs() < 1e-6);
    }

    #[test_case(0.0 ; "zero")]
    #[test_case(-1.5 ; "negative")]
    #[test_case(f64::NAN ; "nan")]
    fn test_speed_rejects_non_positive(factor: f64) {
        assert!(Speed::new(factor).is_err());
        let err = Speed { factor }.apply(ramp(10)).unwrap_err();
        assert_eq!(err.error_code(), "INVALID_PARAMETER");
    }

    #[test]
    fn test_speed_empty_buffer() {
        let empty = AudioBuffer::new(1, 0, 1000);
        let out = Speed::new(3.0).unwrap().apply(empty).unwrap();
        assert!(out.is_empty());
    }
}
