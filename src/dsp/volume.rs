//! Volume Effect
//!
//! Gain adjustment in decibels. No bounds are enforced: gain that pushes the
//! signal past full scale clips when the result is encoded, not here. Extreme
//! boosts saturate at the largest finite float instead of overflowing.

use crate::dsp::effect::AudioEffect;
use crate::engine::AudioBuffer;
use crate::error::{PipelineError, Result};

/// Scales buffer amplitude by `gain_db` decibels
///
/// # Example
/// ```
/// use augmenta::dsp::{AudioEffect, Volume};
/// use augmenta::engine::AudioBuffer;
///
/// let buffer = AudioBuffer::from_channels(vec![vec![0.25; 8]], 8000).unwrap();
/// let louder = Volume::new(6.0).unwrap().apply(buffer).unwrap();
/// assert!((louder.peak() - 0.5).abs() < 0.01);
/// ```
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Volume {
    /// Gain in decibels (negative attenuates)
    pub gain_db: f64,
}

impl Volume {
    pub const NAME: &'static str = "volume";

    /// Create a validated volume effect
    pub fn new(gain_db: f64) -> Result<Self> {
        let volume = Self { gain_db };
        volume.validate()?;
        Ok(volume)
    }

    /// Linear multiplier equivalent to the gain, capped at `f32::MAX`
    pub fn gain_linear(&self) -> f32 {
        10.0_f64.powf(self.gain_db / 20.0).min(f32::MAX as f64) as f32
    }
}

impl Default for Volume {
    fn default() -> Self {
        Self { gain_db: 0.0 }
    }
}

impl AudioEffect for Volume {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn validate(&self) -> Result<()> {
        if !self.gain_db.is_finite() {
            return Err(PipelineError::invalid_param(
                Self::NAME,
                "gain",
                format!("must be a finite number of decibels, got {}", self.gain_db),
            ));
        }
        Ok(())
    }

    fn apply(&self, mut buffer: AudioBuffer) -> Result<AudioBuffer> {
        self.validate()?;

        // Unity gain
        if self.gain_db == 0.0 {
            return Ok(buffer);
        }

        let factor = self.gain_linear();
        for channel in &mut buffer.samples {
            for sample in channel.iter_mut() {
                *sample = (*sample * factor).clamp(-f32::MAX, f32::MAX);
            }
        }
        Ok(buffer)
    }
}
