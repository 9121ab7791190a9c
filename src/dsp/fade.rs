//! Fade Effect
//!
//! Linear fade-in from silence at the start and fade-out to silence at the
//! end. Durations longer than the buffer are clamped to its length.

use crate::dsp::effect::AudioEffect;
use crate::engine::AudioBuffer;
use crate::error::Result;

/// Applies linear fade envelopes at the buffer edges
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Fade {
    /// Fade-in length in milliseconds
    pub fade_in_ms: u64,
    /// Fade-out length in milliseconds
    pub fade_out_ms: u64,
}

impl Fade {
    pub const NAME: &'static str = "fade";

    pub fn new(fade_in_ms: u64, fade_out_ms: u64) -> Self {
        Self {
            fade_in_ms,
            fade_out_ms,
        }
    }
}

impl AudioEffect for Fade {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn validate(&self) -> Result<()> {
        // Unsigned durations cannot be negative, and over-long fades clamp
        Ok(())
    }

    fn apply(&self, mut buffer: AudioBuffer) -> Result<AudioBuffer> {
        self.validate()?;

        let len = buffer.len();
        let fade_in = buffer.ms_to_samples(self.fade_in_ms);
        let fade_out = buffer.ms_to_samples(self.fade_out_ms);

        for channel in buffer.samples.iter_mut() {
            // Gain rises from 0 at the first sample
            for (i, sample) in channel.iter_mut().take(fade_in).enumerate() {
                *sample *= i as f32 / fade_in as f32;
            }

            // Gain falls to 0 at the last sample
            for k in 0..fade_out {
                channel[len - 1 - k] *= k as f32 / fade_out as f32;
            }
        }

        Ok(buffer)
    }
}
