//! Reverse Effect

use crate::dsp::effect::AudioEffect;
use crate::engine::AudioBuffer;
use crate::error::Result;

/// Reverses sample order in time, channel by channel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Reverse;

impl Reverse {
    pub const NAME: &'static str = "reverse";
}

impl AudioEffect for Reverse {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn validate(&self) -> Result<()> {
        Ok(())
    }

    fn apply(&self, mut buffer: AudioBuffer) -> Result<AudioBuffer> {
        for channel in buffer.samples.iter_mut() {
            channel.reverse();
        }
        Ok(buffer)
    }
}
