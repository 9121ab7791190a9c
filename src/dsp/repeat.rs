//! Repeat Effect

use crate::dsp::effect::AudioEffect;
use crate::engine::buffer::MAX_OUTPUT_SAMPLES;
use crate::engine::AudioBuffer;
use crate::error::{PipelineError, Result};

/// Concatenates the buffer with itself `times` times in sequence
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Repeat {
    /// Number of copies in the output, at least 1
    pub times: u64,
}

impl Repeat {
    pub const NAME: &'static str = "repeat";

    /// Create a validated repeat effect
    pub fn new(times: u64) -> Result<Self> {
        let repeat = Self { times };
        repeat.validate()?;
        Ok(repeat)
    }
}

impl Default for Repeat {
    fn default() -> Self {
        Self { times: 1 }
    }
}

impl AudioEffect for Repeat {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn validate(&self) -> Result<()> {
        if self.times < 1 {
            return Err(PipelineError::invalid_param(
                Self::NAME,
                "times",
                format!("must be an integer >= 1, got {}", self.times),
            ));
        }
        Ok(())
    }

    fn apply(&self, mut buffer: AudioBuffer) -> Result<AudioBuffer> {
        self.validate()?;

        if self.times == 1 {
            return Ok(buffer);
        }

        let len = buffer.len();
        let times = usize::try_from(self.times)
            .ok()
            .filter(|&times| {
                len.checked_mul(times)
                    .map_or(false, |total| total <= MAX_OUTPUT_SAMPLES)
            })
            .ok_or_else(|| {
                PipelineError::invalid_param(
                    Self::NAME,
                    "times",
                    format!(
                        "repeating {} samples {} times exceeds the {} sample limit",
                        len, self.times, MAX_OUTPUT_SAMPLES
                    ),
                )
            })?;

        for channel in buffer.samples.iter_mut() {
            *channel = channel.repeat(times);
        }

        Ok(buffer)
    }
}
