//! Normalize Effect
//!
//! Peak normalization: scales the buffer so its loudest sample sits
//! `headroom` dB below full scale. Silent buffers are left untouched.

use crate::dsp::effect::AudioEffect;
use crate::engine::buffer::{db_to_linear, FULL_SCALE};
use crate::engine::AudioBuffer;
use crate::error::{PipelineError, Result};

/// Default headroom below full scale, in dB
pub const DEFAULT_HEADROOM_DB: f64 = 0.1;

/// Peak-normalizes the buffer
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Normalize {
    /// Distance between the resulting peak and full scale, in dB (>= 0)
    pub headroom_db: f64,
}

impl Normalize {
    pub const NAME: &'static str = "normalize";

    /// Create a validated normalize effect
    pub fn new(headroom_db: f64) -> Result<Self> {
        let normalize = Self { headroom_db };
        normalize.validate()?;
        Ok(normalize)
    }

    /// Linear amplitude the peak is scaled to
    pub fn target_peak(&self) -> f32 {
        FULL_SCALE * db_to_linear(-self.headroom_db as f32)
    }
}

impl Default for Normalize {
    fn default() -> Self {
        Self {
            headroom_db: DEFAULT_HEADROOM_DB,
        }
    }
}

impl AudioEffect for Normalize {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn validate(&self) -> Result<()> {
        if !self.headroom_db.is_finite() || self.headroom_db < 0.0 {
            return Err(PipelineError::invalid_param(
                Self::NAME,
                "headroom",
                format!("must be a finite number >= 0 dB, got {}", self.headroom_db),
            ));
        }
        Ok(())
    }

    fn apply(&self, mut buffer: AudioBuffer) -> Result<AudioBuffer> {
        self.validate()?;

        let peak = buffer.peak();
        if peak == 0.0 {
            return Ok(buffer);
        }

        buffer.scale(self.target_peak() / peak);
        Ok(buffer)
    }
}
