//! Error handling for Augmenta
//!
//! Configuration errors are fatal for a run. Every other error is scoped to a
//! single (input, variant) pair and ends up in the run report.

use std::path::PathBuf;

use thiserror::Error;

/// Result type alias for Augmenta operations
pub type Result<T> = std::result::Result<T, PipelineError>;

/// Main error type for Augmenta operations
#[derive(Error, Debug)]
pub enum PipelineError {
    // Configuration Errors
    #[error("Configuration error: {reason}")]
    Config {
        reason: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    // Effect Errors
    #[error("Unknown effect: '{name}'")]
    UnknownEffect { name: String },

    #[error("Invalid parameter '{param}' for effect '{effect}': {reason}")]
    InvalidParameter {
        effect: String,
        param: String,
        reason: String,
    },

    #[error("Effect '{effect_name}' at position {position} failed: {source}")]
    ChainExecution {
        effect_name: String,
        position: usize,
        #[source]
        source: Box<PipelineError>,
    },

    #[error("DSP overflow: effect '{effect}' produced invalid audio (NaN/Inf)")]
    DspOverflow { effect: String },

    // I/O Errors
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Codec error on {path}: {reason}")]
    Codec {
        path: PathBuf,
        reason: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    // Orchestration Errors
    #[error("Unit state error: {0}")]
    State(#[from] crate::pipeline::TransitionError),
}

impl PipelineError {
    /// Build a configuration error without an underlying cause
    pub fn config(reason: impl Into<String>) -> Self {
        PipelineError::Config {
            reason: reason.into(),
            source: None,
        }
    }

    /// Build a codec error without an underlying cause
    pub fn codec(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        PipelineError::Codec {
            path: path.into(),
            reason: reason.into(),
            source: None,
        }
    }

    /// Build an invalid parameter error
    pub fn invalid_param(
        effect: impl Into<String>,
        param: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        PipelineError::InvalidParameter {
            effect: effect.into(),
            param: param.into(),
            reason: reason.into(),
        }
    }

    /// Get the error code for this error type
    pub fn error_code(&self) -> &'static str {
        match self {
            PipelineError::Config { .. } => "CONFIG_ERROR",
            PipelineError::UnknownEffect { .. } => "UNKNOWN_EFFECT",
            PipelineError::InvalidParameter { .. } => "INVALID_PARAMETER",
            PipelineError::ChainExecution { .. } => "CHAIN_EXECUTION",
            PipelineError::DspOverflow { .. } => "DSP_OVERFLOW",
            PipelineError::Io { .. } => "IO_ERROR",
            PipelineError::Codec { .. } => "CODEC_ERROR",
            PipelineError::State(_) => "INVALID_STATE",
        }
    }

    /// Check if this error aborts the whole run
    ///
    /// Only configuration problems are fatal; everything else is isolated to
    /// the (input, variant) pair that raised it.
    pub fn is_fatal(&self) -> bool {
        matches!(self, PipelineError::Config { .. })
    }

    /// Name of the failing effect, if this error came out of a chain
    pub fn failing_effect(&self) -> Option<&str> {
        match self {
            PipelineError::ChainExecution { effect_name, .. } => Some(effect_name),
            PipelineError::UnknownEffect { name } => Some(name),
            PipelineError::InvalidParameter { effect, .. } => Some(effect),
            PipelineError::DspOverflow { effect } => Some(effect),
            _ => None,
        }
    }

    /// Innermost cause, looking through chain wrappers
    pub fn root_cause(&self) -> &PipelineError {
        match self {
            PipelineError::ChainExecution { source, .. } => source.root_cause(),
            other => other,
        }
    }

    /// Get recovery suggestions for this error
    pub fn recovery_suggestions(&self) -> Vec<&'static str> {
        match self.root_cause() {
            PipelineError::Config { .. } => vec![
                "Check the configuration file path and its YAML or JSON syntax",
                "Make sure 'inputs' and 'variants' are both non-empty",
            ],
            PipelineError::UnknownEffect { .. } => vec![
                "Supported effects: volume, speed, fade, reverse, normalize, repeat",
                "Check the spelling of the effect name",
            ],
            PipelineError::InvalidParameter { .. } => vec![
                "Check the parameter name and its allowed range",
                "speed.factor and repeat.times must be positive",
            ],
            PipelineError::DspOverflow { .. } => vec![
                "The effect settings may be too extreme",
                "Try reducing the gain or the number of repeats",
            ],
            PipelineError::Io { .. } => vec![
                "Check that the file exists and is readable",
                "Check write permissions on the output directory",
            ],
            PipelineError::Codec { .. } => vec![
                "Try converting the file to WAV format first",
                "Non-WAV formats need the ffmpeg executable on PATH",
            ],
            PipelineError::State(_) => vec!["This is a bug; please report it with the run report"],
            PipelineError::ChainExecution { .. } => vec![],
        }
    }
}
