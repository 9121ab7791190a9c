//! Augmenta - Config-Driven Audio Augmentation
//!
//! Applies ordered chains of audio effects to source files and writes one
//! derived file per configured variant.
//!
//! # Architecture
//!
//! - `dsp`: effect registry, the six effects, and the chain executor
//! - `engine`: audio buffer and codec collaborators (WAV + ffmpeg)
//! - `pipeline`: configuration, input resolution, and the variant orchestrator

pub mod cli;
pub mod dsp;
pub mod engine;
pub mod error;
pub mod pipeline;

pub use error::{PipelineError, Result};
