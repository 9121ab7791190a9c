//! DSP Effects Library
//!
//! The six augmentation effects, the registry that names them, and the
//! executor that applies them in order. All effects implement the
//! `AudioEffect` trait for uniform processing.

mod chain;
mod effect;
mod fade;
mod normalize;
mod registry;
mod repeat;
mod reverse;
mod speed;
mod volume;

pub use chain::{ChainExecutor, ChainSpec, CompiledChain};
pub use effect::{AudioEffect, Effect, EffectSpec};
pub use fade::Fade;
pub use normalize::{Normalize, DEFAULT_HEADROOM_DB};
pub use registry::{
    EffectDefinition, EffectKind, EffectRegistry, ParamSpec, ParamType, ParamValue, ParamValues,
};
pub use repeat::Repeat;
pub use reverse::Reverse;
pub use speed::Speed;
pub use volume::Volume;
