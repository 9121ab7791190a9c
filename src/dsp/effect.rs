//! Effect definitions
//!
//! `EffectSpec` is an effect entry as written in the configuration (a name
//! plus loosely typed parameters). `Effect` is the closed set of effects the
//! engine can run, each carrying its own typed parameter record.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::dsp::{Fade, Normalize, Repeat, Reverse, Speed, Volume};
use crate::engine::AudioBuffer;
use crate::error::Result;

/// Base trait for all effects
///
/// Effects take ownership of a buffer and hand back the transformed buffer.
/// `apply` must call `validate` before touching any sample, so a rejected
/// invocation never leaves a half-processed buffer behind.
pub trait AudioEffect {
    /// Registry name of the effect
    fn name(&self) -> &'static str;

    /// Check the parameter record against the effect's contract
    fn validate(&self) -> Result<()>;

    /// Transform the buffer
    fn apply(&self, buffer: AudioBuffer) -> Result<AudioBuffer>;
}

// ============================================================================
// Typed effects
// ============================================================================

/// One of the six supported effects with validated parameters
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Effect {
    Volume(Volume),
    Speed(Speed),
    Fade(Fade),
    Reverse(Reverse),
    Normalize(Normalize),
    Repeat(Repeat),
}

impl Effect {
    fn inner(&self) -> &dyn AudioEffect {
        match self {
            Effect::Volume(e) => e,
            Effect::Speed(e) => e,
            Effect::Fade(e) => e,
            Effect::Reverse(e) => e,
            Effect::Normalize(e) => e,
            Effect::Repeat(e) => e,
        }
    }
}

impl AudioEffect for Effect {
    fn name(&self) -> &'static str {
        self.inner().name()
    }

    fn validate(&self) -> Result<()> {
        self.inner().validate()
    }

    fn apply(&self, buffer: AudioBuffer) -> Result<AudioBuffer> {
        self.inner().apply(buffer)
    }
}

impl fmt::Display for Effect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Effect::Volume(v) => write!(f, "volume(gain={}dB)", v.gain_db),
            Effect::Speed(s) => write!(f, "speed(factor={})", s.factor),
            Effect::Fade(fd) => write!(
                f,
                "fade(in={}ms, out={}ms)",
                fd.fade_in_ms, fd.fade_out_ms
            ),
            Effect::Reverse(_) => write!(f, "reverse()"),
            Effect::Normalize(n) => write!(f, "normalize(headroom={}dB)", n.headroom_db),
            Effect::Repeat(r) => write!(f, "repeat(times={})", r.times),
        }
    }
}

macro_rules! impl_from_effect {
    ($($variant:ident),*) => {
        $(
            impl From<$variant> for Effect {
                fn from(effect: $variant) -> Self {
                    Effect::$variant(effect)
                }
            }
        )*
    };
}

impl_from_effect!(Volume, Speed, Fade, Reverse, Normalize, Repeat);

// ============================================================================
// Declarative effect entries
// ============================================================================

/// An effect entry as it appears in a variant's chain
///
/// Accepted JSON shapes:
/// - `{"effect": "volume", "params": {"gain": 6}}`
/// - `{"type": "volume", "gain": 6}` (parameters inline)
///
/// Inline parameters never override keys given under `params`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Map<String, Value>")]
pub struct EffectSpec {
    /// Registry name of the effect
    pub effect: String,
    /// Raw parameter values, checked against the registry contract
    #[serde(skip_serializing_if = "Map::is_empty")]
    pub params: Map<String, Value>,
}

impl EffectSpec {
    /// Create a spec with no parameters
    pub fn new(effect: impl Into<String>) -> Self {
        Self {
            effect: effect.into(),
            params: Map::new(),
        }
    }

    /// Add a parameter, builder style
    pub fn with_param(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.params.insert(name.into(), value.into());
        self
    }
}

impl TryFrom<Map<String, Value>> for EffectSpec {
    type Error = String;

    fn try_from(mut raw: Map<String, Value>) -> std::result::Result<Self, Self::Error> {
        let effect = match (raw.remove("effect"), raw.remove("type")) {
            (Some(_), Some(_)) => {
                return Err("effect entry has both 'effect' and 'type' keys".to_string())
            }
            (Some(name), None) | (None, Some(name)) => match name {
                Value::String(name) => name,
                other => return Err(format!("effect name must be a string, got {}", other)),
            },
            (None, None) => return Err("effect entry is missing the 'effect' key".to_string()),
        };

        let mut params = match raw.remove("params") {
            None | Some(Value::Null) => Map::new(),
            Some(Value::Object(params)) => params,
            Some(other) => {
                return Err(format!(
                    "'params' of effect '{}' must be an object, got {}",
                    effect, other
                ))
            }
        };

        for (key, value) in raw {
            params.entry(key).or_insert(value);
        }

        Ok(EffectSpec { effect, params })
    }
}

impl fmt::Display for EffectSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.effect, Value::Object(self.params.clone()))
    }
}
