//! Effect Registry
//!
//! Maps effect names to their implementation and parameter contract. The
//! registry is built once per process and only read afterwards, so every
//! worker thread shares it without locking.

use std::fmt;
use std::sync::OnceLock;

use serde_json::{Map, Value};

use crate::dsp::{Effect, EffectSpec, Fade, Normalize, Repeat, Reverse, Speed, Volume};
use crate::error::{PipelineError, Result};

// ============================================================================
// Parameter contracts
// ============================================================================

/// Semantic type of an effect parameter
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamType {
    /// Any finite real number
    Real,
    /// Finite real >= 0
    NonNegativeReal,
    /// Finite real > 0
    PositiveReal,
    /// Integer >= 0
    NonNegativeInteger,
    /// Integer >= 1
    PositiveInteger,
}

impl ParamType {
    fn is_integer(&self) -> bool {
        matches!(
            self,
            ParamType::NonNegativeInteger | ParamType::PositiveInteger
        )
    }
}

impl fmt::Display for ParamType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParamType::Real => write!(f, "number"),
            ParamType::NonNegativeReal => write!(f, "number >= 0"),
            ParamType::PositiveReal => write!(f, "number > 0"),
            ParamType::NonNegativeInteger => write!(f, "integer >= 0"),
            ParamType::PositiveInteger => write!(f, "integer >= 1"),
        }
    }
}

/// Declared parameter of an effect
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ParamSpec {
    pub name: &'static str,
    pub kind: ParamType,
    /// Value used when the parameter is omitted
    pub default: f64,
    pub description: &'static str,
}

/// A parameter value after validation against its `ParamSpec`
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ParamValue {
    Real(f64),
    Integer(u64),
}

/// Validated parameters of one effect entry, in declaration order
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ParamValues {
    values: Vec<(&'static str, ParamValue)>,
}

impl ParamValues {
    fn get(&self, name: &str) -> Option<ParamValue> {
        self.values
            .iter()
            .find(|(key, _)| *key == name)
            .map(|(_, value)| *value)
    }

    /// Real-valued parameter (integers widen)
    pub fn real(&self, name: &str) -> f64 {
        match self.get(name) {
            Some(ParamValue::Real(v)) => v,
            Some(ParamValue::Integer(v)) => v as f64,
            None => 0.0,
        }
    }

    /// Integer parameter
    pub fn integer(&self, name: &str) -> u64 {
        match self.get(name) {
            Some(ParamValue::Integer(v)) => v,
            Some(ParamValue::Real(v)) => v as u64,
            None => 0,
        }
    }
}

// ============================================================================
// Registry entries
// ============================================================================

/// Closed set of effect kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EffectKind {
    Volume,
    Speed,
    Fade,
    Reverse,
    Normalize,
    Repeat,
}

impl EffectKind {
    pub const ALL: [EffectKind; 6] = [
        EffectKind::Volume,
        EffectKind::Speed,
        EffectKind::Fade,
        EffectKind::Reverse,
        EffectKind::Normalize,
        EffectKind::Repeat,
    ];

    /// Registry name
    pub fn name(&self) -> &'static str {
        match self {
            EffectKind::Volume => Volume::NAME,
            EffectKind::Speed => Speed::NAME,
            EffectKind::Fade => Fade::NAME,
            EffectKind::Reverse => Reverse::NAME,
            EffectKind::Normalize => Normalize::NAME,
            EffectKind::Repeat => Repeat::NAME,
        }
    }
}

impl fmt::Display for EffectKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

const VOLUME_PARAMS: &[ParamSpec] = &[ParamSpec {
    name: "gain",
    kind: ParamType::Real,
    default: 0.0,
    description: "gain in dB",
}];

const SPEED_PARAMS: &[ParamSpec] = &[ParamSpec {
    name: "factor",
    kind: ParamType::PositiveReal,
    default: 1.0,
    description: "playback-rate multiplier",
}];

const FADE_PARAMS: &[ParamSpec] = &[
    ParamSpec {
        name: "fade_in",
        kind: ParamType::NonNegativeInteger,
        default: 0.0,
        description: "fade-in length in ms",
    },
    ParamSpec {
        name: "fade_out",
        kind: ParamType::NonNegativeInteger,
        default: 0.0,
        description: "fade-out length in ms",
    },
];

const NORMALIZE_PARAMS: &[ParamSpec] = &[ParamSpec {
    name: "headroom",
    kind: ParamType::NonNegativeReal,
    default: crate::dsp::DEFAULT_HEADROOM_DB,
    description: "peak distance below full scale in dB",
}];

const REPEAT_PARAMS: &[ParamSpec] = &[ParamSpec {
    name: "times",
    kind: ParamType::PositiveInteger,
    default: 1.0,
    description: "number of copies",
}];

/// Registry entry: an effect kind and its parameter contract
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EffectDefinition {
    pub kind: EffectKind,
    pub params: &'static [ParamSpec],
}

impl EffectDefinition {
    fn new(kind: EffectKind) -> Self {
        let params: &'static [ParamSpec] = match kind {
            EffectKind::Volume => VOLUME_PARAMS,
            EffectKind::Speed => SPEED_PARAMS,
            EffectKind::Fade => FADE_PARAMS,
            EffectKind::Reverse => &[],
            EffectKind::Normalize => NORMALIZE_PARAMS,
            EffectKind::Repeat => REPEAT_PARAMS,
        };
        Self { kind, params }
    }

    pub fn name(&self) -> &'static str {
        self.kind.name()
    }

    /// Check raw parameters against the contract, filling in defaults
    ///
    /// # Errors
    /// `InvalidParameter` for unknown names, wrong types, or out-of-range values
    pub fn parse_params(&self, raw: &Map<String, Value>) -> Result<ParamValues> {
        if let Some(unknown) = raw
            .keys()
            .find(|key| !self.params.iter().any(|p| p.name == key.as_str()))
        {
            let expected: Vec<&str> = self.params.iter().map(|p| p.name).collect();
            return Err(PipelineError::invalid_param(
                self.name(),
                unknown.as_str(),
                if expected.is_empty() {
                    "this effect takes no parameters".to_string()
                } else {
                    format!("unknown parameter (expected: {})", expected.join(", "))
                },
            ));
        }

        let mut values = Vec::with_capacity(self.params.len());
        for spec in self.params {
            let value = match raw.get(spec.name) {
                None => default_value(spec),
                Some(value) => coerce_value(self.name(), spec, value)?,
            };
            values.push((spec.name, value));
        }

        Ok(ParamValues { values })
    }

    /// Build the typed effect from raw parameters
    pub fn instantiate(&self, raw: &Map<String, Value>) -> Result<Effect> {
        let values = self.parse_params(raw)?;

        let effect = match self.kind {
            EffectKind::Volume => Effect::Volume(Volume::new(values.real("gain"))?),
            EffectKind::Speed => Effect::Speed(Speed::new(values.real("factor"))?),
            EffectKind::Fade => Effect::Fade(Fade::new(
                values.integer("fade_in"),
                values.integer("fade_out"),
            )),
            EffectKind::Reverse => Effect::Reverse(Reverse),
            EffectKind::Normalize => Effect::Normalize(Normalize::new(values.real("headroom"))?),
            EffectKind::Repeat => Effect::Repeat(Repeat::new(values.integer("times"))?),
        };

        Ok(effect)
    }
}

fn default_value(spec: &ParamSpec) -> ParamValue {
    if spec.kind.is_integer() {
        ParamValue::Integer(spec.default as u64)
    } else {
        ParamValue::Real(spec.default)
    }
}

fn coerce_value(effect: &str, spec: &ParamSpec, value: &Value) -> Result<ParamValue> {
    let invalid = |reason: String| PipelineError::invalid_param(effect, spec.name, reason);

    let number = value
        .as_f64()
        .ok_or_else(|| invalid(format!("expected {}, got {}", spec.kind, value)))?;

    if !number.is_finite() {
        return Err(invalid(format!("expected {}, got {}", spec.kind, number)));
    }

    let in_range = match spec.kind {
        ParamType::Real => true,
        ParamType::NonNegativeReal | ParamType::NonNegativeInteger => number >= 0.0,
        ParamType::PositiveReal => number > 0.0,
        ParamType::PositiveInteger => number >= 1.0,
    };
    if !in_range {
        return Err(invalid(format!("expected {}, got {}", spec.kind, value)));
    }

    if spec.kind.is_integer() {
        if let Some(integer) = value.as_u64() {
            return Ok(ParamValue::Integer(integer));
        }
        // Integral floats such as 100.0 are accepted
        if number.fract() != 0.0 || number > u64::MAX as f64 {
            return Err(invalid(format!("expected {}, got {}", spec.kind, value)));
        }
        return Ok(ParamValue::Integer(number as u64));
    }

    Ok(ParamValue::Real(number))
}

// ============================================================================
// Registry
// ============================================================================

/// Lookup table from effect name to definition
#[derive(Debug, Clone)]
pub struct EffectRegistry {
    definitions: Vec<EffectDefinition>,
}

impl EffectRegistry {
    /// Registry holding the six built-in effects
    pub fn with_defaults() -> Self {
        Self {
            definitions: EffectKind::ALL
                .iter()
                .map(|&kind| EffectDefinition::new(kind))
                .collect(),
        }
    }

    /// Process-wide registry, built on first use
    pub fn global() -> &'static EffectRegistry {
        static REGISTRY: OnceLock<EffectRegistry> = OnceLock::new();
        REGISTRY.get_or_init(EffectRegistry::with_defaults)
    }

    /// Look up an effect by name
    ///
    /// # Errors
    /// `UnknownEffect` when `name` is not registered
    pub fn resolve(&self, name: &str) -> Result<&EffectDefinition> {
        self.definitions
            .iter()
            .find(|def| def.name() == name)
            .ok_or_else(|| PipelineError::UnknownEffect {
                name: name.to_string(),
            })
    }

    /// Check whether an effect name is registered
    pub fn has_effect(&self, name: &str) -> bool {
        self.resolve(name).is_ok()
    }

    /// Registered effect names, in registration order
    pub fn names(&self) -> Vec<&'static str> {
        self.definitions.iter().map(|def| def.name()).collect()
    }

    /// Resolve and validate a declarative entry into a typed effect
    pub fn build(&self, spec: &EffectSpec) -> Result<Effect> {
        self.resolve(&spec.effect)?.instantiate(&spec.params)
    }
}

impl Default for EffectRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use test_case::test_case;

    fn build(spec: serde_json::Value) -> Result<Effect> {
        let spec: EffectSpec = serde_json::from_value(spec).unwrap();
        EffectRegistry::global().build(&spec)
    }

    #[test]
    fn test_registry_has_six_effects() {
        let registry = EffectRegistry::with_defaults();
        assert_eq!(
            registry.names(),
            vec!["volume", "speed", "fade", "reverse", "normalize", "repeat"]
        );
        assert!(registry.has_effect("fade"));
        assert!(!registry.has_effect("Fade"));
    }

    #[test]
    fn test_resolve_unknown_effect() {
        let err = EffectRegistry::global().resolve("echo").unwrap_err();
        assert_eq!(err.error_code(), "UNKNOWN_EFFECT");
    }

    #[test]
    fn test_defaults_are_filled_in() {
        assert_eq!(
            build(json!({"effect": "normalize"})).unwrap(),
            Effect::Normalize(Normalize { headroom_db: 0.1 })
        );
        assert_eq!(
            build(json!({"effect": "fade", "params": {"fade_out": 250}})).unwrap(),
            Effect::Fade(Fade::new(0, 250))
        );
        assert_eq!(
            build(json!({"effect": "repeat"})).unwrap(),
            Effect::Repeat(Repeat { times: 1 })
        );
    }

    #[test]
    fn test_integral_float_accepted_for_integer() {
        assert_eq!(
            build(json!({"effect": "repeat", "params": {"times": 3.0}})).unwrap(),
            Effect::Repeat(Repeat { times: 3 })
        );
    }

    #[test_case(json!({"effect": "speed", "params": {"factor": 0}}) ; "zero speed")]
    #[test_case(json!({"effect": "speed", "params": {"factor": -2.0}}) ; "negative speed")]
    #[test_case(json!({"effect": "repeat", "params": {"times": 0}}) ; "zero repeats")]
    #[test_case(json!({"effect": "repeat", "params": {"times": -3}}) ; "negative repeats")]
    #[test_case(json!({"effect": "repeat", "params": {"times": 1.5}}) ; "fractional repeats")]
    #[test_case(json!({"effect": "fade", "params": {"fade_in": -10}}) ; "negative fade")]
    #[test_case(json!({"effect": "normalize", "params": {"headroom": -1}}) ; "negative headroom")]
    #[test_case(json!({"effect": "volume", "params": {"gain": "loud"}}) ; "string gain")]
    #[test_case(json!({"effect": "volume", "params": {"gian": 3}}) ; "misspelled param")]
    #[test_case(json!({"effect": "reverse", "params": {"times": 2}}) ; "reverse takes no params")]
    fn test_invalid_parameters_rejected(spec: serde_json::Value) {
        let err = build(spec).unwrap_err();
        assert_eq!(err.error_code(), "INVALID_PARAMETER");
    }

    #[test]
    fn test_volume_accepts_any_finite_gain() {
        assert_eq!(
            build(json!({"effect": "volume", "params": {"gain": -60}})).unwrap(),
            Effect::Volume(Volume { gain_db: -60.0 })
        );
    }
}
