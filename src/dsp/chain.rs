//! Effect Chain execution
//!
//! Effects run strictly in declared order (index 0 first). Effects do not
//! commute: `[fade, reverse]` and `[reverse, fade]` give different results.
//! A chain either completes or stops at its first failing step.

use std::fmt;

use log::debug;
use serde::{Deserialize, Serialize};

use crate::dsp::{AudioEffect, Effect, EffectRegistry, EffectSpec};
use crate::engine::AudioBuffer;
use crate::error::{PipelineError, Result};

/// Ordered list of declarative effect entries
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChainSpec {
    pub effects: Vec<EffectSpec>,
}

impl ChainSpec {
    pub fn new(effects: Vec<EffectSpec>) -> Self {
        Self { effects }
    }

    /// Get the number of entries in the chain
    pub fn len(&self) -> usize {
        self.effects.len()
    }

    /// Check if the chain is empty
    pub fn is_empty(&self) -> bool {
        self.effects.is_empty()
    }

    /// Resolve and validate every entry
    ///
    /// # Errors
    /// `ChainExecution` wrapping the first entry that fails to resolve or
    /// validate, with its 0-based position
    pub fn compile(&self, registry: &EffectRegistry) -> Result<CompiledChain> {
        let steps = self
            .effects
            .iter()
            .enumerate()
            .map(|(position, spec)| {
                registry
                    .build(spec)
                    .map_err(|e| chain_error(&spec.effect, position, e))
            })
            .collect::<Result<Vec<Effect>>>()?;

        Ok(CompiledChain { steps })
    }
}

impl From<Vec<EffectSpec>> for ChainSpec {
    fn from(effects: Vec<EffectSpec>) -> Self {
        Self::new(effects)
    }
}

/// A chain whose entries have all been resolved and validated
#[derive(Debug, Clone, PartialEq, Default)]
pub struct CompiledChain {
    steps: Vec<Effect>,
}

impl CompiledChain {
    pub fn new(steps: Vec<Effect>) -> Self {
        Self { steps }
    }

    pub fn steps(&self) -> &[Effect] {
        &self.steps
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }
}

impl fmt::Display for CompiledChain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.steps.is_empty() {
            return write!(f, "(passthrough)");
        }
        for (i, step) in self.steps.iter().enumerate() {
            if i > 0 {
                write!(f, " -> ")?;
            }
            write!(f, "{}", step)?;
        }
        Ok(())
    }
}

fn chain_error(effect_name: &str, position: usize, cause: PipelineError) -> PipelineError {
    PipelineError::ChainExecution {
        effect_name: effect_name.to_string(),
        position,
        source: Box::new(cause),
    }
}

/// Runs effect chains against audio buffers
#[derive(Debug, Clone, Copy)]
pub struct ChainExecutor<'r> {
    registry: &'r EffectRegistry,
}

impl ChainExecutor<'static> {
    /// Executor backed by the process-wide registry
    pub fn global() -> Self {
        Self::new(EffectRegistry::global())
    }
}

impl<'r> ChainExecutor<'r> {
    pub fn new(registry: &'r EffectRegistry) -> Self {
        Self { registry }
    }

    /// Resolve, validate and apply a declarative chain
    ///
    /// Every entry is validated before the first one is applied, so a bad
    /// entry late in the chain never costs any processing.
    pub fn execute(&self, buffer: AudioBuffer, chain: &ChainSpec) -> Result<AudioBuffer> {
        let compiled = chain.compile(self.registry)?;
        self.run(buffer, &compiled)
    }

    /// Apply an already-compiled chain
    ///
    /// # Errors
    /// `ChainExecution` for the first step that fails or produces non-finite
    /// samples; later steps are not run
    pub fn run(&self, buffer: AudioBuffer, chain: &CompiledChain) -> Result<AudioBuffer> {
        let mut current = buffer;

        for (position, effect) in chain.steps().iter().enumerate() {
            debug!("  [{}] {}", position, effect);

            current = effect
                .apply(current)
                .map_err(|e| chain_error(effect.name(), position, e))?;

            if !current.is_finite() {
                return Err(chain_error(
                    effect.name(),
                    position,
                    PipelineError::DspOverflow {
                        effect: effect.name().to_string(),
                    },
                ));
            }
        }

        Ok(current)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dsp::{Fade, Repeat, Reverse, Speed, Volume};

    fn constant(len: usize) -> AudioBuffer {
        AudioBuffer::from_channels(vec![vec![0.5; len]], 1000).unwrap()
    }

    #[test]
    fn test_empty_chain_passthrough() {
        let input = constant(100);
        let out = ChainExecutor::global()
            .execute(input.clone(), &ChainSpec::default())
            .unwrap();
        assert_eq!(out, input);
    }

    #[test]
    fn test_chain_runs_in_declared_order() {
        let fade_then_reverse = CompiledChain::new(vec![
            Fade::new(100, 0).into(),
            Reverse.into(),
        ]);
        let reverse_then_fade = CompiledChain::new(vec![
            Reverse.into(),
            Fade::new(100, 0).into(),
        ]);

        let executor = ChainExecutor::global();
        let a = executor.run(constant(1000), &fade_then_reverse).unwrap();
        let b = executor.run(constant(1000), &reverse_then_fade).unwrap();

        // Fade-in moved to the end vs. staying at the start
        assert_eq!(a.channel(0)[0], 0.5);
        assert_eq!(a.channel(0)[999], 0.0);
        assert_eq!(b.channel(0)[0], 0.0);
        assert_eq!(b.channel(0)[999], 0.5);
        assert_ne!(a, b);
    }

    #[test]
    fn test_unknown_effect_reports_position() {
        let chain = ChainSpec::new(vec![
            EffectSpec::new("volume").with_param("gain", 3),
            EffectSpec::new("reverb"),
        ]);

        let err = ChainExecutor::global()
            .execute(constant(10), &chain)
            .unwrap_err();

        match &err {
            PipelineError::ChainExecution {
                effect_name,
                position,
                source,
            } => {
                assert_eq!(effect_name, "reverb");
                assert_eq!(*position, 1);
                assert_eq!(source.error_code(), "UNKNOWN_EFFECT");
            }
            other => panic!("expected ChainExecution, got {:?}", other),
        }
    }

    #[test]
    fn test_failing_step_aborts_chain() {
        let chain = CompiledChain::new(vec![
            Repeat { times: 2 }.into(),
            Speed { factor: -1.0 }.into(),
            Volume { gain_db: 6.0 }.into(),
        ]);

        let err = ChainExecutor::global().run(constant(10), &chain).unwrap_err();
        assert_eq!(err.failing_effect(), Some("speed"));
        assert_eq!(err.root_cause().error_code(), "INVALID_PARAMETER");
    }

    #[test]
    fn test_non_finite_output_is_detected() {
        let chain = CompiledChain::new(vec![Reverse.into(), Volume { gain_db: 6.0 }.into()]);
        let mut input = constant(10);
        input.samples[0][3] = f32::NAN;

        let err = ChainExecutor::global().run(input, &chain).unwrap_err();
        assert_eq!(err.failing_effect(), Some("reverse"));
        assert_eq!(err.root_cause().error_code(), "DSP_OVERFLOW");
    }

    #[test]
    fn test_huge_gain_saturates_instead_of_overflowing() {
        let chain = CompiledChain::new(vec![Volume { gain_db: 1.0e6 }.into()]);
        let out = ChainExecutor::global().run(constant(10), &chain).unwrap();
        assert!(out.is_finite());
        assert_eq!(out.peak(), f32::MAX);
    }

    #[test]
    fn test_compiled_chain_display() {
        let chain = ChainSpec::new(vec![
            EffectSpec::new("fade")
                .with_param("fade_in", 100)
                .with_param("fade_out", 200),
            EffectSpec::new("repeat").with_param("times", 2),
        ])
        .compile(EffectRegistry::global())
        .unwrap();

        assert_eq!(
            chain.to_string(),
            "fade(in=100ms, out=200ms) -> repeat(times=2)"
        );
    }
}
