//! Effect Property Tests
//!
//! Algebraic properties of the six effects and of chain ordering.

use approx::assert_abs_diff_eq;
use test_case::test_case;

use augmenta::dsp::{
    AudioEffect, ChainExecutor, ChainSpec, CompiledChain, EffectRegistry, EffectSpec, Fade,
    Normalize, Repeat, Reverse, Speed, Volume,
};
use augmenta::engine::{generate_test_tone, linear_to_db, AudioBuffer};
use augmenta::PipelineError;

/// Stereo tone with different content per channel
fn stereo_tone() -> AudioBuffer {
    let left = generate_test_tone(440.0, 0.25, 8000, 1, 0.5);
    let right = generate_test_tone(660.0, 0.25, 8000, 1, 0.3);
    AudioBuffer::from_channels(
        vec![left.channel(0).to_vec(), right.channel(0).to_vec()],
        8000,
    )
    .unwrap()
}

fn constant(value: f32, len: usize, sample_rate: u32) -> AudioBuffer {
    AudioBuffer::from_channels(vec![vec![value; len]], sample_rate).unwrap()
}

fn root_code(err: &PipelineError) -> &'static str {
    err.root_cause().error_code()
}

// === Reverse ===

#[test]
fn test_reverse_is_an_involution() {
    let input = stereo_tone();
    let once = Reverse.apply(input.clone()).unwrap();
    assert_ne!(once, input);

    let twice = Reverse.apply(once).unwrap();
    assert_eq!(twice, input);
}

// === Volume ===

#[test]
fn test_volume_zero_is_noop() {
    let input = stereo_tone();
    let out = Volume { gain_db: 0.0 }.apply(input.clone()).unwrap();
    assert_eq!(out, input);
}

#[test_case(0.5 ; "half a decibel")]
#[test_case(6.0 ; "six decibels")]
#[test_case(-12.0 ; "negative twelve decibels")]
#[test_case(40.0 ; "forty decibels")]
fn test_volume_gain_round_trip(gain_db: f64) {
    let input = stereo_tone();

    let louder = Volume::new(gain_db).unwrap().apply(input.clone()).unwrap();
    let restored = Volume::new(-gain_db).unwrap().apply(louder).unwrap();

    let diff = restored.max_abs_diff(&input).unwrap();
    assert!(diff < 1e-4, "round trip drifted by {}", diff);
}

#[test]
fn test_volume_six_db_doubles_amplitude() {
    let input = constant(0.25, 100, 1000);
    let out = Volume { gain_db: 6.0 }.apply(input.clone()).unwrap();
    let ratio_db = linear_to_db(out.peak() / input.peak());
    assert_abs_diff_eq!(ratio_db, 6.0, epsilon = 1e-3);
}

#[test]
fn test_volume_does_not_clip_in_float() {
    let out = Volume { gain_db: 20.0 }
        .apply(constant(0.5, 10, 1000))
        .unwrap();
    assert!(out.peak() > 1.0);
}

#[test_case(800.0 ; "just past the float range")]
#[test_case(1000.0 ; "one thousand decibels")]
fn test_volume_extreme_gain_runs_through_chain(gain_db: f64) {
    let spec = ChainSpec::new(vec![EffectSpec::new("volume").with_param("gain", gain_db)]);
    let chain = spec.compile(EffectRegistry::global()).unwrap();

    let out = ChainExecutor::global().run(stereo_tone(), &chain).unwrap();
    assert!(out.is_finite());
    assert!(out.peak() > f32::MAX / 4.0);
}

// === Speed ===

#[test]
fn test_speed_one_is_noop() {
    let input = stereo_tone();
    let out = Speed::new(1.0).unwrap().apply(input.clone()).unwrap();
    assert_eq!(out, input);
}

#[test_case(0.0)]
#[test_case(-1.5)]
fn test_speed_rejects_non_positive(factor: f64) {
    let err = Speed::new(factor).unwrap_err();
    assert_eq!(err.error_code(), "INVALID_PARAMETER");

    let spec = EffectSpec::new("speed").with_param("factor", factor);
    let err = EffectRegistry::global().build(&spec).unwrap_err();
    assert_eq!(err.error_code(), "INVALID_PARAMETER");
}

#[test_case(2.0, 1000)]
#[test_case(0.5, 4000)]
#[test_case(3.0, 667)]
fn test_speed_changes_length(factor: f64, expected_len: usize) {
    let out = Speed::new(factor)
        .unwrap()
        .apply(constant(0.1, 2000, 1000))
        .unwrap();
    assert_eq!(out.len(), expected_len);
    assert_eq!(out.sample_rate, 1000);
}

// === Repeat ===

#[test_case(1)]
#[test_case(2)]
#[test_case(5)]
fn test_repeat_multiplies_duration(times: u64) {
    let input = stereo_tone();
    let out = Repeat::new(times).unwrap().apply(input.clone()).unwrap();

    assert_eq!(out.len(), input.len() * times as usize);
    assert_abs_diff_eq!(
        out.duration_ms(),
        input.duration_ms() * times as f64,
        epsilon = 1e-6
    );
    assert_eq!(out.channels(), input.channels());
}

#[test]
fn test_repeat_rejects_zero_and_negative() {
    assert_eq!(Repeat::new(0).unwrap_err().error_code(), "INVALID_PARAMETER");

    for times in [0, -3] {
        let spec = EffectSpec::new("repeat").with_param("times", times);
        let err = EffectRegistry::global().build(&spec).unwrap_err();
        assert_eq!(err.error_code(), "INVALID_PARAMETER");
    }
}

// === Fade ===

#[test]
fn test_fade_envelope_edges() {
    let out = Fade::new(100, 200).apply(constant(1.0, 1000, 1000)).unwrap();
    let samples = out.channel(0);

    assert_eq!(samples[0], 0.0);
    assert_abs_diff_eq!(samples[50], 0.5, epsilon = 1e-6);
    assert_eq!(samples[500], 1.0);
    assert_abs_diff_eq!(samples[899], 0.5, epsilon = 1e-2);
    assert_eq!(samples[999], 0.0);
}

#[test]
fn test_fade_longer_than_buffer_is_clamped() {
    let out = Fade::new(10_000, 10_000)
        .apply(constant(1.0, 100, 1000))
        .unwrap();
    assert_eq!(out.len(), 100);
    assert!(out.is_finite());
    assert_eq!(out.channel(0)[0], 0.0);
    assert_eq!(out.channel(0)[99], 0.0);
}

// === Normalize ===

#[test]
fn test_normalize_hits_headroom() {
    let out = Normalize::new(3.0)
        .unwrap()
        .apply(stereo_tone())
        .unwrap();
    assert_abs_diff_eq!(linear_to_db(out.peak()), -3.0, epsilon = 1e-3);
}

#[test]
fn test_normalize_leaves_silence_alone() {
    let silence = constant(0.0, 100, 1000);
    let out = Normalize::default().apply(silence.clone()).unwrap();
    assert_eq!(out, silence);
}

// === Chains ===

#[test]
fn test_fade_and_reverse_do_not_commute() {
    let executor = ChainExecutor::global();
    let input = constant(0.5, 1000, 1000);

    let fade_first = executor
        .run(
            input.clone(),
            &CompiledChain::new(vec![Fade::new(100, 0).into(), Reverse.into()]),
        )
        .unwrap();
    let reverse_first = executor
        .run(
            input,
            &CompiledChain::new(vec![Reverse.into(), Fade::new(100, 0).into()]),
        )
        .unwrap();

    // The fade ramp ends up at opposite ends of the buffer
    assert_eq!(fade_first.channel(0)[999], 0.0);
    assert_eq!(fade_first.channel(0)[0], 0.5);
    assert_eq!(reverse_first.channel(0)[0], 0.0);
    assert_eq!(reverse_first.channel(0)[999], 0.5);
}

#[test]
fn test_declarative_chain_matches_typed_chain() {
    let spec: ChainSpec = serde_json::from_str(
        r#"[
            {"effect": "fade", "params": {"fade_in": 100, "fade_out": 200}},
            {"effect": "repeat", "params": {"times": 2}}
        ]"#,
    )
    .unwrap();

    let executor = ChainExecutor::global();
    let input = stereo_tone();

    let declarative = executor.execute(input.clone(), &spec).unwrap();
    let typed = executor
        .run(
            input,
            &CompiledChain::new(vec![Fade::new(100, 200).into(), Repeat { times: 2 }.into()]),
        )
        .unwrap();

    assert_eq!(declarative, typed);
}

#[test]
fn test_bad_entry_is_rejected_before_processing() {
    let spec = ChainSpec::new(vec![
        EffectSpec::new("reverse"),
        EffectSpec::new("volume").with_param("gain", 3),
        EffectSpec::new("speed").with_param("rate", 2.0),
    ]);

    let err = ChainExecutor::global()
        .execute(stereo_tone(), &spec)
        .unwrap_err();

    match &err {
        PipelineError::ChainExecution {
            effect_name,
            position,
            ..
        } => {
            assert_eq!(effect_name, "speed");
            assert_eq!(*position, 2);
        }
        other => panic!("expected ChainExecution, got {:?}", other),
    }
    assert_eq!(root_code(&err), "INVALID_PARAMETER");
}
