//! Property-based tests for the DSP primitives.
//!
//! Verifies invariants that must hold for any finite input: filters and
//! demodulation never emit non-finite samples, output lengths match, and
//! the statistics stay within their algebraic bounds.

use proptest::prelude::*;

use aullido_dsp::biquad::{filter_samples, lowpass_coefficients};
use aullido_dsp::demod::demodulate_partial;
use aullido_dsp::stats::{linear_regression, mean, mean_square, variance};

proptest! {
    #![proptest_config(ProptestConfig::with_cases(200))]

    /// Low-pass filtering finite input yields finite output of equal length.
    #[test]
    fn lowpass_output_finite(
        input in prop::collection::vec(-1.0f32..=1.0, 0..=256),
        cutoff in 1.0f32..=20_000.0,
    ) {
        let coeffs = lowpass_coefficients(cutoff, std::f32::consts::FRAC_1_SQRT_2, 8000.0);
        let out = filter_samples(&input, coeffs);
        prop_assert_eq!(out.len(), input.len());
        prop_assert!(out.iter().all(|v| v.is_finite()));
    }

    /// Demodulation preserves length and never emits non-finite samples.
    #[test]
    fn demodulation_output_finite(
        input in prop::collection::vec(-1.0f32..=1.0, 0..=256),
        freq in 20.0f32..=2000.0,
        bandwidth in 0.0f32..=100.0,
    ) {
        let env = demodulate_partial(&input, 8000.0, freq, bandwidth, 15.0);
        prop_assert_eq!(env.len(), input.len());
        prop_assert!(env.iter().all(|v| v.is_finite()));
    }

    /// Variance and mean-square are non-negative; the mean lies within the
    /// sample range.
    #[test]
    fn stats_bounds(samples in prop::collection::vec(-100.0f32..=100.0, 1..=256)) {
        let m = mean(&samples);
        let lo = samples.iter().copied().fold(f32::INFINITY, f32::min);
        let hi = samples.iter().copied().fold(f32::NEG_INFINITY, f32::max);
        prop_assert!(m >= lo - 1e-3 && m <= hi + 1e-3, "mean {m} outside [{lo}, {hi}]");
        prop_assert!(variance(&samples) >= 0.0);
        prop_assert!(mean_square(&samples) >= 0.0);
    }

    /// When regression succeeds, r² is within [0, 1] and all outputs finite.
    #[test]
    fn regression_r2_bounded(
        y in prop::collection::vec(-100.0f32..=100.0, 2..=128),
    ) {
        let x: Vec<f32> = (0..y.len()).map(|i| i as f32 * 0.01).collect();
        let fit = linear_regression(&x, &y).expect("x has non-zero variance");
        prop_assert!(fit.slope.is_finite());
        prop_assert!(fit.intercept.is_finite());
        prop_assert!((0.0..=1.0).contains(&fit.r2), "r2 {} out of range", fit.r2);
    }
}
