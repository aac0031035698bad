//! Biquad (bi-quadratic) low-pass filter.
//!
//! Second-order IIR filter in Direct Form I, with coefficients from the
//! RBJ Audio EQ Cookbook. The analysis engine only needs the low-pass
//! response (envelope smoothing and quadrature-rail filtering), so that is
//! the only design provided here.

use std::f32::consts::{FRAC_1_SQRT_2, PI};

/// Normalized biquad coefficients (`a0` divided out).
///
/// Transfer function:
/// ```text
/// H(z) = (b0 + b1 z^-1 + b2 z^-2) / (1 + a1 z^-1 + a2 z^-2)
/// ```
#[derive(Debug, Clone, Copy)]
pub struct BiquadCoefficients {
    pub b0: f32,
    pub b1: f32,
    pub b2: f32,
    pub a1: f32,
    pub a2: f32,
}

/// Calculates low-pass coefficients using the RBJ cookbook formula.
///
/// The cutoff is clamped just below Nyquist so the recursion stays stable
/// for out-of-range requests.
///
/// # Arguments
///
/// * `cutoff_hz` - Cutoff frequency in Hz
/// * `q` - Q factor (1/√2 for a Butterworth response)
/// * `sample_rate` - Sample rate in Hz
pub fn lowpass_coefficients(cutoff_hz: f32, q: f32, sample_rate: f32) -> BiquadCoefficients {
    let cutoff = cutoff_hz.clamp(0.0, 0.49 * sample_rate);
    let omega = 2.0 * PI * cutoff / sample_rate;
    let cos_omega = omega.cos();
    let sin_omega = omega.sin();
    let alpha = sin_omega / (2.0 * q);

    let b0 = (1.0 - cos_omega) / 2.0;
    let b1 = 1.0 - cos_omega;
    let b2 = (1.0 - cos_omega) / 2.0;
    let a0 = 1.0 + alpha;
    let a1 = -2.0 * cos_omega;
    let a2 = 1.0 - alpha;

    let a0_inv = 1.0 / a0;
    BiquadCoefficients {
        b0: b0 * a0_inv,
        b1: b1 * a0_inv,
        b2: b2 * a0_inv,
        a1: a1 * a0_inv,
        a2: a2 * a0_inv,
    }
}

/// Biquad filter state for the Direct Form I recursion:
///
/// ```text
/// y[n] = b0*x[n] + b1*x[n-1] + b2*x[n-2]
///                - a1*y[n-1] - a2*y[n-2]
/// ```
#[derive(Debug, Clone)]
pub struct Biquad {
    coeffs: BiquadCoefficients,

    /// Input delay line: x[n-1], x[n-2]
    x1: f32,
    x2: f32,

    /// Output delay line: y[n-1], y[n-2]
    y1: f32,
    y2: f32,
}

impl Biquad {
    /// Creates a biquad with the given coefficients and zeroed delay lines.
    pub fn new(coeffs: BiquadCoefficients) -> Self {
        Self {
            coeffs,
            x1: 0.0,
            x2: 0.0,
            y1: 0.0,
            y2: 0.0,
        }
    }

    /// Creates a Butterworth (Q = 1/√2) low-pass biquad.
    pub fn lowpass(cutoff_hz: f32, sample_rate: f32) -> Self {
        Self::new(lowpass_coefficients(cutoff_hz, FRAC_1_SQRT_2, sample_rate))
    }

    /// Processes a single sample through the filter.
    #[inline]
    pub fn process(&mut self, input: f32) -> f32 {
        let c = &self.coeffs;
        let output = c.b0 * input + c.b1 * self.x1 + c.b2 * self.x2
            - c.a1 * self.y1
            - c.a2 * self.y2;

        self.x2 = self.x1;
        self.x1 = input;
        self.y2 = self.y1;
        self.y1 = output;

        output
    }

    /// Clears the delay lines without changing the coefficients.
    pub fn clear(&mut self) {
        self.x1 = 0.0;
        self.x2 = 0.0;
        self.y1 = 0.0;
        self.y2 = 0.0;
    }
}

/// Runs a whole buffer through a freshly zeroed filter.
///
/// One-shot equivalent of constructing a [`Biquad`] and calling
/// [`Biquad::process`] per sample; used wherever the engine filters a fully
/// materialized envelope rather than a stream.
pub fn filter_samples(input: &[f32], coeffs: BiquadCoefficients) -> Vec<f32> {
    let mut filter = Biquad::new(coeffs);
    input.iter().map(|&x| filter.process(x)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sine(freq: f32, sample_rate: f32, num_samples: usize) -> Vec<f32> {
        (0..num_samples)
            .map(|i| (2.0 * PI * freq * i as f32 / sample_rate).sin())
            .collect()
    }

    /// Steady-state peak amplitude after the filter transient settles.
    fn steady_peak(signal: &[f32]) -> f32 {
        let skip = signal.len() / 2;
        signal[skip..]
            .iter()
            .map(|x| x.abs())
            .fold(0.0f32, f32::max)
    }

    #[test]
    fn test_lowpass_dc_pass() {
        let mut biquad = Biquad::lowpass(1000.0, 44100.0);

        let mut output = 0.0;
        for _ in 0..1000 {
            output = biquad.process(1.0);
        }

        // DC should pass with near-unity gain
        assert!((output - 1.0).abs() < 0.05, "DC gain was {output}");
    }

    #[test]
    fn test_lowpass_passes_below_cutoff() {
        let sample_rate = 8000.0;
        let signal = sine(20.0, sample_rate, 16000);
        let out = filter_samples(&signal, lowpass_coefficients(500.0, FRAC_1_SQRT_2, sample_rate));

        let gain = steady_peak(&out) / steady_peak(&signal);
        assert!(
            (gain - 1.0).abs() < 0.05,
            "Well-below-cutoff gain should be near unity, got {gain}"
        );
    }

    #[test]
    fn test_lowpass_attenuates_above_cutoff() {
        let sample_rate = 8000.0;
        // A tone a decade above the cutoff: a 2nd-order Butterworth rolls off
        // 12 dB/octave, so 40 dB here. Require at least 20 dB.
        let signal = sine(2000.0, sample_rate, 16000);
        let out = filter_samples(&signal, lowpass_coefficients(200.0, FRAC_1_SQRT_2, sample_rate));

        let gain = steady_peak(&out) / steady_peak(&signal);
        let gain_db = 20.0 * gain.log10();
        assert!(
            gain_db < -20.0,
            "Stopband attenuation should exceed 20 dB, got {gain_db:.1} dB"
        );
    }

    #[test]
    fn test_clear_resets_state() {
        let mut biquad = Biquad::lowpass(500.0, 8000.0);
        for _ in 0..64 {
            biquad.process(1.0);
        }
        biquad.clear();

        let mut fresh = Biquad::lowpass(500.0, 8000.0);
        for i in 0..32 {
            let x = (i as f32 * 0.1).sin();
            assert_eq!(biquad.process(x), fresh.process(x));
        }
    }

    #[test]
    fn test_coefficients_finite_at_extreme_cutoff() {
        // Cutoff above Nyquist is clamped, not NaN.
        let c = lowpass_coefficients(10_000.0, FRAC_1_SQRT_2, 8000.0);
        assert!(c.b0.is_finite() && c.b1.is_finite() && c.b2.is_finite());
        assert!(c.a1.is_finite() && c.a2.is_finite());
    }
}
