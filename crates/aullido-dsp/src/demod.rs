//! Quadrature demodulation — extracts one partial's amplitude envelope.
//!
//! Mixes the recorded waveform to complex baseband at the partial's
//! frequency, low-passes the in-phase and quadrature rails to the partial's
//! bandwidth, and takes the rail magnitude. A final low-pass smooths the
//! magnitude into a plot-ready envelope.
//!
//! # Signal model
//!
//! For a real input w\[n\] and partial frequency f:
//!
//! ```text
//! I[n] = w[n] ·  cos(2π f n / fs)
//! Q[n] = w[n] · -sin(2π f n / fs)
//! env[n] = lowpass(hypot(lowpass(I)[n], lowpass(Q)[n]))
//! ```
//!
//! The magnitude of the filtered I/Q pair is the instantaneous amplitude of
//! the spectral component at f, insensitive to the partial's phase.

use std::f32::consts::PI;

use crate::biquad::{Biquad, filter_samples, lowpass_coefficients};

/// Minimum rail-filter cutoff in Hz. Very narrow requested bandwidths would
/// otherwise make the envelope settle slower than the note decays.
const MIN_BANDWIDTH_HZ: f32 = 5.0;

/// Demodulates the amplitude envelope of a single spectral component.
///
/// # Arguments
///
/// * `wave` - Real input samples
/// * `sample_rate` - Sample rate in Hz
/// * `freq` - Center frequency of the partial in Hz
/// * `bandwidth_hz` - Analysis bandwidth; the I/Q rails are low-passed at
///   `max(5, bandwidth_hz)`
/// * `envelope_lp_hz` - Cutoff of the final magnitude-smoothing low-pass
///
/// # Returns
///
/// Envelope samples, one per input sample. Non-negative by construction.
pub fn demodulate_partial(
    wave: &[f32],
    sample_rate: f32,
    freq: f32,
    bandwidth_hz: f32,
    envelope_lp_hz: f32,
) -> Vec<f32> {
    if wave.is_empty() {
        return Vec::new();
    }

    let phase_inc = 2.0 * PI * freq / sample_rate;
    let mut in_phase = Vec::with_capacity(wave.len());
    let mut quadrature = Vec::with_capacity(wave.len());

    let mut phase = 0.0f32;
    for &x in wave {
        in_phase.push(x * phase.cos());
        quadrature.push(x * (-phase.sin()));

        phase += phase_inc;
        // Wrap to [0, 2π) to prevent floating-point drift
        if phase >= 2.0 * PI {
            phase -= 2.0 * PI;
        }
    }

    let rail_cutoff = bandwidth_hz.max(MIN_BANDWIDTH_HZ);
    let rail = lowpass_coefficients(rail_cutoff, std::f32::consts::FRAC_1_SQRT_2, sample_rate);
    let i_filtered = filter_samples(&in_phase, rail);
    let q_filtered = filter_samples(&quadrature, rail);

    let mut smoother = Biquad::lowpass(envelope_lp_hz, sample_rate);
    i_filtered
        .iter()
        .zip(q_filtered.iter())
        .map(|(&i, &q)| smoother.process(i.hypot(q)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tone(freq: f32, amplitude: f32, sample_rate: f32, num_samples: usize) -> Vec<f32> {
        (0..num_samples)
            .map(|i| amplitude * (2.0 * PI * freq * i as f32 / sample_rate).sin())
            .collect()
    }

    fn steady_mean(env: &[f32]) -> f32 {
        let skip = env.len() / 2;
        env[skip..].iter().sum::<f32>() / (env.len() - skip) as f32
    }

    #[test]
    fn test_output_length_matches_input() {
        let sr = 8000.0;
        let wave = tone(200.0, 1.0, sr, 4000);
        let env = demodulate_partial(&wave, sr, 200.0, 20.0, 10.0);
        assert_eq!(env.len(), wave.len());
    }

    #[test]
    fn test_on_frequency_tone_recovers_amplitude() {
        // A steady tone at the demodulation frequency: the filtered I/Q
        // magnitude converges to half the tone amplitude (one sideband).
        let sr = 8000.0;
        let amplitude = 0.8;
        let wave = tone(300.0, amplitude, sr, 16000);
        let env = demodulate_partial(&wave, sr, 300.0, 20.0, 10.0);

        let level = steady_mean(&env);
        let expected = amplitude / 2.0;
        assert!(
            (level - expected).abs() < 0.05 * expected,
            "Recovered level {level} should be near {expected}"
        );
    }

    #[test]
    fn test_off_frequency_tone_rejected() {
        let sr = 8000.0;
        let on = tone(300.0, 1.0, sr, 16000);
        let off = tone(900.0, 1.0, sr, 16000);

        let env_on = demodulate_partial(&on, sr, 300.0, 20.0, 10.0);
        let env_off = demodulate_partial(&off, sr, 300.0, 20.0, 10.0);

        let rejection_db = 20.0 * (steady_mean(&env_off) / steady_mean(&env_on)).log10();
        assert!(
            rejection_db < -30.0,
            "600 Hz-away tone should be rejected by > 30 dB, got {rejection_db:.1} dB"
        );
    }

    #[test]
    fn test_decaying_tone_yields_decaying_envelope() {
        let sr = 4000.0;
        let wave: Vec<f32> = (0..8000)
            .map(|i| {
                let t = i as f32 / sr;
                (-2.0 * t).exp() * (2.0 * PI * 196.0 * t).sin()
            })
            .collect();
        let env = demodulate_partial(&wave, sr, 196.0, 20.0, 12.0);

        // Compare mid-note level against late level: should have decayed.
        let early = env[(0.5 * sr) as usize];
        let late = env[(1.5 * sr) as usize];
        assert!(
            late < early * 0.3,
            "Envelope should decay: early {early}, late {late}"
        );
    }

    #[test]
    fn test_empty_input() {
        let env = demodulate_partial(&[], 8000.0, 200.0, 20.0, 10.0);
        assert!(env.is_empty());
    }

    #[test]
    fn test_narrow_bandwidth_floored() {
        // A 0 Hz bandwidth request still tracks a decaying tone because the
        // rail cutoff is floored at 5 Hz.
        let sr = 4000.0;
        let wave: Vec<f32> = (0..8000)
            .map(|i| {
                let t = i as f32 / sr;
                (-1.0 * t).exp() * (2.0 * PI * 150.0 * t).sin()
            })
            .collect();
        let env = demodulate_partial(&wave, sr, 150.0, 0.0, 10.0);
        let peak = env.iter().copied().fold(0.0f32, f32::max);
        assert!(peak > 0.1, "Envelope should still carry signal, peak {peak}");
    }
}
