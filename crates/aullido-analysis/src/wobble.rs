//! Two-mode decay/beat fit.
//!
//! A wolf-prone note decays as two coupled oscillators exchanging energy:
//! the envelope is an exponential decay multiplied by a slow beat,
//!
//! ```text
//! env(t) ≈ A0 · e^(−α·t) · (1 + r·cos(ω·t + φ))
//! ```
//!
//! The fit runs as a small state machine over one envelope:
//! prepare → decay fit → (low signal | wobble fit). The decay is estimated
//! by log-linear regression and divided out; the remaining oscillation is
//! located by a weighted correlation sweep and fitted by closed-form least
//! squares on a cos/sin basis. The reconstruction quality (r²), beat rate,
//! and beat depth combine into a bounded wolf-risk score.

use std::f32::consts::PI;

use aullido_dsp::stats::{linear_regression, mean, mean_square, variance};
use thiserror::Error;

use crate::envelope::{FitPrep, LOG_FLOOR, LateWindow, late_window_indices, normalize_envelope,
                      prepare_envelope_for_fit, trim_tail};
use crate::types::{EnergySeries, PartialKey, TwoModeFitResult, WolfCategory};

/// Detrended variance below which the note is treated as having no
/// exploitable beat signal.
const LOW_SIGNAL_VARIANCE: f32 = 1e-7;

/// Beat-frequency sweep parameters.
const SWEEP_MAX_HZ: f32 = 12.0;
const SWEEP_STEP_HZ: f32 = 0.01;
const SWEEP_MIN_HZ: f32 = 1.5;
const SWEEP_MIN_HZ_EXTENDED: f32 = 0.5;

/// Exponential taper constant of the sweep weighting window.
const SWEEP_DECAY: f32 = 3.0;

/// Trailing moving-average window used by the residual beat estimator.
const RESIDUAL_MA_SEC: f32 = 0.05;

/// Wolf-score normalizers: full credit at 0.4 beat depth and 4 Hz beat rate.
const DEPTH_FULL_SCALE: f32 = 0.4;
const RATE_FULL_SCALE_HZ: f32 = 4.0;

/// Instability thresholds shared by [`is_unstable_decay`] and the
/// per-partial map.
const UNSTABLE_BEAT_HZ: f32 = 0.8;
const UNSTABLE_DEPTH: f32 = 0.08;
const MIN_BEAT_CYCLES: f32 = 1.5;
const MIN_LATE_MS: f32 = 220.0;

/// Errors from the two-mode fit.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum FitError {
    /// The caller passed an empty envelope; callers must guard.
    #[error("cannot fit an empty envelope")]
    EmptyEnvelope,
}

/// Fits the two-mode decay/beat model with default pre-conditioning
/// (100 ms attack skip, 2 s analysis window).
///
/// # Errors
///
/// [`FitError::EmptyEnvelope`] when `env` is empty. Low-signal envelopes do
/// not error; they produce a null result (`wolf_score` 0, category `None`).
pub fn fit_two_mode_decay(env: &[f32], dt: f32) -> Result<TwoModeFitResult, FitError> {
    fit_two_mode_decay_with(env, dt, &FitPrep::default())
}

/// [`fit_two_mode_decay`] with explicit pre-conditioning parameters.
pub fn fit_two_mode_decay_with(
    env: &[f32],
    dt: f32,
    prep: &FitPrep,
) -> Result<TwoModeFitResult, FitError> {
    if env.is_empty() {
        return Err(FitError::EmptyEnvelope);
    }

    // --- Preparing -------------------------------------------------------
    let prepared = prepare_envelope_for_fit(env, dt, prep);
    if prepared.len() < 2 {
        return Ok(low_signal_result(0.0, 0.0));
    }
    let t: Vec<f32> = (0..prepared.len()).map(|i| i as f32 * dt).collect();

    // --- DecayFitted -----------------------------------------------------
    let log_env: Vec<f32> = prepared.iter().map(|&v| v.max(LOG_FLOOR).ln()).collect();
    let decay = linear_regression(&t, &log_env);
    let alpha = decay.map_or(0.0, |r| (-r.slope).max(0.0));
    let a0 = decay.map_or_else(|| prepared[0].max(1.0), |r| r.intercept.exp());

    let detrended_full: Vec<f32> = prepared
        .iter()
        .zip(t.iter())
        .map(|(&v, &ti)| v * (alpha * ti).exp() / a0)
        .collect();
    let detrended = trim_tail(&detrended_full);
    let n = detrended.len();

    let detrended_var = variance(&detrended);
    if !detrended_var.is_finite() || detrended_var < LOW_SIGNAL_VARIANCE {
        return Ok(low_signal_result(alpha, detrended_var));
    }

    // --- WobbleFitted ----------------------------------------------------
    let t = &t[..n];
    let dc = mean(&detrended);
    let wobble: Vec<f32> = detrended.iter().map(|&v| v - dc).collect();

    let delta_f = estimate_beat_frequency(&wobble, t, dt);

    let omega = 2.0 * PI * delta_f;
    let (a, b) = fit_sinusoid(&wobble, t, omega);
    let wobble_depth = a.hypot(b);

    // Reconstruct and score against max-scaled curves.
    let fitted: Vec<f32> = t
        .iter()
        .map(|&ti| {
            let phase = omega * ti;
            a0 * (-alpha * ti).exp() * (1.0 + a * phase.cos() + b * phase.sin())
        })
        .collect();
    let norm_orig = normalize_envelope(&prepared[..n]);
    let norm_fit = normalize_envelope(&fitted);

    let residuals: Vec<f32> = norm_orig
        .iter()
        .zip(norm_fit.iter())
        .map(|(&o, &f)| o - f)
        .collect();
    let residual_var = mean_square(&residuals);
    let ss_tot = variance(&norm_orig);
    let r2 = if ss_tot > 0.0 {
        (1.0 - residual_var / ss_tot).clamp(0.0, 1.0)
    } else {
        0.0
    };

    let wolf_score = clamp01(wobble_depth / DEPTH_FULL_SCALE)
        * clamp01(delta_f / RATE_FULL_SCALE_HZ)
        * r2;

    Ok(TwoModeFitResult {
        delta_f,
        wobble_depth,
        alpha,
        r2,
        residual_var,
        wolf_score,
        category: WolfCategory::from_score(wolf_score),
    })
}

fn low_signal_result(alpha: f32, residual_var: f32) -> TwoModeFitResult {
    TwoModeFitResult {
        delta_f: 0.0,
        wobble_depth: 0.0,
        alpha,
        r2: 0.0,
        residual_var,
        wolf_score: 0.0,
        category: WolfCategory::None,
    }
}

fn clamp01(v: f32) -> f32 {
    v.clamp(0.0, 1.0)
}

/// Estimates the beat frequency of a zero-mean detrended oscillation.
///
/// Two estimators share the same correlation sweep:
///
/// 1. residual-based: the signal minus its own trailing 50 ms moving
///    average, swept from 1.5 Hz — preferred whenever the residual carries
///    usable variance, since the moving-average subtraction suppresses any
///    leftover slow trend that would otherwise pull the sweep low;
/// 2. direct: the detrended signal itself, swept from 1.5 Hz for short
///    (≤ 1.5 s) windows with visible wobble, else from 0.5 Hz.
fn estimate_beat_frequency(wobble: &[f32], t: &[f32], dt: f32) -> f32 {
    let ma_window = ((RESIDUAL_MA_SEC / dt).round() as usize).max(1);
    let residual = subtract_trailing_mean(wobble, ma_window);
    let residual_var = variance(&residual);

    if residual_var.is_finite() && residual_var > LOW_SIGNAL_VARIANCE {
        return sweep_correlation(&residual, t, SWEEP_MIN_HZ);
    }

    let window_dur = t.last().copied().unwrap_or(0.0);
    let peak = wobble.iter().map(|v| v.abs()).fold(0.0f32, f32::max);
    let min_hz = if window_dur <= 1.5 && peak > 0.01 {
        SWEEP_MIN_HZ
    } else {
        SWEEP_MIN_HZ_EXTENDED
    };
    sweep_correlation(wobble, t, min_hz)
}

/// Subtracts a trailing moving average (window of `len` samples) from each
/// sample.
fn subtract_trailing_mean(signal: &[f32], len: usize) -> Vec<f32> {
    let mut out = Vec::with_capacity(signal.len());
    let mut running = 0.0f64;

    for (i, &v) in signal.iter().enumerate() {
        running += f64::from(v);
        if i >= len {
            running -= f64::from(signal[i - len]);
        }
        let count = (i + 1).min(len) as f64;
        out.push(v - (running / count) as f32);
    }
    out
}

/// Sweeps candidate frequencies and returns the one with the largest
/// weighted correlation magnitude.
///
/// The weighting is a Hann window tapered by `exp(−3·i/n)`, emphasizing the
/// early, high-SNR part of the decay while still suppressing edge leakage.
fn sweep_correlation(signal: &[f32], t: &[f32], min_hz: f32) -> f32 {
    let n = signal.len();
    if n < 2 {
        return min_hz;
    }

    let denom = (n - 1) as f32;
    let weights: Vec<f32> = (0..n)
        .map(|i| {
            let x = i as f32 / denom;
            let hann = 0.5 * (1.0 - (2.0 * PI * x).cos());
            hann * (-SWEEP_DECAY * x).exp()
        })
        .collect();

    let steps = ((SWEEP_MAX_HZ - min_hz) / SWEEP_STEP_HZ).round() as usize;
    let mut best_freq = min_hz;
    let mut best_mag = -1.0f64;

    for s in 0..=steps {
        let freq = min_hz + s as f32 * SWEEP_STEP_HZ;
        let omega = 2.0 * PI * freq;

        let mut re = 0.0f64;
        let mut im = 0.0f64;
        for i in 0..n {
            let w = f64::from(weights[i] * signal[i]);
            let phase = f64::from(omega * t[i]);
            re += w * phase.cos();
            im += w * phase.sin();
        }
        let mag = re * re + im * im;
        if mag > best_mag {
            best_mag = mag;
            best_freq = freq;
        }
    }

    best_freq
}

/// Least-squares fit of `signal(t) ≈ a·cos(ωt) + b·sin(ωt)` via the 2×2
/// normal equations.
fn fit_sinusoid(signal: &[f32], t: &[f32], omega: f32) -> (f32, f32) {
    let mut scc = 0.0f64;
    let mut sss = 0.0f64;
    let mut scs = 0.0f64;
    let mut syc = 0.0f64;
    let mut sys = 0.0f64;

    for (&y, &ti) in signal.iter().zip(t.iter()) {
        let phase = f64::from(omega * ti);
        let c = phase.cos();
        let s = phase.sin();
        let yv = f64::from(y);
        scc += c * c;
        sss += s * s;
        scs += c * s;
        syc += yv * c;
        sys += yv * s;
    }

    let det = scc * sss - scs * scs;
    if det.abs() < 1e-12 {
        return (0.0, 0.0);
    }
    let a = (syc * sss - sys * scs) / det;
    let b = (sys * scc - syc * scs) / det;
    (a as f32, b as f32)
}

/// Whether a fitted decay is unstable enough to call wolf-like on its own.
///
/// A fast beat (≥ 0.8 Hz) is unstable outright; when no beat rate is
/// available, a beat depth ≥ 0.08 is. A known slow beat is stable
/// regardless of depth.
pub fn is_unstable_decay(beat_rate: Option<f32>, wobble_depth: f32) -> bool {
    match beat_rate {
        Some(rate) => rate >= UNSTABLE_BEAT_HZ,
        None => wobble_depth >= UNSTABLE_DEPTH,
    }
}

/// Runs the two-mode fit on each partial's normalized energy-share series
/// and flags unstable decays.
///
/// Uses a 40 ms attack skip (share series settle faster than raw
/// envelopes). A partial is unstable when the fitted beat is fast
/// (≥ 0.8 Hz), completes at least 1.5 cycles over the late window, and the
/// late window spans ≥ 220 ms; or when the beat depth alone reaches 0.08
/// over a ≥ 220 ms late window.
pub fn compute_partial_instability_map(
    series: &EnergySeries,
) -> std::collections::BTreeMap<PartialKey, bool> {
    let mut map = std::collections::BTreeMap::new();

    let dt = if series.t.len() >= 2 {
        series.t[1] - series.t[0]
    } else {
        0.0
    };
    let prep = FitPrep {
        attack_skip_ms: 40.0,
        max_duration_ms: 2000.0,
    };
    let window = LateWindow::default();

    for (&key, track) in &series.partials {
        if dt <= 0.0 || track.share.is_empty() {
            map.insert(key, false);
            continue;
        }

        let env = normalize_envelope(&track.share);
        let Ok(fit) = fit_two_mode_decay_with(&env, dt, &prep) else {
            map.insert(key, false);
            continue;
        };

        let late_dur = late_window_indices(&series.t, &window)
            .map_or(0.0, |(start, end)| series.t[end] - series.t[start]);
        let late_ms = late_dur * 1000.0;

        let fast_beat = fit.delta_f >= UNSTABLE_BEAT_HZ
            && fit.delta_f * late_dur >= MIN_BEAT_CYCLES
            && late_ms >= MIN_LATE_MS;
        let deep_wobble = fit.wobble_depth >= UNSTABLE_DEPTH && late_ms >= MIN_LATE_MS;

        map.insert(key, fast_beat || deep_wobble);
    }

    map
}
