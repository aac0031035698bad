//! Amplitude-envelope analysis: normalization, late-time-window statistics,
//! and pre-conditioning for the decay fit.
//!
//! The "late window" is the 200–800 ms post-onset region where transients
//! have died out and steady-state coupling behavior shows; its bounds (and
//! their fallbacks for very short notes) are measurement heuristics carried
//! over from the instrument-bench setup, exposed as configurable defaults.

use aullido_dsp::stats::{linear_regression, mean, variance_with_mean};

use crate::types::LateStats;

/// Division floor when normalizing by a near-zero maximum.
pub const NORM_FLOOR: f32 = 1e-9;

/// Floor applied before taking logs of envelope samples.
pub const LOG_FLOOR: f32 = 1e-9;

/// Fraction of the slice peak below which the tail is trimmed.
const TAIL_KEEP_RATIO: f32 = 0.05;

/// Minimum number of samples kept for any fit.
const MIN_FIT_LEN: usize = 16;

/// Late-window stability thresholds.
const STABLE_MEAN_MIN: f32 = 0.08;
const STABLE_CV_MAX: f32 = 0.6;

/// Scales an envelope by its own maximum.
///
/// - empty input → empty output
/// - all samples non-finite → zeros
/// - maximum floored at [`NORM_FLOOR`] so silence does not divide by zero
pub fn normalize_envelope(env: &[f32]) -> Vec<f32> {
    let max = env
        .iter()
        .copied()
        .filter(|v| v.is_finite())
        .fold(0.0f32, f32::max);
    let denom = max.max(NORM_FLOOR);
    env.iter()
        .map(|&v| if v.is_finite() { v / denom } else { 0.0 })
        .collect()
}

/// Late-time window bounds.
#[derive(Debug, Clone, Copy)]
pub struct LateWindow {
    /// Window start, seconds after onset.
    pub start_sec: f32,
    /// Window end, seconds after onset.
    pub end_sec: f32,
    /// Fallback start as a fraction of the series length, for notes shorter
    /// than `start_sec`.
    pub start_frac: f32,
}

impl Default for LateWindow {
    fn default() -> Self {
        Self {
            start_sec: 0.2,
            end_sec: 0.8,
            start_frac: 0.6,
        }
    }
}

/// Locates the late-window index range (inclusive) on a time axis.
///
/// Start is the first index with `t ≥ start_sec`, falling back to
/// `start_frac` of the length; end is the first index with `t ≥ end_sec`,
/// falling back to the last index. If no index lies past the start, the end
/// snaps to the last index. Returns `None` for an empty axis.
pub fn late_window_indices(t: &[f32], window: &LateWindow) -> Option<(usize, usize)> {
    if t.is_empty() {
        return None;
    }
    let last = t.len() - 1;

    let start = t
        .iter()
        .position(|&v| v >= window.start_sec)
        .unwrap_or_else(|| ((t.len() as f32 * window.start_frac) as usize).min(last));

    let mut end = t.iter().position(|&v| v >= window.end_sec).unwrap_or(last);
    if end <= start {
        end = last;
    }

    Some((start, end.max(start)))
}

/// Mean, coefficient of variation, and stability over the late window.
///
/// An empty or missing window yields `{mean: 0, cv: 1, stable: false}` — the
/// conservative "nothing sustained" answer.
pub fn late_time_stats(env: &[f32], t: &[f32], window: &LateWindow) -> LateStats {
    let silent = LateStats {
        mean: 0.0,
        cv: 1.0,
        stable: false,
    };

    let Some((start, end)) = late_window_indices(t, window) else {
        return silent;
    };
    if start >= env.len() {
        return silent;
    }
    let slice = &env[start..=end.min(env.len() - 1)];
    if slice.is_empty() {
        return silent;
    }

    let m = mean(slice);
    let cv = if m > NORM_FLOOR {
        variance_with_mean(slice, m).sqrt() / m
    } else {
        1.0
    };

    LateStats {
        mean: m,
        cv,
        stable: m >= STABLE_MEAN_MIN && cv <= STABLE_CV_MAX,
    }
}

/// Log-linear decay slope over the late window, in ln-units per second.
///
/// Returns `None` when the window is empty, inverted, or the regression is
/// degenerate.
pub fn late_time_slope(env: &[f32], t: &[f32], window: &LateWindow) -> Option<f32> {
    let (start, end) = late_window_indices(t, window)?;
    if start >= env.len() {
        return None;
    }
    let end = end.min(env.len() - 1);
    if end < start {
        return None;
    }

    let log_env: Vec<f32> = env[start..=end]
        .iter()
        .map(|&v| v.max(LOG_FLOOR).ln())
        .collect();
    linear_regression(&t[start..=end], &log_env).map(|r| r.slope)
}

/// Pre-conditioning parameters for the decay fit.
#[derive(Debug, Clone, Copy)]
pub struct FitPrep {
    /// Attack region skipped before fitting, in milliseconds.
    pub attack_skip_ms: f32,
    /// Maximum analysis duration, in milliseconds.
    pub max_duration_ms: f32,
}

impl Default for FitPrep {
    fn default() -> Self {
        Self {
            attack_skip_ms: 100.0,
            max_duration_ms: 2000.0,
        }
    }
}

/// Skips the attack, truncates to the analysis duration, then trims the tail
/// at the last sample still above 5 % of the slice's peak (keeping at least
/// 16 samples).
pub fn prepare_envelope_for_fit(env: &[f32], dt: f32, prep: &FitPrep) -> Vec<f32> {
    if env.is_empty() || dt <= 0.0 {
        return Vec::new();
    }

    let skip = ((prep.attack_skip_ms / 1000.0 / dt).round() as usize).min(env.len());
    let max_len = ((prep.max_duration_ms / 1000.0 / dt).round() as usize).max(1);
    let slice = &env[skip..(skip + max_len).min(env.len())];
    if slice.is_empty() {
        return Vec::new();
    }

    trim_tail(slice)
}

/// Cuts a slice after the last sample whose magnitude exceeds 5 % of the
/// slice peak, keeping at least [`MIN_FIT_LEN`] samples.
pub(crate) fn trim_tail(slice: &[f32]) -> Vec<f32> {
    let peak = slice.iter().map(|v| v.abs()).fold(0.0f32, f32::max);
    let threshold = peak * TAIL_KEEP_RATIO;

    let last_live = slice
        .iter()
        .rposition(|&v| v.abs() > threshold)
        .map_or(0, |i| i + 1);
    let keep = last_live.max(MIN_FIT_LEN).min(slice.len());
    slice[..keep].to_vec()
}
