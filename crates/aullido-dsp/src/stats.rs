//! Statistics primitives: mean, population variance, mean-square, and
//! ordinary least-squares linear regression.
//!
//! The analysis engine regresses over envelopes thousands of samples long;
//! sums are accumulated in `f64` so partial-sum rounding does not leak into
//! slope estimates.

/// Variance of the regressor below which a fit is considered degenerate.
const MIN_X_VARIANCE: f64 = 1e-12;

/// Arithmetic mean. Empty input yields 0.
pub fn mean(samples: &[f32]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }
    let sum: f64 = samples.iter().map(|&x| f64::from(x)).sum();
    (sum / samples.len() as f64) as f32
}

/// Population variance about the sample mean. Empty input yields 0.
pub fn variance(samples: &[f32]) -> f32 {
    variance_with_mean(samples, mean(samples))
}

/// Population variance about a given mean. Empty input yields 0.
pub fn variance_with_mean(samples: &[f32], mean: f32) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }
    let m = f64::from(mean);
    let sum: f64 = samples
        .iter()
        .map(|&x| {
            let d = f64::from(x) - m;
            d * d
        })
        .sum();
    (sum / samples.len() as f64) as f32
}

/// Mean of the squared samples. Empty input yields 0.
pub fn mean_square(samples: &[f32]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }
    let sum: f64 = samples
        .iter()
        .map(|&x| {
            let v = f64::from(x);
            v * v
        })
        .sum();
    (sum / samples.len() as f64) as f32
}

/// Ordinary least-squares fit of `y = slope·x + intercept`.
#[derive(Debug, Clone, Copy)]
pub struct Regression {
    pub slope: f32,
    pub intercept: f32,
    /// Coefficient of determination, clamped to [0, 1].
    pub r2: f32,
}

/// Fits a line through `(x[i], y[i])` by ordinary least squares.
///
/// Returns `None` when the inputs are empty, of mismatched length, or when
/// the x-variance is numerically zero (no slope is identifiable).
pub fn linear_regression(x: &[f32], y: &[f32]) -> Option<Regression> {
    if x.is_empty() || x.len() != y.len() {
        return None;
    }

    let n = x.len() as f64;
    let mut sum_x = 0.0f64;
    let mut sum_y = 0.0f64;
    let mut sum_xx = 0.0f64;
    let mut sum_xy = 0.0f64;

    for (&xi, &yi) in x.iter().zip(y.iter()) {
        let xv = f64::from(xi);
        let yv = f64::from(yi);
        sum_x += xv;
        sum_y += yv;
        sum_xx += xv * xv;
        sum_xy += xv * yv;
    }

    let mean_x = sum_x / n;
    let mean_y = sum_y / n;
    let var_x = sum_xx / n - mean_x * mean_x;
    if var_x < MIN_X_VARIANCE {
        return None;
    }

    let cov_xy = sum_xy / n - mean_x * mean_y;
    let slope = cov_xy / var_x;
    let intercept = mean_y - slope * mean_x;

    // r² = 1 − SS_res / SS_tot
    let mut ss_res = 0.0f64;
    let mut ss_tot = 0.0f64;
    for (&xi, &yi) in x.iter().zip(y.iter()) {
        let yv = f64::from(yi);
        let fit = slope * f64::from(xi) + intercept;
        ss_res += (yv - fit) * (yv - fit);
        ss_tot += (yv - mean_y) * (yv - mean_y);
    }
    let r2 = if ss_tot > 0.0 {
        (1.0 - ss_res / ss_tot).clamp(0.0, 1.0)
    } else {
        // y is constant: the flat line fits it exactly.
        1.0
    };

    Some(Regression {
        slope: slope as f32,
        intercept: intercept as f32,
        r2: r2 as f32,
    })
}
