//! Spectral peak and body-mode analysis.
//!
//! Operates on an already-computed magnitude spectrum (`freqs` in Hz, `dbs`
//! in decibels); the FFT itself happens upstream. Provides per-band peak
//! detection with prominence scoring, parabolic peak refinement, −3 dB
//! bandwidth Q estimation, and the band-width/overlap heuristics used by the
//! driver mapping.

use crate::types::PartialKey;

/// Curvature denominator below which parabolic refinement is degenerate.
const MIN_CURVATURE: f32 = 1e-12;

/// Half-width of the neighborhood (in bins, each side) used for the
/// prominence median.
const PROMINENCE_HALF_SPAN: usize = 6;

/// A named frequency band to search for one body mode.
#[derive(Debug, Clone)]
pub struct Band {
    pub id: String,
    pub lo_hz: f32,
    pub hi_hz: f32,
}

impl Band {
    pub fn new(id: impl Into<String>, lo_hz: f32, hi_hz: f32) -> Self {
        Self {
            id: id.into(),
            lo_hz,
            hi_hz,
        }
    }
}

/// A sub-bin refined peak location.
#[derive(Debug, Clone, Copy)]
pub struct RefinedPeak {
    pub freq: f32,
    pub value: f32,
}

/// Three-point parabolic interpolation around a local maximum at `idx`.
///
/// The vertex offset is clamped to ±1 bin. Returns `None` at array edges or
/// when the curvature denominator is numerically zero (flat top).
pub fn refine_parabolic_peak(freqs: &[f32], values: &[f32], idx: usize) -> Option<RefinedPeak> {
    if idx == 0 || idx + 1 >= values.len() || idx + 1 >= freqs.len() {
        return None;
    }

    let y0 = values[idx - 1];
    let y1 = values[idx];
    let y2 = values[idx + 1];

    let denom = y0 - 2.0 * y1 + y2;
    if denom.abs() < MIN_CURVATURE {
        return None;
    }

    let delta = (0.5 * (y0 - y2) / denom).clamp(-1.0, 1.0);
    let bin_step = if delta >= 0.0 {
        freqs[idx + 1] - freqs[idx]
    } else {
        freqs[idx] - freqs[idx - 1]
    };

    Some(RefinedPeak {
        freq: freqs[idx] + delta * bin_step,
        value: y1 - 0.25 * (y0 - y2) * delta,
    })
}

/// One detected spectral peak inside a band.
#[derive(Debug, Clone, Copy)]
pub struct DetectedPeak {
    /// Parabolically refined peak frequency in Hz.
    pub peak_freq: f32,
    /// Refined peak magnitude in dB.
    pub peak_db: f32,
    /// Index of the underlying spectrum bin.
    pub peak_idx: usize,
    /// Height above the median of the surrounding 12 bins, in dB.
    pub prominence_db: f32,
}

/// Per-band detection result.
#[derive(Debug, Clone)]
pub struct BandPeak {
    pub band: String,
    /// Absent when the band contains no local maximum.
    pub peak: Option<DetectedPeak>,
}

/// Median of a 12-bin neighborhood around `idx`, excluding `idx` itself.
fn neighborhood_median(dbs: &[f32], idx: usize) -> f32 {
    let lo = idx.saturating_sub(PROMINENCE_HALF_SPAN);
    let hi = (idx + PROMINENCE_HALF_SPAN + 1).min(dbs.len());

    let mut neighborhood: Vec<f32> = (lo..hi).filter(|&j| j != idx).map(|j| dbs[j]).collect();
    if neighborhood.is_empty() {
        return dbs[idx];
    }
    neighborhood.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));

    let n = neighborhood.len();
    if n % 2 == 1 {
        neighborhood[n / 2]
    } else {
        (neighborhood[n / 2 - 1] + neighborhood[n / 2]) / 2.0
    }
}

/// Scans each band for its highest local maximum and refines it.
///
/// A bin counts as a local maximum when it strictly exceeds both neighbors.
/// Prominence is the height above the median of the surrounding 12 bins.
/// The returned vector is parallel to `bands`.
pub fn detect_modes_in_bands(freqs: &[f32], dbs: &[f32], bands: &[Band]) -> Vec<BandPeak> {
    let n = freqs.len().min(dbs.len());

    bands
        .iter()
        .map(|band| {
            let mut best: Option<usize> = None;

            for i in 1..n.saturating_sub(1) {
                if freqs[i] < band.lo_hz || freqs[i] > band.hi_hz {
                    continue;
                }
                if dbs[i] > dbs[i - 1] && dbs[i] > dbs[i + 1] {
                    let better = best.is_none_or(|b| dbs[i] > dbs[b]);
                    if better {
                        best = Some(i);
                    }
                }
            }

            let peak = best.map(|idx| {
                let prominence_db = dbs[idx] - neighborhood_median(dbs, idx);
                let refined = refine_parabolic_peak(freqs, dbs, idx);
                let (peak_freq, peak_db) = refined
                    .map_or((freqs[idx], dbs[idx]), |r| (r.freq, r.value));
                DetectedPeak {
                    peak_freq,
                    peak_db,
                    peak_idx: idx,
                    prominence_db,
                }
            });

            BandPeak {
                band: band.id.clone(),
                peak,
            }
        })
        .collect()
}

/// Estimates Q from the −3 dB bandwidth around a known peak.
///
/// Scans outward from the bin nearest `peak_freq` until the magnitude drops
/// below `peak_db − 3`, linearly interpolating both crossing frequencies.
/// Returns `None` when either crossing is missing or Q is non-positive.
pub fn estimate_q_from_db(freqs: &[f32], dbs: &[f32], peak_freq: f32, peak_db: f32) -> Option<f32> {
    let n = freqs.len().min(dbs.len());
    if n == 0 {
        return None;
    }

    let center = (0..n)
        .min_by(|&a, &b| {
            (freqs[a] - peak_freq)
                .abs()
                .partial_cmp(&(freqs[b] - peak_freq).abs())
                .unwrap_or(std::cmp::Ordering::Equal)
        })
        .unwrap_or(0);

    let target = peak_db - 3.0;

    // Lower crossing: walk left until we fall below the target.
    let mut f_lo = None;
    for j in (0..center).rev() {
        if dbs[j] < target {
            let t = (target - dbs[j]) / (dbs[j + 1] - dbs[j]);
            f_lo = Some(freqs[j] + t * (freqs[j + 1] - freqs[j]));
            break;
        }
    }

    // Upper crossing: walk right.
    let mut f_hi = None;
    for j in center + 1..n {
        if dbs[j] < target {
            let t = (target - dbs[j - 1]) / (dbs[j] - dbs[j - 1]);
            f_hi = Some(freqs[j - 1] + t * (freqs[j] - freqs[j - 1]));
            break;
        }
    }

    let (f_lo, f_hi) = (f_lo?, f_hi?);
    let bandwidth = f_hi - f_lo;
    if bandwidth <= 0.0 {
        return None;
    }

    let q = peak_freq / bandwidth;
    (q > 0.0).then_some(q)
}

/// Analysis bandwidth assigned to a body mode: 3 % of its frequency,
/// floored at 40 Hz.
pub fn mode_band_width(freq: f32) -> f32 {
    (0.03 * freq).max(40.0)
}

/// Analysis bandwidth assigned to a partial: 4 % of its frequency for the
/// 2nd and 3rd harmonics (wider tuning drift up the series), 3 % for the
/// fundamental, floored at 40 Hz.
pub fn partial_band_width(key: PartialKey, freq: f32) -> f32 {
    let ratio = match key {
        PartialKey::Fundamental => 0.03,
        PartialKey::Second | PartialKey::Third => 0.04,
    };
    (ratio * freq).max(40.0)
}

/// Overlap of two center/bandwidth intervals divided by the smaller
/// bandwidth, clamped to ≥ 0. 1.0 means the narrower band is fully inside
/// the wider one.
pub fn band_overlap_ratio(f1: f32, bw1: f32, f2: f32, bw2: f32) -> f32 {
    let lo = (f1 - bw1 / 2.0).max(f2 - bw2 / 2.0);
    let hi = (f1 + bw1 / 2.0).min(f2 + bw2 / 2.0);
    let overlap = (hi - lo).max(0.0);

    let smaller = bw1.min(bw2);
    if smaller <= 0.0 {
        return 0.0;
    }
    (overlap / smaller).max(0.0)
}
