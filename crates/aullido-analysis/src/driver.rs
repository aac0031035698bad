//! Partial→body-mode driver mapping.
//!
//! For each string partial, every known body mode is scored as a coupling
//! candidate (pitch distance in cents, band overlap, late-window energy
//! behavior). The best strong and stable candidate becomes the partial's
//! *driver*; the entry then classifies the coupling as normal, a
//! directional energy sink, or a wolf instability, with a confidence level.
//!
//! All selection rules are deterministic: candidates are considered in the
//! caller-supplied mode order and ties break on explicit keys.

use crate::envelope::{LateWindow, late_time_slope, late_time_stats};
use crate::modes::{band_overlap_ratio, mode_band_width, partial_band_width};
use crate::types::{
    Candidate, Confidence, CouplingState, CouplingTier, DriverEntry, EnergySeries, EnergyTrack,
    LateStats, Mode, ModeSource, Partial, SinkFlavor,
};
use crate::wobble::compute_partial_instability_map;

/// Band-overlap ratio above which partial and mode share a band.
const SHARED_BAND_OVERLAP: f32 = 0.45;

/// Minimum late-slope difference for the mode to decay independently of
/// the partial.
const SLOPE_INDEPENDENT_DELTA: f32 = 0.15;

/// Directional-sink thresholds: the partial must decay at least this much
/// faster than the body mode, and the body mode itself must still decay.
const SINK_SLOPE_GAP: f32 = 0.15;
const SINK_BODY_SLOPE_MAX: f32 = -0.08;

/// Dominance is only meaningful after the attack transient.
const DOMINANCE_MIN_TIME_SEC: f32 = 0.1;

/// Builds the full per-partial driver mapping.
///
/// Computes each partial's instability flag from its energy-share series,
/// then scores and classifies every (partial, mode) pairing. Entries come
/// back in `partials` order.
pub fn analyze_partial_drivers(
    partials: &[Partial],
    modes: &[Mode],
    series: &EnergySeries,
) -> Vec<DriverEntry> {
    let instability = compute_partial_instability_map(series);

    partials
        .iter()
        .map(|partial| {
            let unstable = instability.get(&partial.key).copied().unwrap_or(false);
            analyze_partial(partial, modes, series, unstable)
        })
        .collect()
}

/// Scores one partial against every mode and derives its driver entry.
pub fn analyze_partial(
    partial: &Partial,
    modes: &[Mode],
    series: &EnergySeries,
    instability: bool,
) -> DriverEntry {
    let window = LateWindow::default();
    let partial_track = series.partials.get(&partial.key);
    let partial_slope = partial_track
        .and_then(|track| late_time_slope(&track.share, &series.t, &window));

    let mut candidates: Vec<Candidate> = Vec::with_capacity(modes.len());
    for mode in modes {
        if let Some(candidate) = build_candidate(partial, mode, series, partial_slope, &window) {
            candidates.push(candidate);
        }
    }

    let nearest = candidates
        .iter()
        .min_by(|a, b| a.cents_abs.total_cmp(&b.cents_abs))
        .cloned();

    let driver = select_driver(&candidates);

    let shared_band = driver
        .as_ref()
        .is_some_and(|d| d.overlap > SHARED_BAND_OVERLAP);

    let body_slope = driver.as_ref().and_then(|d| {
        series
            .modes
            .get(&d.mode.id)
            .and_then(|track| late_time_slope(&track.share, &series.t, &window))
    });

    let dominance_time = driver.as_ref().and_then(|d| {
        if shared_band || !d.slope_independent {
            return None;
        }
        let body = series.modes.get(&d.mode.id)?;
        let own = partial_track?;
        first_dominance_time(&series.t, &body.share, &own.share)
    });

    let exchange_depth_db = driver.as_ref().and_then(|d| {
        let body = series.modes.get(&d.mode.id)?;
        let own = partial_track?;
        exchange_depth(body, own)
    });

    let sink = driver.is_some()
        && matches!(
            (partial_slope, body_slope),
            (Some(ps), Some(bs)) if ps < bs - SINK_SLOPE_GAP && bs <= SINK_BODY_SLOPE_MAX
        );

    let state = if driver.is_none() {
        CouplingState::Normal
    } else if instability {
        CouplingState::Wolf
    } else if sink {
        CouplingState::Sink
    } else {
        CouplingState::Normal
    };

    let sink_flavor = (state == CouplingState::Sink).then(|| {
        if shared_band {
            SinkFlavor::SharedBand
        } else {
            SinkFlavor::Clean
        }
    });

    let confidence = classify_confidence(driver.as_ref().or(nearest.as_ref()));

    DriverEntry {
        partial: partial.clone(),
        driver,
        nearest,
        confidence,
        dominance_time,
        exchange_depth_db,
        shared_band,
        instability,
        state,
        sink_flavor,
        body_slope,
        partial_slope,
    }
}

/// Scores one (partial, mode) pairing. Modes without a located peak
/// frequency cannot be scored and yield `None`.
fn build_candidate(
    partial: &Partial,
    mode: &Mode,
    series: &EnergySeries,
    partial_slope: Option<f32>,
    window: &LateWindow,
) -> Option<Candidate> {
    let mode_freq = mode.peak_freq?;
    if mode_freq <= 0.0 || partial.freq <= 0.0 {
        return None;
    }

    let cents = 1200.0 * (mode_freq / partial.freq).log2();
    let cents_abs = cents.abs();

    let overlap = band_overlap_ratio(
        partial.freq,
        partial_band_width(partial.key, partial.freq),
        mode_freq,
        mode_band_width(mode_freq),
    );

    let mode_track = series.modes.get(&mode.id);
    let late = mode_track.map_or(
        LateStats {
            mean: 0.0,
            cv: 1.0,
            stable: false,
        },
        |track| late_time_stats(&track.share, &series.t, window),
    );

    let mode_slope = mode_track.and_then(|track| late_time_slope(&track.share, &series.t, window));
    let slope_independent = matches!(
        (mode_slope, partial_slope),
        (Some(ms), Some(ps)) if (ms - ps).abs() >= SLOPE_INDEPENDENT_DELTA
    );

    Some(Candidate {
        mode: mode.clone(),
        cents,
        cents_abs,
        tier: CouplingTier::from_cents(cents_abs),
        overlap,
        late,
        slope_independent,
    })
}

/// Picks the driving candidate: strong tier and stable late window, closest
/// in cents; ties break on larger late mean, then larger mode Q (absent Q
/// counts as 0).
fn select_driver(candidates: &[Candidate]) -> Option<Candidate> {
    let mut best: Option<&Candidate> = None;

    for candidate in candidates {
        if candidate.tier != CouplingTier::Strong || !candidate.late.stable {
            continue;
        }
        match best {
            None => best = Some(candidate),
            Some(current) => {
                if driver_beats(candidate, current) {
                    best = Some(candidate);
                }
            }
        }
    }

    best.cloned()
}

fn driver_beats(challenger: &Candidate, incumbent: &Candidate) -> bool {
    if challenger.cents_abs != incumbent.cents_abs {
        return challenger.cents_abs < incumbent.cents_abs;
    }
    if challenger.late.mean != incumbent.late.mean {
        return challenger.late.mean > incumbent.late.mean;
    }
    challenger.mode.q.unwrap_or(0.0) > incumbent.mode.q.unwrap_or(0.0)
}

/// First time the body mode's energy share exceeds the partial's own,
/// past the attack transient.
fn first_dominance_time(t: &[f32], body_share: &[f32], partial_share: &[f32]) -> Option<f32> {
    let n = t.len().min(body_share.len()).min(partial_share.len());
    (0..n)
        .find(|&i| t[i] > DOMINANCE_MIN_TIME_SEC && body_share[i] > partial_share[i])
        .map(|i| t[i])
}

/// How much energy moved into the body, as a dB ratio of raw peaks.
/// Clamped at 0 dB: the body never "gives back" more than the partial had.
fn exchange_depth(body: &EnergyTrack, partial: &EnergyTrack) -> Option<f32> {
    let max_body = body.raw.iter().copied().fold(0.0f32, f32::max);
    let max_partial = partial.raw.iter().copied().fold(0.0f32, f32::max);
    if max_body <= 0.0 || max_partial <= 0.0 {
        return None;
    }
    Some((20.0 * (max_body / max_partial).log10()).max(0.0))
}

/// Confidence ladder over the driver (or, failing that, the nearest)
/// candidate. Inferred modes are demoted one step: their frequency was
/// never measured on this instrument.
fn classify_confidence(basis: Option<&Candidate>) -> Confidence {
    let Some(candidate) = basis else {
        return Confidence::Low;
    };

    let strong_stable = candidate.tier == CouplingTier::Strong && candidate.late.stable;
    let clean_band = candidate.overlap <= SHARED_BAND_OVERLAP;

    let confidence = if strong_stable && clean_band {
        Confidence::High
    } else if strong_stable
        || (candidate.tier == CouplingTier::Possible && candidate.late.stable && clean_band)
    {
        Confidence::Medium
    } else {
        Confidence::Low
    };

    if candidate.mode.source == ModeSource::Inferred {
        confidence.demoted()
    } else {
        confidence
    }
}

/// Selects the overall primary driver across all partials: best confidence
/// first, then smallest cents distance, then larger late mean, then larger
/// mode Q.
pub fn pick_primary_driver(entries: &[DriverEntry]) -> Option<&DriverEntry> {
    let mut best: Option<(&DriverEntry, &Candidate)> = None;

    for entry in entries {
        let Some(driver) = entry.driver.as_ref() else {
            continue;
        };
        let replace = match best {
            None => true,
            Some((best_entry, best_driver)) => {
                if entry.confidence != best_entry.confidence {
                    entry.confidence > best_entry.confidence
                } else {
                    driver_beats(driver, best_driver)
                }
            }
        };
        if replace {
            best = Some((entry, driver));
        }
    }

    best.map(|(entry, _)| entry)
}

/// Fallback pick when no partial has a driver: the closest non-`none`-tier
/// nearest candidate across all entries.
pub fn pick_nearest_candidate(entries: &[DriverEntry]) -> Option<(&DriverEntry, &Candidate)> {
    entries
        .iter()
        .filter_map(|entry| {
            entry
                .nearest
                .as_ref()
                .filter(|c| c.tier != CouplingTier::None)
                .map(|c| (entry, c))
        })
        .min_by(|(_, a), (_, b)| a.cents_abs.total_cmp(&b.cents_abs))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::PartialKey;

    fn mode(id: &str, freq: f32, q: Option<f32>, source: ModeSource) -> Mode {
        Mode {
            id: id.to_string(),
            peak_freq: Some(freq),
            q,
            source,
        }
    }

    fn stable_candidate(id: &str, cents_abs: f32, late_mean: f32, q: Option<f32>) -> Candidate {
        Candidate {
            mode: mode(id, 200.0, q, ModeSource::Detected),
            cents: cents_abs,
            cents_abs,
            tier: CouplingTier::from_cents(cents_abs),
            overlap: 0.2,
            late: LateStats {
                mean: late_mean,
                cv: 0.2,
                stable: true,
            },
            slope_independent: true,
        }
    }

    /// Energy series where one mode's share rises while the partial's
    /// falls, with a shared uniform time axis.
    fn crossing_series(n: usize, dt: f32, mode_id: &str) -> EnergySeries {
        let t: Vec<f32> = (0..n).map(|i| i as f32 * dt).collect();

        // Partial share decays from 0.9; mode share grows toward 0.8.
        let partial_share: Vec<f32> = t.iter().map(|&ti| 0.9 * (-3.0 * ti).exp()).collect();
        let mode_share: Vec<f32> = t.iter().map(|&ti| 0.8 * (1.0 - (-3.0 * ti).exp())).collect();
        let partial_raw: Vec<f32> = partial_share.iter().map(|&v| v * 0.01).collect();
        let mode_raw: Vec<f32> = mode_share.iter().map(|&v| v * 0.02).collect();

        let mut series = EnergySeries {
            t,
            ..EnergySeries::default()
        };
        series.partials.insert(
            PartialKey::Fundamental,
            EnergyTrack {
                raw: partial_raw,
                normalized: Vec::new(),
                share: partial_share,
            },
        );
        series.modes.insert(
            mode_id.to_string(),
            EnergyTrack {
                raw: mode_raw,
                normalized: Vec::new(),
                share: mode_share,
            },
        );
        series
    }

    #[test]
    fn test_driver_requires_strong_and_stable() {
        let weak = Candidate {
            late: LateStats {
                mean: 0.5,
                cv: 0.1,
                stable: false,
            },
            ..stable_candidate("top", 10.0, 0.5, None)
        };
        let possible = stable_candidate("back", 40.0, 0.5, None);
        assert!(select_driver(&[weak, possible]).is_none());
    }

    #[test]
    fn test_driver_picks_smallest_cents() {
        let far = stable_candidate("top", 20.0, 0.5, None);
        let near = stable_candidate("air", 5.0, 0.1, None);
        let driver = select_driver(&[far, near]).unwrap();
        assert_eq!(driver.mode.id, "air");
    }

    #[test]
    fn test_driver_tie_breaks_on_late_mean_then_q() {
        // Equal cents: larger late mean wins.
        let a = stable_candidate("top", 10.0, 0.3, Some(40.0));
        let b = stable_candidate("air", 10.0, 0.5, Some(20.0));
        let driver = select_driver(&[a.clone(), b.clone()]).unwrap();
        assert_eq!(driver.mode.id, "air");

        // Equal cents and means: larger Q wins; absent Q counts as 0.
        let c = stable_candidate("top", 10.0, 0.5, None);
        let d = stable_candidate("air", 10.0, 0.5, Some(15.0));
        let driver = select_driver(&[c, d]).unwrap();
        assert_eq!(driver.mode.id, "air");
    }

    #[test]
    fn test_confidence_ladder() {
        // strong + stable + clean band → High
        let high = stable_candidate("top", 10.0, 0.5, None);
        assert_eq!(classify_confidence(Some(&high)), Confidence::High);

        // strong + stable + shared band → Medium
        let shared = Candidate {
            overlap: 0.6,
            ..stable_candidate("top", 10.0, 0.5, None)
        };
        assert_eq!(classify_confidence(Some(&shared)), Confidence::Medium);

        // possible + stable + clean band → Medium
        let possible = stable_candidate("top", 40.0, 0.5, None);
        assert_eq!(classify_confidence(Some(&possible)), Confidence::Medium);

        // possible + stable + shared band → Low
        let possible_shared = Candidate {
            overlap: 0.6,
            ..stable_candidate("top", 40.0, 0.5, None)
        };
        assert_eq!(classify_confidence(Some(&possible_shared)), Confidence::Low);

        // No candidate at all → Low
        assert_eq!(classify_confidence(None), Confidence::Low);
    }

    #[test]
    fn test_confidence_demoted_for_inferred_mode() {
        let mut high = stable_candidate("top", 10.0, 0.5, None);
        high.mode.source = ModeSource::Inferred;
        assert_eq!(classify_confidence(Some(&high)), Confidence::Medium);

        let mut possible = stable_candidate("top", 40.0, 0.5, None);
        possible.mode.source = ModeSource::Inferred;
        assert_eq!(classify_confidence(Some(&possible)), Confidence::Low);
    }

    #[test]
    fn test_analyze_partial_finds_driver() {
        let dt = 0.002;
        let series = crossing_series(1000, dt, "top");

        // Mode 5 cents above a 196 Hz fundamental.
        let modes = [mode("top", 196.0 * (5.0f32 / 1200.0).exp2(), Some(35.0), ModeSource::Detected)];
        let partial = Partial {
            key: PartialKey::Fundamental,
            label: "fundamental".to_string(),
            freq: 196.0,
        };

        let entry = analyze_partial(&partial, &modes, &series, false);
        let driver = entry.driver.as_ref().expect("driver should be selected");
        assert_eq!(driver.mode.id, "top");
        assert_eq!(driver.tier, CouplingTier::Strong);
        assert!(driver.late.stable, "grown mode share should be stable late");

        // At 5 cents the partial and mode bands are nearly congruent:
        // shared band, so no dominance time and a Medium (not High) verdict.
        assert!(entry.shared_band);
        assert!(entry.dominance_time.is_none());
        assert_eq!(entry.confidence, Confidence::Medium);

        // Exchange depth still applies: mode raw peaks ≈ 1.77× the partial
        // raw peak ⇒ ≈ +5 dB.
        let depth = entry.exchange_depth_db.expect("exchange depth expected");
        assert!((depth - 5.0).abs() < 1.0, "exchange depth {depth}");
    }

    #[test]
    fn test_first_dominance_time_respects_gate() {
        let dt = 0.01;
        let t: Vec<f32> = (0..100).map(|i| i as f32 * dt).collect();
        // Body exceeds the partial from the very start, but the crossing
        // only counts past the 0.1 s attack gate.
        let body = vec![0.6f32; 100];
        let partial = vec![0.4f32; 100];
        let dom = first_dominance_time(&t, &body, &partial).unwrap();
        assert!(dom > DOMINANCE_MIN_TIME_SEC);
        assert!((dom - 0.11).abs() < 1e-6, "dominance at {dom}");

        // Never-crossing shares yield no dominance time.
        assert!(first_dominance_time(&t, &partial, &body).is_none());
    }

    #[test]
    fn test_analyze_partial_without_matching_mode() {
        let dt = 0.002;
        let series = crossing_series(1000, dt, "top");
        // Mode far away in pitch: tier none, no driver.
        let modes = [mode("top", 400.0, None, ModeSource::Detected)];
        let partial = Partial {
            key: PartialKey::Fundamental,
            label: "fundamental".to_string(),
            freq: 196.0,
        };

        let entry = analyze_partial(&partial, &modes, &series, false);
        assert!(entry.driver.is_none());
        assert_eq!(entry.state, CouplingState::Normal);
        assert_eq!(entry.confidence, Confidence::Low);
        let nearest = entry.nearest.expect("nearest is tracked regardless of tier");
        assert_eq!(nearest.tier, CouplingTier::None);
    }

    #[test]
    fn test_wolf_state_requires_driver() {
        let dt = 0.002;
        let series = crossing_series(1000, dt, "top");
        let partial = Partial {
            key: PartialKey::Fundamental,
            label: "fundamental".to_string(),
            freq: 196.0,
        };

        // Instability flag set, but no scorable mode: state stays Normal.
        let no_modes: [Mode; 0] = [];
        let entry = analyze_partial(&partial, &no_modes, &series, true);
        assert_eq!(entry.state, CouplingState::Normal);
        assert!(entry.instability);

        // With a driver present the same flag yields Wolf.
        let modes = [mode("top", 196.5, Some(30.0), ModeSource::Detected)];
        let entry = analyze_partial(&partial, &modes, &series, true);
        assert!(entry.driver.is_some());
        assert_eq!(entry.state, CouplingState::Wolf);
    }

    #[test]
    fn test_mode_without_peak_freq_is_skipped() {
        let dt = 0.002;
        let series = crossing_series(1000, dt, "top");
        let modes = [Mode {
            id: "top".to_string(),
            peak_freq: None,
            q: None,
            source: ModeSource::Detected,
        }];
        let partial = Partial {
            key: PartialKey::Fundamental,
            label: "fundamental".to_string(),
            freq: 196.0,
        };

        let entry = analyze_partial(&partial, &modes, &series, false);
        assert!(entry.driver.is_none());
        assert!(entry.nearest.is_none());
    }

    #[test]
    fn test_pick_primary_driver_prefers_confidence_then_cents() {
        let dt = 0.002;
        let series = crossing_series(1000, dt, "top");

        let make_entry = |key: PartialKey, freq: f32, mode_cents: f32, source: ModeSource| {
            let mode_freq = freq * (mode_cents / 1200.0).exp2();
            let modes = [mode("top", mode_freq, Some(30.0), source)];
            let partial = Partial {
                key,
                label: key.label().to_string(),
                freq,
            };
            // All partials read the fundamental's track here; only the
            // selection keys differ between entries.
            let mut s = series.clone();
            let track = s.partials[&PartialKey::Fundamental].clone();
            s.partials.insert(key, track);
            analyze_partial(&partial, &modes, &s, false)
        };

        // Shared-band strong drivers sit at Medium; the Inferred one is
        // demoted to Low. Confidence outranks the smaller cents distance.
        let detected = make_entry(PartialKey::Fundamental, 196.0, 10.0, ModeSource::Detected);
        let inferred = make_entry(PartialKey::Second, 392.0, 2.0, ModeSource::Inferred);
        assert_eq!(detected.confidence, Confidence::Medium);
        assert_eq!(inferred.confidence, Confidence::Low);

        let entries = vec![inferred, detected];
        let primary = pick_primary_driver(&entries).expect("primary driver expected");
        assert_eq!(primary.partial.key, PartialKey::Fundamental);

        // With equal confidence, smaller cents wins.
        let near = make_entry(PartialKey::Fundamental, 196.0, 3.0, ModeSource::Detected);
        let far = make_entry(PartialKey::Second, 392.0, 12.0, ModeSource::Detected);
        let entries = vec![far, near];
        let primary = pick_primary_driver(&entries).expect("primary driver expected");
        assert_eq!(primary.partial.key, PartialKey::Fundamental);
    }

    #[test]
    fn test_pick_nearest_candidate_excludes_none_tier() {
        let dt = 0.002;
        let series = crossing_series(1000, dt, "top");
        let partial = Partial {
            key: PartialKey::Fundamental,
            label: "fundamental".to_string(),
            freq: 196.0,
        };

        // 400 Hz mode against 196 Hz partial: > 50 cents away, tier none.
        let far = [mode("top", 400.0, None, ModeSource::Detected)];
        let entries = vec![analyze_partial(&partial, &far, &series, false)];
        assert!(pick_nearest_candidate(&entries).is_none());

        // 40-cents-away mode: possible tier, eligible as nearest fallback.
        let near_freq = 196.0 * (40.0f32 / 1200.0).exp2();
        let near = [mode("top", near_freq, None, ModeSource::Detected)];
        let entries = vec![analyze_partial(&partial, &near, &series, false)];
        let (_, candidate) = pick_nearest_candidate(&entries).expect("fallback expected");
        assert_eq!(candidate.tier, CouplingTier::Possible);
    }
}
