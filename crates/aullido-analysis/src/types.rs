//! Data model for wolf-tone analysis.
//!
//! Everything here is computed fresh per analysis call from caller-supplied
//! inputs; no type carries persistent state. Modes are identified by free-form
//! string ids (`"air"`, `"top"`, `"back"`, `"custom-…"`) so user-defined
//! resonances fit the same pipeline as detected ones.

use std::collections::{BTreeMap, HashMap};

/// Where a body-mode entry came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModeSource {
    /// Found by spectral peak detection.
    Detected,
    /// Filled in from typical-instrument priors; demotes coupling confidence.
    Inferred,
    /// Entered or overridden by the user.
    Manual,
}

/// One body resonance of the instrument (top plate, back plate, air cavity…).
///
/// Read-only to the analysis engine; detection or user overrides happen
/// upstream.
#[derive(Debug, Clone)]
pub struct Mode {
    pub id: String,
    /// Resonance center in Hz; absent when the mode was never located.
    pub peak_freq: Option<f32>,
    /// Quality factor from the −3 dB bandwidth; absent when not measurable.
    pub q: Option<f32>,
    pub source: ModeSource,
}

/// Which partial of the note a series or candidate refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum PartialKey {
    Fundamental,
    Second,
    Third,
}

impl PartialKey {
    /// Harmonic index `n` with `freq = f0 · n`.
    pub fn harmonic_number(self) -> u32 {
        match self {
            PartialKey::Fundamental => 1,
            PartialKey::Second => 2,
            PartialKey::Third => 3,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            PartialKey::Fundamental => "fundamental",
            PartialKey::Second => "2nd harmonic",
            PartialKey::Third => "3rd harmonic",
        }
    }
}

/// The fundamental or an integer harmonic of the analyzed note.
#[derive(Debug, Clone)]
pub struct Partial {
    pub key: PartialKey,
    pub label: String,
    /// Frequency in Hz; `f0 · harmonic_number`.
    pub freq: f32,
}

impl Partial {
    /// Builds the standard fundamental / 2nd / 3rd partial set from an
    /// estimated fundamental frequency.
    pub fn harmonics_of(f0: f32) -> Vec<Partial> {
        [PartialKey::Fundamental, PartialKey::Second, PartialKey::Third]
            .into_iter()
            .map(|key| Partial {
                key,
                label: key.label().to_string(),
                freq: f0 * key.harmonic_number() as f32,
            })
            .collect()
    }
}

/// Wolf-risk category derived from the fitted wolf score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum WolfCategory {
    None,
    Mild,
    Moderate,
    Strong,
    Severe,
}

impl WolfCategory {
    /// Maps a wolf score in [0, 1] onto its category.
    ///
    /// Boundaries are inclusive upward: a score of exactly 0.10 is `Mild`,
    /// 0.25 is `Moderate`, 0.45 is `Strong`, 0.70 is `Severe`.
    pub fn from_score(score: f32) -> Self {
        if score < 0.10 {
            WolfCategory::None
        } else if score < 0.25 {
            WolfCategory::Mild
        } else if score < 0.45 {
            WolfCategory::Moderate
        } else if score < 0.70 {
            WolfCategory::Strong
        } else {
            WolfCategory::Severe
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            WolfCategory::None => "none",
            WolfCategory::Mild => "mild",
            WolfCategory::Moderate => "moderate",
            WolfCategory::Strong => "strong",
            WolfCategory::Severe => "severe",
        }
    }
}

/// Result of the two-mode decay/beat fit over one envelope.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TwoModeFitResult {
    /// Estimated beat frequency between the coupled modes, in Hz.
    pub delta_f: f32,
    /// Fitted beat (amplitude-wobble) depth, ≥ 0.
    pub wobble_depth: f32,
    /// Exponential decay rate in 1/s, clamped ≥ 0.
    pub alpha: f32,
    /// Goodness of the reconstructed envelope fit, in [0, 1].
    pub r2: f32,
    /// Mean-square residual between normalized original and fitted curves.
    pub residual_var: f32,
    /// Bounded wolf-risk score in [0, 1].
    pub wolf_score: f32,
    pub category: WolfCategory,
}

/// Categorical pitch-proximity bucket between a partial and a mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CouplingTier {
    None,
    Possible,
    Strong,
}

impl CouplingTier {
    /// Strong within 25 cents, possible within 50, none beyond.
    pub fn from_cents(cents_abs: f32) -> Self {
        if cents_abs <= 25.0 {
            CouplingTier::Strong
        } else if cents_abs <= 50.0 {
            CouplingTier::Possible
        } else {
            CouplingTier::None
        }
    }
}

/// Late-time-window statistics of an energy-share series.
#[derive(Debug, Clone, Copy)]
pub struct LateStats {
    pub mean: f32,
    /// Coefficient of variation (σ/μ); 1 when the window is empty or silent.
    pub cv: f32,
    /// Sustained presence: mean ≥ 0.08 and cv ≤ 0.6.
    pub stable: bool,
}

/// A scored pairing of one partial with one body mode.
#[derive(Debug, Clone)]
pub struct Candidate {
    pub mode: Mode,
    /// Signed pitch distance mode − partial, in cents.
    pub cents: f32,
    pub cents_abs: f32,
    pub tier: CouplingTier,
    /// Band-overlap ratio between the partial and mode bands, in [0, 1].
    pub overlap: f32,
    /// Late-window stats of the mode's energy-share series.
    pub late: LateStats,
    /// Whether the mode's late decay slope differs from the partial's by
    /// at least 0.15 (absent slope data counts as dependent).
    pub slope_independent: bool,
}

/// Confidence of a coupling verdict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Confidence {
    Low,
    Medium,
    High,
}

impl Confidence {
    /// One step down the ladder; applied when the mode is only inferred.
    pub fn demoted(self) -> Self {
        match self {
            Confidence::High => Confidence::Medium,
            Confidence::Medium | Confidence::Low => Confidence::Low,
        }
    }
}

/// Behavioral classification of a partial/mode coupling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CouplingState {
    /// Stable coupling or no coupling at all.
    Normal,
    /// Directional energy sink: the partial drains into the body mode.
    Sink,
    /// Wolf instability: the partial's own decay is unstable.
    Wolf,
}

/// Refinement of the sink state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SinkFlavor {
    Clean,
    /// The partial and mode bands overlap enough that the energy split is
    /// partly a measurement artifact.
    SharedBand,
}

/// Per-partial driver-mapping result.
#[derive(Debug, Clone)]
pub struct DriverEntry {
    pub partial: Partial,
    /// Best strong, stable candidate; absent when none qualifies.
    pub driver: Option<Candidate>,
    /// Closest candidate by cents distance regardless of tier.
    pub nearest: Option<Candidate>,
    pub confidence: Confidence,
    /// First moment (s) the driving mode's energy share exceeds the
    /// partial's own, past 0.1 s; clean-band, slope-independent drivers only.
    pub dominance_time: Option<f32>,
    /// `20·log10(max body energy / max partial energy)`, clamped ≥ 0 dB.
    pub exchange_depth_db: Option<f32>,
    pub shared_band: bool,
    /// The partial's own decay-instability flag.
    pub instability: bool,
    pub state: CouplingState,
    /// Present only when `state == Sink`.
    pub sink_flavor: Option<SinkFlavor>,
    /// Late-window log-decay slope of the driving mode's share series.
    pub body_slope: Option<f32>,
    /// Late-window log-decay slope of the partial's share series.
    pub partial_slope: Option<f32>,
}

/// One partial's or mode's energy over time.
#[derive(Debug, Clone, Default)]
pub struct EnergyTrack {
    /// Raw demodulated energy envelope.
    pub raw: Vec<f32>,
    /// Level-scale normalized envelope (display scaling, caller-defined).
    pub normalized: Vec<f32>,
    /// This track's share of the total energy at each instant, in [0, 1].
    pub share: Vec<f32>,
}

/// Caller-assembled per-note energy bundle: a common time axis plus one
/// track per partial and per mode.
///
/// Mode iteration order is always taken from the caller's mode slice, never
/// from this map, so results are deterministic.
#[derive(Debug, Clone, Default)]
pub struct EnergySeries {
    /// Time axis in seconds, uniform step.
    pub t: Vec<f32>,
    pub partials: BTreeMap<PartialKey, EnergyTrack>,
    pub modes: HashMap<String, EnergyTrack>,
}
