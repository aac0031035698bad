//! Aullido Analysis - wolf-tone detection for plucked and struck strings
//!
//! A wolf tone is audible beating or unstable decay caused by a string
//! partial coupling to a resonant body mode. Given a recorded note's
//! amplitude envelope and a set of known body resonances, this crate:
//!
//! - fits a physically motivated two-mode decay model to estimate beat
//!   rate, beat depth, and fit quality ([`wobble`]);
//! - converts the fit into a bounded wolf-risk score and category
//!   ([`types::WolfCategory`]);
//! - determines, per string partial, which body mode (if any) is
//!   acoustically coupled to it, with a confidence level and behavioral
//!   classification ([`driver`]).
//!
//! Supporting modules: [`envelope`] (normalization, late-window statistics,
//! fit pre-conditioning) and [`modes`] (spectral peak refinement, −3 dB Q
//! estimation, band heuristics).
//!
//! Everything is a pure function over caller-supplied data: no audio I/O,
//! no FFT (spectra arrive precomputed), no persistent state. Calls are
//! independent and safely parallelizable by the caller.
//!
//! # Example
//!
//! ```rust
//! use aullido_analysis::wobble::fit_two_mode_decay;
//! use aullido_analysis::types::WolfCategory;
//!
//! // A 2 s decay with a pronounced 3 Hz beat — classic wolf behavior.
//! let dt = 1.0 / 2000.0;
//! let env: Vec<f32> = (0..4000)
//!     .map(|i| {
//!         let t = i as f32 * dt;
//!         (-2.0 * t).exp() * (1.0 + 0.3 * (2.0 * std::f32::consts::PI * 3.0 * t).cos())
//!     })
//!     .collect();
//!
//! let fit = fit_two_mode_decay(&env, dt).unwrap();
//! assert!(fit.category >= WolfCategory::Strong);
//! ```

pub mod driver;
pub mod envelope;
pub mod modes;
pub mod types;
pub mod wobble;

// Re-export main types
pub use driver::{analyze_partial, analyze_partial_drivers, pick_nearest_candidate, pick_primary_driver};
pub use envelope::{
    FitPrep, LateWindow, late_time_slope, late_time_stats, late_window_indices, normalize_envelope,
    prepare_envelope_for_fit,
};
pub use modes::{
    Band, BandPeak, DetectedPeak, RefinedPeak, band_overlap_ratio, detect_modes_in_bands,
    estimate_q_from_db, mode_band_width, partial_band_width, refine_parabolic_peak,
};
pub use types::{
    Candidate, Confidence, CouplingState, CouplingTier, DriverEntry, EnergySeries, EnergyTrack,
    LateStats, Mode, ModeSource, Partial, PartialKey, SinkFlavor, TwoModeFitResult, WolfCategory,
};
pub use wobble::{
    FitError, compute_partial_instability_map, fit_two_mode_decay, fit_two_mode_decay_with,
    is_unstable_decay,
};
