//! Aullido DSP - signal and statistics primitives for decay analysis
//!
//! This crate provides the numeric building blocks used by the wolf-tone
//! analysis engine:
//!
//! - [`biquad`] - Second-order IIR low-pass filter (RBJ cookbook coefficients)
//! - [`demod`] - Quadrature demodulation for per-partial amplitude envelopes
//! - [`stats`] - Mean, variance, mean-square, and least-squares regression
//!
//! Everything here is a pure function (or a small stateful filter struct)
//! over in-memory sample buffers. There is no audio I/O, no allocation
//! strategy beyond `Vec`, and no shared state between calls.
//!
//! # Example
//!
//! ```rust
//! use aullido_dsp::demod::demodulate_partial;
//!
//! // Isolate the amplitude envelope of a 196 Hz partial.
//! let sample_rate = 8000.0;
//! let wave: Vec<f32> = (0..8000)
//!     .map(|i| {
//!         let t = i as f32 / sample_rate;
//!         (-2.0 * t).exp() * (2.0 * std::f32::consts::PI * 196.0 * t).sin()
//!     })
//!     .collect();
//! let env = demodulate_partial(&wave, sample_rate, 196.0, 20.0, 12.0);
//! assert_eq!(env.len(), wave.len());
//! ```

pub mod biquad;
pub mod demod;
pub mod stats;

pub use biquad::{Biquad, BiquadCoefficients, filter_samples, lowpass_coefficients};
pub use demod::demodulate_partial;
pub use stats::{Regression, linear_regression, mean, mean_square, variance, variance_with_mean};
