//! # SIS Multitone
//!
//! Harmonic-balance simulation of superconductor-insulator-superconductor
//! (SIS) tunnel-junction mixers.
//!
//! This library provides:
//! - Integer-order Bessel functions for photon-assisted tunnelling
//! - Composite sideband spectra for tones with any number of harmonics
//! - Quasiparticle mixer currents from Tucker theory
//! - A Newton-Raphson harmonic-balance solver for the junction voltages
//!
//! ## Architecture
//!
//! The library is organized into several modules:
//!
//! - [`spectrum`] - Bessel coefficients, spectrum convolution and mixer current
//! - [`response`] - Junction I-V curves and their Kramers-Kronig transforms
//! - [`solver`] - Harmonic-balance driver and Newton iteration
//! - [`constants`] - Physical constants and frequency normalisation
//! - `config` - TOML job files (CLI only)
//!
//! ## Usage
//!
//! ### Native CLI
//!
//! ```bash
//! RUST_LOG=debug multitone job.toml --tolerance 1e-8
//! ```
//!
//! ### Library
//!
//! ```no_run
//! use sis_multitone::{BalanceConfig, Complex64, HarmonicBalance, TabulatedResponse, Tone};
//!
//! let response = TabulatedResponse::kennedy(15, 2.0, 201)?;
//! let mut balance = HarmonicBalance::new(response, 0.8, BalanceConfig::default());
//!
//! let mut tone = Tone::new(0.3, 1.0, Complex64::new(0.5, 0.0), Complex64::new(0.3, 0.1));
//! tone.add_harmonic(Complex64::new(0.0, 0.0), Complex64::new(0.2, 0.0));
//! balance.add_tone(tone);
//! balance.solve_embedded()?;
//!
//! let report = balance.run()?;
//! println!("converged after {} iterations", report.iterations);
//! # Ok::<(), sis_multitone::MultitoneError>(())
//! ```
//!
//! ## Simulation Method
//!
//! All voltages are normalised to the gap voltage and all angular
//! frequencies to the gap frequency. For each Newton iteration:
//!
//! 1. Each harmonic's Bessel coefficients are recomputed if its voltage changed
//! 2. The harmonics are convolved into the tone's composite spectrum, growing
//!    or shrinking the truncation order until the spectrum is unitary
//! 3. The mixer current at each unknown harmonic is evaluated from the spectrum
//! 4. The embedding-circuit residual and its finite-difference Jacobian give
//!    the next voltage estimate

pub mod constants;
pub mod error;
pub mod response;
pub mod solver;
pub mod spectrum;

#[cfg(feature = "cli")]
pub mod config;

// Re-export main types for convenience
pub use error::{MultitoneError, Result};
pub use num_complex::Complex64;
pub use response::{OhmicResponse, ResponseFunction, TabulatedResponse};
pub use solver::{BalanceConfig, BalanceReport, HarmonicBalance};
pub use spectrum::{PhaseReference, Tone};
