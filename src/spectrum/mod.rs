//! Spectral-coefficient engine.
//!
//! A pumped SIS junction sees each harmonic of the local oscillator as a
//! phase modulation of the quasiparticle tunnelling. This module computes:
//!
//! - [`jnx`] - integer-order Bessel functions by downward recurrence
//! - [`Harmonic`] - per-harmonic Bessel coefficients `Anp`, memoised
//! - [`Tone`] - the composite sideband spectrum `Ck` of all harmonics,
//!   with an adaptive truncation order
//! - [`mixer_current`] - the Tucker mixer current at any harmonic

mod bessel;
mod current;
mod harmonic;
mod tone;

pub use bessel::{jnx, MAX_BESSEL_ORDER};
pub use current::mixer_current;
pub use harmonic::{Harmonic, HarmonicParams, PhaseReference};
pub use tone::{SpectrumTable, Tone, DEFAULT_TARGET_DELTA_CK, MAX_TOTAL_J, MIN_TOTAL_J};
