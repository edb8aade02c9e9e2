//! Junction response functions.
//!
//! The mixer current needs two views of the junction's nonlinearity at any
//! bias voltage: the DC I-V curve `Idc(v)` and its Kramers-Kronig transform
//! `Ikk(v)`. Both are pure lookups once constructed.
//!
//! - [`OhmicResponse`] - a linear resistor, `Idc = g·v`, `Ikk = 0`
//! - [`TabulatedResponse`] - interpolated I-V data, either loaded from files
//!   or generated from a Kennedy polynomial fit, with the KK transform
//!   computed by [`Integrator`]

pub mod integrator;
mod table;

pub use integrator::Integrator;
pub use table::{TabulatedResponse, KK_V_MAX};

/// A junction's DC and Kramers-Kronig current response.
///
/// Voltages and currents are normalised to the gap voltage and the gap
/// current of the junction.
pub trait ResponseFunction {
    /// DC tunnel current at `bias`.
    fn idc(&self, bias: f64) -> f64;

    /// Kramers-Kronig transformed current at `bias`.
    fn ikk(&self, bias: f64) -> f64;
}

impl<R: ResponseFunction + ?Sized> ResponseFunction for &R {
    fn idc(&self, bias: f64) -> f64 {
        (**self).idc(bias)
    }

    fn ikk(&self, bias: f64) -> f64 {
        (**self).ikk(bias)
    }
}

impl<R: ResponseFunction + ?Sized> ResponseFunction for Box<R> {
    fn idc(&self, bias: f64) -> f64 {
        (**self).idc(bias)
    }

    fn ikk(&self, bias: f64) -> f64 {
        (**self).ikk(bias)
    }
}

/// Linear (normal-metal) junction.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OhmicResponse {
    /// Normalised conductance
    pub conductance: f64,
}

impl OhmicResponse {
    pub fn new(conductance: f64) -> Self {
        Self { conductance }
    }
}

impl Default for OhmicResponse {
    fn default() -> Self {
        Self::new(1.0)
    }
}

impl ResponseFunction for OhmicResponse {
    fn idc(&self, bias: f64) -> f64 {
        self.conductance * bias
    }

    fn ikk(&self, _bias: f64) -> f64 {
        0.0
    }
}
