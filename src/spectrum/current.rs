//! Quasiparticle mixer current (Tucker theory).
//!
//! The current at harmonic `n` of a pumped junction biased at `V0` is built
//! from two partial sums over the composite spectrum:
//!
//! ```text
//! S+  = Σ_k Ck(k) · conj(Ck(k+n)) · Ires(V0 + k·Vph)
//! S-  = Σ_k Ck(k) · conj(Ck(k-n)) · Ires(V0 + k·Vph)
//! I_n = S- - conj(S+)
//! Ires(v) = Ikk(v) + i·Idc(v)
//! ```
//!
//! with the real and imaginary parts swapped in the result so that the DC
//! I-V curve drives the in-phase (resistive) part and its Kramers-Kronig
//! transform the quadrature (reactive) part.

use num_complex::Complex64;

use crate::response::ResponseFunction;

use super::tone::SpectrumTable;

/// Current at harmonic `n` for the composite spectrum `spectrum`.
///
/// `vph` is the photon voltage `w0 / w_gap` separating adjacent sidebands.
/// For `n == 0` the result is the DC current, halved because the two
/// partial sums count each sideband twice.
pub fn mixer_current<R: ResponseFunction + ?Sized>(
    spectrum: &SpectrumTable,
    vph: f64,
    response: &R,
    bias: f64,
    n: i32,
) -> Complex64 {
    let total_j = spectrum.total_j() as i32;
    let mut rs_plus = Complex64::new(0.0, 0.0);
    let mut rs_minus = Complex64::new(0.0, 0.0);

    for k in -total_j..=total_j {
        let v = bias + k as f64 * vph;
        let ires = Complex64::new(response.ikk(v), response.idc(v));
        let c0 = spectrum.ck(k);

        rs_plus += c0 * spectrum.ck(k + n).conj() * ires;
        rs_minus += c0 * spectrum.ck(k - n).conj() * ires;
    }

    let mut result = rs_minus - rs_plus.conj();
    if n == 0 {
        result /= 2.0;
    }

    Complex64::new(result.im, result.re)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::response::OhmicResponse;
    use crate::spectrum::{PhaseReference, Tone};
    use approx::assert_abs_diff_eq;

    fn pumped(vn: Complex64, phase_reference: PhaseReference) -> Tone {
        let mut tone = Tone::new(0.3, 1.0, vn, Complex64::new(0.0, 0.0));
        tone.set_vn(1, vn).unwrap();
        tone.set_phase_reference(phase_reference);
        tone
    }

    #[test]
    fn test_dc_term_is_bias_for_ohmic_junction() {
        let mut tone = pumped(Complex64::new(0.6, 0.2), PhaseReference::Uniform);
        let i0 = tone.ip(&OhmicResponse::new(1.0), 0.7, 0);
        assert_abs_diff_eq!(i0.re, 0.7, epsilon = 1e-12);
        assert_abs_diff_eq!(i0.im, 0.0, epsilon = 1e-12);
    }

    #[test]
    fn test_per_sideband_ohmic_current_follows_voltage() {
        let vn = Complex64::new(0.6, 0.2);
        let mut tone = pumped(vn, PhaseReference::PerSideband);
        let i1 = tone.ip(&OhmicResponse::new(1.0), 0.7, 1);
        assert_abs_diff_eq!(i1.re, vn.re, epsilon = 1e-12);
        assert_abs_diff_eq!(i1.im, vn.im, epsilon = 1e-12);
    }

    #[test]
    fn test_uniform_ohmic_current_is_magnitude() {
        let vn = Complex64::new(0.6, 0.2);
        let mut tone = pumped(vn, PhaseReference::Uniform);
        let i1 = tone.ip(&OhmicResponse::new(1.0), 0.7, 1);
        assert_abs_diff_eq!(i1.re, vn.norm(), epsilon = 1e-12);
        assert_abs_diff_eq!(i1.im, 0.0, epsilon = 1e-12);
    }

    #[test]
    fn test_conductance_scales_current() {
        let vn = Complex64::new(0.4, -0.1);
        let mut tone = pumped(vn, PhaseReference::PerSideband);
        let i1 = tone.ip(&OhmicResponse::new(2.5), 0.5, 1);
        assert_abs_diff_eq!(i1.re, 2.5 * vn.re, epsilon = 1e-12);
        assert_abs_diff_eq!(i1.im, 2.5 * vn.im, epsilon = 1e-12);
    }

    #[test]
    fn test_second_harmonic_ohmic_current() {
        let mut tone = pumped(Complex64::new(0.6, 0.2), PhaseReference::PerSideband);
        tone.add_harmonic(Complex64::new(0.3, -0.1), Complex64::new(0.0, 0.0));
        tone.set_vn(2, Complex64::new(0.3, -0.1)).unwrap();

        let response = OhmicResponse::new(1.0);
        let i1 = tone.ip(&response, 0.7, 1);
        let i2 = tone.ip(&response, 0.7, 2);
        assert_abs_diff_eq!(i1.re, 0.6, epsilon = 1e-9);
        assert_abs_diff_eq!(i1.im, 0.2, epsilon = 1e-9);
        assert_abs_diff_eq!(i2.re, 0.3, epsilon = 1e-9);
        assert_abs_diff_eq!(i2.im, -0.1, epsilon = 1e-9);
    }
}
