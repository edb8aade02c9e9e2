//! A single harmonic of a pumping tone and its Bessel coefficients.
//!
//! A harmonic of order `p` with junction voltage `Vp` phase-modulates the
//! quasiparticle wavefunction. Its frequency-domain coefficients are
//!   A_n = J_n(alpha) · phase,   alpha = |Vp| · w_gap / (p · w0)
//!
//! for sidebands `n` in `[-totalJ, totalJ]`. The table is computed lazily
//! and memoised by the parameter tuple it was computed from.

use num_complex::Complex64;

use super::bessel::jnx;

/// How the drive phase is applied across a coefficient vector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PhaseReference {
    /// One factor, `conj(unitV)^(-totalJ)`, applied to every sideband
    #[default]
    Uniform,
    /// `conj(unitV)^n` applied to sideband `n`
    PerSideband,
}

/// Parameters that fully determine a harmonic's coefficient table.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HarmonicParams {
    /// Truncation order (sidebands kept on each side)
    pub total_j: usize,
    /// Harmonic order `p` (1 = fundamental)
    pub order: u32,
    /// Complex drive amplitude, normalised to the gap voltage
    pub vp: Complex64,
    /// Fundamental angular frequency
    pub w0: f64,
    /// Gap angular frequency
    pub w_gap: f64,
    /// Phase convention for the coefficient vector
    pub phase_reference: PhaseReference,
}

impl HarmonicParams {
    /// Normalised drive depth `|Vp| · w_gap / (p · w0)`.
    pub fn alpha(&self) -> f64 {
        self.vp.norm() * self.w_gap / (self.order as f64 * self.w0)
    }

    /// Unit phasor along `Vp`, or `1` for a zero drive.
    pub fn unit_drive(&self) -> Complex64 {
        let magnitude = self.vp.norm();
        if magnitude > 0.0 {
            self.vp / magnitude
        } else {
            Complex64::new(1.0, 0.0)
        }
    }
}

/// Coefficients for one parameter tuple. Never resized or mutated.
#[derive(Debug, Clone)]
struct AnpTable {
    params: HarmonicParams,
    values: Vec<Complex64>,
}

impl AnpTable {
    fn compute(params: HarmonicParams) -> Self {
        let total_j = params.total_j as i32;
        let alpha = params.alpha();
        let conj_unit = params.unit_drive().conj();
        let uniform = conj_unit.powi(-total_j);

        let values = (-total_j..=total_j)
            .map(|n| {
                let phase = match params.phase_reference {
                    PhaseReference::Uniform => uniform,
                    PhaseReference::PerSideband => conj_unit.powi(n),
                };
                phase * jnx(n, alpha)
            })
            .collect();

        Self { params, values }
    }
}

/// A harmonic of a tone with a lazily computed `Anp` coefficient vector.
#[derive(Debug, Clone)]
pub struct Harmonic {
    params: HarmonicParams,
    table: Option<AnpTable>,
    recomputations: usize,
}

impl Harmonic {
    /// Create a harmonic. Coefficients are computed on first access.
    pub fn new(total_j: usize, order: u32, vp: Complex64, w0: f64, w_gap: f64) -> Self {
        Self::from_params(HarmonicParams {
            total_j,
            order,
            vp,
            w0,
            w_gap,
            phase_reference: PhaseReference::default(),
        })
    }

    /// Create a harmonic from a full parameter tuple.
    pub fn from_params(params: HarmonicParams) -> Self {
        Self {
            params,
            table: None,
            recomputations: 0,
        }
    }

    /// Current parameter tuple.
    pub fn params(&self) -> &HarmonicParams {
        &self.params
    }

    /// Replace the whole parameter tuple.
    pub fn set_params(&mut self, params: HarmonicParams) {
        self.params = params;
    }

    /// Harmonic order `p`.
    pub fn order(&self) -> u32 {
        self.params.order
    }

    /// Truncation order.
    pub fn total_j(&self) -> usize {
        self.params.total_j
    }

    pub fn set_total_j(&mut self, total_j: usize) {
        self.params.total_j = total_j;
    }

    /// Drive amplitude.
    pub fn vp(&self) -> Complex64 {
        self.params.vp
    }

    pub fn set_vp(&mut self, vp: Complex64) {
        self.params.vp = vp;
    }

    pub fn set_w0(&mut self, w0: f64) {
        self.params.w0 = w0;
    }

    pub fn set_w_gap(&mut self, w_gap: f64) {
        self.params.w_gap = w_gap;
    }

    pub fn set_phase_reference(&mut self, phase_reference: PhaseReference) {
        self.params.phase_reference = phase_reference;
    }

    /// True when the cached table matches the current parameters.
    pub fn is_valid(&self) -> bool {
        self.table
            .as_ref()
            .is_some_and(|table| table.params == self.params)
    }

    /// Number of times the coefficient table has been computed.
    pub fn recompute_count(&self) -> usize {
        self.recomputations
    }

    /// Coefficient `A_n`. Zero outside `[-totalJ, totalJ]`.
    pub fn get(&mut self, n: i32) -> Complex64 {
        let total_j = self.params.total_j as i32;
        if n.abs() > total_j {
            return Complex64::new(0.0, 0.0);
        }
        self.coefficients()[(n + total_j) as usize]
    }

    /// Full coefficient vector, index `n + totalJ`.
    pub fn coefficients(&mut self) -> &[Complex64] {
        if !self.is_valid() {
            self.recomputations += 1;
            self.table = Some(AnpTable::compute(self.params));
        }
        match &self.table {
            Some(table) => &table.values,
            None => &[],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn fundamental(vp: Complex64) -> Harmonic {
        Harmonic::new(15, 1, vp, 0.5, 1.0)
    }

    #[test]
    fn test_lazy_recompute_once() {
        let mut h = fundamental(Complex64::new(0.4, 0.0));
        assert_eq!(h.recompute_count(), 0);

        h.get(0);
        h.get(0);
        assert_eq!(h.recompute_count(), 1);

        h.set_vp(Complex64::new(0.6, 0.1));
        assert!(!h.is_valid());
        h.get(0);
        assert_eq!(h.recompute_count(), 2);
        assert!(h.is_valid());
    }

    #[test]
    fn test_out_of_range_does_not_recompute() {
        let mut h = fundamental(Complex64::new(0.4, 0.0));
        assert_eq!(h.get(16), Complex64::new(0.0, 0.0));
        assert_eq!(h.get(-40), Complex64::new(0.0, 0.0));
        assert_eq!(h.recompute_count(), 0);
    }

    #[test]
    fn test_real_drive_is_plain_bessel() {
        // alpha = 0.5 * 1.0 / (1 * 0.5) = 1.0
        let mut h = fundamental(Complex64::new(0.5, 0.0));
        for n in -5..=5 {
            let a = h.get(n);
            assert_relative_eq!(a.re, jnx(n, 1.0), epsilon = 1e-15);
            assert_relative_eq!(a.im, 0.0, epsilon = 1e-15);
        }
    }

    #[test]
    fn test_alpha_scales_with_order() {
        let params = HarmonicParams {
            total_j: 15,
            order: 2,
            vp: Complex64::new(0.0, 0.6),
            w0: 0.3,
            w_gap: 1.0,
            phase_reference: PhaseReference::Uniform,
        };
        assert_relative_eq!(params.alpha(), 1.0, epsilon = 1e-12);
    }

    #[test]
    fn test_uniform_phase_is_shared() {
        let vp = Complex64::from_polar(0.5, 0.7);
        let mut h = fundamental(vp);
        let expected = (vp / vp.norm()).conj().powi(-15);
        for n in [-3, 0, 2] {
            let a = h.get(n);
            assert_relative_eq!(a.re, expected.re * jnx(n, 1.0), epsilon = 1e-14);
            assert_relative_eq!(a.im, expected.im * jnx(n, 1.0), epsilon = 1e-14);
        }
    }

    #[test]
    fn test_per_sideband_phase_advances() {
        let vp = Complex64::from_polar(0.5, 0.7);
        let mut h = fundamental(vp);
        h.set_phase_reference(PhaseReference::PerSideband);
        for n in [-3, 0, 2] {
            let expected = Complex64::from_polar(jnx(n, 1.0), -0.7 * n as f64);
            let a = h.get(n);
            assert_relative_eq!(a.re, expected.re, epsilon = 1e-14);
            assert_relative_eq!(a.im, expected.im, epsilon = 1e-14);
        }
    }

    #[test]
    fn test_zero_drive_is_delta() {
        let mut h = fundamental(Complex64::new(0.0, 0.0));
        assert_eq!(h.get(0), Complex64::new(1.0, 0.0));
        assert_eq!(h.get(1), Complex64::new(0.0, 0.0));
        assert_eq!(h.get(-1), Complex64::new(0.0, 0.0));
    }
}
