//! Harmonic-balance driver.
//!
//! For every unknown `(tone, harmonic)` the junction voltage `Vn` must
//! satisfy the embedding-circuit balance
//!
//! ```text
//! Vs = Z · Ip(Vn) + Vn
//! ```
//!
//! where `Ip` is the mixer current at that harmonic. Each complex unknown
//! contributes two real components to the Newton vector `X`.

use log::{debug, info};
use num_complex::Complex64;

use crate::error::{MultitoneError, Result};
use crate::response::ResponseFunction;
use crate::spectrum::Tone;

use super::newton::{max_abs, HarmonicNewton, Residual};
use super::{DEFAULT_MAX_ITERATIONS, DEFAULT_MAX_X, DEFAULT_MIN_STEP, DEFAULT_STEP_FACTOR, DEFAULT_TOLERANCE};

/// Harmonic-balance solver configuration.
#[derive(Debug, Clone)]
pub struct BalanceConfig {
    /// Newton iteration cap
    pub max_iterations: usize,
    /// Relative convergence tolerance
    pub tolerance: f64,
    /// Finite-difference step as a fraction of `|X[i]|`
    pub step_factor: f64,
    /// Finite-difference step floor
    pub min_step: f64,
    /// Divergence guard threshold
    pub max_x: f64,
}

impl Default for BalanceConfig {
    fn default() -> Self {
        Self {
            max_iterations: DEFAULT_MAX_ITERATIONS,
            tolerance: DEFAULT_TOLERANCE,
            step_factor: DEFAULT_STEP_FACTOR,
            min_step: DEFAULT_MIN_STEP,
            max_x: DEFAULT_MAX_X,
        }
    }
}

impl BalanceConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the Newton iteration cap.
    pub fn with_max_iterations(mut self, max_iterations: usize) -> Self {
        self.max_iterations = max_iterations;
        self
    }

    /// Set the relative convergence tolerance.
    pub fn with_tolerance(mut self, tolerance: f64) -> Self {
        self.tolerance = tolerance;
        self
    }

    /// Set the finite-difference step factor.
    pub fn with_step_factor(mut self, step_factor: f64) -> Self {
        self.step_factor = step_factor;
        self
    }

    /// Set the finite-difference step floor.
    pub fn with_min_step(mut self, min_step: f64) -> Self {
        self.min_step = min_step;
        self
    }

    /// Set the divergence guard threshold.
    pub fn with_max_x(mut self, max_x: f64) -> Self {
        self.max_x = max_x;
        self
    }

    fn validate(&self) -> Result<()> {
        if self.max_iterations == 0 {
            return Err(MultitoneError::invalid_parameter("max_iterations must be at least 1"));
        }
        for (name, value) in [
            ("tolerance", self.tolerance),
            ("step_factor", self.step_factor),
            ("min_step", self.min_step),
            ("max_x", self.max_x),
        ] {
            if !(value > 0.0 && value.is_finite()) {
                return Err(MultitoneError::invalid_parameter(format!(
                    "{name} must be positive and finite, got {value}"
                )));
            }
        }
        Ok(())
    }
}

/// One solved junction voltage.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SolvedVoltage {
    /// Tone index (0-based)
    pub tone: usize,
    /// Harmonic order (1-based)
    pub harmonic: usize,
    pub vn: Complex64,
}

/// Outcome of a balance run.
#[derive(Debug, Clone)]
pub struct BalanceReport {
    /// Newton iterations used
    pub iterations: usize,
    /// Whether the tolerance was met before the iteration cap
    pub converged: bool,
    /// Largest residual component at the final voltages
    pub residual: f64,
    /// Final `Vn` of each unknown, in registration order
    pub voltages: Vec<SolvedVoltage>,
}

/// Harmonic-balance problem: tones, a junction response and a DC bias.
pub struct HarmonicBalance<R: ResponseFunction> {
    tones: Vec<Tone>,
    response: R,
    bias: f64,
    config: BalanceConfig,
    /// Unknowns as `(tone, harmonic)`
    unknowns: Vec<(usize, usize)>,
}

impl<R: ResponseFunction> HarmonicBalance<R> {
    pub fn new(response: R, bias: f64, config: BalanceConfig) -> Self {
        Self {
            tones: Vec::new(),
            response,
            bias,
            config,
            unknowns: Vec::new(),
        }
    }

    /// Add a tone. Returns its index.
    pub fn add_tone(&mut self, tone: Tone) -> usize {
        self.tones.push(tone);
        self.tones.len() - 1
    }

    pub fn num_tones(&self) -> usize {
        self.tones.len()
    }

    pub fn tone(&self, index: usize) -> Result<&Tone> {
        let count = self.tones.len();
        self.tones
            .get(index)
            .ok_or(MultitoneError::InvalidTone { index, count })
    }

    pub fn tone_mut(&mut self, index: usize) -> Result<&mut Tone> {
        let count = self.tones.len();
        self.tones
            .get_mut(index)
            .ok_or(MultitoneError::InvalidTone { index, count })
    }

    pub fn response(&self) -> &R {
        &self.response
    }

    pub fn bias(&self) -> f64 {
        self.bias
    }

    pub fn set_bias(&mut self, bias: f64) {
        self.bias = bias;
    }

    pub fn config(&self) -> &BalanceConfig {
        &self.config
    }

    pub fn set_config(&mut self, config: BalanceConfig) {
        self.config = config;
    }

    /// Registered unknowns as `(tone, harmonic)`.
    pub fn unknowns(&self) -> &[(usize, usize)] {
        &self.unknowns
    }

    /// Solve for `Vn` at one harmonic of one tone. Duplicates are ignored.
    pub fn solve_for(&mut self, tone: usize, harmonic: usize) -> Result<()> {
        self.tone(tone)?.harmonic(harmonic)?;
        if !self.unknowns.contains(&(tone, harmonic)) {
            self.unknowns.push((tone, harmonic));
        }
        Ok(())
    }

    /// Solve for every harmonic of every tone.
    pub fn solve_all(&mut self) -> Result<()> {
        for tone in 0..self.tones.len() {
            for harmonic in 1..=self.tones[tone].num_harmonics() {
                self.solve_for(tone, harmonic)?;
            }
        }
        Ok(())
    }

    /// Solve for every harmonic with a nonzero embedding impedance.
    ///
    /// Harmonics with `Z == 0` have `Vn = Vs` exactly and are pinned there.
    pub fn solve_embedded(&mut self) -> Result<()> {
        for tone in 0..self.tones.len() {
            for harmonic in 1..=self.tones[tone].num_harmonics() {
                let t = &mut self.tones[tone];
                if t.z(harmonic)?.norm_sqr() == 0.0 {
                    let vs = t.vs(harmonic)?;
                    t.set_vn(harmonic, vs)?;
                } else {
                    self.solve_for(tone, harmonic)?;
                }
            }
        }
        Ok(())
    }

    /// Forget all registered unknowns.
    pub fn clear_unknowns(&mut self) {
        self.unknowns.clear();
    }

    /// Run Newton-Raphson from the unknowns' current `Vn`.
    ///
    /// The final voltages are written back into the tones whether or not
    /// the tolerance was met. If the iteration fails, the unknowns keep
    /// the `Vn` they started from.
    pub fn run(&mut self) -> Result<BalanceReport> {
        if self.unknowns.is_empty() {
            return Err(MultitoneError::invalid_parameter(
                "harmonic balance has no unknowns to solve for",
            ));
        }
        self.config.validate()?;

        let mut x = Vec::with_capacity(2 * self.unknowns.len());
        for &(tone, harmonic) in &self.unknowns {
            let vn = self.tones[tone].vn(harmonic)?;
            x.push(vn.re);
            x.push(vn.im);
        }
        debug!(
            "Harmonic balance: {} unknowns across {} tones at bias {}",
            self.unknowns.len(),
            self.tones.len(),
            self.bias
        );

        let start = x.clone();
        let mut residual = BalanceResidual {
            tones: &mut self.tones,
            response: &self.response,
            bias: self.bias,
            unknowns: &self.unknowns,
        };

        let mut newton = HarmonicNewton::new(&self.config);
        let iterations = match newton.solve(&mut residual, &mut x) {
            Ok(iterations) => iterations,
            Err(e) => {
                // Leave the tones at the caller's starting point
                residual.write_voltages(&start)?;
                return Err(e);
            }
        };

        // Also writes the final X into the tones
        let mut y = vec![0.0; x.len()];
        residual.evaluate(&x, &mut y)?;
        let residual_norm = max_abs(&y);

        let voltages = self
            .unknowns
            .iter()
            .zip(x.chunks_exact(2))
            .map(|(&(tone, harmonic), pair)| SolvedVoltage {
                tone,
                harmonic,
                vn: Complex64::new(pair[0], pair[1]),
            })
            .collect();

        let converged = newton.converged();
        info!(
            "Harmonic balance finished after {} iterations (converged: {}, residual {:.3e})",
            iterations, converged, residual_norm
        );

        Ok(BalanceReport {
            iterations,
            converged,
            residual: residual_norm,
            voltages,
        })
    }

    /// Mixer current `Ip` at one harmonic of one tone, at the balance's bias.
    pub fn current(&mut self, tone: usize, harmonic: usize) -> Result<Complex64> {
        let bias = self.bias;
        let count = self.tones.len();
        let t = self
            .tones
            .get_mut(tone)
            .ok_or(MultitoneError::InvalidTone { index: tone, count })?;
        t.harmonic(harmonic)?;
        Ok(t.ip(&self.response, bias, harmonic as i32))
    }
}

/// `Delta(X)`: the balance residual `Vs - Z·Ip - Vn` per unknown.
struct BalanceResidual<'a, R: ResponseFunction> {
    tones: &'a mut [Tone],
    response: &'a R,
    bias: f64,
    unknowns: &'a [(usize, usize)],
}

impl<R: ResponseFunction> BalanceResidual<'_, R> {
    /// Set each unknown's `Vn` from its (re, im) pair in `x`.
    fn write_voltages(&mut self, x: &[f64]) -> Result<()> {
        for (&(tone, harmonic), pair) in self.unknowns.iter().zip(x.chunks_exact(2)) {
            self.tones[tone].set_vn(harmonic, Complex64::new(pair[0], pair[1]))?;
        }
        Ok(())
    }
}

impl<R: ResponseFunction> Residual for BalanceResidual<'_, R> {
    fn dimension(&self) -> usize {
        2 * self.unknowns.len()
    }

    fn evaluate(&mut self, x: &[f64], y: &mut [f64]) -> Result<()> {
        self.write_voltages(x)?;

        for (&(tone, harmonic), out) in self.unknowns.iter().zip(y.chunks_exact_mut(2)) {
            let t = &mut self.tones[tone];
            let ip = t.ip(self.response, self.bias, harmonic as i32);
            let balance = t.vs(harmonic)? - t.z(harmonic)? * ip - t.vn(harmonic)?;
            out[0] = balance.re;
            out[1] = balance.im;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::response::OhmicResponse;
    use crate::spectrum::PhaseReference;
    use approx::assert_abs_diff_eq;
    use std::cell::Cell;

    fn c(re: f64, im: f64) -> Complex64 {
        Complex64::new(re, im)
    }

    fn ohmic_balance() -> HarmonicBalance<OhmicResponse> {
        HarmonicBalance::new(OhmicResponse::new(1.0), 0.7, BalanceConfig::default())
    }

    /// Ohmic junction whose curve turns to NaN after `limit` DC lookups.
    struct FailingResponse {
        calls: Cell<usize>,
        limit: usize,
    }

    impl ResponseFunction for FailingResponse {
        fn idc(&self, bias: f64) -> f64 {
            self.calls.set(self.calls.get() + 1);
            if self.calls.get() > self.limit {
                f64::NAN
            } else {
                bias
            }
        }

        fn ikk(&self, _bias: f64) -> f64 {
            0.0
        }
    }

    #[test]
    fn test_failed_run_restores_starting_voltages() {
        let start = c(0.5, 0.0);
        let mut tone = Tone::new(0.3, 1.0, c(0.8, 0.3), c(0.5, 0.1));
        tone.set_vn(1, start).unwrap();

        // DC lookups made by one residual evaluation at the starting point
        let counter = FailingResponse { calls: Cell::new(0), limit: usize::MAX };
        tone.clone().ip(&counter, 0.7, 1);
        let response = FailingResponse { calls: Cell::new(0), limit: counter.calls.get() };

        let mut balance = HarmonicBalance::new(response, 0.7, BalanceConfig::default());
        balance.add_tone(tone);
        balance.solve_all().unwrap();

        let err = balance.run().unwrap_err();
        assert!(matches!(err, MultitoneError::NonFiniteResidual { .. }), "{err:?}");
        assert_eq!(balance.tone(0).unwrap().vn(1).unwrap(), start);
    }

    #[test]
    fn test_config_builder() {
        let config = BalanceConfig::new()
            .with_max_iterations(10)
            .with_tolerance(1e-8)
            .with_step_factor(1e-4)
            .with_min_step(1e-9)
            .with_max_x(5.0);
        assert_eq!(config.max_iterations, 10);
        assert_eq!(config.tolerance, 1e-8);
        assert_eq!(config.step_factor, 1e-4);
        assert_eq!(config.min_step, 1e-9);
        assert_eq!(config.max_x, 5.0);
        assert!(config.validate().is_ok());
        assert!(config.with_tolerance(0.0).validate().is_err());
    }

    #[test]
    fn test_run_without_unknowns_is_rejected() {
        let mut balance = ohmic_balance();
        balance.add_tone(Tone::new(0.3, 1.0, c(0.8, 0.0), c(0.5, 0.0)));
        assert!(matches!(
            balance.run(),
            Err(MultitoneError::InvalidParameter { .. })
        ));
    }

    #[test]
    fn test_solve_for_validates_indices() {
        let mut balance = ohmic_balance();
        balance.add_tone(Tone::new(0.3, 1.0, c(0.8, 0.0), c(0.5, 0.0)));
        assert!(matches!(
            balance.solve_for(1, 1),
            Err(MultitoneError::InvalidTone { index: 1, count: 1 })
        ));
        assert!(matches!(
            balance.solve_for(0, 2),
            Err(MultitoneError::InvalidHarmonic { index: 2, count: 1 })
        ));

        balance.solve_for(0, 1).unwrap();
        balance.solve_for(0, 1).unwrap();
        assert_eq!(balance.unknowns(), &[(0, 1)]);
    }

    #[test]
    fn test_solve_embedded_pins_short_circuited_harmonics() {
        let mut balance = ohmic_balance();
        let mut tone = Tone::new(0.3, 1.0, c(0.8, 0.0), c(0.5, 0.0));
        tone.add_harmonic(c(0.2, -0.1), c(0.0, 0.0));
        balance.add_tone(tone);

        balance.solve_embedded().unwrap();
        assert_eq!(balance.unknowns(), &[(0, 1)]);
        assert_eq!(balance.tone(0).unwrap().vn(2).unwrap(), c(0.2, -0.1));
    }

    #[test]
    fn test_uniform_ohmic_balance() {
        // Vs = Z·|Vn| + Vn  =>  Vn = Vs / (1 + Z) for real Vs, Z
        let mut balance = ohmic_balance();
        balance.add_tone(Tone::new(0.3, 1.0, c(0.8, 0.0), c(0.5, 0.0)));
        balance.solve_all().unwrap();

        let report = balance.run().unwrap();
        assert!(report.converged);
        assert!(report.iterations <= 3);
        assert_abs_diff_eq!(report.voltages[0].vn.re, 0.8 / 1.5, epsilon = 1e-6);
        assert_abs_diff_eq!(report.voltages[0].vn.im, 0.0, epsilon = 1e-6);
        assert!(report.residual < 1e-9);
    }

    #[test]
    fn test_per_sideband_ohmic_balance() {
        // Linear junction: Vn = Vs / (1 + Z)
        let vs = c(0.8, 0.2);
        let z = c(0.5, 0.25);
        let mut tone = Tone::new(0.3, 1.0, vs, z);
        tone.set_phase_reference(PhaseReference::PerSideband);

        let mut balance = ohmic_balance();
        balance.add_tone(tone);
        balance.solve_all().unwrap();
        let report = balance.run().unwrap();

        let expected = vs / (c(1.0, 0.0) + z);
        assert!(report.converged);
        assert_abs_diff_eq!(report.voltages[0].vn.re, expected.re, epsilon = 1e-6);
        assert_abs_diff_eq!(report.voltages[0].vn.im, expected.im, epsilon = 1e-6);

        // Written back into the tone
        let vn = balance.tone(0).unwrap().vn(1).unwrap();
        assert_eq!(vn, report.voltages[0].vn);

        let ip = balance.current(0, 1).unwrap();
        assert_abs_diff_eq!(ip.re, expected.re, epsilon = 1e-6);
        assert_abs_diff_eq!(ip.im, expected.im, epsilon = 1e-6);
    }

    #[test]
    fn test_current_rejects_bad_indices() {
        let mut balance = ohmic_balance();
        balance.add_tone(Tone::new(0.3, 1.0, c(0.8, 0.0), c(0.5, 0.0)));
        assert!(balance.current(2, 1).is_err());
        assert!(balance.current(0, 3).is_err());
    }
}
