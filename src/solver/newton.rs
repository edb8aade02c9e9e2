//! Newton-Raphson iteration with a finite-difference Jacobian.

use log::{debug, trace, warn};

use crate::error::{MultitoneError, Result};

use super::balance::BalanceConfig;
use super::linear::DenseSystem;

/// Value a diverging component is reset to.
const DIVERGENCE_RESET: f64 = 1.0;

/// A real vector function `Delta(X) -> Y` with `dim(X) == dim(Y)`.
pub trait Residual {
    /// Length of `X` and `Y`.
    fn dimension(&self) -> usize;

    /// Evaluate the residual at `x` into `y`.
    fn evaluate(&mut self, x: &[f64], y: &mut [f64]) -> Result<()>;
}

/// Where the iteration stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NewtonState {
    /// Not yet run
    Idle,
    /// Working on iteration `iteration` (1-based)
    Iterating { iteration: usize },
    /// Stopped after `iterations` iterations
    Finished { iterations: usize, converged: bool },
}

/// Newton-Raphson solver for the harmonic-balance residual.
pub struct HarmonicNewton {
    /// Maximum iterations
    pub max_iterations: usize,
    /// Relative convergence tolerance on each component of `X`
    pub tolerance: f64,
    /// Finite-difference step as a fraction of `|X[i]|`
    pub step_factor: f64,
    /// Smallest finite-difference step
    pub min_step: f64,
    /// Components whose magnitude exceeds this are reset
    pub max_x: f64,
    state: NewtonState,
}

impl Default for HarmonicNewton {
    fn default() -> Self {
        Self::new(&BalanceConfig::default())
    }
}

impl HarmonicNewton {
    /// Create a solver with the limits from `config`.
    pub fn new(config: &BalanceConfig) -> Self {
        Self {
            max_iterations: config.max_iterations,
            tolerance: config.tolerance,
            step_factor: config.step_factor,
            min_step: config.min_step,
            max_x: config.max_x,
            state: NewtonState::Idle,
        }
    }

    pub fn state(&self) -> NewtonState {
        self.state
    }

    /// True if the last `solve` met the tolerance.
    pub fn converged(&self) -> bool {
        matches!(self.state, NewtonState::Finished { converged: true, .. })
    }

    /// Iterate from `x` until every component settles or the iteration cap
    /// is reached. `x` holds the final estimate on return.
    ///
    /// Returns the number of iterations used. Hitting `max_iterations`
    /// without convergence is not an error; see [`converged`](Self::converged).
    pub fn solve<F: Residual + ?Sized>(&mut self, residual: &mut F, x: &mut [f64]) -> Result<usize> {
        let n = residual.dimension();
        if x.len() != n {
            return Err(MultitoneError::invalid_parameter(format!(
                "initial guess has {} components, residual expects {}",
                x.len(),
                n
            )));
        }

        let mut system = DenseSystem::new(n);
        let mut old_y = vec![0.0; n];
        let mut new_y = vec![0.0; n];
        let mut column = vec![0.0; n];
        let mut shifted = x.to_vec();

        for iter in 0..self.max_iterations {
            self.state = NewtonState::Iterating { iteration: iter + 1 };

            evaluate_checked(residual, x, &mut old_y)?;

            // One-sided difference per column
            for i in 0..n {
                let dx = (self.step_factor * x[i].abs()).max(self.min_step);
                shifted.copy_from_slice(x);
                shifted[i] += dx;
                evaluate_checked(residual, &shifted, &mut new_y)?;

                for (c, (yn, yo)) in column.iter_mut().zip(new_y.iter().zip(old_y.iter())) {
                    *c = (yn - yo) / dx;
                }
                system.set_column(i, &column);
                trace!("Jacobian column {i}: dX = {dx:.3e}");
            }

            system.factor()?;
            system.b.copy_from_slice(&old_y);
            system.solve();

            let mut converged = true;
            let mut max_change = 0.0f64;
            for i in 0..n {
                let old = x[i];
                let mut new = old - system.x[i];
                if new.abs() > self.max_x {
                    warn!(
                        "Component {i} diverged to {new:.3e}, resetting to {DIVERGENCE_RESET}"
                    );
                    new = DIVERGENCE_RESET;
                }
                let change = (new - old).abs();
                if change > self.tolerance * old.abs() {
                    converged = false;
                }
                max_change = max_change.max(change);
                x[i] = new;
            }

            debug!(
                "Newton iteration {}: max |dX| = {:.3e}, max |Y| = {:.3e}",
                iter + 1,
                max_change,
                max_abs(&old_y)
            );

            if converged {
                self.state = NewtonState::Finished {
                    iterations: iter + 1,
                    converged: true,
                };
                return Ok(iter + 1);
            }
        }

        warn!(
            "Harmonic balance did not converge within {} iterations",
            self.max_iterations
        );
        self.state = NewtonState::Finished {
            iterations: self.max_iterations,
            converged: false,
        };
        Ok(self.max_iterations)
    }
}

fn evaluate_checked<F: Residual + ?Sized>(residual: &mut F, x: &[f64], y: &mut [f64]) -> Result<()> {
    residual.evaluate(x, y)?;
    match y.iter().position(|v| !v.is_finite()) {
        Some(index) => Err(MultitoneError::NonFiniteResidual { index }),
        None => Ok(()),
    }
}

/// Largest absolute component.
pub(crate) fn max_abs(values: &[f64]) -> f64 {
    values.iter().fold(0.0f64, |m, v| m.max(v.abs()))
}
