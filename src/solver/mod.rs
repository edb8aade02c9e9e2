//! Harmonic-balance solver.
//!
//! This module finds the self-consistent junction voltages of a pumped
//! mixer.
//!
//! ## Harmonic balance
//!
//! Each unknown harmonic voltage `Vn` is split into real and imaginary
//! parts, giving a real vector X of length `2·U`. The residual
//!
//! ```text
//! Y = Delta(X),   Y_i = Vs - Z·Ip(X) - Vn
//! ```
//!
//! is driven to zero by Newton-Raphson:
//!
//! ```text
//! J · dX = Y(X_old)
//! X_new  = X_old - dX
//! ```
//!
//! where J is rebuilt every iteration by one-sided finite differences and
//! the linear step is solved by LU decomposition with partial pivoting.

mod balance;
mod linear;
mod newton;

pub use balance::{BalanceConfig, BalanceReport, HarmonicBalance, SolvedVoltage};
pub use linear::DenseSystem;
pub use newton::{HarmonicNewton, NewtonState, Residual};

/// Relative convergence tolerance for Newton-Raphson iteration.
pub const DEFAULT_TOLERANCE: f64 = 1e-6;

/// Maximum Newton-Raphson iterations per balance run.
pub const DEFAULT_MAX_ITERATIONS: usize = 50;

/// Finite-difference step as a fraction of each component.
pub const DEFAULT_STEP_FACTOR: f64 = 1e-3;

/// Smallest finite-difference step.
pub const DEFAULT_MIN_STEP: f64 = 1e-7;

/// Components beyond this magnitude are reset to unit magnitude.
pub const DEFAULT_MAX_X: f64 = 10.0;
