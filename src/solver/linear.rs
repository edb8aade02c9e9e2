//! Dense linear system for the Newton update step.

use crate::error::{MultitoneError, Result};

/// Pivots smaller than this fraction of the largest entry are singular.
const RELATIVE_PIVOT_TOLERANCE: f64 = 1e-13;

/// Dense linear system Ax = b.
#[derive(Debug)]
pub struct DenseSystem {
    /// System matrix A (row-major)
    pub a: Vec<f64>,
    /// Right-hand side b
    pub b: Vec<f64>,
    /// Solution vector x
    pub x: Vec<f64>,
    /// Matrix dimension
    pub size: usize,
    /// LU decomposition of A
    lu: Vec<f64>,
    /// Row permutation from partial pivoting
    pivots: Vec<usize>,
}

impl DenseSystem {
    /// Create a zeroed system of dimension `size`.
    pub fn new(size: usize) -> Self {
        Self {
            a: vec![0.0; size * size],
            b: vec![0.0; size],
            x: vec![0.0; size],
            size,
            lu: vec![0.0; size * size],
            pivots: vec![0; size],
        }
    }

    /// Set matrix element at (row, col).
    pub fn set(&mut self, row: usize, col: usize, value: f64) {
        self.a[row * self.size + col] = value;
    }

    /// Overwrite column `col` of the matrix.
    pub fn set_column(&mut self, col: usize, values: &[f64]) {
        for (row, &value) in values.iter().enumerate().take(self.size) {
            self.a[row * self.size + col] = value;
        }
    }

    /// LU decomposition with partial pivoting.
    ///
    /// Fails with `SingularJacobian` on the first column whose best pivot
    /// is negligible relative to the largest entry of A.
    pub fn factor(&mut self) -> Result<()> {
        let n = self.size;
        self.lu.copy_from_slice(&self.a);

        let scale = self.a.iter().fold(0.0f64, |m, v| m.max(v.abs()));
        let threshold = RELATIVE_PIVOT_TOLERANCE * scale;

        for i in 0..n {
            self.pivots[i] = i;
        }

        for k in 0..n {
            let mut max_val = self.lu[k * n + k].abs();
            let mut max_row = k;
            for i in (k + 1)..n {
                let val = self.lu[i * n + k].abs();
                if val > max_val {
                    max_val = val;
                    max_row = i;
                }
            }

            if scale == 0.0 || !max_val.is_finite() || max_val <= threshold {
                return Err(MultitoneError::SingularJacobian { column: k });
            }

            if max_row != k {
                self.pivots.swap(k, max_row);
                for j in 0..n {
                    self.lu.swap(k * n + j, max_row * n + j);
                }
            }

            let pivot = self.lu[k * n + k];
            for i in (k + 1)..n {
                let factor = self.lu[i * n + k] / pivot;
                self.lu[i * n + k] = factor;
                for j in (k + 1)..n {
                    self.lu[i * n + j] -= factor * self.lu[k * n + j];
                }
            }
        }

        Ok(())
    }

    /// Solve for `x` using the decomposition from [`factor`](Self::factor).
    pub fn solve(&mut self) {
        let n = self.size;

        for i in 0..n {
            self.x[i] = self.b[self.pivots[i]];
        }

        // L * y = Pb
        for i in 0..n {
            for j in 0..i {
                self.x[i] -= self.lu[i * n + j] * self.x[j];
            }
        }

        // U * x = y
        for i in (0..n).rev() {
            for j in (i + 1)..n {
                self.x[i] -= self.lu[i * n + j] * self.x[j];
            }
            self.x[i] /= self.lu[i * n + i];
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_solve_2x2() {
        // 2x + y = 5, x + 3y = 10  =>  x = 1, y = 3
        let mut system = DenseSystem::new(2);
        system.set(0, 0, 2.0);
        system.set(0, 1, 1.0);
        system.set(1, 0, 1.0);
        system.set(1, 1, 3.0);
        system.b.copy_from_slice(&[5.0, 10.0]);

        system.factor().unwrap();
        system.solve();
        assert_relative_eq!(system.x[0], 1.0, epsilon = 1e-12);
        assert_relative_eq!(system.x[1], 3.0, epsilon = 1e-12);
    }

    #[test]
    fn test_needs_pivoting() {
        // Zero on the leading diagonal
        let mut system = DenseSystem::new(3);
        system.set_column(0, &[0.0, 1.0, 2.0]);
        system.set_column(1, &[1.0, 0.0, 1.0]);
        system.set_column(2, &[2.0, 1.0, 0.0]);
        // x = (1, 2, 3)
        system.b.copy_from_slice(&[8.0, 4.0, 4.0]);

        system.factor().unwrap();
        system.solve();
        assert_relative_eq!(system.x[0], 1.0, epsilon = 1e-12);
        assert_relative_eq!(system.x[1], 2.0, epsilon = 1e-12);
        assert_relative_eq!(system.x[2], 3.0, epsilon = 1e-12);
    }

    #[test]
    fn test_singular_matrix_reports_column() {
        let mut system = DenseSystem::new(2);
        system.set_column(0, &[1.0, 2.0]);
        system.set_column(1, &[2.0, 4.0]);
        assert!(matches!(
            system.factor(),
            Err(MultitoneError::SingularJacobian { column: 1 })
        ));
    }

    #[test]
    fn test_zero_matrix_is_singular() {
        let mut system = DenseSystem::new(2);
        assert!(matches!(
            system.factor(),
            Err(MultitoneError::SingularJacobian { column: 0 })
        ));
    }

    #[test]
    fn test_tiny_but_well_conditioned_matrix() {
        let mut system = DenseSystem::new(2);
        system.set(0, 0, 1e-20);
        system.set(1, 1, 2e-20);
        system.b.copy_from_slice(&[1e-20, 1e-20]);
        system.factor().unwrap();
        system.solve();
        assert_relative_eq!(system.x[0], 1.0, epsilon = 1e-12);
        assert_relative_eq!(system.x[1], 0.5, epsilon = 1e-12);
    }
}
