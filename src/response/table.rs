//! Tabulated I-V response with Kramers-Kronig transform.

use std::f64::consts::PI;
use std::path::Path;

use log::{debug, trace};

use crate::error::{MultitoneError, Result};

use super::{Integrator, ResponseFunction};

/// Upper limit of the KK integral, in units of the gap voltage.
pub const KK_V_MAX: f64 = 10.0;

/// I-V and KK current tabulated on a common, increasing bias grid.
///
/// `idc` is odd in bias and extrapolated linearly beyond the grid; `ikk`
/// is even in bias and clamped to its last value beyond the grid.
#[derive(Debug, Clone)]
pub struct TabulatedResponse {
    bias: Vec<f64>,
    idc: Vec<f64>,
    ikk: Vec<f64>,
    /// Normal-state conductance used above the grid
    slope: f64,
    /// Current intercept of the normal-state line
    intercept: f64,
}

impl TabulatedResponse {
    /// Build from raw tables.
    ///
    /// The bias grid must have at least two strictly increasing points and
    /// all three tables must have the same length.
    pub fn new(bias: Vec<f64>, idc: Vec<f64>, ikk: Vec<f64>, slope: f64, intercept: f64) -> Result<Self> {
        if bias.len() < 2 {
            return Err(MultitoneError::invalid_response(format!(
                "need at least two bias points, got {}",
                bias.len()
            )));
        }
        if idc.len() != bias.len() || ikk.len() != bias.len() {
            return Err(MultitoneError::invalid_response(format!(
                "table lengths differ: bias {}, idc {}, ikk {}",
                bias.len(),
                idc.len(),
                ikk.len()
            )));
        }
        check_increasing(&bias)?;

        Ok(Self {
            bias,
            idc,
            ikk,
            slope,
            intercept,
        })
    }

    /// Kennedy polynomial fit to an ideal SIS I-V curve:
    ///   Idc(v) = v^(2n+1) / (1 + v^(2n))
    ///
    /// sampled on `points` biases in `[0, max_bias]`, with its KK transform.
    pub fn kennedy(order: u32, max_bias: f64, points: usize) -> Result<Self> {
        if points < 2 || max_bias <= 0.0 {
            return Err(MultitoneError::invalid_response(format!(
                "Kennedy fit needs max_bias > 0 and at least two points (got {max_bias}, {points})"
            )));
        }

        let n = 2 * order as i32;
        let bias: Vec<f64> = (0..points)
            .map(|k| max_bias * k as f64 / (points - 1) as f64)
            .collect();
        let idc = bias
            .iter()
            .map(|&v| v.powi(n + 1) / (1.0 + v.powi(n)))
            .collect();

        let mut response = Self::new(bias, idc, vec![0.0; points], 1.0, 0.0)?;
        response.compute_kk();
        Ok(response)
    }

    /// Load tab- or space-separated `(bias, current)` columns.
    ///
    /// The KK data is resampled onto the I-V bias grid. Lines that do not
    /// start with two numbers are skipped.
    pub fn from_files(idc_path: &Path, ikk_path: &Path, v_gap: f64) -> Result<Self> {
        let iv = read_columns(idc_path)?;
        let kk = read_columns(ikk_path)?;
        debug!(
            "Loaded {} I-V points from '{}' and {} KK points from '{}'",
            iv.len(),
            idc_path.display(),
            kk.len(),
            ikk_path.display()
        );
        Self::from_columns(&iv, &kk, v_gap)
    }

    /// Build from `(bias, current)` pairs for the I-V and KK curves.
    ///
    /// The normal-state line used for extrapolation is fitted over the top
    /// `v_gap / 5` of the I-V bias range.
    pub fn from_columns(iv: &[(f64, f64)], kk: &[(f64, f64)], v_gap: f64) -> Result<Self> {
        let (bias, idc): (Vec<f64>, Vec<f64>) = iv.iter().copied().unzip();
        let (kk_bias, kk_current): (Vec<f64>, Vec<f64>) = kk.iter().copied().unzip();
        if kk_bias.len() < 2 {
            return Err(MultitoneError::invalid_response(format!(
                "need at least two KK points, got {}",
                kk_bias.len()
            )));
        }
        check_increasing(&kk_bias)?;

        let ikk = bias
            .iter()
            .map(|&v| interpolate(v, &kk_bias, &kk_current))
            .collect();
        let mut response = Self::new(bias, idc, ikk, 1.0, 0.0)?;
        response.fit_normal_state(v_gap)?;
        Ok(response)
    }

    /// Recompute the KK table from the I-V table.
    pub fn compute_kk(&mut self) {
        self.compute_kk_with(&Integrator::new());
    }

    /// Recompute the KK table with a custom integrator:
    ///
    /// ```text
    /// Ikk(v0) = 1/π ∫_0^10 [ (Idc(v0+v) - (v0+v)) / v + (Idc(v0-v) - (v0-v)) / (-v) ] dv
    /// ```
    pub fn compute_kk_with(&mut self, integrator: &Integrator) {
        let ikk: Vec<f64> = self
            .bias
            .iter()
            .map(|&v0| {
                let value = integrator.integrate(|v| self.kk_integrand(v0, v), 0.0, KK_V_MAX) / PI;
                trace!("Ikk({v0:.4}) = {value:.6e}");
                value
            })
            .collect();
        self.ikk = ikk;
    }

    /// Bias grid.
    pub fn bias_points(&self) -> &[f64] {
        &self.bias
    }

    /// Largest tabulated bias.
    pub fn v_max(&self) -> f64 {
        self.bias[self.bias.len() - 1]
    }

    /// Normal-state conductance used for extrapolation.
    pub fn slope(&self) -> f64 {
        self.slope
    }

    /// Normal-state current intercept used for extrapolation.
    pub fn intercept(&self) -> f64 {
        self.intercept
    }

    fn kk_integrand(&self, v0: f64, v: f64) -> f64 {
        let above = (self.idc(v0 + v) - (v0 + v)) / v;
        let below = (self.idc(v0 - v) - (v0 - v)) / (-v);
        above + below
    }

    /// Average differential resistance over the top `v_gap / 5` of bias.
    fn fit_normal_state(&mut self, v_gap: f64) -> Result<()> {
        let last = self.bias.len() - 1;
        let mut start = last;
        while start > 1 && self.bias[last] - self.bias[start] < v_gap / 5.0 {
            start -= 1;
        }

        let count = (last - start + 1) as f64;
        let mut rn = 0.0;
        let mut v_mid = 0.0;
        let mut i_mid = 0.0;
        for i in start..=last {
            rn += (self.bias[i] - self.bias[i - 1]) / (self.idc[i] - self.idc[i - 1]);
            v_mid += self.bias[i];
            i_mid += self.idc[i];
        }
        rn /= count;
        v_mid /= count;
        i_mid /= count;

        if !rn.is_finite() || rn <= 0.0 {
            return Err(MultitoneError::invalid_response(format!(
                "normal-state resistance fit failed (Rn = {rn})"
            )));
        }

        self.slope = 1.0 / rn;
        self.intercept = i_mid - v_mid / rn;
        debug!(
            "Normal-state fit over {} points: Rn = {:.4}, intercept = {:.4}",
            last - start + 1,
            rn,
            self.intercept
        );
        Ok(())
    }
}

impl ResponseFunction for TabulatedResponse {
    fn idc(&self, bias: f64) -> f64 {
        let v = bias.abs();
        let current = if v > self.v_max() {
            self.intercept + self.slope * v
        } else {
            interpolate(v, &self.bias, &self.idc)
        };
        if bias < 0.0 {
            -current
        } else {
            current
        }
    }

    fn ikk(&self, bias: f64) -> f64 {
        let v = bias.abs();
        if v >= self.v_max() {
            self.ikk[self.ikk.len() - 1]
        } else {
            interpolate(v, &self.bias, &self.ikk)
        }
    }
}

/// Linear interpolation on an increasing grid; the end segments extend
/// outside the grid.
fn interpolate(x: f64, xs: &[f64], ys: &[f64]) -> f64 {
    let upper = xs.partition_point(|&xi| xi < x).clamp(1, xs.len() - 1);
    let lower = upper - 1;
    if xs[upper] == x {
        return ys[upper];
    }
    ys[lower] + (ys[upper] - ys[lower]) * (x - xs[lower]) / (xs[upper] - xs[lower])
}

fn check_increasing(xs: &[f64]) -> Result<()> {
    match xs.windows(2).position(|w| w[1] <= w[0]) {
        Some(idx) => Err(MultitoneError::invalid_response(format!(
            "bias column not strictly increasing at row {}",
            idx + 1
        ))),
        None => Ok(()),
    }
}

fn read_columns(path: &Path) -> Result<Vec<(f64, f64)>> {
    let content = std::fs::read_to_string(path).map_err(|e| MultitoneError::file_read(path, e))?;
    Ok(parse_columns(&content))
}

fn parse_columns(content: &str) -> Vec<(f64, f64)> {
    content
        .lines()
        .filter_map(|line| {
            let mut fields = line.split_whitespace();
            let v = fields.next()?.parse::<f64>().ok()?;
            let i = fields.next()?.parse::<f64>().ok()?;
            Some((v, i))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::{assert_abs_diff_eq, assert_relative_eq};

    fn ohmic_columns(points: usize, v_max: f64) -> Vec<(f64, f64)> {
        (0..points)
            .map(|k| {
                let v = v_max * k as f64 / (points - 1) as f64;
                (v, v)
            })
            .collect()
    }

    #[test]
    fn test_parse_skips_headers_and_junk() {
        let text = "# bias\tcurrent\n0.0\t0.0\nbias current\n0.5\t0.25\n\n1.0 1.0 extra\nbad";
        assert_eq!(parse_columns(text), vec![(0.0, 0.0), (0.5, 0.25), (1.0, 1.0)]);
    }

    #[test]
    fn test_interpolate() {
        let xs = [0.0, 1.0, 2.0];
        let ys = [0.0, 10.0, 30.0];
        assert_relative_eq!(interpolate(0.5, &xs, &ys), 5.0);
        assert_relative_eq!(interpolate(1.0, &xs, &ys), 10.0);
        assert_relative_eq!(interpolate(1.5, &xs, &ys), 20.0);
        assert_relative_eq!(interpolate(2.0, &xs, &ys), 30.0);
    }

    #[test]
    fn test_rejects_bad_tables() {
        assert!(TabulatedResponse::new(vec![0.0], vec![0.0], vec![0.0], 1.0, 0.0).is_err());
        assert!(TabulatedResponse::new(vec![0.0, 1.0], vec![0.0], vec![0.0, 0.0], 1.0, 0.0).is_err());
        assert!(matches!(
            TabulatedResponse::new(vec![0.0, 1.0, 1.0], vec![0.0; 3], vec![0.0; 3], 1.0, 0.0),
            Err(MultitoneError::InvalidResponseData { .. })
        ));
    }

    #[test]
    fn test_kennedy_idc_is_odd_and_extrapolates() {
        let response = TabulatedResponse::kennedy(15, 2.0, 101).unwrap();
        assert_relative_eq!(response.idc(1.0), 0.5, epsilon = 1e-12);
        assert_relative_eq!(response.idc(-1.0), -0.5, epsilon = 1e-12);
        assert_abs_diff_eq!(response.idc(0.3), 0.0, epsilon = 1e-6);
        assert_relative_eq!(response.idc(3.0), 3.0, epsilon = 1e-12);
        assert_relative_eq!(response.idc(-3.0), -3.0, epsilon = 1e-12);
    }

    #[test]
    fn test_kennedy_kk_peaks_at_gap() {
        let response = TabulatedResponse::kennedy(15, 2.0, 101).unwrap();
        let at_gap = response.ikk(1.0);
        assert!(at_gap > response.ikk(0.3));
        assert!(at_gap > response.ikk(1.5));
        assert!(at_gap > 0.5);
        assert_eq!(response.ikk(-1.0), at_gap);
    }

    #[test]
    fn test_kk_clamped_beyond_grid() {
        let response = TabulatedResponse::kennedy(15, 2.0, 101).unwrap();
        let edge = response.ikk(2.0);
        assert_eq!(response.ikk(5.0), edge);
        assert_eq!(response.ikk(-7.5), edge);
    }

    #[test]
    fn test_ohmic_table_has_no_kk_current() {
        let iv = ohmic_columns(21, 2.0);
        let mut response = TabulatedResponse::from_columns(&iv, &iv, 1.0).unwrap();
        response.compute_kk();
        for v in [0.0, 0.45, 1.0, 1.9] {
            assert_abs_diff_eq!(response.ikk(v), 0.0, epsilon = 1e-9);
        }
    }

    #[test]
    fn test_normal_state_fit() {
        // Rn = 2, line I = 0.1 + v / 2 above the gap
        let iv: Vec<(f64, f64)> = (0..=20)
            .map(|k| {
                let v = 0.1 * k as f64;
                (v, 0.1 + v / 2.0)
            })
            .collect();
        let kk = vec![(0.0, 0.0), (2.0, 0.0)];
        let response = TabulatedResponse::from_columns(&iv, &kk, 1.0).unwrap();
        assert_relative_eq!(response.slope(), 0.5, epsilon = 1e-9);
        assert_relative_eq!(response.intercept(), 0.1, epsilon = 1e-9);
        assert_relative_eq!(response.idc(4.0), 2.1, epsilon = 1e-9);
    }

    #[test]
    fn test_from_files() {
        let dir = std::env::temp_dir();
        let idc_path = dir.join(format!("sis_multitone_idc_{}.dat", std::process::id()));
        let ikk_path = dir.join(format!("sis_multitone_ikk_{}.dat", std::process::id()));
        std::fs::write(&idc_path, "V\tI\n0.0\t0.0\n0.5\t0.5\n1.0\t1.0\n1.5\t1.5\n").unwrap();
        std::fs::write(&ikk_path, "0.0\t0.2\n1.5\t0.8\n").unwrap();

        let response = TabulatedResponse::from_files(&idc_path, &ikk_path, 1.0).unwrap();
        assert_eq!(response.bias_points().len(), 4);
        assert_relative_eq!(response.ikk(0.75), 0.5, epsilon = 1e-12);
        assert_relative_eq!(response.idc(-0.25), -0.25, epsilon = 1e-12);

        std::fs::remove_file(&idc_path).ok();
        std::fs::remove_file(&ikk_path).ok();
    }

    #[test]
    fn test_missing_file_is_reported() {
        let missing = Path::new("/nonexistent/sis_multitone/iv.dat");
        let err = TabulatedResponse::from_files(missing, missing, 1.0).unwrap_err();
        assert!(matches!(err, MultitoneError::FileReadError { .. }));
    }
}
