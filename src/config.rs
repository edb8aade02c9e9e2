//! TOML job files.
//!
//! A job names a junction response, a DC bias, optional solver overrides and
//! one or more tones with their harmonics:
//!
//! ```toml
//! bias = 0.8
//!
//! [response]
//! kennedy = { order = 15, max_bias = 2.0, points = 201 }
//!
//! [[tone]]
//! w0 = 0.3
//! [[tone.harmonic]]
//! vs = [0.5, 0.0]
//! z  = [0.3, 0.1]
//! ```

use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::constants::normalized_frequency;
use crate::error::{MultitoneError, Result};
use crate::response::TabulatedResponse;
use crate::solver::{BalanceConfig, HarmonicBalance};
use crate::spectrum::{PhaseReference, Tone};
use crate::Complex64;

/// Top-level job configuration.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct JobConfig {
    /// Normalised DC bias
    pub bias: f64,
    pub response: ResponseConfig,
    #[serde(default)]
    pub solver: SolverConfig,
    #[serde(rename = "tone")]
    pub tones: Vec<ToneConfig>,
    /// File the job was read from; data paths are relative to it
    #[serde(skip)]
    pub source: PathBuf,
}

/// Junction response: a Kennedy fit or tabulated data files.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum ResponseConfig {
    Kennedy {
        kennedy: KennedyConfig,
    },
    Tabulated {
        idc: PathBuf,
        ikk: PathBuf,
        #[serde(default = "default_v_gap")]
        v_gap: f64,
    },
}

/// Kennedy polynomial I-V fit.
#[derive(Debug, Deserialize)]
pub struct KennedyConfig {
    #[serde(default = "default_kennedy_order")]
    pub order: u32,
    #[serde(default = "default_max_bias")]
    pub max_bias: f64,
    #[serde(default = "default_points")]
    pub points: usize,
}

fn default_v_gap() -> f64 {
    1.0
}
fn default_kennedy_order() -> u32 {
    15
}
fn default_max_bias() -> f64 {
    2.0
}
fn default_points() -> usize {
    201
}

/// Which harmonics become unknowns.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SolveMode {
    /// Harmonics with nonzero `Z`; the rest are pinned to `Vs`
    #[default]
    Embedded,
    /// Every harmonic
    All,
}

/// Solver overrides; unset fields keep their defaults.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SolverConfig {
    pub tolerance: Option<f64>,
    pub max_iterations: Option<usize>,
    pub step_factor: Option<f64>,
    pub min_step: Option<f64>,
    pub max_x: Option<f64>,
    #[serde(default)]
    pub solve: SolveMode,
}

impl SolverConfig {
    /// Apply the overrides to the default configuration.
    pub fn balance_config(&self) -> BalanceConfig {
        let mut config = BalanceConfig::default();
        if let Some(tolerance) = self.tolerance {
            config = config.with_tolerance(tolerance);
        }
        if let Some(max_iterations) = self.max_iterations {
            config = config.with_max_iterations(max_iterations);
        }
        if let Some(step_factor) = self.step_factor {
            config = config.with_step_factor(step_factor);
        }
        if let Some(min_step) = self.min_step {
            config = config.with_min_step(min_step);
        }
        if let Some(max_x) = self.max_x {
            config = config.with_max_x(max_x);
        }
        config
    }
}

/// Phase reference as written in job files.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PhaseReferenceConfig {
    #[default]
    Uniform,
    PerSideband,
}

impl From<PhaseReferenceConfig> for PhaseReference {
    fn from(value: PhaseReferenceConfig) -> Self {
        match value {
            PhaseReferenceConfig::Uniform => PhaseReference::Uniform,
            PhaseReferenceConfig::PerSideband => PhaseReference::PerSideband,
        }
    }
}

/// One tone. The frequency is either `w0` (already normalised to the gap
/// frequency) or `frequency_ghz` with `gap_voltage_mv`.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ToneConfig {
    pub w0: Option<f64>,
    pub frequency_ghz: Option<f64>,
    pub gap_voltage_mv: Option<f64>,
    #[serde(default)]
    pub phase_reference: PhaseReferenceConfig,
    pub target_delta_ck: Option<f64>,
    #[serde(rename = "harmonic")]
    pub harmonics: Vec<HarmonicConfig>,
}

/// One harmonic; complex values are `[re, im]`.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct HarmonicConfig {
    pub vs: [f64; 2],
    pub z: [f64; 2],
    /// Initial guess for `Vn`
    pub vn: Option<[f64; 2]>,
}

fn complex([re, im]: [f64; 2]) -> Complex64 {
    Complex64::new(re, im)
}

/// Load and parse a TOML job file.
pub fn load_config(path: &Path) -> Result<JobConfig> {
    let content = std::fs::read_to_string(path).map_err(|e| MultitoneError::file_read(path, e))?;
    parse_config(&content, path)
}

/// Parse a job from TOML text; `source` is used for messages and relative paths.
pub fn parse_config(content: &str, source: &Path) -> Result<JobConfig> {
    let mut config: JobConfig = toml::from_str(content).map_err(|e| MultitoneError::ConfigError {
        path: source.display().to_string(),
        message: e.to_string(),
    })?;
    config.source = source.to_path_buf();
    Ok(config)
}

impl JobConfig {
    /// Build the response, tones and unknowns described by this job.
    pub fn build(&self) -> Result<HarmonicBalance<TabulatedResponse>> {
        if self.tones.is_empty() {
            return Err(self.error("job has no [[tone]] entries"));
        }

        let response = self.build_response()?;
        let mut balance = HarmonicBalance::new(response, self.bias, self.solver.balance_config());
        for (index, tone) in self.tones.iter().enumerate() {
            balance.add_tone(self.build_tone(index, tone)?);
        }

        match self.solver.solve {
            SolveMode::Embedded => balance.solve_embedded()?,
            SolveMode::All => balance.solve_all()?,
        }
        Ok(balance)
    }

    fn build_response(&self) -> Result<TabulatedResponse> {
        match &self.response {
            ResponseConfig::Kennedy { kennedy } => {
                TabulatedResponse::kennedy(kennedy.order, kennedy.max_bias, kennedy.points)
            }
            ResponseConfig::Tabulated { idc, ikk, v_gap } => {
                TabulatedResponse::from_files(&self.resolve(idc), &self.resolve(ikk), *v_gap)
            }
        }
    }

    fn build_tone(&self, index: usize, config: &ToneConfig) -> Result<Tone> {
        let w0 = match (config.w0, config.frequency_ghz, config.gap_voltage_mv) {
            (Some(w0), None, None) => w0,
            (None, Some(ghz), Some(mv)) => normalized_frequency(ghz * 1e9, mv * 1e-3),
            _ => {
                return Err(self.error(format!(
                    "tone {index}: give either w0 or frequency_ghz with gap_voltage_mv"
                )))
            }
        };
        if !(w0 > 0.0 && w0.is_finite()) {
            return Err(self.error(format!("tone {index}: w0 must be positive, got {w0}")));
        }

        let (first, rest) = config
            .harmonics
            .split_first()
            .ok_or_else(|| self.error(format!("tone {index} has no [[tone.harmonic]] entries")))?;

        let mut tone = Tone::new(w0, 1.0, complex(first.vs), complex(first.z));
        for harmonic in rest {
            tone.add_harmonic(complex(harmonic.vs), complex(harmonic.z));
        }
        for (n, harmonic) in config.harmonics.iter().enumerate() {
            if let Some(vn) = harmonic.vn {
                tone.set_vn(n + 1, complex(vn))?;
            }
        }
        tone.set_phase_reference(config.phase_reference.into());
        if let Some(target) = config.target_delta_ck {
            tone.set_target_delta_ck(target);
        }
        Ok(tone)
    }

    fn resolve(&self, path: &Path) -> PathBuf {
        match self.source.parent() {
            Some(dir) if path.is_relative() => dir.join(path),
            _ => path.to_path_buf(),
        }
    }

    fn error(&self, message: impl Into<String>) -> MultitoneError {
        MultitoneError::ConfigError {
            path: self.source.display().to_string(),
            message: message.into(),
        }
    }
}
