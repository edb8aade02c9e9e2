//! A pumping tone: an ordered set of harmonics and their composite spectrum.
//!
//! Each harmonic `p` phase-modulates the junction independently, so the
//! composite sideband spectrum is the convolution of all harmonics'
//! coefficient vectors, harmonic `j` contributing at stride `j`:
//!
//! ```text
//! C(1, k) = A_1(k)
//! C(j, k) = Σ_m C(j-1, k - j·m) · A_j(m)      j ≥ 2
//! Ck(k)   = C(N, k)
//! ```
//!
//! The table is built bottom-up, one level per harmonic, every level
//! truncated to `[-totalJ, totalJ]`. The truncation order adapts until the
//! closure relation `Σ|Ck|² = 1` holds to the tone's target accuracy.

use log::{debug, warn};
use num_complex::Complex64;

use crate::error::{MultitoneError, Result};
use crate::response::ResponseFunction;

use super::current::mixer_current;
use super::harmonic::{Harmonic, HarmonicParams, PhaseReference};

/// Lowest truncation order the adaptive search will use.
pub const MIN_TOTAL_J: usize = 15;

/// Highest truncation order the adaptive search will use.
pub const MAX_TOTAL_J: usize = 50;

/// Default closure-relation target for `Delta_Ck`.
pub const DEFAULT_TARGET_DELTA_CK: f64 = 1.0e-13;

/// Truncation order increment when the spectrum is not accurate enough.
const GROW_STEP: usize = 5;

/// Truncation order decrement when the spectrum is needlessly accurate.
const SHRINK_STEP: usize = 2;

/// `Delta_Ck` below this fraction of the target shrinks the order.
const SHRINK_RATIO: f64 = 1.0e-5;

/// Composite spectrum for one truncation order.
///
/// `levels[j - 1]` holds `C(j, k)` at index `k + totalJ`.
#[derive(Debug, Clone)]
pub struct SpectrumTable {
    total_j: usize,
    levels: Vec<Vec<Complex64>>,
}

impl SpectrumTable {
    /// Convolve the harmonics' coefficient vectors.
    ///
    /// All harmonics must share the same truncation order.
    pub fn build(harmonics: &mut [Harmonic]) -> Self {
        let total_j = harmonics.first().map_or(0, |h| h.total_j());
        let mut levels: Vec<Vec<Complex64>> = Vec::with_capacity(harmonics.len());

        for (idx, harmonic) in harmonics.iter_mut().enumerate() {
            let anp = harmonic.coefficients();
            let level = match levels.last() {
                None => anp.to_vec(),
                Some(prev) => convolve(prev, anp, idx as i32 + 1, total_j as i32),
            };
            levels.push(level);
        }

        Self { total_j, levels }
    }

    /// Truncation order of this table.
    pub fn total_j(&self) -> usize {
        self.total_j
    }

    /// Number of harmonics convolved into this table.
    pub fn num_harmonics(&self) -> usize {
        self.levels.len()
    }

    /// `C(j, k)` for harmonic `j` in `1..=N`. Zero for `|k| > totalJ`.
    pub fn cjk(&self, j: usize, k: i32) -> Result<Complex64> {
        if j == 0 || j > self.levels.len() {
            return Err(MultitoneError::invalid_harmonic(j, self.levels.len()));
        }
        Ok(lookup(&self.levels[j - 1], self.total_j as i32, k))
    }

    /// Composite coefficient `Ck(k) = C(N, k)`. Zero for `|k| > totalJ`.
    pub fn ck(&self, k: i32) -> Complex64 {
        match self.levels.last() {
            Some(level) => lookup(level, self.total_j as i32, k),
            None => Complex64::new(0.0, 0.0),
        }
    }

    /// Closure-relation error `|Σ_k Ck·conj(Ck) - 1|`.
    pub fn unitarity_error(&self) -> f64 {
        let sum: f64 = self
            .levels
            .last()
            .map_or(0.0, |level| level.iter().map(|c| (c * c.conj()).re).sum());
        (sum - 1.0).abs()
    }
}

fn lookup(level: &[Complex64], total_j: i32, k: i32) -> Complex64 {
    if k.abs() > total_j {
        Complex64::new(0.0, 0.0)
    } else {
        level[(k + total_j) as usize]
    }
}

/// One convolution level: `Σ_m prev(k - order·m) · anp(m)`, truncated.
fn convolve(prev: &[Complex64], anp: &[Complex64], order: i32, total_j: i32) -> Vec<Complex64> {
    (-total_j..=total_j)
        .map(|k| {
            // |k - order·m| <= totalJ
            let m_lo = (-((total_j - k).div_euclid(order))).max(-total_j);
            let m_hi = (k + total_j).div_euclid(order).min(total_j);
            (m_lo..=m_hi)
                .map(|m| prev[(k - order * m + total_j) as usize] * anp[(m + total_j) as usize])
                .sum::<Complex64>()
        })
        .collect()
}

#[derive(Debug, Clone)]
struct CachedSpectrum {
    generation: u64,
    table: SpectrumTable,
    delta_ck: f64,
}

/// A tone (fundamental frequency) made of harmonics `1..=N`.
///
/// Holds per-harmonic source voltage `Vs`, embedding impedance `Z` and
/// nonlinear junction voltage `Vn`. The composite spectrum is rebuilt on
/// demand from `Vn` whenever the tone has changed since the last build.
#[derive(Debug, Clone)]
pub struct Tone {
    w0: f64,
    w_gap: f64,
    harmonics: Vec<Harmonic>,
    vs: Vec<Complex64>,
    z: Vec<Complex64>,
    vn: Vec<Complex64>,
    total_j: usize,
    target_delta_ck: f64,
    phase_reference: PhaseReference,
    /// Bumped on every mutation
    generation: u64,
    spectrum: Option<CachedSpectrum>,
}

impl Tone {
    /// Create a tone with a single (fundamental) harmonic.
    pub fn new(w0: f64, w_gap: f64, vs: Complex64, z: Complex64) -> Self {
        let vn = Complex64::new(1.0, 0.0);
        Self {
            w0,
            w_gap,
            harmonics: vec![Harmonic::new(MIN_TOTAL_J, 1, vn, w0, w_gap)],
            vs: vec![vs],
            z: vec![z],
            vn: vec![vn],
            total_j: MIN_TOTAL_J,
            target_delta_ck: DEFAULT_TARGET_DELTA_CK,
            phase_reference: PhaseReference::default(),
            generation: 0,
            spectrum: None,
        }
    }

    /// Append harmonic `N+1`. Returns the new number of harmonics.
    pub fn add_harmonic(&mut self, vs: Complex64, z: Complex64) -> usize {
        let order = self.harmonics.len() as u32 + 1;
        let vn = Complex64::new(1.0, 0.0);
        self.harmonics
            .push(Harmonic::new(self.total_j, order, vn, self.w0, self.w_gap));
        self.vs.push(vs);
        self.z.push(z);
        self.vn.push(vn);
        self.touch();
        self.harmonics.len()
    }

    /// Remove the highest harmonic. Returns the new number of harmonics.
    ///
    /// Harmonics stay a contiguous set, so only the last one can go, and
    /// the fundamental is never removed.
    pub fn remove_harmonic(&mut self) -> Result<usize> {
        if self.harmonics.len() <= 1 {
            return Err(MultitoneError::LastHarmonic);
        }
        self.harmonics.pop();
        self.vs.pop();
        self.z.pop();
        self.vn.pop();
        self.touch();
        Ok(self.harmonics.len())
    }

    /// Number of harmonics `N`.
    pub fn num_harmonics(&self) -> usize {
        self.harmonics.len()
    }

    /// Harmonic of order `n` (1-based).
    pub fn harmonic(&self, n: usize) -> Result<&Harmonic> {
        let slot = self.slot(n)?;
        Ok(&self.harmonics[slot])
    }

    /// Fundamental angular frequency.
    pub fn w0(&self) -> f64 {
        self.w0
    }

    pub fn set_w0(&mut self, w0: f64) {
        self.w0 = w0;
        self.touch();
    }

    /// Gap angular frequency.
    pub fn w_gap(&self) -> f64 {
        self.w_gap
    }

    pub fn set_w_gap(&mut self, w_gap: f64) {
        self.w_gap = w_gap;
        self.touch();
    }

    /// Photon voltage `w0 / w_gap`: bias offset between adjacent sidebands.
    pub fn vph(&self) -> f64 {
        self.w0 / self.w_gap
    }

    /// Source voltage at harmonic `n`.
    pub fn vs(&self, n: usize) -> Result<Complex64> {
        Ok(self.vs[self.slot(n)?])
    }

    pub fn set_vs(&mut self, n: usize, v: Complex64) -> Result<()> {
        let slot = self.slot(n)?;
        self.vs[slot] = v;
        self.touch();
        Ok(())
    }

    /// Embedding impedance at harmonic `n`.
    pub fn z(&self, n: usize) -> Result<Complex64> {
        Ok(self.z[self.slot(n)?])
    }

    pub fn set_z(&mut self, n: usize, z: Complex64) -> Result<()> {
        let slot = self.slot(n)?;
        self.z[slot] = z;
        self.touch();
        Ok(())
    }

    /// Nonlinear junction voltage at harmonic `n`.
    pub fn vn(&self, n: usize) -> Result<Complex64> {
        Ok(self.vn[self.slot(n)?])
    }

    pub fn set_vn(&mut self, n: usize, v: Complex64) -> Result<()> {
        let slot = self.slot(n)?;
        self.vn[slot] = v;
        self.touch();
        Ok(())
    }

    /// Current truncation order.
    pub fn total_j(&self) -> usize {
        self.total_j
    }

    /// Closure-relation error of the cached spectrum, if one has been built.
    pub fn delta_ck(&self) -> Option<f64> {
        self.spectrum.as_ref().map(|cached| cached.delta_ck)
    }

    /// Target closure-relation error (`Delta_Ck_0`).
    pub fn target_delta_ck(&self) -> f64 {
        self.target_delta_ck
    }

    pub fn set_target_delta_ck(&mut self, target: f64) {
        self.target_delta_ck = target;
        self.touch();
    }

    pub fn phase_reference(&self) -> PhaseReference {
        self.phase_reference
    }

    pub fn set_phase_reference(&mut self, phase_reference: PhaseReference) {
        self.phase_reference = phase_reference;
        self.touch();
    }

    /// True when the cached spectrum reflects every mutation so far.
    pub fn is_spectrum_current(&self) -> bool {
        self.spectrum
            .as_ref()
            .is_some_and(|cached| cached.generation == self.generation)
    }

    /// Bring the composite spectrum up to date and return it.
    ///
    /// The truncation-order search runs to completion before this returns.
    pub fn refresh(&mut self) -> &SpectrumTable {
        let cached = match self.spectrum.take() {
            Some(cached) if cached.generation == self.generation => cached,
            _ => self.rebuild(),
        };
        &self.spectrum.insert(cached).table
    }

    /// `C(j, k)` for harmonic `j` in `1..=N`.
    pub fn cjk(&mut self, j: usize, k: i32) -> Result<Complex64> {
        self.refresh().cjk(j, k)
    }

    /// Two-harmonic convolution `C(2, k)`; needs at least two harmonics.
    pub fn c2k(&mut self, k: i32) -> Result<Complex64> {
        self.cjk(2, k)
    }

    /// Composite spectrum coefficient `Ck(k)`.
    pub fn ck(&mut self, k: i32) -> Complex64 {
        self.refresh().ck(k)
    }

    /// Mixer current at harmonic `n` for DC bias `bias`.
    pub fn ip<R: ResponseFunction + ?Sized>(&mut self, response: &R, bias: f64, n: i32) -> Complex64 {
        let vph = self.vph();
        mixer_current(self.refresh(), vph, response, bias, n)
    }

    fn slot(&self, n: usize) -> Result<usize> {
        if n == 0 || n > self.harmonics.len() {
            Err(MultitoneError::invalid_harmonic(n, self.harmonics.len()))
        } else {
            Ok(n - 1)
        }
    }

    fn touch(&mut self) {
        self.generation = self.generation.wrapping_add(1);
    }

    /// Push the tone's state into each harmonic's parameter tuple.
    fn sync_harmonics(&mut self) {
        for (idx, harmonic) in self.harmonics.iter_mut().enumerate() {
            harmonic.set_params(HarmonicParams {
                total_j: self.total_j,
                order: idx as u32 + 1,
                vp: self.vn[idx],
                w0: self.w0,
                w_gap: self.w_gap,
                phase_reference: self.phase_reference,
            });
        }
    }

    /// Build the spectrum, adapting `totalJ` within `[15, 50]`.
    fn rebuild(&mut self) -> CachedSpectrum {
        // Orders that missed the target; never shrink back onto them
        let mut floor = MIN_TOTAL_J;

        loop {
            self.sync_harmonics();
            let table = SpectrumTable::build(&mut self.harmonics);
            let delta_ck = table.unitarity_error();

            if delta_ck > self.target_delta_ck && self.total_j < MAX_TOTAL_J {
                floor = self.total_j + 1;
                let next = (self.total_j + GROW_STEP).min(MAX_TOTAL_J);
                debug!(
                    "Delta_Ck {:.2e} above target, totalJ {} -> {}",
                    delta_ck, self.total_j, next
                );
                self.total_j = next;
                continue;
            }

            if delta_ck < SHRINK_RATIO * self.target_delta_ck && self.total_j > floor {
                let next = self.total_j.saturating_sub(SHRINK_STEP).max(floor);
                debug!(
                    "Delta_Ck {:.2e} well below target, totalJ {} -> {}",
                    delta_ck, self.total_j, next
                );
                self.total_j = next;
                continue;
            }

            if delta_ck > self.target_delta_ck {
                warn!(
                    "Spectrum saturated at totalJ = {} with Delta_Ck {:.2e} (target {:.2e})",
                    self.total_j, delta_ck, self.target_delta_ck
                );
            }

            return CachedSpectrum {
                generation: self.generation,
                table,
                delta_ck,
            };
        }
    }
}
