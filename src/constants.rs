//! Physical constants and frequency normalisation.
//!
//! The simulator works in normalised units: voltages are scaled by the gap
//! voltage and angular frequencies by the gap frequency `e·V_gap/ħ`. These
//! helpers convert laboratory quantities into that system.

use std::f64::consts::PI;

/// Speed of light in vacuum (m/s)
pub const SPEED_OF_LIGHT: f64 = 2.997_924_58e8;

/// Planck constant (J·s)
pub const PLANCK: f64 = 6.626_070_15e-34;

/// Reduced Planck constant (J·s)
pub const HBAR: f64 = PLANCK / (2.0 * PI);

/// Elementary charge (C)
pub const ELECTRON_CHARGE: f64 = 1.602_176_634e-19;

/// Smallest meaningful difference between two normalised quantities
pub const DOUBLE_PRECISION: f64 = 1.0e-15;

/// Gap angular frequency `e·V_gap/ħ` for a gap voltage in volts.
pub fn gap_angular_frequency(v_gap: f64) -> f64 {
    ELECTRON_CHARGE * v_gap / HBAR
}

/// Angular frequency of `frequency_hz`, normalised to the gap frequency.
pub fn normalized_frequency(frequency_hz: f64, v_gap: f64) -> f64 {
    2.0 * PI * frequency_hz / gap_angular_frequency(v_gap)
}
