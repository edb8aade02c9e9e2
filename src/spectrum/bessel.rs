//! Integer-order Bessel functions of the first kind.
//!
//! Uses Miller's downward recurrence (Abramowitz & Stegun 9.1.27):
//!   J_{j-1}(x) = 2j/x · J_j(x) - J_{j+1}(x)
//!
//! seeded far above the wanted order with an arbitrary small value, then
//! normalised with the sum rule
//!   J_0(x) + 2 · Σ_{k even, k>0} J_k(x) = 1
//!
//! Downward recurrence is stable for J but the unnormalised values grow
//! without bound, so the working array is rescaled whenever an entry gets
//! large. Below `SMALL_ARGUMENT` the leading term of the power series
//!   J_m(x) ≈ (x/2)^m / m!
//!
//! is exact to double precision and the recurrence would overflow.

/// Recurrence depth added on top of `2·|n|`.
const BASE_DEPTH: usize = 50;

/// Seed for the second-highest entry of the recurrence.
const SEED: f64 = 1.0e-30;

/// Magnitude above which the working array is rescaled.
const RESCALE_THRESHOLD: f64 = 1.0e10;

/// Factor applied on each rescale.
const RESCALE_FACTOR: f64 = 1.0e-15;

/// `|x|` below this uses the small-argument series.
const SMALL_ARGUMENT: f64 = 1.0e-100;

/// Largest `|n|` evaluated; higher orders are zero to double precision for
/// any argument the recurrence depth can resolve.
pub const MAX_BESSEL_ORDER: u32 = 1000;

/// Bessel function of the first kind `J_n(x)` for integer order `n`.
///
/// Never fails: `J_0(0) = 1`, `J_n(0) = 0` for `n != 0`, and negative orders
/// use `J_{-m}(x) = (-1)^m J_m(x)`. Negative `x` runs through the same
/// recurrence unchanged, which is sign-symmetric and so yields
/// `J_n(-x) = (-1)^n J_n(x)`. Orders with `|n| > MAX_BESSEL_ORDER` return 0.
pub fn jnx(n: i32, x: f64) -> f64 {
    if x == 0.0 {
        return if n == 0 { 1.0 } else { 0.0 };
    }
    if n.unsigned_abs() > MAX_BESSEL_ORDER {
        return 0.0;
    }

    let abs_n = n.unsigned_abs() as usize;
    let value = if x.abs() < SMALL_ARGUMENT {
        small_argument(abs_n, x)
    } else {
        downward_recurrence(abs_n, x)
    };

    if n < 0 && abs_n % 2 == 1 {
        -value
    } else {
        value
    }
}

/// `(x/2)^m / m!`, stopping once the term underflows.
fn small_argument(abs_n: usize, x: f64) -> f64 {
    let mut term = 1.0;
    for k in 1..=abs_n {
        term *= x / (2.0 * k as f64);
        if term == 0.0 {
            break;
        }
    }
    term
}

/// Miller's algorithm for `J_m(x)`, `m >= 0`.
fn downward_recurrence(abs_n: usize, x: f64) -> f64 {
    let depth = BASE_DEPTH + 2 * abs_n;

    let mut j = vec![0.0f64; depth];
    j[depth - 2] = SEED;

    for idx in (0..depth - 2).rev() {
        j[idx] = 2.0 * (idx as f64 + 1.0) / x * j[idx + 1] - j[idx + 2];

        // Tiny |x| grows faster than one rescale can absorb
        while j[idx].abs() > RESCALE_THRESHOLD {
            for value in &mut j[idx..] {
                *value *= RESCALE_FACTOR;
            }
        }
    }

    let norm = j[0] + 2.0 * j.iter().skip(2).step_by(2).sum::<f64>();
    j[abs_n] / norm
}
