//! Exact arithmetic for marks.
//!
//! Entered marks are carried as integer hundredths and blended as an exact
//! fraction, so the single rounding step never sees binary float error.

use std::cmp::Ordering;

/// Non-negative fraction kept in lowest terms.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ratio {
    num: i128,
    den: i128,
}

fn gcd(mut a: i128, mut b: i128) -> i128 {
    a = a.abs();
    b = b.abs();
    while b != 0 {
        let t = a % b;
        a = b;
        b = t;
    }
    a.max(1)
}

impl Ratio {
    pub const ZERO: Ratio = Ratio { num: 0, den: 1 };

    /// `den` must be positive.
    pub fn new(num: i128, den: i128) -> Self {
        debug_assert!(den > 0, "ratio denominator must be positive");
        let g = gcd(num, den);
        Ratio {
            num: num / g,
            den: den / g,
        }
    }

    pub fn add(self, other: Ratio) -> Ratio {
        let g = gcd(self.den, other.den);
        let den = (self.den / g) * other.den;
        let num = self.num * (other.den / g) + other.num * (self.den / g);
        Ratio::new(num, den)
    }

    pub fn round_half_away(self) -> i128 {
        round_half_away_from_zero(self.num, self.den)
    }
}

/// Integer division rounded to nearest, halves away from zero. `den > 0`.
pub fn round_half_away_from_zero(num: i128, den: i128) -> i128 {
    let q = (2 * num.abs() + den) / (2 * den);
    if num < 0 {
        -q
    } else {
        q
    }
}

/// Converts an entered mark to hundredths. `None` for non-finite values or
/// values with more than two decimal places.
pub fn to_hundredths(value: f64) -> Option<i64> {
    if !value.is_finite() {
        return None;
    }
    let scaled = value * 100.0;
    let rounded = scaled.round();
    if (scaled - rounded).abs() > 1e-6 || rounded.abs() > 1e15 {
        return None;
    }
    Some(rounded as i64)
}

pub fn percentage(obtained: u64, max: u64) -> f64 {
    if max == 0 {
        return 0.0;
    }
    100.0 * obtained as f64 / max as f64
}

/// Percentage rounded to two decimals, half away from zero, computed from
/// the integer totals rather than from the float percentage.
pub fn display_percentage(obtained: u64, max: u64) -> f64 {
    if max == 0 {
        return 0.0;
    }
    let hundredths = round_half_away_from_zero(10_000 * obtained as i128, max as i128);
    hundredths as f64 / 100.0
}

/// Orders `a_num/a_den` against `b_num/b_den` without division.
pub fn cmp_fraction(a_num: u64, a_den: u64, b_num: u64, b_den: u64) -> Ordering {
    (a_num as u128 * b_den as u128).cmp(&(b_num as u128 * a_den as u128))
}
