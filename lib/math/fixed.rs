//! Signed 64.64 fixed-point arithmetic.
//!
//! A [`Fixed`] stores `real * 2^64` in an `i128`, giving a range of roughly
//! `±9.2e18` with a resolution of `2^-64`. Products and quotients go through
//! 256-bit intermediates and every operation is checked; nothing wraps.
//!
//! `exp` and `ln` are evaluated with range reduction and a short series. Over
//! the domain used by the cost function their relative error stays below
//! `1e-15`; results are deterministic to the last bit.

use borsh::{BorshDeserialize, BorshSerialize};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::math::wide;

pub const FRACTIONAL_BITS: u32 = 64;

const ONE_RAW: i128 = 1 << FRACTIONAL_BITS;
const HALF_RAW: i128 = 1 << (FRACTIONAL_BITS - 1);
/// ln(2) * 2^64, rounded to nearest
const LN_2_RAW: i128 = 12_786_308_645_202_655_660;
/// e * 2^64, rounded to nearest
const E_RAW: i128 = 50_143_449_209_799_256_683;
/// Coarse bounds on the argument of `exp`. The exact overflow point,
/// `ln(2^63)`, is detected while scaling the reduced result.
const EXP_MAX_INPUT: i128 = 44 << FRACTIONAL_BITS;
const EXP_MIN_INPUT: i128 = -(46 << FRACTIONAL_BITS);

#[derive(Clone, Copy, Debug, Error, Eq, PartialEq)]
pub enum MathError {
    #[error("arithmetic overflow")]
    ArithmeticOverflow,
    #[error("division by zero")]
    DivisionByZero,
    #[error("argument outside the function domain")]
    DomainError,
}

/// Signed fixed-point number with 64 fractional bits.
#[derive(
    BorshDeserialize,
    BorshSerialize,
    Clone,
    Copy,
    Debug,
    Default,
    Deserialize,
    Eq,
    Hash,
    Ord,
    PartialEq,
    PartialOrd,
    Serialize,
)]
#[repr(transparent)]
#[serde(transparent)]
pub struct Fixed(i128);

impl Fixed {
    pub const ZERO: Self = Self(0);
    pub const ONE: Self = Self(ONE_RAW);
    pub const LN_2: Self = Self(LN_2_RAW);
    pub const E: Self = Self(E_RAW);
    pub const MAX: Self = Self(i128::MAX);
    pub const MIN: Self = Self(i128::MIN);

    pub const fn from_bits(bits: i128) -> Self {
        Self(bits)
    }

    pub const fn to_bits(self) -> i128 {
        self.0
    }

    pub const fn from_int(n: i64) -> Self {
        Self((n as i128) << FRACTIONAL_BITS)
    }

    /// `numerator / denominator`, truncated toward zero.
    pub fn from_ratio(numerator: i64, denominator: i64) -> Result<Self, MathError> {
        Self::from_int(numerator).checked_div(Self::from_int(denominator))
    }

    /// Integer part, rounded toward negative infinity.
    pub const fn floor_int(self) -> i128 {
        self.0 >> FRACTIONAL_BITS
    }

    /// Lossy conversion, for logging and display only.
    pub fn to_f64(self) -> f64 {
        self.0 as f64 / ONE_RAW as f64
    }

    pub const fn is_positive(self) -> bool {
        self.0 > 0
    }

    pub const fn is_negative(self) -> bool {
        self.0 < 0
    }

    /// Distance between two values in units of `2^-64`.
    pub const fn abs_diff(self, other: Self) -> u128 {
        self.0.abs_diff(other.0)
    }

    pub fn checked_add(self, other: Self) -> Result<Self, MathError> {
        self.0
            .checked_add(other.0)
            .map(Self)
            .ok_or(MathError::ArithmeticOverflow)
    }

    pub fn checked_sub(self, other: Self) -> Result<Self, MathError> {
        self.0
            .checked_sub(other.0)
            .map(Self)
            .ok_or(MathError::ArithmeticOverflow)
    }

    pub fn checked_neg(self) -> Result<Self, MathError> {
        self.0
            .checked_neg()
            .map(Self)
            .ok_or(MathError::ArithmeticOverflow)
    }

    /// Product, truncated toward zero.
    pub fn checked_mul(self, other: Self) -> Result<Self, MathError> {
        let negative = self.is_negative() != other.is_negative();
        let (high, low) =
            wide::widening_mul(self.0.unsigned_abs(), other.0.unsigned_abs());
        let magnitude =
            wide::shr64(high, low).ok_or(MathError::ArithmeticOverflow)?;
        from_magnitude(magnitude, negative)
    }

    /// Quotient, truncated toward zero.
    pub fn checked_div(self, other: Self) -> Result<Self, MathError> {
        if other.0 == 0 {
            return Err(MathError::DivisionByZero);
        }
        let negative = self.is_negative() != other.is_negative();
        let dividend = self.0.unsigned_abs();
        let (magnitude, _) = wide::div_rem_wide(
            dividend >> (128 - FRACTIONAL_BITS),
            dividend << FRACTIONAL_BITS,
            other.0.unsigned_abs(),
        )
        .ok_or(MathError::ArithmeticOverflow)?;
        from_magnitude(magnitude, negative)
    }

    /// Sum of a slice, checked.
    pub fn checked_sum(values: &[Self]) -> Result<Self, MathError> {
        values
            .iter()
            .try_fold(Self::ZERO, |acc, value| acc.checked_add(*value))
    }
}

impl std::fmt::Display for Fixed {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.to_f64())
    }
}

fn from_magnitude(magnitude: u128, negative: bool) -> Result<Fixed, MathError> {
    if negative {
        0i128
            .checked_sub_unsigned(magnitude)
            .map(Fixed)
            .ok_or(MathError::ArithmeticOverflow)
    } else {
        i128::try_from(magnitude)
            .map(Fixed)
            .map_err(|_| MathError::ArithmeticOverflow)
    }
}

pub fn mul(a: Fixed, b: Fixed) -> Result<Fixed, MathError> {
    a.checked_mul(b)
}

pub fn div(a: Fixed, b: Fixed) -> Result<Fixed, MathError> {
    a.checked_div(b)
}

/// Natural exponential.
///
/// Fails with [`MathError::ArithmeticOverflow`] once the result exceeds the
/// representable range (`x > ln(2^63)`); underflows to zero below `-46`.
pub fn exp(x: Fixed) -> Result<Fixed, MathError> {
    if x.0 > EXP_MAX_INPUT {
        return Err(MathError::ArithmeticOverflow);
    }
    if x.0 < EXP_MIN_INPUT {
        return Ok(Fixed::ZERO);
    }
    if x.0 == 0 {
        return Ok(Fixed::ONE);
    }

    // x = k * ln(2) + r with |r| <= ln(2) / 2
    let k = x.checked_div(Fixed::LN_2)?.0.saturating_add(HALF_RAW)
        >> FRACTIONAL_BITS;
    let r = x.checked_sub(Fixed(LN_2_RAW * k))?;

    let mut sum = ONE_RAW;
    let mut term = ONE_RAW;
    let mut n = 1i128;
    loop {
        term = Fixed(term).checked_mul(r)?.0 / n;
        if term == 0 {
            break;
        }
        sum += term;
        n += 1;
    }

    // exp(r) is within [0.70, 1.42], so `sum` is positive
    if k >= 0 {
        let shift = k as u32;
        if sum.leading_zeros() <= shift {
            return Err(MathError::ArithmeticOverflow);
        }
        Ok(Fixed(sum << shift))
    } else {
        let shift = k.unsigned_abs();
        if shift >= 128 {
            return Ok(Fixed::ZERO);
        }
        Ok(Fixed(sum >> shift))
    }
}

/// Natural logarithm. Fails with [`MathError::DomainError`] unless `x > 0`.
pub fn ln(x: Fixed) -> Result<Fixed, MathError> {
    if x.0 <= 0 {
        return Err(MathError::DomainError);
    }
    let raw = x.0.unsigned_abs();

    // x = 2^k * m with m in [1, 2)
    let k = (127 - raw.leading_zeros() as i128) - FRACTIONAL_BITS as i128;
    let m = if k >= 0 {
        raw >> k as u32
    } else {
        raw << k.unsigned_abs() as u32
    };
    let m = Fixed(m as i128);

    // ln(m) = 2 * atanh(z), z = (m - 1) / (m + 1) in [0, 1/3)
    let z = m.checked_sub(Fixed::ONE)?.checked_div(m.checked_add(Fixed::ONE)?)?;
    let z_squared = z.checked_mul(z)?;
    let mut power = z;
    let mut denominator = 1i128;
    let mut series = 0i128;
    loop {
        let term = power.0 / denominator;
        if term == 0 {
            break;
        }
        series += term;
        power = power.checked_mul(z_squared)?;
        denominator += 2;
    }

    Fixed(LN_2_RAW * k).checked_add(Fixed(series * 2))
}
