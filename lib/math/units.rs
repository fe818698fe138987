//! Conversion between 64.64 fixed point and collateral base units.
//!
//! Collateral and outcome-position balances are integers in the collateral's
//! smallest unit (`10^-decimals` of a whole token). Conversions choose their
//! rounding direction explicitly.
//!
//! # Rounding Conventions
//! - `Rounding::Up` (ceil): amounts charged TO the trader
//! - `Rounding::Down` (floor): amounts paid or credited TO the trader

use crate::math::fixed::{Fixed, MathError};
use crate::math::wide;

/// Largest decimal count whose scale factor fits in a `u128`.
pub const MAX_DECIMALS: u8 = 38;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Rounding {
    /// Round up (ceil) - use for costs charged TO the trader.
    Up,
    /// Round down (floor) - use for payouts TO the trader.
    Down,
}

fn scale(decimals: u8) -> Result<u128, MathError> {
    if decimals > MAX_DECIMALS {
        return Err(MathError::ArithmeticOverflow);
    }
    Ok(10u128.pow(u32::from(decimals)))
}

/// Convert a non-negative fixed-point amount into base units.
///
/// # Errors
/// - [`MathError::DomainError`] if `value` is negative
/// - [`MathError::ArithmeticOverflow`] if the result exceeds `u128::MAX`
///
/// # Examples
/// ```
/// use ls_lmsr::math::{Fixed, units::{Rounding, to_base_units}};
///
/// let third = Fixed::from_ratio(1, 3).unwrap();
/// assert_eq!(to_base_units(third, 2, Rounding::Up).unwrap(), 34);
/// assert_eq!(to_base_units(third, 2, Rounding::Down).unwrap(), 33);
/// ```
pub fn to_base_units(
    value: Fixed,
    decimals: u8,
    mode: Rounding,
) -> Result<u128, MathError> {
    if value.is_negative() {
        return Err(MathError::DomainError);
    }
    let (high, low) =
        wide::widening_mul(value.to_bits().unsigned_abs(), scale(decimals)?);
    let units = wide::shr64(high, low).ok_or(MathError::ArithmeticOverflow)?;
    let has_remainder = low & u128::from(u64::MAX) != 0;
    match mode {
        Rounding::Up if has_remainder => {
            units.checked_add(1).ok_or(MathError::ArithmeticOverflow)
        }
        Rounding::Up | Rounding::Down => Ok(units),
    }
}

/// Convert base units into fixed point, rounding down.
pub fn from_base_units(units: u128, decimals: u8) -> Result<Fixed, MathError> {
    let (quotient, _) = wide::div_rem_wide(units >> 64, units << 64, scale(decimals)?)
        .ok_or(MathError::ArithmeticOverflow)?;
    i128::try_from(quotient)
        .map(Fixed::from_bits)
        .map_err(|_| MathError::ArithmeticOverflow)
}
