//! 256-bit intermediates for 128-bit fixed-point arithmetic.
//!
//! A 256-bit value is represented as a `(high, low)` pair of `u128` limbs.

const LOW_MASK: u128 = u64::MAX as u128;

/// Full product of two `u128` values as `(high, low)`.
pub(crate) fn widening_mul(a: u128, b: u128) -> (u128, u128) {
    let (a_hi, a_lo) = (a >> 64, a & LOW_MASK);
    let (b_hi, b_lo) = (b >> 64, b & LOW_MASK);

    let lo_lo = a_lo * b_lo;
    let lo_hi = a_lo * b_hi;
    let hi_lo = a_hi * b_lo;
    let hi_hi = a_hi * b_hi;

    // At most 3 * (2^64 - 1), fits in a u128
    let cross = (lo_lo >> 64) + (lo_hi & LOW_MASK) + (hi_lo & LOW_MASK);
    let low = (cross << 64) | (lo_lo & LOW_MASK);
    let high = hi_hi + (lo_hi >> 64) + (hi_lo >> 64) + (cross >> 64);
    (high, low)
}

/// `(high, low) >> 64`, or `None` if the result does not fit in a `u128`.
pub(crate) fn shr64(high: u128, low: u128) -> Option<u128> {
    if high >> 64 != 0 {
        return None;
    }
    Some((high << 64) | (low >> 64))
}

/// Divides the 256-bit value `(high, low)` by `divisor`.
///
/// Returns `(quotient, remainder)`, or `None` if `divisor` is zero or the
/// quotient does not fit in a `u128`.
pub(crate) fn div_rem_wide(
    high: u128,
    low: u128,
    divisor: u128,
) -> Option<(u128, u128)> {
    if divisor == 0 || high >= divisor {
        return None;
    }
    let mut remainder = high;
    let mut quotient = 0u128;
    for bit in (0..128).rev() {
        let carry = remainder >> 127;
        remainder = (remainder << 1) | ((low >> bit) & 1);
        quotient <<= 1;
        // remainder < divisor held before the shift, so the true value is
        // below 2 * divisor and a single subtraction restores the bound
        if carry == 1 || remainder >= divisor {
            remainder = remainder.wrapping_sub(divisor);
            quotient |= 1;
        }
    }
    Some((quotient, remainder))
}
