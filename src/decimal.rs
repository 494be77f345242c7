//! Fixed-point decimal primitives
//!
//! All pipeline arithmetic runs on `rust_decimal::Decimal`. Addition,
//! subtraction and multiplication are exact; division rounds half-up at 18
//! fractional digits; square roots use a Newton-Raphson iteration with a
//! fixed stopping criterion so results are reproducible bit-for-bit.

use rust_decimal::{Decimal, RoundingStrategy};

use crate::error::{DecimalError, TickerError};

/// Fractional digits carried through division and square roots.
pub const DECIMAL_PRECISION: u32 = 18;

const MAX_SQRT_ITERATIONS: u32 = 64;

/// Smallest representable step at the working precision (10^-18).
fn epsilon() -> Decimal {
    Decimal::new(1, DECIMAL_PRECISION)
}

/// Divide `a` by `b`, rounding half-up to 18 fractional digits.
pub fn div18(a: Decimal, b: Decimal) -> Result<Decimal, DecimalError> {
    if b.is_zero() {
        return Err(DecimalError::DivisionByZero);
    }
    let quotient = a.checked_div(b).ok_or(DecimalError::Overflow)?;
    Ok(quotient.round_dp_with_strategy(DECIMAL_PRECISION, RoundingStrategy::MidpointAwayFromZero))
}

/// Newton-Raphson square root at the working precision.
///
/// Iterates `g <- (g + v/g) / 2` until successive guesses differ by less
/// than 10^-18. Zero maps to zero; negative input is an error.
pub fn sqrt(value: Decimal) -> Result<Decimal, DecimalError> {
    if value.is_sign_negative() && !value.is_zero() {
        return Err(DecimalError::NegativeSqrt);
    }
    if value.is_zero() {
        return Ok(Decimal::ZERO);
    }

    // (v + 1) / 2 bounds the root from above for any positive v and can
    // never collapse to zero under rounding.
    let mut guess = div18(value + Decimal::ONE, Decimal::TWO)?;
    for _ in 0..MAX_SQRT_ITERATIONS {
        let next = div18(guess + div18(value, guess)?, Decimal::TWO)?;
        let delta = (next - guess).abs();
        guess = next;
        if delta < epsilon() {
            break;
        }
    }
    Ok(guess)
}

/// Parse a decimal accepting only `-?digits(.digits)?`.
///
/// Leading zeros are allowed; exponents, leading `+`, bare `.` and empty
/// fragments are not.
pub fn parse_decimal(s: &str) -> Result<Decimal, TickerError> {
    let body = s.strip_prefix('-').unwrap_or(s);
    let (int_part, frac_part) = match body.split_once('.') {
        Some((i, f)) => (i, Some(f)),
        None => (body, None),
    };
    let all_digits = |part: &str| !part.is_empty() && part.bytes().all(|b| b.is_ascii_digit());
    if !all_digits(int_part) || !frac_part.map_or(true, all_digits) {
        return Err(TickerError::InvalidDecimal(s.to_string()));
    }
    s.parse::<Decimal>()
        .map(|d| d.normalize())
        .map_err(|_| TickerError::InvalidDecimal(s.to_string()))
}

/// Minimal canonical string: no trailing fractional zeros, no leading `+`,
/// and `-0` collapses to `0`.
pub fn canonical_string(value: Decimal) -> String {
    value.normalize().to_string()
}
