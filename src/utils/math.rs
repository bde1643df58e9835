//! Fixed-point arithmetic and mathematical utilities.
//!
//! All amounts are signed `i128` integers in a stated decimal precision.
//! Every operation is checked and reports the failing expression instead of
//! wrapping or panicking.

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, MathematicalOps};

use crate::error::{Error, Result};
use crate::utils::constants::{BPS_DIVISOR, RATE_PRECISION, RATIO_PRECISION, SECONDS_IN_YEAR};

// ═══════════════════════════════════════════════════════════════════════════════
// SAFE ARITHMETIC OPERATIONS
// ═══════════════════════════════════════════════════════════════════════════════

/// Safe addition with overflow check
pub fn safe_add(a: i128, b: i128) -> Result<i128> {
    a.checked_add(b).ok_or(Error::Overflow {
        operation: format!("{} + {}", a, b),
    })
}

/// Safe subtraction with underflow check
pub fn safe_sub(a: i128, b: i128) -> Result<i128> {
    a.checked_sub(b).ok_or(Error::Underflow {
        operation: format!("{} - {}", a, b),
    })
}

/// Safe multiplication with overflow check
pub fn safe_mul(a: i128, b: i128) -> Result<i128> {
    a.checked_mul(b).ok_or(Error::Overflow {
        operation: format!("{} * {}", a, b),
    })
}

/// Safe negation
pub fn safe_neg(a: i128) -> Result<i128> {
    a.checked_neg().ok_or(Error::Overflow {
        operation: format!("-({})", a),
    })
}

/// Computes (a * b) / c, truncating toward zero
pub fn mul_div(a: i128, b: i128, c: i128) -> Result<i128> {
    if c == 0 {
        return Err(Error::DivisionByZero {
            operation: format!("({} * {}) / 0", a, b),
        });
    }
    Ok(safe_mul(a, b)? / c)
}

/// Computes (a * b) / c, rounding toward negative infinity
///
/// Used when a negative result is a debt: flooring makes the debt larger.
pub fn mul_div_floor(a: i128, b: i128, c: i128) -> Result<i128> {
    if c == 0 {
        return Err(Error::DivisionByZero {
            operation: format!("floor(({} * {}) / 0)", a, b),
        });
    }
    let numerator = safe_mul(a, b)?;
    let quotient = numerator / c;
    if numerator % c != 0 && ((numerator < 0) != (c < 0)) {
        Ok(quotient - 1)
    } else {
        Ok(quotient)
    }
}

/// Computes (a * b) / c, rounding toward positive infinity
pub fn mul_div_up(a: i128, b: i128, c: i128) -> Result<i128> {
    if c == 0 {
        return Err(Error::DivisionByZero {
            operation: format!("ceil(({} * {}) / 0)", a, b),
        });
    }
    let numerator = safe_mul(a, b)?;
    let quotient = numerator / c;
    if numerator % c != 0 && ((numerator < 0) == (c < 0)) {
        Ok(quotient + 1)
    } else {
        Ok(quotient)
    }
}

/// Apply a basis-point multiplier (haircut or buffer)
pub fn apply_bps(amount: i128, bps: i128) -> Result<i128> {
    mul_div_floor(amount, bps, BPS_DIVISOR)
}

// ═══════════════════════════════════════════════════════════════════════════════
// RATIOS
// ═══════════════════════════════════════════════════════════════════════════════

/// Collateral ratio in ratio precision: collateral / -debt
///
/// `debt` is signed and must be zero or negative; zero debt yields
/// `i128::MAX`, a position without debt is always solvent.
pub fn collateral_ratio(collateral: i128, debt: i128) -> Result<i128> {
    if debt > 0 {
        return Err(Error::InvalidParameter {
            name: "debt".into(),
            reason: format!("debt must be non-positive, got {}", debt),
        });
    }
    if debt == 0 {
        return Ok(i128::MAX);
    }
    mul_div_floor(collateral, RATIO_PRECISION, -debt)
}

// ═══════════════════════════════════════════════════════════════════════════════
// DISCOUNTING
// ═══════════════════════════════════════════════════════════════════════════════

/// Continuous discount factor exp(-rate * t) in rate precision
///
/// `annual_rate` is in rate precision; negative rates are clamped to zero so
/// the factor never exceeds 1.0.
pub fn discount_factor(annual_rate: i128, time_to_maturity: u64) -> Result<i128> {
    if time_to_maturity == 0 || annual_rate <= 0 {
        return Ok(RATE_PRECISION);
    }

    let rate = Decimal::try_from_i128_with_scale(annual_rate, 9).map_err(|e| Error::Overflow {
        operation: format!("decimal rate {}: {}", annual_rate, e),
    })?;
    let years = Decimal::from(time_to_maturity) / Decimal::from(SECONDS_IN_YEAR);
    let exponent = rate.checked_mul(years).ok_or(Error::Overflow {
        operation: format!("{} * {}", rate, years),
    })?;
    let factor = (-exponent)
        .checked_exp_with_tolerance(Decimal::new(1, 15))
        .ok_or(Error::Overflow {
            operation: format!("exp(-{})", exponent),
        })?;

    let scaled = (factor * Decimal::from(RATE_PRECISION as i64)).floor();
    scaled.to_i128().ok_or(Error::Overflow {
        operation: format!("discount factor {}", scaled),
    })
}

/// Present value of a notional: notional * discount_factor, flooring debts
pub fn present_value(notional: i128, discount_factor: i128) -> Result<i128> {
    mul_div_floor(notional, discount_factor, RATE_PRECISION)
}

// ═══════════════════════════════════════════════════════════════════════════════
// UTILITY FUNCTIONS
// ═══════════════════════════════════════════════════════════════════════════════

/// Proportional share: amount * part / whole, truncating toward zero
pub fn pro_rata(amount: i128, part: i128, whole: i128) -> Result<i128> {
    mul_div(amount, part, whole)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::constants::SECONDS_IN_DAY;

    #[test]
    fn test_safe_arithmetic() {
        assert!(safe_add(1, 2).is_ok());
        assert!(safe_add(i128::MAX, 1).is_err());

        assert!(safe_sub(5, 3).is_ok());
        assert!(safe_sub(i128::MIN, 1).is_err());

        assert!(safe_mul(100, 200).is_ok());
        assert!(safe_mul(i128::MAX, 2).is_err());

        assert!(mul_div(100, 10, 0).is_err());
    }

    #[test]
    fn test_rounding_directions() {
        assert_eq!(mul_div(-7, 1, 2).unwrap(), -3);
        assert_eq!(mul_div_floor(-7, 1, 2).unwrap(), -4);
        assert_eq!(mul_div_floor(7, 1, 2).unwrap(), 3);
        assert_eq!(mul_div_up(7, 1, 2).unwrap(), 4);
        assert_eq!(mul_div_up(-7, 1, 2).unwrap(), -3);
        assert_eq!(mul_div_up(8, 1, 2).unwrap(), 4);
    }

    #[test]
    fn test_collateral_ratio() {
        // 150 collateral against 100 debt = 150%
        assert_eq!(collateral_ratio(150, -100).unwrap(), 1_500_000_000);
        assert_eq!(collateral_ratio(150, 0).unwrap(), i128::MAX);
        assert!(collateral_ratio(150, 10).is_err());
    }

    #[test]
    fn test_discount_factor_one_year() {
        // exp(-0.05) = 0.951229424...
        let df = discount_factor(50_000_000, SECONDS_IN_YEAR).unwrap();
        assert!((df - 951_229_424).abs() <= 1);
    }

    #[test]
    fn test_discount_factor_bounds() {
        assert_eq!(discount_factor(50_000_000, 0).unwrap(), RATE_PRECISION);
        assert_eq!(discount_factor(0, SECONDS_IN_YEAR).unwrap(), RATE_PRECISION);
        assert_eq!(discount_factor(-10, SECONDS_IN_YEAR).unwrap(), RATE_PRECISION);
        assert!(discount_factor(50_000_000, 90 * SECONDS_IN_DAY).unwrap() < RATE_PRECISION);
    }

    #[test]
    fn test_present_value_floors_debt() {
        assert_eq!(present_value(-3, 500_000_000).unwrap(), -2);
        assert_eq!(present_value(3, 500_000_000).unwrap(), 1);
    }
}
