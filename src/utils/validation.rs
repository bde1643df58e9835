//! Input validation utilities.
//!
//! These checks run before any computation so a malformed request fails
//! without touching state.

use crate::error::{Error, Result};
use crate::utils::constants::*;

// ═══════════════════════════════════════════════════════════════════════════════
// AMOUNT VALIDATION
// ═══════════════════════════════════════════════════════════════════════════════

/// Validate that an amount is non-zero
pub fn validate_non_zero(amount: i128) -> Result<()> {
    if amount == 0 {
        return Err(Error::ZeroAmount);
    }
    Ok(())
}

/// Validate that an amount is strictly positive
pub fn validate_positive(amount: i128, name: &str) -> Result<()> {
    validate_non_zero(amount)?;
    if amount < 0 {
        return Err(Error::InvalidParameter {
            name: name.into(),
            reason: format!("must be positive, got {}", amount),
        });
    }
    Ok(())
}

/// Validate a haircut expressed in basis points (0 < haircut <= 100%)
pub fn validate_haircut_bps(bps: i128, name: &str) -> Result<()> {
    if bps <= 0 || bps > BPS_DIVISOR {
        return Err(Error::Config(format!(
            "{} must be in (0, {}], got {}",
            name, BPS_DIVISOR, bps
        )));
    }
    Ok(())
}

/// Validate a buffer expressed in basis points (buffer >= 100%)
pub fn validate_buffer_bps(bps: i128, name: &str) -> Result<()> {
    if bps < BPS_DIVISOR {
        return Err(Error::Config(format!(
            "{} must be at least {}, got {}",
            name, BPS_DIVISOR, bps
        )));
    }
    Ok(())
}

// ═══════════════════════════════════════════════════════════════════════════════
// LIQUIDATION REQUEST VALIDATION
// ═══════════════════════════════════════════════════════════════════════════════

/// Validate a liquidation maturity list and its per-maturity caps
///
/// Maturities must be non-empty, strictly descending, unmatured at `time`,
/// and paired one-to-one with non-negative maximum amounts (0 = uncapped).
pub fn validate_liquidation_request(
    maturities: &[u64],
    max_amounts: &[i128],
    time: u64,
) -> Result<()> {
    if maturities.len() != max_amounts.len() {
        return Err(Error::LengthMismatch {
            maturities: maturities.len(),
            amounts: max_amounts.len(),
        });
    }

    if maturities.is_empty() {
        return Err(Error::InvalidParameter {
            name: "maturities".into(),
            reason: "at least one maturity is required".into(),
        });
    }

    for pair in maturities.windows(2) {
        if pair[1] >= pair[0] {
            return Err(Error::MaturitiesNotDescending {
                previous: pair[0],
                next: pair[1],
            });
        }
    }

    // Descending, so the last entry is the nearest maturity
    if let Some(&nearest) = maturities.last() {
        if nearest <= time {
            return Err(Error::InvalidParameter {
                name: "maturities".into(),
                reason: format!("maturity {} has already matured at {}", nearest, time),
            });
        }
    }

    if let Some(negative) = max_amounts.iter().find(|a| **a < 0) {
        return Err(Error::InvalidParameter {
            name: "max_amounts".into(),
            reason: format!("caps must be non-negative, got {}", negative),
        });
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_non_zero() {
        assert!(validate_non_zero(1).is_ok());
        assert_eq!(validate_non_zero(0).unwrap_err(), Error::ZeroAmount);
        assert!(validate_positive(-1, "x").is_err());
    }

    #[test]
    fn test_descending_maturities_accepted() {
        assert!(validate_liquidation_request(&[2_000, 1_000], &[0, 0], 10).is_ok());
    }

    #[test]
    fn test_ascending_maturities_rejected() {
        let err = validate_liquidation_request(&[1_000, 2_000], &[0, 0], 10).unwrap_err();
        assert_eq!(
            err,
            Error::MaturitiesNotDescending {
                previous: 1_000,
                next: 2_000
            }
        );
    }

    #[test]
    fn test_duplicate_maturities_rejected() {
        assert!(validate_liquidation_request(&[1_000, 1_000], &[0, 0], 10).is_err());
    }

    #[test]
    fn test_length_mismatch_rejected() {
        let err = validate_liquidation_request(&[2_000, 1_000], &[0], 10).unwrap_err();
        assert_eq!(err.code(), 2002);
    }

    #[test]
    fn test_matured_and_empty_rejected() {
        assert!(validate_liquidation_request(&[2_000, 1_000], &[0, 0], 1_000).is_err());
        assert!(validate_liquidation_request(&[], &[], 0).is_err());
        assert!(validate_liquidation_request(&[2_000], &[-1], 0).is_err());
    }

    #[test]
    fn test_haircut_and_buffer_validation() {
        assert!(validate_haircut_bps(8_000, "haircut").is_ok());
        assert!(validate_haircut_bps(0, "haircut").is_err());
        assert!(validate_haircut_bps(10_001, "haircut").is_err());
        assert!(validate_buffer_bps(12_000, "buffer").is_ok());
        assert!(validate_buffer_bps(9_999, "buffer").is_err());
    }
}
