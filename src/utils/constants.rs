//! Protocol constants and magic numbers.
//!
//! All protocol-wide constants are defined here for easy auditing and modification.

// ═══════════════════════════════════════════════════════════════════════════════
// PRECISION CONSTANTS
// ═══════════════════════════════════════════════════════════════════════════════

/// Precision of rates, discount factors, cash rates and exchange rates: 9 decimals
pub const RATE_PRECISION: i128 = 1_000_000_000;

/// Precision of collateral ratios (1e9 = 100%)
pub const RATIO_PRECISION: i128 = 1_000_000_000;

/// Basis points divisor (10000 = 100%)
pub const BPS_DIVISOR: i128 = 10_000;

/// Sentinel ratio for positions without debt
pub const INFINITE_RATIO: i128 = i128::MAX;

// ═══════════════════════════════════════════════════════════════════════════════
// TIME CONSTANTS
// ═══════════════════════════════════════════════════════════════════════════════

/// Seconds in a day
pub const SECONDS_IN_DAY: u64 = 86_400;

/// Seconds in a rate year (360 days)
pub const SECONDS_IN_YEAR: u64 = 360 * SECONDS_IN_DAY;

// ═══════════════════════════════════════════════════════════════════════════════
// COLLATERALIZATION CONSTANTS
// ═══════════════════════════════════════════════════════════════════════════════

/// Default minimum account collateral ratio - 100%
/// Below this ratio, an account's fCash can be liquidated
pub const DEFAULT_MIN_COLLATERAL_RATIO: i128 = RATIO_PRECISION;

/// Default collateral haircut on positive net currency value - 80%
pub const DEFAULT_COLLATERAL_HAIRCUT_BPS: i128 = 8_000;

/// Default buffer on negative net currency value - 120%
pub const DEFAULT_DEBT_BUFFER_BPS: i128 = 12_000;

/// Default annualized rate added when discounting positive fCash - 1.5%
pub const DEFAULT_FCASH_HAIRCUT_RATE: i128 = 15_000_000;

/// Default annualized rate removed when discounting negative fCash - 1.5%
pub const DEFAULT_DEBT_BUFFER_RATE: i128 = 15_000_000;

/// Default annualized rate added when liquidating positive fCash - 0.5%
pub const DEFAULT_LIQUIDATION_FCASH_HAIRCUT_RATE: i128 = 5_000_000;

/// Default annualized rate removed when liquidating negative fCash - 0.5%
pub const DEFAULT_LIQUIDATION_DEBT_BUFFER_RATE: i128 = 5_000_000;

// ═══════════════════════════════════════════════════════════════════════════════
// VAULT CONSTANTS
// ═══════════════════════════════════════════════════════════════════════════════

/// Maximum number of secondary borrow currencies per vault
pub const MAX_SECONDARY_CURRENCIES: usize = 2;

/// Default vault liquidation rate - 104% (liquidator receives a 4% discount)
pub const DEFAULT_VAULT_LIQUIDATION_RATE_BPS: i128 = 10_400;

// ═══════════════════════════════════════════════════════════════════════════════
// EVENT CONSTANTS
// ═══════════════════════════════════════════════════════════════════════════════

/// Default number of events kept in memory
pub const DEFAULT_MAX_EVENTS: usize = 1000;

// ═══════════════════════════════════════════════════════════════════════════════
// IDENTIFIER CONSTANTS
// ═══════════════════════════════════════════════════════════════════════════════

/// Length of an account id in bytes
pub const ACCOUNT_ID_LENGTH: usize = 20;

/// Length of a hash in bytes (SHA256)
pub const HASH_LENGTH: usize = 32;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_haircut_and_buffer_bounds() {
        assert!(DEFAULT_COLLATERAL_HAIRCUT_BPS <= BPS_DIVISOR);
        assert!(DEFAULT_DEBT_BUFFER_BPS >= BPS_DIVISOR);
    }

    #[test]
    fn test_liquidation_rates_inside_risk_rates() {
        assert!(DEFAULT_LIQUIDATION_FCASH_HAIRCUT_RATE < DEFAULT_FCASH_HAIRCUT_RATE);
        assert!(DEFAULT_LIQUIDATION_DEBT_BUFFER_RATE < DEFAULT_DEBT_BUFFER_RATE);
    }

    #[test]
    fn test_vault_liquidation_rate_is_discount() {
        assert!(DEFAULT_VAULT_LIQUIDATION_RATE_BPS > BPS_DIVISOR);
    }
}
