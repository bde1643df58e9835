//! Risk-adjusted and liquidation discount factors.
//!
//! Positive fCash is discounted at a rate raised by a haircut, negative
//! fCash at a rate lowered by a buffer, so both sides are valued
//! conservatively. Liquidation uses smaller adjustments, which puts the
//! liquidation price strictly between the oracle value and the
//! risk-adjusted value.

use crate::core::currency::CurrencyConfig;
use crate::core::portfolio::FCashAsset;
use crate::error::Result;
use crate::oracle::rate_oracle::RateOracle;
use crate::utils::math::{discount_factor, mul_div_floor, present_value, safe_add};

/// Discount factors for one (currency, maturity, direction)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DiscountFactors {
    /// Annualized oracle rate (rate precision)
    pub oracle_rate: i128,
    /// exp(-oracle_rate * t)
    pub oracle: i128,
    /// Factor used by the health check
    pub risk_adjusted: i128,
    /// Factor a liquidator pays or receives at
    pub liquidation: i128,
}

/// Factors for positive fCash: rates are raised
pub fn positive_fcash_factors(
    config: &CurrencyConfig,
    oracle_rate: i128,
    time_to_maturity: u64,
) -> Result<DiscountFactors> {
    Ok(DiscountFactors {
        oracle_rate,
        oracle: discount_factor(oracle_rate, time_to_maturity)?,
        risk_adjusted: discount_factor(
            safe_add(oracle_rate, config.fcash_haircut_rate)?,
            time_to_maturity,
        )?,
        liquidation: discount_factor(
            safe_add(oracle_rate, config.liquidation_fcash_haircut_rate)?,
            time_to_maturity,
        )?,
    })
}

/// Factors for negative fCash: rates are lowered, floored at zero
pub fn negative_fcash_factors(
    config: &CurrencyConfig,
    oracle_rate: i128,
    time_to_maturity: u64,
) -> Result<DiscountFactors> {
    Ok(DiscountFactors {
        oracle_rate,
        oracle: discount_factor(oracle_rate, time_to_maturity)?,
        risk_adjusted: discount_factor(
            (oracle_rate - config.debt_buffer_rate).max(0),
            time_to_maturity,
        )?,
        liquidation: discount_factor(
            (oracle_rate - config.liquidation_debt_buffer_rate).max(0),
            time_to_maturity,
        )?,
    })
}

/// Factors for the direction given by the sign of `notional`
pub fn fcash_factors(
    config: &CurrencyConfig,
    oracle: &dyn RateOracle,
    maturity: u64,
    notional: i128,
    time: u64,
) -> Result<DiscountFactors> {
    let rate = oracle.oracle_rate(config.id, maturity, time)?;
    let time_to_maturity = maturity.saturating_sub(time);
    if notional >= 0 {
        positive_fcash_factors(config, rate, time_to_maturity)
    } else {
        negative_fcash_factors(config, rate, time_to_maturity)
    }
}

/// Risk-adjusted present value of an fCash asset in underlying
///
/// Matured fCash is worth its notional converted at the settlement rate
/// and carried forward at the current cash rate.
pub fn risk_adjusted_present_value(
    config: &CurrencyConfig,
    oracle: &dyn RateOracle,
    asset: &FCashAsset,
    time: u64,
) -> Result<i128> {
    if asset.is_matured(time) {
        let settlement = oracle.settlement_rate(asset.currency, asset.maturity)?;
        let current = oracle.cash_rate(asset.currency, time)?;
        return mul_div_floor(asset.notional, current.rate, settlement.rate);
    }

    let factors = fcash_factors(config, oracle, asset.maturity, asset.notional, time)?;
    present_value(asset.notional, factors.risk_adjusted)
}
