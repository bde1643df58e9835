//! fCash markets.
//!
//! A market pools cash and fCash at one (currency, maturity). Liquidity
//! providers hold liquidity tokens that claim a pro-rata share of both
//! sides. Trades are executed through a [`MarketAdapter`], which may refuse
//! a trade that cannot clear.

use serde::{Deserialize, Serialize};

use crate::core::currency::CurrencyId;
use crate::error::{Error, Result};
use crate::oracle::rate_oracle::CashRate;
use crate::utils::constants::*;
use crate::utils::math::{discount_factor, mul_div, present_value, safe_neg, safe_sub};

// ═══════════════════════════════════════════════════════════════════════════════
// MARKET STATE
// ═══════════════════════════════════════════════════════════════════════════════

/// Pooled liquidity at one maturity
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarketState {
    /// Currency
    pub currency: CurrencyId,
    /// Maturity
    pub maturity: u64,
    /// fCash held by the market
    pub total_fcash: i128,
    /// Stable cash held by the market
    pub total_cash: i128,
    /// Liquidity tokens outstanding
    pub total_liquidity: i128,
    /// Annualized rate of the last trade (rate precision)
    pub last_implied_rate: i128,
}

/// Cash and fCash released by removing liquidity
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LiquidityClaim {
    /// Stable cash released
    pub cash: i128,
    /// fCash released
    pub fcash: i128,
}

impl MarketState {
    /// Create a market
    pub fn new(
        currency: CurrencyId,
        maturity: u64,
        total_fcash: i128,
        total_cash: i128,
        total_liquidity: i128,
        last_implied_rate: i128,
    ) -> Self {
        Self {
            currency,
            maturity,
            total_fcash,
            total_cash,
            total_liquidity,
            last_implied_rate,
        }
    }

    /// Remove `tokens` of liquidity, returning the pro-rata cash and fCash
    pub fn remove_liquidity(&mut self, tokens: i128) -> Result<LiquidityClaim> {
        if tokens < 0 || tokens > self.total_liquidity {
            return Err(Error::InsufficientBalance {
                required: tokens,
                available: self.total_liquidity,
            });
        }
        if tokens == 0 {
            return Ok(LiquidityClaim { cash: 0, fcash: 0 });
        }

        let cash = mul_div(self.total_cash, tokens, self.total_liquidity)?;
        let fcash = mul_div(self.total_fcash, tokens, self.total_liquidity)?;

        self.total_cash = safe_sub(self.total_cash, cash)?;
        self.total_fcash = safe_sub(self.total_fcash, fcash)?;
        self.total_liquidity = safe_sub(self.total_liquidity, tokens)?;

        Ok(LiquidityClaim { cash, fcash })
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// MARKET ADAPTER
// ═══════════════════════════════════════════════════════════════════════════════

/// Result of a cleared trade
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TradeOutcome {
    /// Stable cash paid to the account (negative = paid by the account)
    pub cash_to_account: i128,
    /// Market after the trade
    pub new_market: MarketState,
}

/// Executes fCash trades against a market
pub trait MarketAdapter: Send + Sync {
    /// Trade `fcash_to_account` notional with the market
    ///
    /// Positive amounts buy fCash from the market, negative amounts sell to
    /// it. Returns `None` when the trade cannot clear.
    fn execute_trade(
        &self,
        market: &MarketState,
        fcash_to_account: i128,
        cash_rate: &CashRate,
        time: u64,
    ) -> Result<Option<TradeOutcome>>;
}

/// Prices every trade at the market's last implied rate plus or minus a fee
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConstantRateMarket {
    /// Annualized fee added against the trader (rate precision)
    pub fee_rate: i128,
    /// Largest trade as a share of the market's fCash, in basis points
    pub max_trade_share_bps: i128,
}

impl Default for ConstantRateMarket {
    fn default() -> Self {
        Self {
            fee_rate: 3_000_000,
            max_trade_share_bps: 5_000,
        }
    }
}

impl MarketAdapter for ConstantRateMarket {
    fn execute_trade(
        &self,
        market: &MarketState,
        fcash_to_account: i128,
        cash_rate: &CashRate,
        time: u64,
    ) -> Result<Option<TradeOutcome>> {
        if fcash_to_account == 0 || market.maturity <= time || market.total_fcash <= 0 {
            return Ok(None);
        }

        let size_limit = mul_div(market.total_fcash, self.max_trade_share_bps, BPS_DIVISOR)?;
        if fcash_to_account.abs() > size_limit {
            tracing::debug!(
                maturity = market.maturity,
                amount = fcash_to_account,
                limit = size_limit,
                "trade exceeds market size tolerance"
            );
            return Ok(None);
        }

        // Buying fCash lends at a lower rate, selling borrows at a higher rate
        let rate = if fcash_to_account > 0 {
            (market.last_implied_rate - self.fee_rate).max(0)
        } else {
            market.last_implied_rate + self.fee_rate
        };
        let df = discount_factor(rate, market.maturity - time)?;
        let underlying = present_value(safe_neg(fcash_to_account)?, df)?;
        let cash_to_account = cash_rate.to_cash(underlying)?;

        if cash_to_account > market.total_cash {
            return Ok(None);
        }

        let new_market = MarketState {
            total_fcash: safe_sub(market.total_fcash, fcash_to_account)?,
            total_cash: safe_sub(market.total_cash, cash_to_account)?,
            ..market.clone()
        };

        Ok(Some(TradeOutcome {
            cash_to_account,
            new_market,
        }))
    }
}
