//! Interest and exchange rate oracle.
//!
//! The oracle converts between a currency's internal stable-cash unit and
//! its underlying, supplies the annualized rate used to discount fCash at a
//! maturity, and the exchange rate of each underlying into the common
//! reference unit.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::core::currency::CurrencyId;
use crate::error::{Error, Result};
use crate::utils::constants::*;
use crate::utils::math::{mul_div, mul_div_floor, mul_div_up, safe_add, safe_sub};

// ═══════════════════════════════════════════════════════════════════════════════
// CASH RATE
// ═══════════════════════════════════════════════════════════════════════════════

/// Underlying value of one unit of stable cash, in rate precision
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CashRate {
    /// Currency
    pub currency: CurrencyId,
    /// Underlying per cash (rate precision)
    pub rate: i128,
    /// Time the rate refers to
    pub time: u64,
}

impl CashRate {
    /// Convert stable cash to underlying, flooring
    pub fn to_underlying(&self, cash: i128) -> Result<i128> {
        mul_div_floor(cash, self.rate, RATE_PRECISION)
    }

    /// Convert underlying to stable cash, flooring
    pub fn to_cash(&self, underlying: i128) -> Result<i128> {
        mul_div_floor(underlying, RATE_PRECISION, self.rate)
    }

    /// Convert underlying to stable cash, rounding up
    pub fn to_cash_up(&self, underlying: i128) -> Result<i128> {
        mul_div_up(underlying, RATE_PRECISION, self.rate)
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// ORACLE TRAIT
// ═══════════════════════════════════════════════════════════════════════════════

/// Rate source consulted by valuation and liquidation
pub trait RateOracle: Send + Sync {
    /// Cash rate at `time` without touching accrual state
    fn cash_rate(&self, currency: CurrencyId, time: u64) -> Result<CashRate>;

    /// Advance the interest accumulator to `time` and return the cash rate
    fn accrue(&mut self, currency: CurrencyId, time: u64) -> Result<CashRate>;

    /// Annualized rate for discounting fCash at `maturity` (rate precision)
    fn oracle_rate(&self, currency: CurrencyId, maturity: u64, time: u64) -> Result<i128>;

    /// Cash rate fixed when fCash at `maturity` settled
    fn settlement_rate(&self, currency: CurrencyId, maturity: u64) -> Result<CashRate>;

    /// Reference units per unit of underlying (rate precision)
    fn exchange_rate(&self, currency: CurrencyId) -> Result<i128>;
}

// ═══════════════════════════════════════════════════════════════════════════════
// STATIC ORACLE
// ═══════════════════════════════════════════════════════════════════════════════

/// Rates for one currency of a [`StaticRateOracle`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CurrencyRates {
    /// Cash rate at `reference_time`
    pub base_cash_rate: i128,
    /// Time of `base_cash_rate`
    #[serde(default)]
    pub reference_time: u64,
    /// Annualized supply rate accrued linearly onto the cash rate
    #[serde(default)]
    pub supply_rate: i128,
    /// Reference units per underlying
    pub exchange_rate: i128,
    /// Annualized rates by maturity
    #[serde(default)]
    pub oracle_rates: BTreeMap<u64, i128>,
    /// Rate used when no maturity rate is known
    #[serde(default)]
    pub default_oracle_rate: Option<i128>,
    /// Cash rates fixed at settlement, by maturity
    #[serde(default)]
    pub settlement_rates: BTreeMap<u64, i128>,
    /// Last accrual time
    #[serde(default)]
    pub last_accrued: u64,
    /// Cash rate at the last accrual
    #[serde(default)]
    pub accrued_rate: i128,
}

impl CurrencyRates {
    /// Rates with a constant cash rate and a single flat oracle rate
    pub fn flat(cash_rate: i128, exchange_rate: i128, oracle_rate: i128) -> Self {
        Self {
            base_cash_rate: cash_rate,
            reference_time: 0,
            supply_rate: 0,
            exchange_rate,
            oracle_rates: BTreeMap::new(),
            default_oracle_rate: Some(oracle_rate),
            settlement_rates: BTreeMap::new(),
            last_accrued: 0,
            accrued_rate: cash_rate,
        }
    }

    /// Cash rate at `time`: base * (1 + supply_rate * elapsed / year)
    fn cash_rate_at(&self, time: u64) -> Result<i128> {
        let elapsed = time.saturating_sub(self.reference_time) as i128;
        let growth = mul_div(self.supply_rate, elapsed, SECONDS_IN_YEAR as i128)?;
        let factor = safe_add(RATE_PRECISION, growth)?;
        mul_div_floor(self.base_cash_rate, factor, RATE_PRECISION)
    }

    /// Rate at `maturity`: exact, interpolated between neighbours, or flat beyond the ends
    fn rate_at(&self, maturity: u64) -> Option<i128> {
        if let Some(rate) = self.oracle_rates.get(&maturity) {
            return Some(*rate);
        }

        let below = self.oracle_rates.range(..maturity).next_back();
        let above = self.oracle_rates.range(maturity..).next();
        match (below, above) {
            (Some((m0, r0)), Some((m1, r1))) => {
                let span = (*m1 - *m0) as i128;
                let offset = (maturity - *m0) as i128;
                let delta = safe_sub(*r1, *r0).ok()?;
                let step = mul_div(delta, offset, span).ok()?;
                r0.checked_add(step)
            }
            (Some((_, r)), None) | (None, Some((_, r))) => Some(*r),
            (None, None) => self.default_oracle_rate,
        }
    }
}

/// Oracle backed by configured rates
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StaticRateOracle {
    currencies: BTreeMap<CurrencyId, CurrencyRates>,
}

impl StaticRateOracle {
    /// Create an empty oracle
    pub fn new() -> Self {
        Self::default()
    }

    /// Add rates for a currency
    pub fn with_currency(mut self, currency: CurrencyId, rates: CurrencyRates) -> Self {
        self.currencies.insert(currency, rates);
        self
    }

    /// Replace a currency's exchange rate
    pub fn set_exchange_rate(&mut self, currency: CurrencyId, rate: i128) -> Result<()> {
        self.rates_mut(currency)?.exchange_rate = rate;
        Ok(())
    }

    /// Set the rate at one maturity
    pub fn set_oracle_rate(&mut self, currency: CurrencyId, maturity: u64, rate: i128) -> Result<()> {
        self.rates_mut(currency)?.oracle_rates.insert(maturity, rate);
        Ok(())
    }

    /// Fix the settlement cash rate of a maturity
    pub fn set_settlement_rate(&mut self, currency: CurrencyId, maturity: u64, rate: i128) -> Result<()> {
        self.rates_mut(currency)?.settlement_rates.insert(maturity, rate);
        Ok(())
    }

    fn rates(&self, currency: CurrencyId) -> Result<&CurrencyRates> {
        self.currencies.get(&currency).ok_or(Error::RateUnavailable {
            currency: currency.0,
            reason: "no rates configured".into(),
        })
    }

    fn rates_mut(&mut self, currency: CurrencyId) -> Result<&mut CurrencyRates> {
        self.currencies.get_mut(&currency).ok_or(Error::RateUnavailable {
            currency: currency.0,
            reason: "no rates configured".into(),
        })
    }
}

impl RateOracle for StaticRateOracle {
    fn cash_rate(&self, currency: CurrencyId, time: u64) -> Result<CashRate> {
        let rates = self.rates(currency)?;
        let rate = rates.cash_rate_at(time)?;
        if rate <= 0 {
            return Err(Error::RateUnavailable {
                currency: currency.0,
                reason: format!("non-positive cash rate {}", rate),
            });
        }
        Ok(CashRate { currency, rate, time })
    }

    fn accrue(&mut self, currency: CurrencyId, time: u64) -> Result<CashRate> {
        let cash_rate = self.cash_rate(currency, time)?;
        let rates = self.rates_mut(currency)?;
        if time >= rates.last_accrued {
            rates.last_accrued = time;
            rates.accrued_rate = cash_rate.rate;
        }
        tracing::trace!(currency = %currency, rate = cash_rate.rate, time, "cash rate accrued");
        Ok(cash_rate)
    }

    fn oracle_rate(&self, currency: CurrencyId, maturity: u64, _time: u64) -> Result<i128> {
        self.rates(currency)?
            .rate_at(maturity)
            .ok_or(Error::RateUnavailable {
                currency: currency.0,
                reason: format!("no oracle rate for maturity {}", maturity),
            })
    }

    fn settlement_rate(&self, currency: CurrencyId, maturity: u64) -> Result<CashRate> {
        let rates = self.rates(currency)?;
        let rate = match rates.settlement_rates.get(&maturity) {
            Some(rate) => *rate,
            None => rates.cash_rate_at(maturity)?,
        };
        Ok(CashRate {
            currency,
            rate,
            time: maturity,
        })
    }

    fn exchange_rate(&self, currency: CurrencyId) -> Result<i128> {
        let rate = self.rates(currency)?.exchange_rate;
        if rate <= 0 {
            return Err(Error::RateUnavailable {
                currency: currency.0,
                reason: format!("non-positive exchange rate {}", rate),
            });
        }
        Ok(rate)
    }
}
