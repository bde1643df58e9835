//! nToken pooled liquidity portfolios.
//!
//! An nToken pools liquidity-provider positions across the active markets
//! of one currency. Besides cash and liquidity tokens it may hold fCash at
//! maturities with no market ("idiosyncratic" fCash), kept in a sparse map
//! keyed by maturity.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::core::currency::CurrencyId;
use crate::error::{Error, Result};

/// Liquidity tokens held in one market
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LiquidityToken {
    /// Market maturity
    pub maturity: u64,
    /// Tokens held
    pub tokens: i128,
}

/// Pool state of one currency's nToken
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NTokenPortfolio {
    /// Currency
    pub currency: CurrencyId,
    /// Shares outstanding
    pub total_supply: i128,
    /// Cash held by the pool (internal precision)
    pub cash_balance: i128,
    /// Liquidity tokens, one entry per active market
    #[serde(default)]
    pub liquidity_tokens: Vec<LiquidityToken>,
    /// fCash held by the pool, by maturity
    #[serde(default)]
    pub fcash: BTreeMap<u64, i128>,
}

impl NTokenPortfolio {
    /// Create an empty pool
    pub fn new(currency: CurrencyId) -> Self {
        Self {
            currency,
            total_supply: 0,
            cash_balance: 0,
            liquidity_tokens: Vec::new(),
            fcash: BTreeMap::new(),
        }
    }

    /// Maturities with a market position
    pub fn market_maturities(&self) -> impl Iterator<Item = u64> + '_ {
        self.liquidity_tokens.iter().map(|t| t.maturity)
    }

    /// Whether the pool provides liquidity at `maturity`
    pub fn has_market(&self, maturity: u64) -> bool {
        self.liquidity_tokens.iter().any(|t| t.maturity == maturity)
    }

    /// fCash held at maturities without a market
    pub fn idiosyncratic_fcash(&self) -> impl Iterator<Item = (u64, i128)> + '_ {
        self.fcash
            .iter()
            .filter(move |(maturity, _)| !self.has_market(**maturity))
            .map(|(m, n)| (*m, *n))
    }

    /// Set the pool's fCash at a maturity, dropping zero entries
    pub fn set_fcash(&mut self, maturity: u64, notional: i128) {
        if notional == 0 {
            self.fcash.remove(&maturity);
        } else {
            self.fcash.insert(maturity, notional);
        }
    }

    /// Check structural invariants
    pub fn validate(&self) -> Result<()> {
        if self.total_supply < 0 {
            return Err(Error::InvariantViolation(format!(
                "nToken {} has negative supply {}",
                self.currency, self.total_supply
            )));
        }
        let mut seen = std::collections::BTreeSet::new();
        for token in &self.liquidity_tokens {
            if token.tokens < 0 || !seen.insert(token.maturity) {
                return Err(Error::InvariantViolation(format!(
                    "nToken {} has invalid liquidity at maturity {}",
                    self.currency, token.maturity
                )));
            }
        }
        Ok(())
    }
}
