//! Account balances, fCash portfolios and account context flags.
//!
//! A portfolio is a list of fCash assets kept sorted by (currency, maturity)
//! with at most one entry per pair. Adding notional to an existing pair
//! merges into it and entries that net to zero are removed.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use crate::core::currency::CurrencyId;
use crate::error::Result;
use crate::utils::math::safe_add;

// ═══════════════════════════════════════════════════════════════════════════════
// BALANCES
// ═══════════════════════════════════════════════════════════════════════════════

/// Per-account, per-currency balances
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountBalance {
    /// Stable-cash balance in internal precision (negative = cash debt)
    pub cash: i128,
    /// nToken shares held
    #[serde(default)]
    pub ntoken_balance: i128,
}

impl AccountBalance {
    /// Balance with only cash
    pub fn cash(cash: i128) -> Self {
        Self {
            cash,
            ntoken_balance: 0,
        }
    }

    /// True when nothing is held
    pub fn is_empty(&self) -> bool {
        self.cash == 0 && self.ntoken_balance == 0
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// FCASH ASSETS
// ═══════════════════════════════════════════════════════════════════════════════

/// A fixed-maturity claim (positive) or debt (negative)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FCashAsset {
    /// Currency of the notional
    pub currency: CurrencyId,
    /// Maturity timestamp in seconds
    pub maturity: u64,
    /// Signed notional in internal precision
    pub notional: i128,
}

impl FCashAsset {
    /// Create a new asset
    pub fn new(currency: CurrencyId, maturity: u64, notional: i128) -> Self {
        Self {
            currency,
            maturity,
            notional,
        }
    }

    /// Whether the asset has matured at `time`
    pub fn is_matured(&self, time: u64) -> bool {
        self.maturity <= time
    }

    fn key(&self) -> (CurrencyId, u64) {
        (self.currency, self.maturity)
    }
}

/// Sorted fCash holdings of an account
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Portfolio {
    assets: Vec<FCashAsset>,
}

impl Portfolio {
    /// Create an empty portfolio
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a portfolio from loose assets, merging duplicates
    pub fn from_assets(assets: impl IntoIterator<Item = FCashAsset>) -> Result<Self> {
        let mut portfolio = Self::new();
        for asset in assets {
            portfolio.add(asset.currency, asset.maturity, asset.notional)?;
        }
        Ok(portfolio)
    }

    /// Add notional at (currency, maturity)
    ///
    /// Merges into the existing entry; a result of zero removes it.
    pub fn add(&mut self, currency: CurrencyId, maturity: u64, notional: i128) -> Result<()> {
        if notional == 0 {
            return Ok(());
        }

        let key = (currency, maturity);
        match self.assets.binary_search_by(|a| a.key().cmp(&key)) {
            Ok(index) => {
                let merged = safe_add(self.assets[index].notional, notional)?;
                if merged == 0 {
                    self.assets.remove(index);
                } else {
                    self.assets[index].notional = merged;
                }
            }
            Err(index) => {
                self.assets
                    .insert(index, FCashAsset::new(currency, maturity, notional));
            }
        }
        Ok(())
    }

    /// Notional held at (currency, maturity), zero if absent
    pub fn notional(&self, currency: CurrencyId, maturity: u64) -> i128 {
        let key = (currency, maturity);
        self.assets
            .binary_search_by(|a| a.key().cmp(&key))
            .map(|index| self.assets[index].notional)
            .unwrap_or(0)
    }

    /// Assets in one currency, ascending maturity
    pub fn assets_in(&self, currency: CurrencyId) -> impl Iterator<Item = &FCashAsset> {
        self.assets.iter().filter(move |a| a.currency == currency)
    }

    /// All assets
    pub fn iter(&self) -> impl Iterator<Item = &FCashAsset> {
        self.assets.iter()
    }

    /// Currencies with at least one asset
    pub fn currencies(&self) -> BTreeSet<CurrencyId> {
        self.assets.iter().map(|a| a.currency).collect()
    }

    /// Whether any asset is a debt
    pub fn has_debt(&self) -> bool {
        self.assets.iter().any(|a| a.notional < 0)
    }

    /// Whether any asset has matured and awaits settlement
    pub fn has_matured(&self, time: u64) -> bool {
        self.assets.iter().any(|a| a.is_matured(time))
    }

    /// Number of assets
    pub fn len(&self) -> usize {
        self.assets.len()
    }

    /// Check if empty
    pub fn is_empty(&self) -> bool {
        self.assets.is_empty()
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// ACCOUNT CONTEXT
// ═══════════════════════════════════════════════════════════════════════════════

/// Flags summarizing an account's holdings
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountContext {
    /// Currencies with a balance or fCash
    pub active_currencies: BTreeSet<CurrencyId>,
    /// Negative cash or negative fCash is held
    pub has_debt: bool,
    /// Some fCash has matured and awaits settlement
    pub settlement_due: bool,
}

impl AccountContext {
    /// Recompute the flags from the account's balances and portfolio
    pub fn refresh(
        &mut self,
        balances: impl IntoIterator<Item = (CurrencyId, AccountBalance)>,
        portfolio: &Portfolio,
        time: u64,
    ) {
        let mut active = portfolio.currencies();
        let mut cash_debt = false;
        for (currency, balance) in balances {
            if !balance.is_empty() {
                active.insert(currency);
            }
            cash_debt |= balance.cash < 0;
        }

        self.active_currencies = active;
        self.has_debt = cash_debt || portfolio.has_debt();
        self.settlement_due = portfolio.has_matured(time);
    }

    /// Whether a currency is active
    pub fn is_active(&self, currency: CurrencyId) -> bool {
        self.active_currencies.contains(&currency)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const USDC: CurrencyId = CurrencyId(1);
    const DAI: CurrencyId = CurrencyId(2);

    #[test]
    fn test_add_keeps_sorted_order() {
        let mut portfolio = Portfolio::new();
        portfolio.add(DAI, 100, 5).unwrap();
        portfolio.add(USDC, 300, 1).unwrap();
        portfolio.add(USDC, 200, -2).unwrap();

        let keys: Vec<_> = portfolio.iter().map(|a| (a.currency, a.maturity)).collect();
        assert_eq!(keys, vec![(USDC, 200), (USDC, 300), (DAI, 100)]);
    }

    #[test]
    fn test_merge_same_maturity() {
        let mut portfolio = Portfolio::new();
        portfolio.add(USDC, 100, 500).unwrap();
        portfolio.add(USDC, 100, 250).unwrap();
        assert_eq!(portfolio.len(), 1);
        assert_eq!(portfolio.notional(USDC, 100), 750);
    }

    #[test]
    fn test_netting_to_zero_removes_entry() {
        let mut portfolio = Portfolio::new();
        portfolio.add(USDC, 100, 500).unwrap();
        portfolio.add(USDC, 100, -500).unwrap();
        assert!(portfolio.is_empty());
        assert_eq!(portfolio.notional(USDC, 100), 0);
    }

    #[test]
    fn test_context_refresh() {
        let mut portfolio = Portfolio::new();
        portfolio.add(USDC, 100, -10).unwrap();

        let mut context = AccountContext::default();
        context.refresh(
            vec![(USDC, AccountBalance::cash(50)), (DAI, AccountBalance::default())],
            &portfolio,
            50,
        );
        assert!(context.has_debt);
        assert!(!context.settlement_due);
        assert!(context.is_active(USDC));
        assert!(!context.is_active(DAI));

        context.refresh(vec![(USDC, AccountBalance::cash(50))], &Portfolio::new(), 150);
        assert!(!context.has_debt);
    }

    #[test]
    fn test_context_cash_debt_and_settlement() {
        let mut portfolio = Portfolio::new();
        portfolio.add(DAI, 100, 10).unwrap();

        let mut context = AccountContext::default();
        context.refresh(vec![(USDC, AccountBalance::cash(-1))], &portfolio, 100);
        assert!(context.has_debt);
        assert!(context.settlement_due);
        assert_eq!(context.active_currencies.len(), 2);
    }
}
