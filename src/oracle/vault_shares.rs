//! Vault share pricing.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::core::vault::VaultId;
use crate::error::{Error, Result};
use crate::utils::constants::RATE_PRECISION;
use crate::utils::math::mul_div_floor;

/// Values vault shares in the vault's primary underlying
pub trait VaultShareValuation: Send + Sync {
    /// Underlying value of `shares` of `vault` at `maturity`
    fn shares_to_underlying(
        &self,
        vault: VaultId,
        maturity: u64,
        shares: i128,
        time: u64,
    ) -> Result<i128>;
}

/// Fixed per-vault share prices (underlying per share, rate precision)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StaticShareValuation {
    prices: BTreeMap<VaultId, i128>,
}

impl StaticShareValuation {
    /// Create without prices
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the price of a vault's shares
    pub fn with_price(mut self, vault: VaultId, price: i128) -> Self {
        self.prices.insert(vault, price);
        self
    }

    /// Update the price of a vault's shares
    pub fn set_price(&mut self, vault: VaultId, price: i128) {
        self.prices.insert(vault, price);
    }
}

impl VaultShareValuation for StaticShareValuation {
    fn shares_to_underlying(
        &self,
        vault: VaultId,
        _maturity: u64,
        shares: i128,
        _time: u64,
    ) -> Result<i128> {
        let price = self.prices.get(&vault).ok_or(Error::VaultNotFound(vault.0))?;
        mul_div_floor(shares, *price, RATE_PRECISION)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_share_value() {
        let valuation = StaticShareValuation::new().with_price(VaultId(1), 1_500_000_000);
        assert_eq!(valuation.shares_to_underlying(VaultId(1), 0, 200, 0).unwrap(), 300);
        assert!(valuation.shares_to_underlying(VaultId(2), 0, 200, 0).is_err());
    }
}
