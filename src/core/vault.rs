//! Leveraged vault configuration and positions.
//!
//! A vault borrows in a primary currency and up to two secondary
//! currencies. Each account holds at most one position per vault; vault
//! aggregates are tracked per (vault, maturity).

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::core::currency::{CurrencyId, CurrencyRegistry};
use crate::error::{Error, Result};
use crate::utils::constants::*;
use crate::utils::crypto::AccountId;

// ═══════════════════════════════════════════════════════════════════════════════
// VAULT ID
// ═══════════════════════════════════════════════════════════════════════════════

/// Vault identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VaultId(pub u32);

impl std::fmt::Display for VaultId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "vault-{}", self.0)
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// VAULT CONFIG
// ═══════════════════════════════════════════════════════════════════════════════

/// Risk parameters of a vault
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VaultConfig {
    /// Vault id
    pub id: VaultId,
    /// Primary borrow currency (debt leg 0)
    pub primary_currency: CurrencyId,
    /// Secondary borrow currencies (debt legs 1 and 2)
    #[serde(default)]
    pub secondary_currencies: Vec<CurrencyId>,
    /// Below this ratio the account can be deleveraged
    pub min_collateral_ratio: i128,
    /// Entry/exit must not leave shares above this ratio
    pub max_required_account_collateral_ratio: i128,
    /// Deleverage may restore the ratio up to this level
    pub max_deleverage_collateral_ratio: i128,
    /// Premium paid to the deleverager in basis points (> 100%)
    pub liquidation_rate_bps: i128,
    /// Minimum debt an account may keep on any leg
    pub min_account_borrow_size: i128,
    /// Restrict deleverage to the operator
    #[serde(default)]
    pub only_vault_deleverage: bool,
    /// Vault operator
    #[serde(default)]
    pub operator: Option<AccountId>,
}

impl VaultConfig {
    /// Create a vault borrowing only in `primary_currency`
    pub fn new(id: VaultId, primary_currency: CurrencyId) -> Self {
        Self {
            id,
            primary_currency,
            secondary_currencies: Vec::new(),
            min_collateral_ratio: 1_200_000_000,
            max_required_account_collateral_ratio: 5_000_000_000,
            max_deleverage_collateral_ratio: 1_500_000_000,
            liquidation_rate_bps: DEFAULT_VAULT_LIQUIDATION_RATE_BPS,
            min_account_borrow_size: 0,
            only_vault_deleverage: false,
            operator: None,
        }
    }

    /// Add a secondary borrow currency
    pub fn with_secondary(mut self, currency: CurrencyId) -> Self {
        self.secondary_currencies.push(currency);
        self
    }

    /// Currency of a debt leg (0 = primary, 1/2 = secondary)
    pub fn leg_currency(&self, index: u8) -> Result<CurrencyId> {
        match index {
            0 => Ok(self.primary_currency),
            1 | 2 => self
                .secondary_currencies
                .get(index as usize - 1)
                .copied()
                .ok_or(Error::InvalidCurrencyIndex(index)),
            _ => Err(Error::InvalidCurrencyIndex(index)),
        }
    }

    /// Number of configured debt legs
    pub fn leg_count(&self) -> usize {
        1 + self.secondary_currencies.len()
    }

    /// Validate the vault parameters against the registered currencies
    pub fn validate(&self, currencies: &CurrencyRegistry) -> Result<()> {
        currencies.get(self.primary_currency)?;
        if self.secondary_currencies.len() > MAX_SECONDARY_CURRENCIES {
            return Err(Error::Config(format!(
                "{}: at most {} secondary currencies",
                self.id, MAX_SECONDARY_CURRENCIES
            )));
        }
        for (i, currency) in self.secondary_currencies.iter().enumerate() {
            currencies.get(*currency)?;
            if *currency == self.primary_currency
                || self.secondary_currencies[..i].contains(currency)
            {
                return Err(Error::Config(format!(
                    "{}: duplicate borrow currency {}",
                    self.id, currency
                )));
            }
        }

        if self.min_collateral_ratio <= 0
            || self.max_deleverage_collateral_ratio <= self.min_collateral_ratio
            || self.max_required_account_collateral_ratio <= self.min_collateral_ratio
        {
            return Err(Error::Config(format!(
                "{}: require 0 < min ratio < max deleverage ratio and min ratio < max required ratio",
                self.id
            )));
        }

        if self.liquidation_rate_bps <= BPS_DIVISOR {
            return Err(Error::Config(format!(
                "{}: liquidation rate {} must exceed {}",
                self.id, self.liquidation_rate_bps, BPS_DIVISOR
            )));
        }

        if self.min_account_borrow_size < 0 {
            return Err(Error::Config(format!(
                "{}: negative minimum borrow size",
                self.id
            )));
        }

        if self.only_vault_deleverage && self.operator.is_none() {
            return Err(Error::Config(format!(
                "{}: deleverage restricted but no operator configured",
                self.id
            )));
        }

        Ok(())
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// VAULT ACCOUNT
// ═══════════════════════════════════════════════════════════════════════════════

/// An account's position in a vault
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VaultAccount {
    /// Owner
    pub account: AccountId,
    /// Vault
    pub vault: VaultId,
    /// Maturity of the borrowed fCash
    pub maturity: u64,
    /// Vault shares owned
    pub vault_shares: i128,
    /// Primary debt in underlying (negative = owed)
    pub account_debt_underlying: i128,
    /// Secondary debts in their own underlying (negative = owed)
    #[serde(default)]
    pub secondary_debt: [i128; MAX_SECONDARY_CURRENCIES],
    /// Transient primary cash; must be zero outside an operation
    #[serde(default)]
    pub temp_cash_balance: i128,
    /// Unsettled secondary cash
    #[serde(default)]
    pub secondary_cash: [i128; MAX_SECONDARY_CURRENCIES],
}

impl VaultAccount {
    /// Create an empty position
    pub fn new(account: AccountId, vault: VaultId, maturity: u64) -> Self {
        Self {
            account,
            vault,
            maturity,
            vault_shares: 0,
            account_debt_underlying: 0,
            secondary_debt: [0; MAX_SECONDARY_CURRENCIES],
            temp_cash_balance: 0,
            secondary_cash: [0; MAX_SECONDARY_CURRENCIES],
        }
    }

    /// Debt on a leg (0 = primary)
    pub fn debt(&self, index: u8) -> Result<i128> {
        match index {
            0 => Ok(self.account_debt_underlying),
            1 | 2 => Ok(self.secondary_debt[index as usize - 1]),
            _ => Err(Error::InvalidCurrencyIndex(index)),
        }
    }

    /// Overwrite the debt on a leg
    pub fn set_debt(&mut self, index: u8, debt: i128) -> Result<()> {
        match index {
            0 => self.account_debt_underlying = debt,
            1 | 2 => self.secondary_debt[index as usize - 1] = debt,
            _ => return Err(Error::InvalidCurrencyIndex(index)),
        }
        Ok(())
    }

    /// Whether the position holds neither shares nor debt
    pub fn is_empty(&self) -> bool {
        self.vault_shares == 0
            && self.account_debt_underlying == 0
            && self.secondary_debt.iter().all(|d| *d == 0)
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// VAULT STATE
// ═══════════════════════════════════════════════════════════════════════════════

/// Aggregate state of a vault at one maturity
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VaultState {
    /// Vault
    pub vault: VaultId,
    /// Maturity
    pub maturity: u64,
    /// Sum of primary debts (negative)
    pub total_debt_underlying: i128,
    /// Sum of shares
    pub total_vault_shares: i128,
    /// Sum of secondary debts (negative)
    #[serde(default)]
    pub total_secondary_debt: [i128; MAX_SECONDARY_CURRENCIES],
}

impl VaultState {
    /// Create an empty aggregate
    pub fn new(vault: VaultId, maturity: u64) -> Self {
        Self {
            vault,
            maturity,
            total_debt_underlying: 0,
            total_vault_shares: 0,
            total_secondary_debt: [0; MAX_SECONDARY_CURRENCIES],
        }
    }

    /// Aggregate debt on a leg
    pub fn debt(&self, index: u8) -> Result<i128> {
        match index {
            0 => Ok(self.total_debt_underlying),
            1 | 2 => Ok(self.total_secondary_debt[index as usize - 1]),
            _ => Err(Error::InvalidCurrencyIndex(index)),
        }
    }

    /// Overwrite the aggregate debt on a leg
    pub fn set_debt(&mut self, index: u8, debt: i128) -> Result<()> {
        match index {
            0 => self.total_debt_underlying = debt,
            1 | 2 => self.total_secondary_debt[index as usize - 1] = debt,
            _ => return Err(Error::InvalidCurrencyIndex(index)),
        }
        Ok(())
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// VAULT REGISTRY
// ═══════════════════════════════════════════════════════════════════════════════

/// Registered vaults
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct VaultRegistry {
    vaults: BTreeMap<VaultId, VaultConfig>,
}

impl VaultRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a vault once; its currencies must already be registered
    pub fn register(&mut self, config: VaultConfig, currencies: &CurrencyRegistry) -> Result<()> {
        config.validate(currencies)?;
        if self.vaults.contains_key(&config.id) {
            return Err(Error::AlreadyRegistered(config.id.to_string()));
        }
        tracing::debug!(vault = %config.id, primary = %config.primary_currency, "vault registered");
        self.vaults.insert(config.id, config);
        Ok(())
    }

    /// Look up a vault
    pub fn get(&self, id: VaultId) -> Result<&VaultConfig> {
        self.vaults.get(&id).ok_or(Error::VaultNotFound(id.0))
    }

    /// All vaults
    pub fn iter(&self) -> impl Iterator<Item = &VaultConfig> {
        self.vaults.values()
    }

    /// Number of vaults
    pub fn len(&self) -> usize {
        self.vaults.len()
    }

    /// Check if empty
    pub fn is_empty(&self) -> bool {
        self.vaults.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::currency::CurrencyConfig;

    fn currencies() -> CurrencyRegistry {
        let mut registry = CurrencyRegistry::new();
        registry.register(CurrencyConfig::new(CurrencyId(1), "USDC")).unwrap();
        registry.register(CurrencyConfig::new(CurrencyId(2), "ETH")).unwrap();
        registry
    }

    #[test]
    fn test_leg_currency() {
        let config = VaultConfig::new(VaultId(1), CurrencyId(1)).with_secondary(CurrencyId(2));
        assert_eq!(config.leg_currency(0).unwrap(), CurrencyId(1));
        assert_eq!(config.leg_currency(1).unwrap(), CurrencyId(2));
        assert_eq!(config.leg_currency(2).unwrap_err(), Error::InvalidCurrencyIndex(2));
        assert_eq!(config.leg_currency(3).unwrap_err(), Error::InvalidCurrencyIndex(3));
    }

    #[test]
    fn test_validate_rejects_bad_configs() {
        let registry = currencies();
        assert!(VaultConfig::new(VaultId(1), CurrencyId(1)).validate(&registry).is_ok());

        let dup = VaultConfig::new(VaultId(1), CurrencyId(1)).with_secondary(CurrencyId(1));
        assert!(dup.validate(&registry).is_err());

        let unknown = VaultConfig::new(VaultId(1), CurrencyId(9));
        assert_eq!(unknown.validate(&registry).unwrap_err(), Error::CurrencyNotRegistered(9));

        let mut low_rate = VaultConfig::new(VaultId(1), CurrencyId(1));
        low_rate.liquidation_rate_bps = BPS_DIVISOR;
        assert!(low_rate.validate(&registry).is_err());

        let mut no_operator = VaultConfig::new(VaultId(1), CurrencyId(1));
        no_operator.only_vault_deleverage = true;
        assert!(no_operator.validate(&registry).is_err());
    }

    #[test]
    fn test_register_once() {
        let registry = currencies();
        let mut vaults = VaultRegistry::new();
        vaults
            .register(VaultConfig::new(VaultId(1), CurrencyId(1)), &registry)
            .unwrap();
        assert!(vaults
            .register(VaultConfig::new(VaultId(1), CurrencyId(2)), &registry)
            .is_err());
        assert_eq!(vaults.get(VaultId(2)).unwrap_err(), Error::VaultNotFound(2));
    }

    #[test]
    fn test_leg_debt_access() {
        let mut account = VaultAccount::new(AccountId::repeat(1), VaultId(1), 100);
        account.set_debt(0, -50).unwrap();
        account.set_debt(2, -7).unwrap();
        assert_eq!(account.debt(0).unwrap(), -50);
        assert_eq!(account.secondary_debt, [0, -7]);
        assert!(account.set_debt(4, 1).is_err());
        assert!(!account.is_empty());
    }
}
