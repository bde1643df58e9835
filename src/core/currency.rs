//! Currency registration and risk parameters.
//!
//! A currency is registered once with its haircut, buffer and fCash
//! discount adjustments; its configuration is immutable afterwards.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::error::{Error, Result};
use crate::utils::constants::*;
use crate::utils::validation::{validate_buffer_bps, validate_haircut_bps};

// ═══════════════════════════════════════════════════════════════════════════════
// CURRENCY ID
// ═══════════════════════════════════════════════════════════════════════════════

/// Integer currency identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CurrencyId(pub u16);

impl CurrencyId {
    /// Raw id
    pub fn get(&self) -> u16 {
        self.0
    }
}

impl std::fmt::Display for CurrencyId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

impl From<u16> for CurrencyId {
    fn from(id: u16) -> Self {
        Self(id)
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// CURRENCY CONFIG
// ═══════════════════════════════════════════════════════════════════════════════

/// Risk parameters of a registered currency
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CurrencyConfig {
    /// Currency id
    pub id: CurrencyId,
    /// Display symbol of the underlying
    pub symbol: String,
    /// Multiplier on positive net value, in basis points (<= 100%)
    pub collateral_haircut_bps: i128,
    /// Multiplier on negative net value, in basis points (>= 100%)
    pub debt_buffer_bps: i128,
    /// Annualized rate added to the oracle rate when valuing positive fCash
    pub fcash_haircut_rate: i128,
    /// Annualized rate removed from the oracle rate when valuing negative fCash
    pub debt_buffer_rate: i128,
    /// Annualized rate added to the oracle rate when liquidating positive fCash
    pub liquidation_fcash_haircut_rate: i128,
    /// Annualized rate removed from the oracle rate when liquidating negative fCash
    pub liquidation_debt_buffer_rate: i128,
}

impl CurrencyConfig {
    /// Create a config with default risk parameters
    pub fn new(id: CurrencyId, symbol: impl Into<String>) -> Self {
        Self {
            id,
            symbol: symbol.into(),
            collateral_haircut_bps: DEFAULT_COLLATERAL_HAIRCUT_BPS,
            debt_buffer_bps: DEFAULT_DEBT_BUFFER_BPS,
            fcash_haircut_rate: DEFAULT_FCASH_HAIRCUT_RATE,
            debt_buffer_rate: DEFAULT_DEBT_BUFFER_RATE,
            liquidation_fcash_haircut_rate: DEFAULT_LIQUIDATION_FCASH_HAIRCUT_RATE,
            liquidation_debt_buffer_rate: DEFAULT_LIQUIDATION_DEBT_BUFFER_RATE,
        }
    }

    /// Override the currency-level haircut and buffer
    pub fn with_haircut_and_buffer(mut self, haircut_bps: i128, buffer_bps: i128) -> Self {
        self.collateral_haircut_bps = haircut_bps;
        self.debt_buffer_bps = buffer_bps;
        self
    }

    /// Validate the parameters are consistent
    ///
    /// Liquidation adjustments must sit strictly inside the risk adjustments
    /// so the liquidation price lies between the oracle and risk-adjusted
    /// values.
    pub fn validate(&self) -> Result<()> {
        validate_haircut_bps(self.collateral_haircut_bps, "collateral_haircut_bps")?;
        validate_buffer_bps(self.debt_buffer_bps, "debt_buffer_bps")?;

        if self.liquidation_fcash_haircut_rate < 0
            || self.liquidation_fcash_haircut_rate >= self.fcash_haircut_rate
        {
            return Err(Error::Config(format!(
                "currency {}: liquidation fCash haircut rate {} must be in [0, {})",
                self.id, self.liquidation_fcash_haircut_rate, self.fcash_haircut_rate
            )));
        }

        if self.liquidation_debt_buffer_rate < 0
            || self.liquidation_debt_buffer_rate >= self.debt_buffer_rate
        {
            return Err(Error::Config(format!(
                "currency {}: liquidation debt buffer rate {} must be in [0, {})",
                self.id, self.liquidation_debt_buffer_rate, self.debt_buffer_rate
            )));
        }

        Ok(())
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// CURRENCY REGISTRY
// ═══════════════════════════════════════════════════════════════════════════════

/// Registered currencies, keyed by id
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CurrencyRegistry {
    currencies: BTreeMap<CurrencyId, CurrencyConfig>,
}

impl CurrencyRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a currency; each id can be registered exactly once
    pub fn register(&mut self, config: CurrencyConfig) -> Result<()> {
        config.validate()?;
        if self.currencies.contains_key(&config.id) {
            return Err(Error::AlreadyRegistered(format!("currency {}", config.id)));
        }
        tracing::debug!(currency = %config.id, symbol = %config.symbol, "currency registered");
        self.currencies.insert(config.id, config);
        Ok(())
    }

    /// Look up a registered currency
    pub fn get(&self, id: CurrencyId) -> Result<&CurrencyConfig> {
        self.currencies
            .get(&id)
            .ok_or(Error::CurrencyNotRegistered(id.0))
    }

    /// Whether a currency is registered
    pub fn contains(&self, id: CurrencyId) -> bool {
        self.currencies.contains_key(&id)
    }

    /// All registered currencies in id order
    pub fn iter(&self) -> impl Iterator<Item = &CurrencyConfig> {
        self.currencies.values()
    }

    /// Number of registered currencies
    pub fn len(&self) -> usize {
        self.currencies.len()
    }

    /// Check if empty
    pub fn is_empty(&self) -> bool {
        self.currencies.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_valid() {
        assert!(CurrencyConfig::new(CurrencyId(1), "USDC").validate().is_ok());
    }

    #[test]
    fn test_liquidation_rate_must_be_inside_risk_rate() {
        let mut config = CurrencyConfig::new(CurrencyId(1), "USDC");
        config.liquidation_fcash_haircut_rate = config.fcash_haircut_rate;
        assert!(config.validate().is_err());

        let mut config = CurrencyConfig::new(CurrencyId(1), "USDC");
        config.liquidation_debt_buffer_rate = config.debt_buffer_rate + 1;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_register_once() {
        let mut registry = CurrencyRegistry::new();
        registry.register(CurrencyConfig::new(CurrencyId(1), "USDC")).unwrap();
        let err = registry
            .register(CurrencyConfig::new(CurrencyId(1), "DAI"))
            .unwrap_err();
        assert_eq!(err.code(), 7004);
        assert_eq!(registry.get(CurrencyId(1)).unwrap().symbol, "USDC");
    }

    #[test]
    fn test_unregistered_lookup() {
        let registry = CurrencyRegistry::new();
        assert_eq!(
            registry.get(CurrencyId(9)).unwrap_err(),
            Error::CurrencyNotRegistered(9)
        );
    }
}
