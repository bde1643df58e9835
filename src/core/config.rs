//! Protocol configuration and parameters.
//!
//! Parameters are loaded once, validated, and turned into the currency and
//! vault registries. Registrations are immutable afterwards.

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::core::currency::{CurrencyConfig, CurrencyRegistry};
use crate::core::vault::{VaultConfig, VaultRegistry};
use crate::error::{Error, Result};
use crate::utils::constants::*;

/// Environment override for the minimum account collateral ratio
pub const ENV_MIN_COLLATERAL_RATIO: &str = "TERMLEND_MIN_COLLATERAL_RATIO";

/// Environment override for the event history cap
pub const ENV_MAX_EVENTS: &str = "TERMLEND_MAX_EVENTS";

// ═══════════════════════════════════════════════════════════════════════════════
// PROTOCOL PARAMETERS
// ═══════════════════════════════════════════════════════════════════════════════

/// Protocol-wide parameters
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProtocolParams {
    /// Protocol version
    #[serde(default = "default_version")]
    pub version: String,

    /// Minimum account collateral ratio (ratio precision)
    /// Below this, an account's fCash can be liquidated
    pub min_collateral_ratio: i128,

    /// Number of events kept in memory
    pub max_events: usize,

    /// Whether redemptions inside a batch may place residual fCash
    #[serde(default)]
    pub batch_residuals_allowed: bool,
}

fn default_version() -> String {
    env!("CARGO_PKG_VERSION").to_string()
}

impl Default for ProtocolParams {
    fn default() -> Self {
        Self {
            version: default_version(),
            min_collateral_ratio: DEFAULT_MIN_COLLATERAL_RATIO,
            max_events: DEFAULT_MAX_EVENTS,
            batch_residuals_allowed: false,
        }
    }
}

impl ProtocolParams {
    /// Create with custom minimum ratio (for testing)
    pub fn with_min_ratio(mut self, ratio: i128) -> Self {
        self.min_collateral_ratio = ratio;
        self
    }

    /// Validate parameters are consistent
    pub fn validate(&self) -> Result<()> {
        if self.min_collateral_ratio <= 0 {
            return Err(Error::Config(format!(
                "min_collateral_ratio must be positive, got {}",
                self.min_collateral_ratio
            )));
        }
        if self.max_events == 0 {
            return Err(Error::Config("max_events must be greater than 0".into()));
        }
        if self.batch_residuals_allowed {
            return Err(Error::Config(
                "batched redemptions cannot place residual fCash".into(),
            ));
        }
        Ok(())
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// PROTOCOL CONFIGURATION
// ═══════════════════════════════════════════════════════════════════════════════

/// Complete configuration: parameters plus currency and vault listings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProtocolConfig {
    /// Protocol parameters
    #[serde(default)]
    pub params: ProtocolParams,

    /// Currencies to register, in order
    #[serde(default)]
    pub currencies: Vec<CurrencyConfig>,

    /// Vaults to register, in order
    #[serde(default)]
    pub vaults: Vec<VaultConfig>,
}

impl ProtocolConfig {
    /// Create a configuration with the given parameters
    pub fn new(params: ProtocolParams) -> Self {
        Self {
            params,
            ..Default::default()
        }
    }

    /// Add a currency listing
    pub fn with_currency(mut self, currency: CurrencyConfig) -> Self {
        self.currencies.push(currency);
        self
    }

    /// Add a vault listing
    pub fn with_vault(mut self, vault: VaultConfig) -> Self {
        self.vaults.push(vault);
        self
    }

    /// Parse from JSON
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| Error::Deserialization(e.to_string()))
    }

    /// Load from a JSON file and apply environment overrides
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("{}: {}", path.display(), e)))?;
        let mut config = Self::from_json(&content)?;
        config.apply_env_overrides()?;
        config.validate()?;
        Ok(config)
    }

    /// Save to a JSON file
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let content = serde_json::to_string_pretty(self)
            .map_err(|e| Error::Serialization(e.to_string()))?;
        std::fs::write(path.as_ref(), content)
            .map_err(|e| Error::Config(format!("{}: {}", path.as_ref().display(), e)))
    }

    /// Apply environment variable overrides
    pub fn apply_env_overrides(&mut self) -> Result<()> {
        if let Ok(ratio) = std::env::var(ENV_MIN_COLLATERAL_RATIO) {
            self.params.min_collateral_ratio = ratio.trim().parse().map_err(|_| {
                Error::Config(format!("{} is not an integer: {}", ENV_MIN_COLLATERAL_RATIO, ratio))
            })?;
        }

        if let Ok(max) = std::env::var(ENV_MAX_EVENTS) {
            self.params.max_events = max.trim().parse().map_err(|_| {
                Error::Config(format!("{} is not an integer: {}", ENV_MAX_EVENTS, max))
            })?;
        }

        Ok(())
    }

    /// Validate parameters and listings
    pub fn validate(&self) -> Result<()> {
        self.params.validate()?;
        self.registries().map(|_| ())
    }

    /// Build the currency and vault registries
    pub fn registries(&self) -> Result<(CurrencyRegistry, VaultRegistry)> {
        let mut currencies = CurrencyRegistry::new();
        for currency in &self.currencies {
            currencies.register(currency.clone())?;
        }

        let mut vaults = VaultRegistry::new();
        for vault in &self.vaults {
            vaults.register(vault.clone(), &currencies)?;
        }

        Ok((currencies, vaults))
    }
}
