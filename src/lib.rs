//! # termlend
//!
//! The solvency core of a multi-currency fixed-rate lending protocol.
//! Accounts borrow and lend through fCash, fixed-maturity claims and debts
//! that settle to underlying value at maturity; leveraged vaults borrow in
//! up to three currencies against pooled vault shares; liquidity providers
//! hold nTokens, shares of a pool spread across every active maturity.
//!
//! ## Architecture
//!
//! The crate consists of several modules:
//!
//! - **Valuation**: Health factors of accounts and vault positions
//! - **Liquidation**: Local and cross-currency fCash liquidation, vault deleverage
//! - **Redemption**: nToken redemption into cash and residual fCash
//! - **Protocol**: Transactional entry points and audit events
//!
//! Rates, markets, vault share prices and the balance ledger are
//! collaborators behind traits; in-memory implementations are provided.
//!
//! ## Example
//!
//! ```rust,ignore
//! use termlend::prelude::*;
//!
//! let mut core = SolvencyCore::new(&config, ledger, oracle, market, shares, now)?;
//! let health = core.compute_health_factors(&account, None)?;
//! if health.is_below(core.params().min_collateral_ratio) {
//!     core.liquidate_fcash_local(&liquidator, &account, usdc, &[m2, m1], &[0, 0])?;
//! }
//! ```

#![forbid(unsafe_code)]
#![warn(
    missing_docs,
    rust_2018_idioms,
    trivial_casts,
    unused_lifetimes,
    unused_qualifications
)]

pub mod core;
pub mod error;
pub mod liquidation;
pub mod market;
pub mod oracle;
pub mod protocol;
pub mod redemption;
pub mod storage;
pub mod utils;
pub mod valuation;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::core::{
        config::{ProtocolConfig, ProtocolParams},
        currency::{CurrencyConfig, CurrencyId, CurrencyRegistry},
        ntoken::{LiquidityToken, NTokenPortfolio},
        portfolio::{AccountBalance, AccountContext, Portfolio},
        vault::{VaultAccount, VaultConfig, VaultId, VaultRegistry, VaultState},
    };
    pub use crate::error::{Error, Result};
    pub use crate::liquidation::{
        engine::{LiquidationEngine, LiquidationReceipt},
        fcash::FCashLiquidation,
        vault::VaultDeleverage,
    };
    pub use crate::market::{ConstantRateMarket, MarketAdapter, MarketState};
    pub use crate::oracle::{
        rate_oracle::{CashRate, CurrencyRates, RateOracle, StaticRateOracle},
        vault_shares::{StaticShareValuation, VaultShareValuation},
    };
    pub use crate::protocol::{
        core::SolvencyCore,
        events::{EventLog, ProtocolEvent},
    };
    pub use crate::redemption::ntoken::{NTokenRedemption, RedeemRequest, RedemptionEngine};
    pub use crate::storage::{
        ledger::{BalanceLedger, InMemoryLedger},
        transaction::{LedgerTransaction, LedgerWrites},
    };
    pub use crate::utils::crypto::{AccountId, Hash};
    pub use crate::valuation::health::{HealthFactors, ValuationContext};
}

/// Protocol version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Protocol name
pub const PROTOCOL_NAME: &str = "termlend";
