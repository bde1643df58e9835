//! Oracle module for rates and share prices.
//!
//! This module provides the valuation inputs the solvency core reads:
//! - Cash rates converting stable cash to underlying
//! - Annualized oracle rates for discounting fCash
//! - Settlement rates of matured fCash
//! - Exchange rates into the reference unit
//! - Vault share prices

pub mod rate_oracle;
pub mod vault_shares;

pub use rate_oracle::*;
pub use vault_shares::*;
