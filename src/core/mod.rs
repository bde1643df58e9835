//! Core data model of the solvency core.
//!
//! This module contains the fundamental building blocks:
//! - Configuration and protocol parameters
//! - Currency registration and risk parameters
//! - Balances, fCash portfolios and account context
//! - Leveraged vault positions
//! - nToken pooled liquidity

pub mod config;
pub mod currency;
pub mod ntoken;
pub mod portfolio;
pub mod vault;

pub use config::*;
pub use currency::*;
pub use ntoken::*;
pub use portfolio::*;
pub use vault::*;
