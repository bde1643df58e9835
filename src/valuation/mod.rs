//! Position valuation.
//!
//! This module turns holdings into health factors:
//! - Risk-adjusted and liquidation discount factors
//! - Per-currency net values of accounts
//! - Collateral ratios of accounts and vault positions

pub mod discount;
pub mod health;

pub use discount::*;
pub use health::*;
