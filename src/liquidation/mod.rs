//! Liquidation module for the termlend solvency core.
//!
//! This module restores solvency of distressed positions:
//! - Local-currency fCash liquidation
//! - Cross-currency fCash liquidation
//! - Vault deleverage and the vault entry/exit ratio check
//!
//! Every algorithm is split into a pure calculation over committed state
//! and a finalization that takes the calculation's output and writes it.

pub mod engine;
pub mod fcash;
pub mod vault;

pub use engine::*;
pub use fcash::FCashLiquidation;
pub use vault::*;
