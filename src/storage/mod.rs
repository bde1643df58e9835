//! Storage module for ledger state.
//!
//! This module provides the persistent state of the solvency core:
//! - Per-currency cash and nToken balances
//! - fCash portfolios and account context flags
//! - Vault positions and per-maturity aggregates
//! - nToken pools and markets
//!
//! ## Usage
//!
//! ```rust,ignore
//! use termlend::storage::{BalanceLedger, InMemoryLedger, LedgerTransaction};
//!
//! let mut ledger = InMemoryLedger::new();
//! let writes = {
//!     let mut tx = LedgerTransaction::new(&ledger);
//!     tx.set_balance(&account, currency, AccountBalance::cash(100))?;
//!     tx.into_writes()
//! };
//! writes.apply(&mut ledger)?;
//! ```

pub mod ledger;
pub mod transaction;

pub use ledger::*;
pub use transaction::*;
