//! Utility modules for the solvency core.
//!
//! This module contains shared utilities used across the crate:
//! - Identifiers and audit hashes
//! - Fixed-point arithmetic and discounting
//! - Validation helpers
//! - Reentrancy guard
//! - Constants

pub mod constants;
pub mod crypto;
pub mod guard;
pub mod math;
pub mod validation;

pub use constants::*;
pub use crypto::*;
pub use guard::*;
pub use math::*;
pub use validation::*;
