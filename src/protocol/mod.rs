//! Protocol module - entry points and event emission.
//!
//! This module provides the solvency core facade that runs every
//! liquidation and redemption under one transactional boundary, and the
//! audit events it emits.

pub mod core;
pub mod events;

pub use self::core::*;
pub use events::*;
