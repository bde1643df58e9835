//! Redemption module for the termlend solvency core.
//!
//! Converts pooled liquidity-provider shares (nTokens) into cash and,
//! where a claim cannot be sold, residual fCash held by the redeemer.

pub mod ntoken;

pub use ntoken::*;
