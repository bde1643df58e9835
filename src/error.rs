//! Error types for the termlend solvency core.
//!
//! Every failure aborts the whole operation; the variants identify which
//! precondition or invariant was violated so callers can decide whether to
//! resubmit.

use thiserror::Error;

/// Result type alias for termlend operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for the solvency core
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    // ═══════════════════════════════════════════════════════════════════
    // Account Errors
    // ═══════════════════════════════════════════════════════════════════

    /// Account holds less than the operation needs
    #[error("Insufficient balance: required {required}, available {available}")]
    InsufficientBalance {
        /// Required amount
        required: i128,
        /// Available amount
        available: i128,
    },

    /// Collateral ratio below the required minimum
    #[error("Collateral ratio {current} below minimum {minimum}")]
    CollateralRatioTooLow {
        /// Current ratio (ratio precision)
        current: i128,
        /// Minimum ratio (ratio precision)
        minimum: i128,
    },

    /// Collateral ratio above the allowed maximum
    #[error("Collateral ratio {current} above maximum {maximum}")]
    CollateralRatioTooHigh {
        /// Current ratio (ratio precision)
        current: i128,
        /// Maximum ratio (ratio precision)
        maximum: i128,
    },

    // ═══════════════════════════════════════════════════════════════════
    // Liquidation Errors
    // ═══════════════════════════════════════════════════════════════════

    /// Position is not under-collateralized and cannot be liquidated
    #[error("Position is healthy: ratio {ratio}, minimum {minimum}")]
    PositionHealthy {
        /// Current ratio (ratio precision)
        ratio: i128,
        /// Minimum ratio (ratio precision)
        minimum: i128,
    },

    /// Maturity and amount arrays differ in length
    #[error("Length mismatch: {maturities} maturities, {amounts} amounts")]
    LengthMismatch {
        /// Number of maturities
        maturities: usize,
        /// Number of max amounts
        amounts: usize,
    },

    /// Maturities are not strictly descending
    #[error("Maturities must be strictly descending: {previous} then {next}")]
    MaturitiesNotDescending {
        /// Earlier entry in the list
        previous: u64,
        /// Offending entry
        next: u64,
    },

    /// Liquidation would transfer nothing
    #[error("Nothing to liquidate: {0}")]
    NothingToLiquidate(String),

    /// Liquidator and liquidated account are the same
    #[error("Account cannot liquidate itself")]
    SelfLiquidation,

    // ═══════════════════════════════════════════════════════════════════
    // Oracle / Market Errors
    // ═══════════════════════════════════════════════════════════════════

    /// Oracle has no rate for the request
    #[error("Rate unavailable for currency {currency}: {reason}")]
    RateUnavailable {
        /// Currency id
        currency: u16,
        /// Missing datum
        reason: String,
    },

    /// Market does not exist
    #[error("Market not found: currency {currency}, maturity {maturity}")]
    MarketNotFound {
        /// Currency id
        currency: u16,
        /// Market maturity
        maturity: u64,
    },

    // ═══════════════════════════════════════════════════════════════════
    // Vault Errors
    // ═══════════════════════════════════════════════════════════════════

    /// Vault not registered
    #[error("Vault not found: {0}")]
    VaultNotFound(u32),

    /// Vault account does not exist
    #[error("Vault account not found: {account} in vault {vault}")]
    VaultAccountNotFound {
        /// Account id (hex)
        account: String,
        /// Vault id
        vault: u32,
    },

    /// Transient vault cash must be zero between operations
    #[error("Transient cash not cleared: {0}")]
    TransientCashNotCleared(i128),

    /// Secondary currency cash must be settled before the check
    #[error("Secondary cash not settled on leg {leg}: {amount}")]
    SecondaryCashNotSettled {
        /// Secondary leg index (1 or 2)
        leg: u8,
        /// Outstanding cash
        amount: i128,
    },

    /// Debt leg index is not 0, 1 or 2, or the leg is not configured
    #[error("Invalid currency index {0}")]
    InvalidCurrencyIndex(u8),

    // ═══════════════════════════════════════════════════════════════════
    // Redemption Errors
    // ═══════════════════════════════════════════════════════════════════

    /// Redeeming more shares than held or outstanding
    #[error("Insufficient nToken shares: required {required}, available {available}")]
    InsufficientShares {
        /// Requested shares
        required: i128,
        /// Held shares
        available: i128,
    },

    /// Partial withdrawal would leave exactly zero liquidity tokens
    #[error("Partial withdrawal leaves zero liquidity tokens at maturity {0}")]
    DustLiquidityPosition(u64),

    /// Redemption produced residual fCash the caller did not accept
    #[error("Redemption has residual fCash but residuals were not accepted")]
    ResidualsNotAccepted,

    /// Redemption inside a batch would place residual fCash
    #[error("Redemption inside a batch cannot place residual fCash")]
    ResidualsInBatch,

    /// nToken not initialized for currency
    #[error("nToken not found for currency {0}")]
    NTokenNotFound(u16),

    // ═══════════════════════════════════════════════════════════════════
    // Validation Errors
    // ═══════════════════════════════════════════════════════════════════

    /// Invalid input parameter
    #[error("Invalid parameter {name}: {reason}")]
    InvalidParameter {
        /// Parameter name
        name: String,
        /// Reason for invalidity
        reason: String,
    },

    /// Amount is zero
    #[error("Amount cannot be zero")]
    ZeroAmount,

    /// Overflow in calculation
    #[error("Arithmetic overflow in {operation}")]
    Overflow {
        /// Operation that overflowed
        operation: String,
    },

    /// Underflow in calculation
    #[error("Arithmetic underflow in {operation}")]
    Underflow {
        /// Operation that underflowed
        operation: String,
    },

    /// Division by zero
    #[error("Division by zero in {operation}")]
    DivisionByZero {
        /// Operation that divided by zero
        operation: String,
    },

    // ═══════════════════════════════════════════════════════════════════
    // Protocol Errors
    // ═══════════════════════════════════════════════════════════════════

    /// Mutating entry point invoked while another is in progress
    #[error("Reentrant call rejected")]
    Reentrancy,

    /// Not authorized to perform this action
    #[error("Not authorized: {0}")]
    Unauthorized(String),

    /// Currency not registered
    #[error("Currency not registered: {0}")]
    CurrencyNotRegistered(u16),

    /// Registry entry already exists
    #[error("Already registered: {0}")]
    AlreadyRegistered(String),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// Invariant violation detected
    #[error("Invariant violation: {0}")]
    InvariantViolation(String),

    // ═══════════════════════════════════════════════════════════════════
    // Serialization Errors
    // ═══════════════════════════════════════════════════════════════════

    /// Serialization failed
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Deserialization failed
    #[error("Deserialization error: {0}")]
    Deserialization(String),

    // ═══════════════════════════════════════════════════════════════════
    // Internal Errors
    // ═══════════════════════════════════════════════════════════════════

    /// Internal error (should not happen in production)
    #[error("Internal error: {0}")]
    Internal(String),

    /// Storage error
    #[error("Storage error: {0}")]
    Storage(String),
}

impl Error {
    /// Returns true if resubmitting later may succeed
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Error::PositionHealthy { .. }
                | Error::CollateralRatioTooLow { .. }
                | Error::InsufficientBalance { .. }
                | Error::RateUnavailable { .. }
                | Error::Reentrancy
        )
    }

    /// Returns true if this is a critical error requiring immediate attention
    pub fn is_critical(&self) -> bool {
        matches!(
            self,
            Error::InvariantViolation(_)
                | Error::TransientCashNotCleared(_)
                | Error::Internal(_)
                | Error::Overflow { .. }
                | Error::Underflow { .. }
        )
    }

    /// Returns the error code for external systems
    pub fn code(&self) -> u32 {
        match self {
            // Account errors: 1xxx
            Error::InsufficientBalance { .. } => 1001,
            Error::CollateralRatioTooLow { .. } => 1002,
            Error::CollateralRatioTooHigh { .. } => 1003,

            // Liquidation errors: 2xxx
            Error::PositionHealthy { .. } => 2001,
            Error::LengthMismatch { .. } => 2002,
            Error::MaturitiesNotDescending { .. } => 2003,
            Error::NothingToLiquidate(_) => 2004,
            Error::SelfLiquidation => 2005,

            // Oracle / market errors: 3xxx
            Error::RateUnavailable { .. } => 3001,
            Error::MarketNotFound { .. } => 3002,

            // Vault errors: 4xxx
            Error::VaultNotFound(_) => 4001,
            Error::VaultAccountNotFound { .. } => 4002,
            Error::TransientCashNotCleared(_) => 4003,
            Error::SecondaryCashNotSettled { .. } => 4004,
            Error::InvalidCurrencyIndex(_) => 4005,

            // Redemption errors: 5xxx
            Error::InsufficientShares { .. } => 5001,
            Error::DustLiquidityPosition(_) => 5002,
            Error::ResidualsNotAccepted => 5003,
            Error::ResidualsInBatch => 5004,
            Error::NTokenNotFound(_) => 5005,

            // Validation errors: 6xxx
            Error::InvalidParameter { .. } => 6001,
            Error::ZeroAmount => 6002,
            Error::Overflow { .. } => 6003,
            Error::Underflow { .. } => 6004,
            Error::DivisionByZero { .. } => 6005,

            // Protocol errors: 7xxx
            Error::Reentrancy => 7001,
            Error::Unauthorized(_) => 7002,
            Error::CurrencyNotRegistered(_) => 7003,
            Error::AlreadyRegistered(_) => 7004,
            Error::Config(_) => 7005,
            Error::InvariantViolation(_) => 7006,

            // Serialization errors: 8xxx
            Error::Serialization(_) => 8001,
            Error::Deserialization(_) => 8002,

            // Internal errors: 9xxx
            Error::Internal(_) => 9001,
            Error::Storage(_) => 9002,
        }
    }
}
