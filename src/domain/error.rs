//! Domain Error Types
//!
//! Pure domain errors that don't depend on infrastructure.

use thiserror::Error;

use super::{AmountError, OwnerId};

/// Domain-specific errors
///
/// These errors represent business rule violations.
/// They are independent of the web/infrastructure layer.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum DomainError {
    /// Invalid amount (zero, negative, or exceeds limit)
    #[error("Invalid transfer amount: {0}")]
    InvalidAmount(String),

    /// Sender and recipient are the same owner
    #[error("You cannot send money to yourself")]
    SelfTransfer,

    /// Recipient has no account
    #[error("Recipient not found: {0}")]
    RecipientNotFound(OwnerId),

    /// Account not found
    #[error("Account not found: {0}")]
    AccountNotFound(OwnerId),

    /// Owner already has an account
    #[error("Account already exists for owner {0}")]
    AccountExists(OwnerId),

    /// Insufficient balance for debit operation
    #[error("Insufficient funds: required {required}, available {available}")]
    InsufficientFunds { required: i64, available: i64 },

    /// A credit would push the balance past `MAX_BALANCE`
    #[error("Balance of {0} would exceed the maximum allowed balance")]
    BalanceLimitExceeded(OwnerId),
}

impl DomainError {
    /// Create an insufficient funds error
    pub fn insufficient_funds(required: i64, available: i64) -> Self {
        Self::InsufficientFunds {
            required,
            available,
        }
    }
}

impl From<AmountError> for DomainError {
    fn from(err: AmountError) -> Self {
        Self::InvalidAmount(err.to_string())
    }
}
