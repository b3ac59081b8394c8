//! Ledger Store Errors
//!
//! Error types for ledger store operations.

use crate::domain::{AmountError, OwnerId};

/// Errors that can occur in the ledger store
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// No account for this owner
    #[error("Account not found: {0}")]
    AccountNotFound(OwnerId),

    /// Owner already has an account
    #[error("Account already exists: {0}")]
    AccountExists(OwnerId),

    /// A staged or committed delta would drive the balance below zero
    #[error("Delta {delta} would make balance of {owner_id} negative (current {balance})")]
    NegativeBalance {
        owner_id: OwnerId,
        balance: i64,
        delta: i64,
    },

    /// A delta would exceed the maximum balance
    #[error("Delta would overflow balance of {0}")]
    BalanceOverflow(OwnerId),

    /// Waiting for a row lock ran past the transaction deadline
    #[error("Timed out waiting for the row lock of {0}")]
    LockTimeout(OwnerId),

    /// The store transaction was already committed or rolled back
    #[error("Store transaction is closed")]
    Closed,

    /// Backend failure not covered by the database driver
    #[error("Storage backend error: {0}")]
    Backend(String),

    /// Database error
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

impl StoreError {
    /// Map a failed balance computation for `owner_id` to a store error
    pub(crate) fn from_amount(owner_id: OwnerId, balance: i64, delta: i64, err: AmountError) -> Self {
        match err {
            AmountError::Overflow => StoreError::BalanceOverflow(owner_id),
            _ => StoreError::NegativeBalance {
                owner_id,
                balance,
                delta,
            },
        }
    }
}
