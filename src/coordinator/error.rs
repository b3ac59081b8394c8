//! Coordinator Errors

use std::time::Duration;
use uuid::Uuid;

use crate::ledger_store::StoreError;

/// Errors raised by coordinator transactions
#[derive(Debug, thiserror::Error)]
pub enum CoordinatorError {
    /// The transaction outlived its deadline and was aborted
    #[error("Transaction {id} exceeded its {}ms lifetime and was aborted", .after.as_millis())]
    Timeout { id: Uuid, after: Duration },

    /// The transaction was already committed or aborted
    #[error("Transaction {0} is no longer active")]
    NotActive(Uuid),

    /// The store refused to apply the staged writes; nothing was applied
    #[error("Commit failed: {0}")]
    CommitFailed(#[source] StoreError),

    /// Underlying store failure
    #[error(transparent)]
    Store(#[from] StoreError),
}
