//! Transaction Coordinator
//!
//! Gives every logical operation an isolated transaction over the accounts it
//! touches. Isolation is pessimistic: a row lock is taken on first touch and
//! held until commit or abort, so overlapping transactions run one after the
//! other and callers never need a retry loop. Every transaction has a
//! deadline; an operation that would run past it aborts the transaction with
//! `CoordinatorError::Timeout`, and a transaction left idle past it is rolled
//! back in the background.

mod error;
mod transaction;

use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

use crate::ledger_store::LedgerStore;

pub use error::CoordinatorError;
pub use transaction::{Transaction, TransactionState};

/// Default bounded lifetime of a transaction
pub const DEFAULT_TRANSACTION_TIMEOUT: Duration = Duration::from_secs(5);

/// Opens transactions against a ledger store
#[derive(Clone)]
pub struct TransactionCoordinator {
    store: Arc<dyn LedgerStore>,
    transaction_timeout: Duration,
}

impl TransactionCoordinator {
    pub fn new(store: Arc<dyn LedgerStore>, transaction_timeout: Duration) -> Self {
        Self {
            store,
            transaction_timeout,
        }
    }

    /// The underlying store, for committed-state reads
    pub fn store(&self) -> &Arc<dyn LedgerStore> {
        &self.store
    }

    /// Open a new transaction scope
    pub async fn begin(&self) -> Result<Transaction, CoordinatorError> {
        let started_at = Instant::now();
        let inner = self
            .store
            .begin(started_at + self.transaction_timeout)
            .await?;
        let tx = Transaction::new(inner, started_at, self.transaction_timeout);
        tracing::debug!(transaction_id = %tx.id(), "Transaction started");
        Ok(tx)
    }
}

impl std::fmt::Debug for TransactionCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransactionCoordinator")
            .field("transaction_timeout", &self.transaction_timeout)
            .finish_non_exhaustive()
    }
}
