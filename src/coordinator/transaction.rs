//! Transaction handle
//!
//! A `Transaction` is the only way to mutate an account. It owns the store
//! transaction for its whole life: `commit` and `abort` both close it, and
//! dropping a still-active handle rolls it back. A reaper task rolls the
//! store transaction back once the deadline passes, even if the handle is
//! never touched again.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, OwnedMappedMutexGuard, OwnedMutexGuard};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use uuid::Uuid;

use crate::domain::{Account, OwnerId};
use crate::ledger_store::{StoreError, StoreTransaction};

use super::CoordinatorError;

type StoreSlot = Arc<Mutex<Option<Box<dyn StoreTransaction>>>>;
type HeldStore = OwnedMappedMutexGuard<Option<Box<dyn StoreTransaction>>, Box<dyn StoreTransaction>>;

/// Lifecycle of a transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionState {
    Active,
    Committed,
    Aborted,
}

/// Isolated unit of reads and staged writes
pub struct Transaction {
    id: Uuid,
    started_at: Instant,
    deadline: Instant,
    lifetime: Duration,
    state: TransactionState,
    inner: StoreSlot,
    reaper: JoinHandle<()>,
}

impl Transaction {
    pub(super) fn new(
        inner: Box<dyn StoreTransaction>,
        started_at: Instant,
        lifetime: Duration,
    ) -> Self {
        let id = Uuid::new_v4();
        let deadline = started_at + lifetime;
        let inner: StoreSlot = Arc::new(Mutex::new(Some(inner)));
        let reaper = tokio::spawn(reap_at(id, deadline, inner.clone()));

        Self {
            id,
            started_at,
            deadline,
            lifetime,
            state: TransactionState::Active,
            inner,
            reaper,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Current state; an active transaction past its deadline reports `Aborted`
    pub fn state(&self) -> TransactionState {
        match self.state {
            TransactionState::Active if Instant::now() >= self.deadline => {
                TransactionState::Aborted
            }
            state => state,
        }
    }

    /// Lock a set of accounts in canonical order.
    ///
    /// Two transactions enlisting the same accounts acquire them in the same
    /// order and therefore cannot deadlock each other.
    pub async fn enlist(&mut self, owners: &[OwnerId]) -> Result<(), CoordinatorError> {
        let mut ordered = owners.to_vec();
        ordered.sort();
        ordered.dedup();

        for owner_id in ordered {
            let mut store = self.acquire().await?;
            let outcome = store.lock(owner_id).await;
            drop(store);
            self.settle(outcome).await?;
        }
        Ok(())
    }

    /// Read an account, locking its row.
    ///
    /// Returns the committed balance plus this transaction's staged deltas.
    pub async fn read(&mut self, owner_id: OwnerId) -> Result<Account, CoordinatorError> {
        let mut store = self.acquire().await?;
        let outcome = store.read(owner_id).await;
        drop(store);
        self.settle(outcome).await
    }

    /// Stage a balance change, visible only through this handle until commit
    pub async fn write(&mut self, owner_id: OwnerId, delta: i64) -> Result<(), CoordinatorError> {
        let mut store = self.acquire().await?;
        let outcome = store.apply_delta(owner_id, delta).await;
        drop(store);
        self.settle(outcome).await?;

        tracing::trace!(transaction_id = %self.id, owner_id = %owner_id, delta, "Write staged");
        Ok(())
    }

    /// Apply every staged write atomically.
    ///
    /// The deadline is checked once, before the store is asked to commit;
    /// from then on the outcome is awaited. On failure nothing is applied
    /// and the transaction is already rolled back, so a later `abort` is a
    /// no-op.
    pub async fn commit(&mut self) -> Result<(), CoordinatorError> {
        self.ensure_live().await?;
        let taken = self.inner.lock().await.take();
        let Some(mut store) = taken else {
            return Err(self.expire().await);
        };
        self.reaper.abort();

        match store.commit().await {
            Ok(()) => {
                self.state = TransactionState::Committed;
                tracing::debug!(
                    transaction_id = %self.id,
                    elapsed_ms = %self.started_at.elapsed().as_millis(),
                    "Transaction committed"
                );
                Ok(())
            }
            Err(e) => {
                self.state = TransactionState::Aborted;
                if let Err(rollback_err) = store.rollback().await {
                    tracing::warn!(
                        transaction_id = %self.id,
                        error = %rollback_err,
                        "Rollback after failed commit reported an error"
                    );
                }
                tracing::warn!(transaction_id = %self.id, error = %e, "Commit failed");
                Err(CoordinatorError::CommitFailed(e))
            }
        }
    }

    /// Discard staged writes and release locks. Idempotent.
    pub async fn abort(&mut self) {
        if self.state != TransactionState::Active {
            return;
        }
        self.state = TransactionState::Aborted;
        self.reaper.abort();

        let taken = self.inner.lock().await.take();
        if let Some(mut store) = taken {
            if let Err(e) = store.rollback().await {
                tracing::warn!(transaction_id = %self.id, error = %e, "Rollback reported an error");
            }
        }
        tracing::debug!(transaction_id = %self.id, "Transaction aborted");
    }

    async fn ensure_live(&mut self) -> Result<(), CoordinatorError> {
        if self.state != TransactionState::Active {
            return Err(CoordinatorError::NotActive(self.id));
        }
        if Instant::now() >= self.deadline {
            return Err(self.expire().await);
        }
        Ok(())
    }

    /// Exclusive access to the store transaction while it is still open
    async fn acquire(&mut self) -> Result<HeldStore, CoordinatorError> {
        self.ensure_live().await?;

        let slot = self.inner.clone().lock_owned().await;
        match OwnedMutexGuard::try_map(slot, |slot| slot.as_mut()) {
            Ok(store) => Ok(store),
            Err(empty) => {
                // Reaped between the deadline check and the lock.
                drop(empty);
                Err(self.expire().await)
            }
        }
    }

    async fn settle<T>(&mut self, outcome: Result<T, StoreError>) -> Result<T, CoordinatorError> {
        match outcome {
            Err(StoreError::LockTimeout(owner_id)) => {
                tracing::debug!(transaction_id = %self.id, owner_id = %owner_id, "Row lock wait expired");
                Err(self.expire().await)
            }
            outcome => outcome.map_err(CoordinatorError::from),
        }
    }

    async fn expire(&mut self) -> CoordinatorError {
        tracing::warn!(
            transaction_id = %self.id,
            lifetime_ms = %self.lifetime.as_millis(),
            "Transaction deadline exceeded, aborting"
        );
        self.abort().await;
        CoordinatorError::Timeout {
            id: self.id,
            after: self.lifetime,
        }
    }
}

/// Roll back the store transaction at `deadline` unless the handle closed it first
async fn reap_at(id: Uuid, deadline: Instant, slot: StoreSlot) {
    tokio::time::sleep_until(deadline).await;

    let taken = slot.lock().await.take();
    if let Some(mut store) = taken {
        tracing::warn!(transaction_id = %id, "Transaction deadline passed while idle, rolling back");
        if let Err(e) = store.rollback().await {
            tracing::warn!(transaction_id = %id, error = %e, "Rollback reported an error");
        }
    }
}

impl Drop for Transaction {
    fn drop(&mut self) {
        self.reaper.abort();
        // Dropping the store transaction rolls it back.
        if let Ok(mut slot) = self.inner.try_lock() {
            if slot.take().is_some() {
                tracing::warn!(transaction_id = %self.id, "Transaction dropped while active, rolling back");
            }
        }
    }
}

impl std::fmt::Debug for Transaction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Transaction")
            .field("id", &self.id)
            .field("state", &self.state)
            .field("lifetime", &self.lifetime)
            .finish_non_exhaustive()
    }
}
