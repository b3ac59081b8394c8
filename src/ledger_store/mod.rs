//! Ledger Store module
//!
//! Persistence layer for account balances.
//! The store owns every `Account` record; callers hold only owner ids.
//! Mutations happen exclusively through a `StoreTransaction`, which stages
//! deltas under row locks and applies them all at commit.

mod error;
mod memory;
mod postgres;

use async_trait::async_trait;
use tokio::time::Instant;

use crate::domain::{Account, Balance, OwnerId};

pub use error::StoreError;
pub use memory::{InMemoryLedgerStore, InMemoryTransaction};
pub use postgres::{PgLedgerStore, PgStoreTransaction};

/// Account table with point lookups and transaction-scoped mutation.
#[async_trait]
pub trait LedgerStore: Send + Sync {
    /// Latest committed state of an account
    async fn get_account(&self, owner_id: OwnerId) -> Result<Account, StoreError>;

    /// Open the single account of a new owner
    async fn create_account(
        &self,
        owner_id: OwnerId,
        initial_balance: Balance,
    ) -> Result<Account, StoreError>;

    /// Start a store-level transaction.
    ///
    /// No row lock wait may outlast `deadline`; a wait that would is
    /// abandoned with `StoreError::LockTimeout`.
    async fn begin(&self, deadline: Instant) -> Result<Box<dyn StoreTransaction>, StoreError>;
}

/// Store side of a coordinator transaction.
///
/// Row locks are held from first touch until `commit` or `rollback`.
/// Dropping an open transaction must behave like `rollback`.
#[async_trait]
pub trait StoreTransaction: Send {
    /// Acquire the row lock for an account
    async fn lock(&mut self, owner_id: OwnerId) -> Result<(), StoreError>;

    /// Committed state plus the deltas staged by this transaction
    async fn read(&mut self, owner_id: OwnerId) -> Result<Account, StoreError>;

    /// Stage a balance change; nothing is applied before `commit`
    async fn apply_delta(&mut self, owner_id: OwnerId, delta: i64) -> Result<(), StoreError>;

    /// Apply every staged delta atomically and release locks.
    ///
    /// Once the backend has been asked to commit, the outcome is awaited
    /// rather than abandoned.
    async fn commit(&mut self) -> Result<(), StoreError>;

    /// Discard staged deltas and release locks
    async fn rollback(&mut self) -> Result<(), StoreError>;
}
