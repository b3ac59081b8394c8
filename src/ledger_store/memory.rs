//! In-memory Ledger Store
//!
//! Committed rows live behind one `RwLock`. Each row also owns an async
//! mutex that serves as its row lock; a transaction keeps the owned guard
//! until it commits or rolls back, so overlapping transactions serialize.

use async_trait::async_trait;
use chrono::Utc;
use std::collections::hash_map::Entry;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard, RwLock};
use tokio::time::{timeout_at, Instant};

use crate::domain::{Account, Balance, OwnerId};

use super::{LedgerStore, StoreError, StoreTransaction};

#[derive(Debug)]
struct Row {
    account: Account,
    lock: Arc<Mutex<()>>,
}

#[derive(Debug, Default)]
struct Ledger {
    rows: RwLock<HashMap<OwnerId, Row>>,
}

impl Ledger {
    async fn committed(&self, owner_id: OwnerId) -> Result<Account, StoreError> {
        let rows = self.rows.read().await;
        rows.get(&owner_id)
            .map(|row| row.account.clone())
            .ok_or(StoreError::AccountNotFound(owner_id))
    }
}

/// Thread-safe in-memory store, cheap to clone.
///
/// Used when no database is configured, and in tests.
#[derive(Debug, Clone, Default)]
pub struct InMemoryLedgerStore {
    ledger: Arc<Ledger>,
}

impl InMemoryLedgerStore {
    /// Creates a new, empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Committed state of every account, ordered by owner id.
    pub async fn accounts(&self) -> Vec<Account> {
        let rows = self.ledger.rows.read().await;
        let mut accounts: Vec<Account> = rows.values().map(|row| row.account.clone()).collect();
        accounts.sort_by_key(|account| account.owner_id);
        accounts
    }
}

#[async_trait]
impl LedgerStore for InMemoryLedgerStore {
    async fn get_account(&self, owner_id: OwnerId) -> Result<Account, StoreError> {
        self.ledger.committed(owner_id).await
    }

    async fn create_account(
        &self,
        owner_id: OwnerId,
        initial_balance: Balance,
    ) -> Result<Account, StoreError> {
        let mut rows = self.ledger.rows.write().await;
        match rows.entry(owner_id) {
            Entry::Occupied(_) => Err(StoreError::AccountExists(owner_id)),
            Entry::Vacant(slot) => {
                let account = Account::open(owner_id, initial_balance);
                slot.insert(Row {
                    account: account.clone(),
                    lock: Arc::default(),
                });
                Ok(account)
            }
        }
    }

    async fn begin(&self, deadline: Instant) -> Result<Box<dyn StoreTransaction>, StoreError> {
        Ok(Box::new(InMemoryTransaction::new(self.ledger.clone(), deadline)))
    }
}

/// Transaction over an `InMemoryLedgerStore`.
///
/// Dropping it releases every row lock and forgets staged deltas.
#[derive(Debug)]
pub struct InMemoryTransaction {
    ledger: Arc<Ledger>,
    deadline: Instant,
    held: HashMap<OwnerId, OwnedMutexGuard<()>>,
    staged: BTreeMap<OwnerId, i64>,
}

impl InMemoryTransaction {
    fn new(ledger: Arc<Ledger>, deadline: Instant) -> Self {
        Self {
            ledger,
            deadline,
            held: HashMap::new(),
            staged: BTreeMap::new(),
        }
    }

    fn staged_delta(&self, owner_id: OwnerId) -> i64 {
        self.staged.get(&owner_id).copied().unwrap_or(0)
    }

    fn release(&mut self) {
        self.staged.clear();
        self.held.clear();
    }
}

#[async_trait]
impl StoreTransaction for InMemoryTransaction {
    async fn lock(&mut self, owner_id: OwnerId) -> Result<(), StoreError> {
        if self.held.contains_key(&owner_id) {
            return Ok(());
        }

        // Never wait on a row lock while holding the table lock.
        let row_lock = {
            let rows = self.ledger.rows.read().await;
            rows.get(&owner_id)
                .map(|row| row.lock.clone())
                .ok_or(StoreError::AccountNotFound(owner_id))?
        };

        let guard = timeout_at(self.deadline, row_lock.lock_owned())
            .await
            .map_err(|_| StoreError::LockTimeout(owner_id))?;
        self.held.insert(owner_id, guard);
        Ok(())
    }

    async fn read(&mut self, owner_id: OwnerId) -> Result<Account, StoreError> {
        self.lock(owner_id).await?;

        let mut account = self.ledger.committed(owner_id).await?;
        let delta = self.staged_delta(owner_id);
        let committed = account.balance.value();
        account.balance = account
            .balance
            .apply_delta(delta)
            .map_err(|e| StoreError::from_amount(owner_id, committed, delta, e))?;
        Ok(account)
    }

    async fn apply_delta(&mut self, owner_id: OwnerId, delta: i64) -> Result<(), StoreError> {
        let current = self.read(owner_id).await?;
        current
            .balance
            .apply_delta(delta)
            .map_err(|e| StoreError::from_amount(owner_id, current.balance.value(), delta, e))?;

        *self.staged.entry(owner_id).or_insert(0) += delta;
        Ok(())
    }

    async fn commit(&mut self) -> Result<(), StoreError> {
        {
            let mut rows = self.ledger.rows.write().await;

            // Validate everything before touching anything.
            let mut updates = Vec::with_capacity(self.staged.len());
            for (&owner_id, &delta) in &self.staged {
                let row = rows.get(&owner_id).ok_or(StoreError::AccountNotFound(owner_id))?;
                let committed = row.account.balance.value();
                let balance = row
                    .account
                    .balance
                    .apply_delta(delta)
                    .map_err(|e| StoreError::from_amount(owner_id, committed, delta, e))?;
                updates.push((owner_id, balance));
            }

            let now = Utc::now();
            for (owner_id, balance) in updates {
                if let Some(row) = rows.get_mut(&owner_id) {
                    row.account.balance = balance;
                    row.account.updated_at = now;
                }
            }
        }

        self.release();
        Ok(())
    }

    async fn rollback(&mut self) -> Result<(), StoreError> {
        self.release();
        Ok(())
    }
}
