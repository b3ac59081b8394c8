//! PostgreSQL Ledger Store
//!
//! Row locks are `SELECT ... FOR UPDATE` inside a database transaction.
//! Deltas are staged in memory and written with `UPDATE` at commit, so a
//! rolled-back or dropped transaction leaves no trace.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Postgres, Transaction};
use std::collections::{BTreeMap, HashMap};
use tokio::time::Instant;
use uuid::Uuid;

use crate::domain::{Account, Balance, OwnerId};

use super::{LedgerStore, StoreError, StoreTransaction};

/// Postgres error code for CHECK constraint violations
const CHECK_VIOLATION: &str = "23514";

/// Postgres error code raised when `lock_timeout` expires
const LOCK_NOT_AVAILABLE: &str = "55P03";

#[derive(Debug, sqlx::FromRow)]
struct AccountRow {
    owner_id: Uuid,
    balance: i64,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<AccountRow> for Account {
    type Error = StoreError;

    fn try_from(row: AccountRow) -> Result<Self, Self::Error> {
        let balance = Balance::new(row.balance).map_err(|e| {
            StoreError::Backend(format!("corrupt balance for {}: {}", row.owner_id, e))
        })?;
        Ok(Account {
            owner_id: OwnerId::from_uuid(row.owner_id),
            balance,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

/// Ledger store backed by the `accounts` table
#[derive(Debug, Clone)]
pub struct PgLedgerStore {
    pool: PgPool,
}

impl PgLedgerStore {
    /// Create a new PgLedgerStore with a database pool
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl LedgerStore for PgLedgerStore {
    async fn get_account(&self, owner_id: OwnerId) -> Result<Account, StoreError> {
        let row: Option<AccountRow> = sqlx::query_as(
            r#"
            SELECT owner_id, balance, created_at, updated_at
            FROM accounts
            WHERE owner_id = $1
            "#,
        )
        .bind(owner_id.as_uuid())
        .fetch_optional(&self.pool)
        .await?;

        row.ok_or(StoreError::AccountNotFound(owner_id))?.try_into()
    }

    async fn create_account(
        &self,
        owner_id: OwnerId,
        initial_balance: Balance,
    ) -> Result<Account, StoreError> {
        let row: Option<AccountRow> = sqlx::query_as(
            r#"
            INSERT INTO accounts (owner_id, balance, created_at, updated_at)
            VALUES ($1, $2, NOW(), NOW())
            ON CONFLICT (owner_id) DO NOTHING
            RETURNING owner_id, balance, created_at, updated_at
            "#,
        )
        .bind(owner_id.as_uuid())
        .bind(initial_balance.value())
        .fetch_optional(&self.pool)
        .await?;

        row.ok_or(StoreError::AccountExists(owner_id))?.try_into()
    }

    async fn begin(&self, deadline: Instant) -> Result<Box<dyn StoreTransaction>, StoreError> {
        let tx = self.pool.begin().await?;
        Ok(Box::new(PgStoreTransaction::new(tx, deadline)))
    }
}

/// Transaction over a `PgLedgerStore`.
///
/// Dropping it drops the sqlx transaction, which rolls back.
pub struct PgStoreTransaction {
    tx: Option<Transaction<'static, Postgres>>,
    deadline: Instant,
    locked: HashMap<OwnerId, Account>,
    staged: BTreeMap<OwnerId, i64>,
}

impl PgStoreTransaction {
    fn new(tx: Transaction<'static, Postgres>, deadline: Instant) -> Self {
        Self {
            tx: Some(tx),
            deadline,
            locked: HashMap::new(),
            staged: BTreeMap::new(),
        }
    }

    fn open(&mut self) -> Result<&mut Transaction<'static, Postgres>, StoreError> {
        self.tx.as_mut().ok_or(StoreError::Closed)
    }
}

#[async_trait]
impl StoreTransaction for PgStoreTransaction {
    async fn lock(&mut self, owner_id: OwnerId) -> Result<(), StoreError> {
        if self.locked.contains_key(&owner_id) {
            return Ok(());
        }

        // Bound the wait server-side; a cancelled client future would leave
        // the query running.
        let remaining = self.deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            return Err(StoreError::LockTimeout(owner_id));
        }

        let tx = self.open()?;
        sqlx::query(&format!(
            "SET LOCAL lock_timeout = '{}ms'",
            remaining.as_millis().max(1)
        ))
        .execute(&mut **tx)
        .await?;

        let row: Option<AccountRow> = sqlx::query_as(
            r#"
            SELECT owner_id, balance, created_at, updated_at
            FROM accounts
            WHERE owner_id = $1
            FOR UPDATE
            "#,
        )
        .bind(owner_id.as_uuid())
        .fetch_optional(&mut **tx)
        .await
        .map_err(|e| match e {
            sqlx::Error::Database(db_err)
                if db_err.code().as_deref() == Some(LOCK_NOT_AVAILABLE) =>
            {
                StoreError::LockTimeout(owner_id)
            }
            e => StoreError::from(e),
        })?;

        // The row cannot change while we hold its lock.
        let account: Account = row.ok_or(StoreError::AccountNotFound(owner_id))?.try_into()?;
        self.locked.insert(owner_id, account);
        Ok(())
    }

    async fn read(&mut self, owner_id: OwnerId) -> Result<Account, StoreError> {
        self.lock(owner_id).await?;

        let mut account = self
            .locked
            .get(&owner_id)
            .cloned()
            .ok_or(StoreError::AccountNotFound(owner_id))?;
        let delta = self.staged.get(&owner_id).copied().unwrap_or(0);
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
        let mut tx = self.tx.take().ok_or(StoreError::Closed)?;
        let staged = std::mem::take(&mut self.staged);
        self.locked.clear();

        for (owner_id, delta) in staged {
            let result = sqlx::query(
                r#"
                UPDATE accounts
                SET balance = balance + $2, updated_at = NOW()
                WHERE owner_id = $1
                "#,
            )
            .bind(owner_id.as_uuid())
            .bind(delta)
            .execute(&mut *tx)
            .await;

            match result {
                Ok(done) if done.rows_affected() == 1 => {}
                Ok(_) => return Err(StoreError::AccountNotFound(owner_id)),
                Err(sqlx::Error::Database(db_err))
                    if db_err.code().as_deref() == Some(CHECK_VIOLATION) =>
                {
                    return Err(StoreError::NegativeBalance {
                        owner_id,
                        balance: 0,
                        delta,
                    });
                }
                Err(e) => return Err(e.into()),
            }
        }

        // Early returns above drop `tx`, which rolls it back.
        tx.commit().await?;
        Ok(())
    }

    async fn rollback(&mut self) -> Result<(), StoreError> {
        self.staged.clear();
        self.locked.clear();
        match self.tx.take() {
            Some(tx) => tx.rollback().await.map_err(StoreError::from),
            None => Ok(()),
        }
    }
}
