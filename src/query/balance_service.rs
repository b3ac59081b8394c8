//! Balance Query Service
//!
//! Serves balances from committed state. Writes staged by an in-flight
//! transaction are never visible here.

use std::sync::Arc;

use crate::domain::{Account, Balance, OwnerId};
use crate::error::AppError;
use crate::ledger_store::LedgerStore;

/// Read path over the ledger store
#[derive(Clone)]
pub struct BalanceQueryService {
    store: Arc<dyn LedgerStore>,
}

impl BalanceQueryService {
    pub fn new(store: Arc<dyn LedgerStore>) -> Self {
        Self { store }
    }

    /// Latest committed balance of an owner
    pub async fn get_balance(&self, owner_id: OwnerId) -> Result<Balance, AppError> {
        Ok(self.get_account(owner_id).await?.balance)
    }

    /// Latest committed account record of an owner
    pub async fn get_account(&self, owner_id: OwnerId) -> Result<Account, AppError> {
        let account = self.store.get_account(owner_id).await?;
        tracing::debug!(owner_id = %owner_id, balance = account.balance.value(), "Balance read");
        Ok(account)
    }
}
