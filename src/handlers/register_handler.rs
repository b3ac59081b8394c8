//! Registration Handler
//!
//! Opens the single account of a new owner and issues its credential.

use std::sync::Arc;

use crate::domain::{InitialBalancePolicy, OperationContext};
use crate::error::AppError;
use crate::identity::IdentityProvider;
use crate::ledger_store::LedgerStore;

use super::{RegisterAccountCommand, RegisterAccountResult};

/// Handler for account registration
#[derive(Clone)]
pub struct RegisterAccountHandler {
    store: Arc<dyn LedgerStore>,
    identity: Arc<dyn IdentityProvider>,
    balance_policy: Arc<dyn InitialBalancePolicy>,
}

impl RegisterAccountHandler {
    pub fn new(
        store: Arc<dyn LedgerStore>,
        identity: Arc<dyn IdentityProvider>,
        balance_policy: Arc<dyn InitialBalancePolicy>,
    ) -> Self {
        Self {
            store,
            identity,
            balance_policy,
        }
    }

    /// Execute the registration command
    pub async fn execute(
        &self,
        command: RegisterAccountCommand,
        context: &OperationContext,
    ) -> Result<RegisterAccountResult, AppError> {
        let owner_id = command.owner_id.unwrap_or_default();
        let initial_balance = self.balance_policy.initial_balance(owner_id);

        // Fails with AccountExists before any credential is issued.
        let account = self.store.create_account(owner_id, initial_balance).await?;
        let access_token = self.identity.issue(owner_id).await;

        tracing::info!(
            owner_id = %owner_id,
            balance = account.balance.value(),
            correlation_id = ?context.correlation_id,
            client_ip = ?context.client_ip,
            "Account registered"
        );

        Ok(RegisterAccountResult {
            owner_id,
            balance: account.balance,
            access_token,
        })
    }
}
