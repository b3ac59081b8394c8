//! Transfer Handler
//!
//! Moves funds between two owners inside one coordinator transaction.

use std::sync::Arc;
use uuid::Uuid;

use crate::coordinator::{CoordinatorError, Transaction, TransactionCoordinator};
use crate::domain::{Account, Amount, Balance, DomainError, OperationContext, OwnerId};
use crate::error::AppError;
use crate::identity::AuthError;
use crate::ledger_store::StoreError;

use super::{TransferCommand, TransferResult};

/// Stage a debit of `amount` from `account` within `tx`.
pub async fn debit(
    tx: &mut Transaction,
    account: &Account,
    amount: Amount,
) -> Result<(), CoordinatorError> {
    tx.write(account.owner_id, -amount.value()).await
}

/// Stage a credit of `amount` to `owner_id` within `tx`.
pub async fn credit(
    tx: &mut Transaction,
    owner_id: OwnerId,
    amount: Amount,
) -> Result<(), CoordinatorError> {
    tx.write(owner_id, amount.value()).await
}

/// Handler for transfers between owners
#[derive(Debug, Clone)]
pub struct TransferHandler {
    coordinator: Arc<TransactionCoordinator>,
}

impl TransferHandler {
    pub fn new(coordinator: Arc<TransactionCoordinator>) -> Self {
        Self { coordinator }
    }

    /// Execute the transfer command
    pub async fn execute(
        &self,
        command: TransferCommand,
        context: &OperationContext,
    ) -> Result<TransferResult, AppError> {
        if let Some(request_owner_id) = context.request_owner_id {
            if request_owner_id != command.from_owner_id {
                return Err(AuthError::InvalidCredential.into());
            }
        }

        if command.from_owner_id == command.to_owner_id {
            return Err(DomainError::SelfTransfer.into());
        }

        let amount = Amount::new(command.amount).map_err(DomainError::from)?;

        // Recipient existence is checked against committed state, before any lock.
        match self.coordinator.store().get_account(command.to_owner_id).await {
            Ok(_) => {}
            Err(StoreError::AccountNotFound(owner_id)) => {
                return Err(DomainError::RecipientNotFound(owner_id).into());
            }
            Err(e) => return Err(e.into()),
        }

        let transfer_id = Uuid::new_v4();
        let mut tx = self.coordinator.begin().await?;

        let updated_balance = match Self::apply(&mut tx, &command, amount).await {
            Ok(balance) => balance,
            Err(e) => {
                tx.abort().await;
                tracing::info!(
                    transfer_id = %transfer_id,
                    transaction_id = %tx.id(),
                    correlation_id = ?context.correlation_id,
                    client_ip = ?context.client_ip,
                    from = %command.from_owner_id,
                    to = %command.to_owner_id,
                    amount = amount.value(),
                    error = %e,
                    "Transfer rejected"
                );
                return Err(e);
            }
        };

        tracing::info!(
            transfer_id = %transfer_id,
            transaction_id = %tx.id(),
            correlation_id = ?context.correlation_id,
            client_ip = ?context.client_ip,
            from = %command.from_owner_id,
            to = %command.to_owner_id,
            amount = amount.value(),
            updated_balance = updated_balance.value(),
            "Transfer committed"
        );

        Ok(TransferResult {
            transfer_id,
            from_owner_id: command.from_owner_id,
            to_owner_id: command.to_owner_id,
            amount: amount.value(),
            updated_balance,
        })
    }

    async fn apply(
        tx: &mut Transaction,
        command: &TransferCommand,
        amount: Amount,
    ) -> Result<Balance, AppError> {
        tx.enlist(&[command.from_owner_id, command.to_owner_id])
            .await?;

        let sender = tx.read(command.from_owner_id).await?;
        if !sender.balance.is_sufficient_for(&amount) {
            return Err(
                DomainError::insufficient_funds(amount.value(), sender.balance.value()).into(),
            );
        }
        let updated_balance = sender.balance.debit(&amount).map_err(DomainError::from)?;

        debit(tx, &sender, amount).await?;
        credit(tx, command.to_owner_id, amount).await?;
        tx.commit().await?;

        Ok(updated_balance)
    }
}
