//! Command definitions
//!
//! Commands represent intentions to change the system state.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::{Balance, OwnerId};

/// Command to open the account of a new owner
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RegisterAccountCommand {
    /// Requested owner id; a fresh one is generated when absent
    pub owner_id: Option<OwnerId>,
}

impl RegisterAccountCommand {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_owner_id(mut self, owner_id: OwnerId) -> Self {
        self.owner_id = Some(owner_id);
        self
    }
}

/// Command to move funds between two owners
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransferCommand {
    /// Sender, the authenticated caller
    pub from_owner_id: OwnerId,
    /// Recipient
    pub to_owner_id: OwnerId,
    /// Amount in minor units, validated by the handler
    pub amount: i64,
}

impl TransferCommand {
    pub fn new(from_owner_id: OwnerId, to_owner_id: OwnerId, amount: i64) -> Self {
        Self {
            from_owner_id,
            to_owner_id,
            amount,
        }
    }
}

/// Result of a successful transfer
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransferResult {
    pub transfer_id: Uuid,
    pub from_owner_id: OwnerId,
    pub to_owner_id: OwnerId,
    pub amount: i64,
    /// Sender balance after the transfer committed
    pub updated_balance: Balance,
}

/// Result of a successful registration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegisterAccountResult {
    pub owner_id: OwnerId,
    pub balance: Balance,
    pub access_token: String,
}
