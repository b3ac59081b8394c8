//! Domain module
//!
//! Core domain types and business rules.

pub mod account;
pub mod amount;
pub mod context;
pub mod error;
pub mod initial_balance;

pub use account::{Account, OwnerId};
pub use amount::{Amount, AmountError, Balance, MAX_BALANCE};
pub use context::OperationContext;
pub use error::DomainError;
pub use initial_balance::{FixedInitialBalance, InitialBalancePolicy, SeededRandomBalance};
