//! wallet_ledger Library
//!
//! Re-exports modules for integration testing and external use.

pub mod api;
pub mod coordinator;
pub mod domain;
pub mod handlers;
pub mod identity;
pub mod ledger_store;
pub mod query;

pub mod config;
pub mod db;
mod error;

pub use config::Config;
pub use error::{AppError, AppResult, ErrorResponse};
pub use domain::{Account, Amount, AmountError, Balance, DomainError, OperationContext, OwnerId};
