//! Query module
//!
//! Read-only access to committed ledger state.

mod balance_service;

pub use balance_service::BalanceQueryService;
