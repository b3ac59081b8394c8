//! Command Handlers module
//!
//! Handlers that orchestrate state-changing operations.
//! Each handler validates a command and drives the ledger through it.

mod commands;
mod register_handler;
mod transfer_handler;

pub use commands::*;
pub use register_handler::RegisterAccountHandler;
pub use transfer_handler::{credit, debit, TransferHandler};
