//! Error handling module
//!
//! Centralized error types and HTTP response conversion.

use std::time::Duration;

use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

use crate::config::ConfigError;
use crate::coordinator::CoordinatorError;
use crate::domain::{AmountError, DomainError};
use crate::identity::AuthError;
use crate::ledger_store::StoreError;

/// Application-wide Result type
pub type AppResult<T> = Result<T, AppError>;

/// Application error types
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    // Client errors (4xx)
    #[error("Invalid request: {0}")]
    Validation(String),

    #[error(transparent)]
    Auth(#[from] AuthError),

    // Domain errors
    #[error(transparent)]
    Domain(#[from] DomainError),

    // Server errors (5xx)
    #[error("Transaction failed: {0}")]
    TransactionFailed(#[source] CoordinatorError),

    #[error("Transaction timed out after {}ms and was rolled back", .0.as_millis())]
    TransactionTimeout(Duration),

    #[error("Storage error: {0}")]
    Storage(#[source] StoreError),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
}

impl AppError {
    /// HTTP status this error is reported with
    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
            AppError::Auth(_) => StatusCode::UNAUTHORIZED,
            AppError::Domain(domain_err) => match domain_err {
                DomainError::InvalidAmount(_) | DomainError::BalanceLimitExceeded(_) => {
                    StatusCode::UNPROCESSABLE_ENTITY
                }
                DomainError::RecipientNotFound(_) | DomainError::AccountNotFound(_) => {
                    StatusCode::NOT_FOUND
                }
                DomainError::InsufficientFunds { .. } | DomainError::SelfTransfer => {
                    StatusCode::BAD_REQUEST
                }
                DomainError::AccountExists(_) => StatusCode::CONFLICT,
            },
            AppError::TransactionTimeout(_) => StatusCode::SERVICE_UNAVAILABLE,
            AppError::TransactionFailed(_)
            | AppError::Storage(_)
            | AppError::Internal(_)
            | AppError::Config(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// Errors raised while reading or staging are the caller's; a failed commit
/// is always `TransactionFailed`.
impl From<CoordinatorError> for AppError {
    fn from(err: CoordinatorError) -> Self {
        match err {
            CoordinatorError::Timeout { after, .. } => AppError::TransactionTimeout(after),
            CoordinatorError::Store(StoreError::AccountNotFound(owner_id)) => {
                DomainError::AccountNotFound(owner_id).into()
            }
            CoordinatorError::Store(StoreError::BalanceOverflow(owner_id)) => {
                DomainError::BalanceLimitExceeded(owner_id).into()
            }
            other => AppError::TransactionFailed(other),
        }
    }
}

impl From<StoreError> for AppError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::AccountNotFound(owner_id) => DomainError::AccountNotFound(owner_id).into(),
            StoreError::AccountExists(owner_id) => DomainError::AccountExists(owner_id).into(),
            StoreError::BalanceOverflow(owner_id) => {
                DomainError::BalanceLimitExceeded(owner_id).into()
            }
            other => AppError::Storage(other),
        }
    }
}

impl From<AmountError> for AppError {
    fn from(err: AmountError) -> Self {
        AppError::Validation(err.to_string())
    }
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        AppError::Validation(rejection.body_text())
    }
}

/// Error response body
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorResponse {
    pub success: bool,
    pub status_code: u16,
    pub message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();

        match &self {
            AppError::TransactionFailed(e) => tracing::error!("Transaction failed: {:?}", e),
            AppError::TransactionTimeout(after) => {
                tracing::error!("Transaction timed out after {:?}", after)
            }
            AppError::Storage(e) => tracing::error!("Storage error: {:?}", e),
            AppError::Internal(msg) => tracing::error!("Internal error: {}", msg),
            AppError::Config(e) => tracing::error!("Config error: {:?}", e),
            _ => {}
        }

        let body = ErrorResponse {
            success: false,
            status_code: status.as_u16(),
            message: self.to_string(),
        };

        (status, Json(body)).into_response()
    }
}
