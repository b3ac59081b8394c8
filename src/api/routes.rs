//! API Routes
//!
//! HTTP endpoint definitions.

use std::net::SocketAddr;

use axum::{
    extract::{ConnectInfo, Extension, FromRequest, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Router,
};
use serde::{Deserialize, Serialize};

use crate::domain::{Balance, OperationContext, OwnerId};
use crate::error::AppError;
use crate::handlers::{
    RegisterAccountCommand, RegisterAccountHandler, TransferCommand, TransferHandler,
};
use crate::query::BalanceQueryService;

use super::middleware::{request_context, RequestCredential, RequestOwner, ACCESS_TOKEN_COOKIE};
use super::AppState;

/// JSON extractor and response whose rejections use the API error payload
#[derive(Debug, Clone, Copy, Default, FromRequest)]
#[from_request(via(axum::Json), rejection(AppError))]
pub struct AppJson<T>(pub T);

impl<T: Serialize> IntoResponse for AppJson<T> {
    fn into_response(self) -> Response {
        axum::Json(self.0).into_response()
    }
}

// =========================================================================
// Request/Response types
// =========================================================================

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterRequest {
    #[serde(default)]
    pub owner_id: Option<OwnerId>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterResponse {
    pub owner_id: OwnerId,
    pub balance: Balance,
    pub access_token: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BalanceResponse {
    pub owner_id: OwnerId,
    pub balance: Balance,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransferRequest {
    pub recipient_id: OwnerId,
    #[serde(alias = "transferAmount")]
    pub amount: i64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TransferResponse {
    pub updated_balance: Balance,
}

// =========================================================================
// API Router
// =========================================================================

/// Routes reachable without a credential
pub fn public_routes() -> Router<AppState> {
    Router::new().route("/accounts", post(register))
}

/// Routes that require an authenticated owner
pub fn protected_routes() -> Router<AppState> {
    Router::new()
        .route("/accounts/balance", get(get_balance))
        .route("/accounts/transfer", post(transfer))
        .route("/accounts/signout", post(signout))
}

/// Open an account and issue its access token
async fn register(
    State(state): State<AppState>,
    connect_info: Option<ConnectInfo<SocketAddr>>,
    headers: HeaderMap,
    AppJson(request): AppJson<RegisterRequest>,
) -> Result<(StatusCode, AppJson<RegisterResponse>), AppError> {
    let mut context = request_context(&headers);
    if let Some(ConnectInfo(addr)) = connect_info {
        context = context.with_client_ip(addr.ip());
    }
    let handler = RegisterAccountHandler::new(
        state.store(),
        state.identity.clone(),
        state.balance_policy.clone(),
    );

    let command = match request.owner_id {
        Some(owner_id) => RegisterAccountCommand::new().with_owner_id(owner_id),
        None => RegisterAccountCommand::new(),
    };

    let result = handler.execute(command, &context).await?;

    Ok((
        StatusCode::CREATED,
        AppJson(RegisterResponse {
            owner_id: result.owner_id,
            balance: result.balance,
            access_token: result.access_token,
        }),
    ))
}

/// Committed balance of the caller
async fn get_balance(
    State(state): State<AppState>,
    Extension(owner): Extension<RequestOwner>,
) -> Result<AppJson<BalanceResponse>, AppError> {
    let service = BalanceQueryService::new(state.store());
    let balance = service.get_balance(owner.owner_id).await?;

    Ok(AppJson(BalanceResponse {
        owner_id: owner.owner_id,
        balance,
    }))
}

/// Transfer funds from the caller to a recipient
async fn transfer(
    State(state): State<AppState>,
    Extension(owner): Extension<RequestOwner>,
    Extension(context): Extension<OperationContext>,
    AppJson(request): AppJson<TransferRequest>,
) -> Result<AppJson<TransferResponse>, AppError> {
    let handler = TransferHandler::new(state.coordinator.clone());

    let command = TransferCommand::new(owner.owner_id, request.recipient_id, request.amount);
    let result = handler.execute(command, &context).await?;

    Ok(AppJson(TransferResponse {
        updated_balance: result.updated_balance,
    }))
}

/// Revoke the presented credential and clear the access token cookie
async fn signout(
    State(state): State<AppState>,
    Extension(owner): Extension<RequestOwner>,
    Extension(credential): Extension<RequestCredential>,
    Extension(context): Extension<OperationContext>,
) -> impl IntoResponse {
    state.identity.revoke(&credential.0).await;

    tracing::info!(
        owner_id = %owner.owner_id,
        correlation_id = ?context.correlation_id,
        client_ip = ?context.client_ip,
        "Signed out"
    );

    (
        StatusCode::NO_CONTENT,
        [(header::SET_COOKIE, cleared_cookie())],
    )
}

fn cleared_cookie() -> String {
    format!("{}=; Path=/; Max-Age=0; HttpOnly; SameSite=Strict", ACCESS_TOKEN_COOKIE)
}
