//! API Middleware
//!
//! Credential authentication and request logging.

use std::net::SocketAddr;

use axum::{
    body::Body,
    extract::{ConnectInfo, State},
    http::{header, HeaderMap, Request},
    middleware::Next,
    response::Response,
};
use uuid::Uuid;

use crate::domain::{OperationContext, OwnerId};
use crate::error::AppError;
use crate::identity::AuthError;

use super::AppState;

/// Cookie carrying the access token
pub const ACCESS_TOKEN_COOKIE: &str = "accessToken";

/// Header carrying the caller's correlation id
pub const CORRELATION_ID_HEADER: &str = "x-correlation-id";

/// Owner resolved from the request credential
#[derive(Debug, Clone, Copy)]
pub struct RequestOwner {
    pub owner_id: OwnerId,
}

/// The credential the request authenticated with
#[derive(Clone)]
pub struct RequestCredential(pub String);

impl std::fmt::Debug for RequestCredential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("RequestCredential([REDACTED])")
    }
}

/// Resolve the request credential to an owner.
///
/// On success the handler sees a `RequestOwner`, the `RequestCredential` and
/// an `OperationContext` in the request extensions.
pub async fn auth_middleware(
    State(state): State<AppState>,
    mut request: Request<Body>,
    next: Next,
) -> Result<Response, AppError> {
    let credential = extract_credential(request.headers()).ok_or(AuthError::MissingCredential)?;

    let owner_id = match state.identity.resolve(&credential).await {
        Ok(owner_id) => owner_id,
        Err(e) => {
            tracing::debug!(error = %e, "Credential rejected");
            return Err(e.into());
        }
    };

    let mut context = request_context(request.headers()).with_request_owner(owner_id);
    if let Some(ConnectInfo(addr)) = request.extensions().get::<ConnectInfo<SocketAddr>>() {
        context = context.with_client_ip(addr.ip());
    }

    request.extensions_mut().insert(RequestOwner { owner_id });
    request.extensions_mut().insert(RequestCredential(credential));
    request.extensions_mut().insert(context);

    Ok(next.run(request).await)
}

/// Bearer token from `Authorization`, falling back to the access token cookie
pub fn extract_credential(headers: &HeaderMap) -> Option<String> {
    let bearer = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|value| {
            let (scheme, token) = value.trim().split_once(' ')?;
            scheme.eq_ignore_ascii_case("bearer").then(|| token.trim())
        })
        .filter(|token| !token.is_empty());

    if let Some(token) = bearer {
        return Some(token.to_string());
    }

    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|cookies| cookies.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(name, value)| *name == ACCESS_TOKEN_COOKIE && !value.is_empty())
        .map(|(_, value)| value.to_string())
}

/// Operation context carrying the caller's correlation id, or a fresh one
pub fn request_context(headers: &HeaderMap) -> OperationContext {
    let mut context = OperationContext::new();
    if let Some(correlation_id) = headers
        .get(CORRELATION_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .and_then(|s| Uuid::parse_str(s).ok())
    {
        context = context.with_correlation_id(correlation_id);
    }
    context.ensure_correlation_id();
    context
}

/// Headers that should be masked in logs
const SENSITIVE_HEADERS: &[&str] = &["authorization", "cookie", "set-cookie"];

/// Mask sensitive headers for logging
pub fn mask_headers_for_logging(headers: &HeaderMap) -> Vec<(String, String)> {
    headers
        .iter()
        .map(|(name, value)| {
            let name_lower = name.as_str().to_lowercase();
            let masked_value = if SENSITIVE_HEADERS.contains(&name_lower.as_str()) {
                "[REDACTED]".to_string()
            } else {
                value.to_str().unwrap_or("[invalid utf8]").to_string()
            };
            (name.to_string(), masked_value)
        })
        .collect()
}

/// Request logging middleware
pub async fn logging_middleware(request: Request<Body>, next: Next) -> Response {
    let method = request.method().clone();
    let uri = request.uri().clone();
    let headers = mask_headers_for_logging(request.headers());
    let request_id = request
        .headers()
        .get("x-request-id")
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);

    let start = std::time::Instant::now();

    tracing::info!(
        method = %method,
        uri = %uri,
        request_id = ?request_id,
        headers = ?headers,
        "Incoming request"
    );

    let response = next.run(request).await;

    tracing::info!(
        method = %method,
        uri = %uri,
        status = %response.status(),
        duration_ms = %start.elapsed().as_millis(),
        request_id = ?request_id,
        "Request completed"
    );

    response
}
