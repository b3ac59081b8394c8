//! API module
//!
//! HTTP API endpoints and middleware.

pub mod middleware;
pub mod routes;

use std::sync::Arc;

use axum::{extract::DefaultBodyLimit, routing::get, Router};

use crate::coordinator::TransactionCoordinator;
use crate::domain::InitialBalancePolicy;
use crate::identity::IdentityProvider;
use crate::ledger_store::LedgerStore;

/// Maximum accepted request body size
pub const MAX_BODY_BYTES: usize = 16 * 1024;

/// Shared state handed to every request
#[derive(Clone)]
pub struct AppState {
    pub coordinator: Arc<TransactionCoordinator>,
    pub identity: Arc<dyn IdentityProvider>,
    pub balance_policy: Arc<dyn InitialBalancePolicy>,
}

impl AppState {
    pub fn new(
        coordinator: Arc<TransactionCoordinator>,
        identity: Arc<dyn IdentityProvider>,
        balance_policy: Arc<dyn InitialBalancePolicy>,
    ) -> Self {
        Self {
            coordinator,
            identity,
            balance_policy,
        }
    }

    /// The ledger store behind the coordinator
    pub fn store(&self) -> Arc<dyn LedgerStore> {
        self.coordinator.store().clone()
    }
}

/// Create the application router
///
/// Registration is public; every other `/api/v1` route requires a credential.
pub fn create_router(state: AppState) -> Router {
    let protected_routes = routes::protected_routes().route_layer(
        axum::middleware::from_fn_with_state(state.clone(), middleware::auth_middleware),
    );

    let api_router = routes::public_routes().merge(protected_routes);

    Router::new()
        // Health check (no auth)
        .route("/health", get(health_check))
        .nest("/api/v1", api_router)
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .with_state(state)
}

/// Health check endpoint
async fn health_check() -> &'static str {
    "OK"
}
