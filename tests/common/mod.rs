//! Common test utilities
#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::body::{to_bytes, Body};
use axum::http::{Request, StatusCode};
use axum::Router;
use serde_json::Value;
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use tokio::time::Instant;
use tower::util::ServiceExt;

use wallet_ledger::api::{self, AppState};
use wallet_ledger::coordinator::TransactionCoordinator;
use wallet_ledger::domain::{Account, Balance, FixedInitialBalance, OwnerId};
use wallet_ledger::handlers::TransferHandler;
use wallet_ledger::identity::TokenIdentityProvider;
use wallet_ledger::ledger_store::{InMemoryLedgerStore, LedgerStore, StoreError, StoreTransaction};

/// Open one account per balance and return their owners in order
pub async fn seed(store: &dyn LedgerStore, balances: &[i64]) -> Vec<OwnerId> {
    let mut owners = Vec::with_capacity(balances.len());
    for &balance in balances {
        let owner_id = OwnerId::new();
        store
            .create_account(owner_id, Balance::new(balance).unwrap())
            .await
            .unwrap();
        owners.push(owner_id);
    }
    owners
}

/// In-memory ledger with seeded accounts and a transfer handler over it
pub async fn setup_ledger(
    balances: &[i64],
    timeout: Duration,
) -> (InMemoryLedgerStore, TransferHandler, Vec<OwnerId>) {
    let store = InMemoryLedgerStore::new();
    let owners = seed(&store, balances).await;
    let coordinator = TransactionCoordinator::new(Arc::new(store.clone()), timeout);
    (store, TransferHandler::new(Arc::new(coordinator)), owners)
}

pub async fn balance_of(store: &dyn LedgerStore, owner_id: OwnerId) -> i64 {
    store.get_account(owner_id).await.unwrap().balance.value()
}

/// Deadline far enough away that it never fires during a test
pub fn far_deadline() -> Instant {
    Instant::now() + Duration::from_secs(30)
}

pub async fn total_balance(store: &dyn LedgerStore, owners: &[OwnerId]) -> i64 {
    let mut total = 0;
    for &owner_id in owners {
        total += balance_of(store, owner_id).await;
    }
    total
}

// =========================================================================
// Fault injection
// =========================================================================

/// What a `FaultyStore` transaction gets wrong
#[derive(Debug, Clone, Copy)]
pub enum Fault {
    /// Refuse to stage any credit to this owner
    Credit(OwnerId),
    /// Refuse to commit
    Commit,
    /// Commit correctly, but only after this delay
    SlowCommit(Duration),
}

/// Store wrapper that injects one fault into every transaction.
pub struct FaultyStore {
    inner: Arc<dyn LedgerStore>,
    fault: Fault,
}

impl FaultyStore {
    pub fn new(inner: Arc<dyn LedgerStore>, fault: Fault) -> Self {
        Self { inner, fault }
    }
}

#[async_trait]
impl LedgerStore for FaultyStore {
    async fn get_account(&self, owner_id: OwnerId) -> Result<Account, StoreError> {
        self.inner.get_account(owner_id).await
    }

    async fn create_account(
        &self,
        owner_id: OwnerId,
        initial_balance: Balance,
    ) -> Result<Account, StoreError> {
        self.inner.create_account(owner_id, initial_balance).await
    }

    async fn begin(&self, deadline: Instant) -> Result<Box<dyn StoreTransaction>, StoreError> {
        Ok(Box::new(FaultyTransaction {
            inner: self.inner.begin(deadline).await?,
            fault: self.fault,
        }))
    }
}

struct FaultyTransaction {
    inner: Box<dyn StoreTransaction>,
    fault: Fault,
}

#[async_trait]
impl StoreTransaction for FaultyTransaction {
    async fn lock(&mut self, owner_id: OwnerId) -> Result<(), StoreError> {
        self.inner.lock(owner_id).await
    }

    async fn read(&mut self, owner_id: OwnerId) -> Result<Account, StoreError> {
        self.inner.read(owner_id).await
    }

    async fn apply_delta(&mut self, owner_id: OwnerId, delta: i64) -> Result<(), StoreError> {
        if let Fault::Credit(refused) = self.fault {
            if owner_id == refused && delta > 0 {
                return Err(StoreError::Backend("injected credit failure".to_string()));
            }
        }
        self.inner.apply_delta(owner_id, delta).await
    }

    async fn commit(&mut self) -> Result<(), StoreError> {
        match self.fault {
            Fault::Commit => Err(StoreError::Backend("commit refused".to_string())),
            Fault::SlowCommit(delay) => {
                tokio::time::sleep(delay).await;
                self.inner.commit().await
            }
            Fault::Credit(_) => self.inner.commit().await,
        }
    }

    async fn rollback(&mut self) -> Result<(), StoreError> {
        self.inner.rollback().await
    }
}

// =========================================================================
// HTTP helpers
// =========================================================================

/// Router over a fresh in-memory ledger where every account starts at `initial`
pub fn test_app(initial: i64) -> Router {
    let store = Arc::new(InMemoryLedgerStore::new());
    let coordinator = Arc::new(TransactionCoordinator::new(store, Duration::from_secs(5)));
    let state = AppState::new(
        coordinator,
        Arc::new(TokenIdentityProvider::new()),
        Arc::new(FixedInitialBalance::new(Balance::new(initial).unwrap())),
    );
    api::create_router(state)
}

/// Send a request and decode the JSON body (`Value::Null` when empty)
pub async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let json = if body.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&body).unwrap_or(Value::Null)
    };
    (status, json)
}

pub fn json_request(method: &str, uri: &str, token: Option<&str>, body: Value) -> Request<Body> {
    let mut builder = Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json");
    if let Some(token) = token {
        builder = builder.header("authorization", format!("Bearer {}", token));
    }
    builder.body(Body::from(body.to_string())).unwrap()
}

pub fn get_request(uri: &str, token: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder().method("GET").uri(uri);
    if let Some(token) = token {
        builder = builder.header("authorization", format!("Bearer {}", token));
    }
    builder.body(Body::empty()).unwrap()
}

/// Register an account over HTTP, returning `(owner_id, access_token)`
pub async fn register(app: &Router) -> (String, String) {
    let (status, json) = send(
        app,
        json_request("POST", "/api/v1/accounts", None, serde_json::json!({})),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "registration failed: {json}");
    (
        json["ownerId"].as_str().unwrap().to_string(),
        json["accessToken"].as_str().unwrap().to_string(),
    )
}

// =========================================================================
// PostgreSQL
// =========================================================================

/// Connect to `DATABASE_URL` and ensure the schema, or `None` when unset
pub async fn setup_test_db() -> Option<PgPool> {
    dotenvy::dotenv().ok();
    let database_url = std::env::var("DATABASE_URL").ok()?;

    let pool = PgPoolOptions::new()
        .max_connections(10)
        .connect(&database_url)
        .await
        .expect("Failed to connect to DB");

    wallet_ledger::db::ensure_schema(&pool)
        .await
        .expect("Failed to ensure schema");

    Some(pool)
}
