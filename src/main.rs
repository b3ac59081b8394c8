//! wallet_ledger - Wallet backend API
//!
//! Serves balances and atomic fund transfers between owners.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{http::HeaderValue, middleware, Router};
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use tower::ServiceBuilder;
use tower_http::cors::{Any, CorsLayer};
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use wallet_ledger::api::{self, AppState};
use wallet_ledger::coordinator::TransactionCoordinator;
use wallet_ledger::identity::TokenIdentityProvider;
use wallet_ledger::ledger_store::{InMemoryLedgerStore, LedgerStore, PgLedgerStore};
use wallet_ledger::{db, Config};

/// Initialize tracing/logging
fn init_tracing(json: bool) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "wallet_ledger=debug,tower_http=debug".into());

    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}

/// Build the application router with its outer layers
fn build_router(state: AppState, config: &Config) -> anyhow::Result<Router> {
    let cors = match &config.cors_origin {
        Some(origin) => CorsLayer::new()
            .allow_origin(origin.parse::<HeaderValue>()?)
            .allow_methods(Any)
            .allow_headers(Any),
        None => CorsLayer::permissive(),
    };

    // Outermost first: request id, trace, logging, CORS.
    let layers = ServiceBuilder::new()
        .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
        .layer(TraceLayer::new_for_http())
        .layer(PropagateRequestIdLayer::x_request_id())
        .layer(middleware::from_fn(api::middleware::logging_middleware))
        .layer(cors);

    Ok(api::create_router(state).layer(layers))
}

/// Connect to PostgreSQL and make sure the account table exists
async fn connect_database(config: &Config, url: &str) -> anyhow::Result<PgPool> {
    tracing::info!("Connecting to database...");

    let pool = PgPoolOptions::new()
        .max_connections(config.database_max_connections)
        .connect(url)
        .await?;

    db::verify_connection(&pool).await?;
    db::ensure_schema(&pool).await?;

    if !db::check_schema(&pool).await? {
        tracing::error!("Database schema is not complete. Please run migrations.");
        return Err(anyhow::anyhow!("Database schema incomplete"));
    }

    tracing::info!("Database connected successfully");
    Ok(pool)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    // Load configuration
    let config = Config::from_env()?;

    init_tracing(config.log_json);

    let addr: SocketAddr = format!("{}:{}", config.host, config.port).parse()?;

    tracing::info!(environment = %config.environment, "Starting wallet_ledger server");

    let (store, pool): (Arc<dyn LedgerStore>, Option<PgPool>) = match &config.database_url {
        Some(url) => {
            let pool = connect_database(&config, url).await?;
            (Arc::new(PgLedgerStore::new(pool.clone())), Some(pool))
        }
        None => {
            tracing::warn!("DATABASE_URL not set, balances are kept in memory only");
            (Arc::new(InMemoryLedgerStore::new()), None)
        }
    };

    let coordinator = Arc::new(TransactionCoordinator::new(store, config.transaction_timeout));
    let balance_policy = config.initial_balance.build()?;
    let state = AppState::new(
        coordinator,
        Arc::new(TokenIdentityProvider::new()),
        balance_policy,
    );

    let app = build_router(state, &config)?;

    tracing::info!("Listening on http://{}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    // Cleanup
    tracing::info!("Server shutting down...");
    if let Some(pool) = pool {
        pool.close().await;
        tracing::info!("Database connections closed");
    }
    tracing::info!("Goodbye!");

    Ok(())
}

/// Shutdown signal handler for graceful shutdown
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating graceful shutdown...");
        },
        _ = terminate => {
            tracing::info!("Received SIGTERM, initiating graceful shutdown...");
        },
    }
}
