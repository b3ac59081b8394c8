//! Database module
//!
//! Database connection and schema utilities.

use sqlx::{Executor, PgPool};

/// Schema of the account table, also shipped under `migrations/`
const ACCOUNTS_SCHEMA: &str = include_str!("../migrations/0001_create_accounts.sql");

/// Simple connectivity check
pub async fn verify_connection(pool: &PgPool) -> Result<(), sqlx::Error> {
    sqlx::query("SELECT 1").execute(pool).await?;

    Ok(())
}

/// Create the account table if it does not exist yet
pub async fn ensure_schema(pool: &PgPool) -> Result<(), sqlx::Error> {
    pool.execute(ACCOUNTS_SCHEMA).await?;
    tracing::debug!("Account schema ensured");
    Ok(())
}

/// Check if required tables exist
pub async fn check_schema(pool: &PgPool) -> Result<bool, sqlx::Error> {
    let required_tables = ["accounts"];

    for table in required_tables {
        let exists: bool = sqlx::query_scalar(
            r#"
            SELECT EXISTS (
                SELECT 1 FROM information_schema.tables
                WHERE table_schema = 'public' AND table_name = $1
            )
            "#,
        )
        .bind(table)
        .fetch_one(pool)
        .await?;

        if !exists {
            tracing::error!("Required table '{}' does not exist", table);
            return Ok(false);
        }
    }

    Ok(true)
}
