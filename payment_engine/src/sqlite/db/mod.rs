//! # SQLite database methods
//!
//! "Low-level" SQLite interactions, maintained as simple functions (rather than stateful
//! structs) that accept a `&mut SqliteConnection`. Callers obtain a connection from a pool, or
//! open a transaction and pass `&mut *tx` when several statements must land atomically.

use std::env;

use log::info;
use sqlx::{sqlite::SqlitePoolOptions, Error as SqlxError, SqlitePool};

pub mod history;
pub mod idempotency;
pub mod payments;

const SQLITE_DB_URL: &str = "sqlite://data/payments.db";

pub fn db_url() -> String {
    let result = env::var("MPG_DATABASE_URL").unwrap_or_else(|_| {
        info!("MPG_DATABASE_URL is not set. Using the default.");
        SQLITE_DB_URL.to_string()
    });
    info!("Using database URL: {result}");
    result
}

pub async fn new_pool(url: &str, max_connections: u32) -> Result<SqlitePool, SqlxError> {
    let pool = SqlitePoolOptions::new().max_connections(max_connections).connect(url).await?;
    Ok(pool)
}

/// Create the gateway's tables if they are not present. Idempotent.
pub async fn create_schema(pool: &SqlitePool) -> Result<(), SqlxError> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS payments (
            id             INTEGER PRIMARY KEY AUTOINCREMENT,
            payment_key    TEXT NOT NULL UNIQUE,
            order_id       TEXT NOT NULL,
            user_id        TEXT NOT NULL,
            amount         INTEGER NOT NULL,
            payment_method TEXT,
            status         TEXT NOT NULL,
            approved_at    DATETIME,
            canceled_at    DATETIME,
            failed_reason  TEXT,
            raw_response   TEXT,
            created_at     DATETIME NOT NULL DEFAULT CURRENT_TIMESTAMP,
            updated_at     DATETIME NOT NULL DEFAULT CURRENT_TIMESTAMP
        );
        "#,
    )
    .execute(pool)
    .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS payments_order_user ON payments (order_id, user_id);")
        .execute(pool)
        .await?;
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS payment_history (
            id              INTEGER PRIMARY KEY AUTOINCREMENT,
            payment_id      INTEGER NOT NULL REFERENCES payments (id),
            previous_status TEXT,
            current_status  TEXT NOT NULL,
            change_reason   TEXT NOT NULL,
            raw_response    TEXT,
            created_at      DATETIME NOT NULL DEFAULT CURRENT_TIMESTAMP
        );
        "#,
    )
    .execute(pool)
    .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS payment_history_payment ON payment_history (payment_id);")
        .execute(pool)
        .await?;
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS idempotency_keys (
            op_key     TEXT PRIMARY KEY,
            snapshot   TEXT,
            created_at DATETIME NOT NULL DEFAULT CURRENT_TIMESTAMP,
            updated_at DATETIME NOT NULL DEFAULT CURRENT_TIMESTAMP
        );
        "#,
    )
    .execute(pool)
    .await?;
    Ok(())
}
