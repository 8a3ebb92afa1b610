use log::trace;
use sqlx::SqliteConnection;

/// Try to claim `op_key` with an atomic insert-if-absent. Returns true when this caller won,
/// i.e. the row did not exist before.
pub async fn try_claim(op_key: &str, conn: &mut SqliteConnection) -> Result<bool, sqlx::Error> {
    let result =
        sqlx::query("INSERT OR IGNORE INTO idempotency_keys (op_key) VALUES ($1)").bind(op_key).execute(conn).await?;
    let won = result.rows_affected() == 1;
    trace!("🔑️ Claim for {op_key}: won = {won}");
    Ok(won)
}

/// Fetch the state of a key. `None` means no claim exists; `Some(None)` means a claim is held
/// but the operation has not completed; `Some(Some(snapshot))` is a completed operation.
pub async fn fetch_snapshot(
    op_key: &str,
    conn: &mut SqliteConnection,
) -> Result<Option<Option<String>>, sqlx::Error> {
    let row: Option<(Option<String>,)> =
        sqlx::query_as("SELECT snapshot FROM idempotency_keys WHERE op_key = $1").bind(op_key).fetch_optional(conn).await?;
    Ok(row.map(|(snapshot,)| snapshot))
}

/// Record the result snapshot of a completed operation.
pub async fn complete(op_key: &str, snapshot: &str, conn: &mut SqliteConnection) -> Result<(), sqlx::Error> {
    sqlx::query("UPDATE idempotency_keys SET snapshot = $1, updated_at = CURRENT_TIMESTAMP WHERE op_key = $2")
        .bind(snapshot)
        .bind(op_key)
        .execute(conn)
        .await?;
    Ok(())
}

/// Drop a claim whose operation did not produce a durable result.
pub async fn release(op_key: &str, conn: &mut SqliteConnection) -> Result<(), sqlx::Error> {
    sqlx::query("DELETE FROM idempotency_keys WHERE op_key = $1").bind(op_key).execute(conn).await?;
    trace!("🔑️ Released claim for {op_key}");
    Ok(())
}
