use sqlx::SqliteConnection;

use crate::db_types::{PaymentHistory, PaymentStatus};

/// Append a ledger entry for an observed transition. History rows are created only, never
/// mutated or deleted.
pub async fn insert_history(
    payment_id: i64,
    previous_status: Option<PaymentStatus>,
    current_status: PaymentStatus,
    change_reason: &str,
    raw_response: Option<&str>,
    conn: &mut SqliteConnection,
) -> Result<PaymentHistory, sqlx::Error> {
    let history: PaymentHistory = sqlx::query_as(
        r#"
            INSERT INTO payment_history (payment_id, previous_status, current_status, change_reason, raw_response)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING *;
        "#,
    )
    .bind(payment_id)
    .bind(previous_status)
    .bind(current_status)
    .bind(change_reason)
    .bind(raw_response)
    .fetch_one(conn)
    .await?;
    Ok(history)
}

/// The full ledger for a payment, oldest entry first.
pub async fn fetch_for_payment(
    payment_id: i64,
    conn: &mut SqliteConnection,
) -> Result<Vec<PaymentHistory>, sqlx::Error> {
    let rows = sqlx::query_as("SELECT * FROM payment_history WHERE payment_id = $1 ORDER BY id ASC")
        .bind(payment_id)
        .fetch_all(conn)
        .await?;
    Ok(rows)
}
