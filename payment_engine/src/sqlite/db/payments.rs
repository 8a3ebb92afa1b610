use chrono::{DateTime, Utc};
use log::debug;
use sqlx::SqliteConnection;

use crate::db_types::{NewPayment, OrderId, Payment, PaymentStatus};

/// Returns the payment row for the given gateway payment key, if any.
pub async fn fetch_by_key(payment_key: &str, conn: &mut SqliteConnection) -> Result<Option<Payment>, sqlx::Error> {
    let payment = sqlx::query_as("SELECT * FROM payments WHERE payment_key = $1")
        .bind(payment_key)
        .fetch_optional(conn)
        .await?;
    Ok(payment)
}

pub async fn fetch_by_id(id: i64, conn: &mut SqliteConnection) -> Result<Option<Payment>, sqlx::Error> {
    let payment = sqlx::query_as("SELECT * FROM payments WHERE id = $1").bind(id).fetch_optional(conn).await?;
    Ok(payment)
}

/// Returns the most recent payment for the given (order, user) pair.
pub async fn fetch_for_order(
    order_id: &OrderId,
    user_id: &str,
    conn: &mut SqliteConnection,
) -> Result<Option<Payment>, sqlx::Error> {
    let payment =
        sqlx::query_as("SELECT * FROM payments WHERE order_id = $1 AND user_id = $2 ORDER BY id DESC LIMIT 1")
            .bind(order_id.as_str())
            .bind(user_id)
            .fetch_optional(conn)
            .await?;
    Ok(payment)
}

/// Returns all payments for a user, most recent first.
pub async fn fetch_for_user(user_id: &str, conn: &mut SqliteConnection) -> Result<Vec<Payment>, sqlx::Error> {
    let payments = sqlx::query_as("SELECT * FROM payments WHERE user_id = $1 ORDER BY id DESC")
        .bind(user_id)
        .fetch_all(conn)
        .await?;
    Ok(payments)
}

pub async fn insert_approved(
    payment: &NewPayment,
    payment_method: Option<&str>,
    approved_at: DateTime<Utc>,
    raw_response: &str,
    conn: &mut SqliteConnection,
) -> Result<Payment, sqlx::Error> {
    let payment: Payment = sqlx::query_as(
        r#"
            INSERT INTO payments (payment_key, order_id, user_id, amount, payment_method, status, approved_at,
                raw_response)
            VALUES ($1, $2, $3, $4, $5, 'Approved', $6, $7)
            RETURNING *;
        "#,
    )
    .bind(&payment.payment_key)
    .bind(payment.order_id.as_str())
    .bind(&payment.user_id)
    .bind(payment.amount.value())
    .bind(payment_method)
    .bind(approved_at)
    .bind(raw_response)
    .fetch_one(conn)
    .await?;
    debug!("💾️ Payment [{}] inserted as Approved with id {}", payment.payment_key, payment.id);
    Ok(payment)
}

pub async fn insert_failed(
    payment: &NewPayment,
    failed_reason: &str,
    raw_response: Option<&str>,
    conn: &mut SqliteConnection,
) -> Result<Payment, sqlx::Error> {
    let payment: Payment = sqlx::query_as(
        r#"
            INSERT INTO payments (payment_key, order_id, user_id, amount, status, failed_reason, raw_response)
            VALUES ($1, $2, $3, $4, 'Failed', $5, $6)
            RETURNING *;
        "#,
    )
    .bind(&payment.payment_key)
    .bind(payment.order_id.as_str())
    .bind(&payment.user_id)
    .bind(payment.amount.value())
    .bind(failed_reason)
    .bind(raw_response)
    .fetch_one(conn)
    .await?;
    debug!("💾️ Payment [{}] inserted as Failed with id {}", payment.payment_key, payment.id);
    Ok(payment)
}

/// Guarded transition to `Approved`. Returns `None` when the row is no longer in `expected`
/// status, i.e. a concurrent writer got there first.
pub async fn mark_approved(
    id: i64,
    expected: PaymentStatus,
    payment_method: Option<&str>,
    approved_at: DateTime<Utc>,
    raw_response: &str,
    conn: &mut SqliteConnection,
) -> Result<Option<Payment>, sqlx::Error> {
    let payment = sqlx::query_as(
        r#"
            UPDATE payments
            SET status = 'Approved', payment_method = COALESCE($1, payment_method), approved_at = $2,
                failed_reason = NULL, raw_response = $3, updated_at = CURRENT_TIMESTAMP
            WHERE id = $4 AND status = $5
            RETURNING *;
        "#,
    )
    .bind(payment_method)
    .bind(approved_at)
    .bind(raw_response)
    .bind(id)
    .bind(expected)
    .fetch_optional(conn)
    .await?;
    Ok(payment)
}

/// Guarded transition to `Canceled`. Only an `Approved` payment can be cancelled.
pub async fn mark_canceled(
    id: i64,
    canceled_at: DateTime<Utc>,
    raw_response: &str,
    conn: &mut SqliteConnection,
) -> Result<Option<Payment>, sqlx::Error> {
    let payment = sqlx::query_as(
        r#"
            UPDATE payments
            SET status = 'Canceled', canceled_at = $1, raw_response = $2, updated_at = CURRENT_TIMESTAMP
            WHERE id = $3 AND status = 'Approved'
            RETURNING *;
        "#,
    )
    .bind(canceled_at)
    .bind(raw_response)
    .bind(id)
    .fetch_optional(conn)
    .await?;
    Ok(payment)
}

/// Guarded transition to `Failed`.
pub async fn mark_failed(
    id: i64,
    expected: PaymentStatus,
    failed_reason: &str,
    raw_response: Option<&str>,
    conn: &mut SqliteConnection,
) -> Result<Option<Payment>, sqlx::Error> {
    let payment = sqlx::query_as(
        r#"
            UPDATE payments
            SET status = 'Failed', failed_reason = $1, raw_response = COALESCE($2, raw_response),
                updated_at = CURRENT_TIMESTAMP
            WHERE id = $3 AND status = $4
            RETURNING *;
        "#,
    )
    .bind(failed_reason)
    .bind(raw_response)
    .bind(id)
    .bind(expected)
    .fetch_optional(conn)
    .await?;
    Ok(payment)
}
