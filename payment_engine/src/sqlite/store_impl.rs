//! `SqlitePaymentStore` is the concrete SQLite implementation of the engine's storage backend.
//!
//! Every mutating method wraps the payment-row change and the matching ledger entry in a single
//! transaction, so the ledger invariant survives concurrent writers.

use std::fmt::Debug;

use chrono::{DateTime, Utc};
use log::*;
use sqlx::SqlitePool;

use super::db::{create_schema, history, idempotency, new_pool, payments};
use crate::{
    db_types::{NewPayment, OrderId, Payment, PaymentHistory, PaymentStatus},
    traits::{IdempotencyClaim, PaymentStore, PaymentStoreError, StatusUpdate},
};

#[derive(Clone)]
pub struct SqlitePaymentStore {
    url: String,
    pool: SqlitePool,
}

impl Debug for SqlitePaymentStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "SqlitePaymentStore ({:?})", self.pool)
    }
}

impl SqlitePaymentStore {
    pub async fn new_with_url(url: &str, max_connections: u32) -> Result<Self, PaymentStoreError> {
        let pool = new_pool(url, max_connections).await?;
        create_schema(&pool).await?;
        Ok(Self { url: url.to_string(), pool })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

impl PaymentStore for SqlitePaymentStore {
    fn url(&self) -> &str {
        self.url.as_str()
    }

    async fn fetch_payment_by_key(&self, payment_key: &str) -> Result<Option<Payment>, PaymentStoreError> {
        let mut conn = self.pool.acquire().await?;
        let payment = payments::fetch_by_key(payment_key, &mut conn).await?;
        Ok(payment)
    }

    async fn fetch_payment_for_order(
        &self,
        order_id: &OrderId,
        user_id: &str,
    ) -> Result<Option<Payment>, PaymentStoreError> {
        let mut conn = self.pool.acquire().await?;
        let payment = payments::fetch_for_order(order_id, user_id, &mut conn).await?;
        Ok(payment)
    }

    async fn fetch_payments_for_user(&self, user_id: &str) -> Result<Vec<Payment>, PaymentStoreError> {
        let mut conn = self.pool.acquire().await?;
        let result = payments::fetch_for_user(user_id, &mut conn).await?;
        Ok(result)
    }

    async fn fetch_history_for_payment(&self, payment_id: i64) -> Result<Vec<PaymentHistory>, PaymentStoreError> {
        let mut conn = self.pool.acquire().await?;
        let rows = history::fetch_for_payment(payment_id, &mut conn).await?;
        Ok(rows)
    }

    async fn upsert_confirmed_payment(
        &self,
        payment: NewPayment,
        payment_method: Option<String>,
        approved_at: DateTime<Utc>,
        raw_response: &str,
        reason: &str,
    ) -> Result<(Payment, PaymentHistory), PaymentStoreError> {
        let mut tx = self.pool.begin().await?;
        let existing = payments::fetch_by_key(&payment.payment_key, &mut *tx).await?;
        let (row, previous) = match existing {
            None => {
                let row = payments::insert_approved(
                    &payment,
                    payment_method.as_deref(),
                    approved_at,
                    raw_response,
                    &mut *tx,
                )
                .await?;
                (row, None)
            },
            Some(p) if matches!(p.status, PaymentStatus::Ready | PaymentStatus::Failed) => {
                let row = payments::mark_approved(
                    p.id,
                    p.status,
                    payment_method.as_deref(),
                    approved_at,
                    raw_response,
                    &mut *tx,
                )
                .await?
                .ok_or(PaymentStoreError::IllegalStatusChange {
                    payment_key: p.payment_key.clone(),
                    from: p.status,
                    to: PaymentStatus::Approved,
                })?;
                (row, Some(p.status))
            },
            Some(p) => {
                return Err(PaymentStoreError::IllegalStatusChange {
                    payment_key: p.payment_key,
                    from: p.status,
                    to: PaymentStatus::Approved,
                })
            },
        };
        let entry =
            history::insert_history(row.id, previous, PaymentStatus::Approved, reason, Some(raw_response), &mut *tx)
                .await?;
        tx.commit().await?;
        debug!("💾️ Payment [{}] recorded as Approved (previous: {previous:?})", row.payment_key);
        Ok((row, entry))
    }

    async fn upsert_failed_payment(
        &self,
        payment: NewPayment,
        failed_reason: &str,
        raw_response: Option<&str>,
        reason: &str,
    ) -> Result<(Payment, PaymentHistory), PaymentStoreError> {
        let mut tx = self.pool.begin().await?;
        let existing = payments::fetch_by_key(&payment.payment_key, &mut *tx).await?;
        let (row, previous) = match existing {
            None => {
                let row = payments::insert_failed(&payment, failed_reason, raw_response, &mut *tx).await?;
                (row, None)
            },
            Some(p) if matches!(p.status, PaymentStatus::Ready | PaymentStatus::Failed) => {
                let row = payments::mark_failed(p.id, p.status, failed_reason, raw_response, &mut *tx)
                    .await?
                    .ok_or(PaymentStoreError::IllegalStatusChange {
                        payment_key: p.payment_key.clone(),
                        from: p.status,
                        to: PaymentStatus::Failed,
                    })?;
                (row, Some(p.status))
            },
            Some(p) => {
                return Err(PaymentStoreError::IllegalStatusChange {
                    payment_key: p.payment_key,
                    from: p.status,
                    to: PaymentStatus::Failed,
                })
            },
        };
        let entry =
            history::insert_history(row.id, previous, PaymentStatus::Failed, reason, raw_response, &mut *tx).await?;
        tx.commit().await?;
        debug!("💾️ Payment [{}] recorded as Failed. {failed_reason}", row.payment_key);
        Ok((row, entry))
    }

    async fn transition_payment(
        &self,
        payment_id: i64,
        expected: PaymentStatus,
        update: StatusUpdate,
        reason: &str,
    ) -> Result<(Payment, PaymentHistory), PaymentStoreError> {
        let target = update.target_status();
        let mut tx = self.pool.begin().await?;
        let updated = match &update {
            StatusUpdate::Approve { payment_method, approved_at, raw_response } => {
                payments::mark_approved(
                    payment_id,
                    expected,
                    payment_method.as_deref(),
                    *approved_at,
                    raw_response,
                    &mut *tx,
                )
                .await?
            },
            StatusUpdate::Cancel { canceled_at, raw_response } => {
                // mark_canceled guards on Approved; the engine never passes anything else
                payments::mark_canceled(payment_id, *canceled_at, raw_response, &mut *tx).await?
            },
            StatusUpdate::Fail { failed_reason, raw_response } => {
                payments::mark_failed(payment_id, expected, failed_reason, raw_response.as_deref(), &mut *tx).await?
            },
        };
        let row = match updated {
            Some(row) => row,
            None => {
                // the guard failed: report the actual current status
                let actual = payments::fetch_by_id(payment_id, &mut *tx)
                    .await?
                    .ok_or(PaymentStoreError::PaymentIdNotFound(payment_id))?;
                return Err(PaymentStoreError::IllegalStatusChange {
                    payment_key: actual.payment_key,
                    from: actual.status,
                    to: target,
                });
            },
        };
        let raw = row.raw_response.clone();
        let entry = history::insert_history(row.id, Some(expected), target, reason, raw.as_deref(), &mut *tx).await?;
        tx.commit().await?;
        debug!("💾️ Payment [{}] transitioned {expected} -> {target}", row.payment_key);
        Ok((row, entry))
    }

    async fn claim_operation(&self, op_key: &str) -> Result<IdempotencyClaim, PaymentStoreError> {
        let mut conn = self.pool.acquire().await?;
        if idempotency::try_claim(op_key, &mut conn).await? {
            return Ok(IdempotencyClaim::Won);
        }
        match idempotency::fetch_snapshot(op_key, &mut conn).await? {
            Some(Some(snapshot)) => Ok(IdempotencyClaim::Replayed(snapshot)),
            Some(None) => Ok(IdempotencyClaim::InFlight),
            // the claim was released between our insert and fetch; try once more
            None => {
                if idempotency::try_claim(op_key, &mut conn).await? {
                    Ok(IdempotencyClaim::Won)
                } else {
                    Ok(IdempotencyClaim::InFlight)
                }
            },
        }
    }

    async fn complete_operation(&self, op_key: &str, snapshot: &str) -> Result<(), PaymentStoreError> {
        let mut conn = self.pool.acquire().await?;
        idempotency::complete(op_key, snapshot, &mut conn).await?;
        Ok(())
    }

    async fn release_operation(&self, op_key: &str) -> Result<(), PaymentStoreError> {
        let mut conn = self.pool.acquire().await?;
        idempotency::release(op_key, &mut conn).await?;
        Ok(())
    }

    async fn close(&mut self) -> Result<(), PaymentStoreError> {
        self.pool.close().await;
        Ok(())
    }
}
