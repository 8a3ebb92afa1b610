use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::db_types::{NewPayment, OrderId, Payment, PaymentHistory, PaymentStatus};

/// The result of trying to claim an idempotency key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IdempotencyClaim {
    /// This caller won the race and must perform the operation (and then complete or release
    /// the claim).
    Won,
    /// The operation has already completed; the stored result snapshot is returned verbatim.
    Replayed(String),
    /// Another caller holds the claim but has not completed the operation yet.
    InFlight,
}

/// The mutation applied by a guarded status transition.
#[derive(Debug, Clone)]
pub enum StatusUpdate {
    /// Move to `Approved`, recording the gateway-reported method and timestamp.
    Approve { payment_method: Option<String>, approved_at: DateTime<Utc>, raw_response: String },
    /// Move to `Canceled`.
    Cancel { canceled_at: DateTime<Utc>, raw_response: String },
    /// Move to `Failed`, recording the gateway-reported reason.
    Fail { failed_reason: String, raw_response: Option<String> },
}

impl StatusUpdate {
    pub fn target_status(&self) -> PaymentStatus {
        match self {
            StatusUpdate::Approve { .. } => PaymentStatus::Approved,
            StatusUpdate::Cancel { .. } => PaymentStatus::Canceled,
            StatusUpdate::Fail { .. } => PaymentStatus::Failed,
        }
    }
}

/// Storage backend for the payment authorization engine.
///
/// Implementations must make each mutating call atomic: the payment row update and the matching
/// history row land in the same transaction, so the ledger invariant (folding history statuses
/// in insertion order reproduces the payment's current status) holds even with concurrent
/// writers.
#[allow(async_fn_in_trait)]
pub trait PaymentStore: Clone {
    /// The URL of the underlying database.
    fn url(&self) -> &str;

    async fn fetch_payment_by_key(&self, payment_key: &str) -> Result<Option<Payment>, PaymentStoreError>;

    /// Fetch the most recent payment for the given (order, user) pair. Ownership is encoded in
    /// the lookup key: a payment belonging to another user is simply not found.
    async fn fetch_payment_for_order(
        &self,
        order_id: &OrderId,
        user_id: &str,
    ) -> Result<Option<Payment>, PaymentStoreError>;

    async fn fetch_payments_for_user(&self, user_id: &str) -> Result<Vec<Payment>, PaymentStoreError>;

    /// Fetch the ledger for a payment, oldest entry first.
    async fn fetch_history_for_payment(&self, payment_id: i64) -> Result<Vec<PaymentHistory>, PaymentStoreError>;

    /// Record a successful gateway approval for a confirmation.
    ///
    /// Inserts a new `Approved` row, or, when a row for the payment key already exists in
    /// `Ready` or `Failed` state (a retried confirmation), updates it in place. A `Canceled` or
    /// `Approved` row is never touched; that is an [`PaymentStoreError::IllegalStatusChange`].
    /// Appends a history row carrying the true previous status (`None` for a fresh row).
    async fn upsert_confirmed_payment(
        &self,
        payment: NewPayment,
        payment_method: Option<String>,
        approved_at: DateTime<Utc>,
        raw_response: &str,
        reason: &str,
    ) -> Result<(Payment, PaymentHistory), PaymentStoreError>;

    /// Record a gateway-rejected confirmation.
    ///
    /// Inserts a `Failed` row (or updates an existing `Ready`/`Failed` row) so the rejection is
    /// durably auditable even though the caller sees an error. `Canceled` and `Approved` rows
    /// are never demoted by this call.
    async fn upsert_failed_payment(
        &self,
        payment: NewPayment,
        failed_reason: &str,
        raw_response: Option<&str>,
        reason: &str,
    ) -> Result<(Payment, PaymentHistory), PaymentStoreError>;

    /// Apply a guarded status transition to an existing payment.
    ///
    /// The update only succeeds if the payment is still in `expected` status at commit time
    /// (`UPDATE … WHERE status = ?`), which turns a lost race with a concurrent writer into an
    /// [`PaymentStoreError::IllegalStatusChange`] instead of a silently clobbered row.
    async fn transition_payment(
        &self,
        payment_id: i64,
        expected: PaymentStatus,
        update: StatusUpdate,
        reason: &str,
    ) -> Result<(Payment, PaymentHistory), PaymentStoreError>;

    /// Atomically claim the given operation key. Exactly one concurrent caller gets
    /// [`IdempotencyClaim::Won`]; everyone else observes the completed snapshot or an
    /// in-flight claim.
    async fn claim_operation(&self, op_key: &str) -> Result<IdempotencyClaim, PaymentStoreError>;

    /// Store the result snapshot for a claimed operation. Subsequent claims replay it.
    async fn complete_operation(&self, op_key: &str, snapshot: &str) -> Result<(), PaymentStoreError>;

    /// Drop a claim whose operation failed before producing a durable result, so that a retry
    /// is allowed to run.
    async fn release_operation(&self, op_key: &str) -> Result<(), PaymentStoreError>;

    /// Closes the database connection.
    async fn close(&mut self) -> Result<(), PaymentStoreError> {
        Ok(())
    }
}

#[derive(Debug, Clone, Error)]
pub enum PaymentStoreError {
    #[error("Internal database error: {0}")]
    DatabaseError(String),
    #[error("The requested payment (internal id {0}) does not exist")]
    PaymentIdNotFound(i64),
    #[error("No payment exists for payment key {0}")]
    PaymentKeyNotFound(String),
    #[error("Illegal status change for payment {payment_key}: {from} -> {to}")]
    IllegalStatusChange { payment_key: String, from: PaymentStatus, to: PaymentStatus },
}

impl From<sqlx::Error> for PaymentStoreError {
    fn from(e: sqlx::Error) -> Self {
        PaymentStoreError::DatabaseError(e.to_string())
    }
}
