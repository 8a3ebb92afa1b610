//! Contracts for the external services the engine talks to.
//!
//! The gateway moves the money and is the source of truth for approval and cancellation. The
//! order, user and store services are owned by other teams; the engine only consumes the
//! interfaces defined here. Concrete HTTP clients live in the server crate.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use pay_common::Money;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::db_types::{OrderId, OrderStatusType};

/// The gateway's response to a successful approval call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GatewayApproval {
    pub payment_key: String,
    pub order_id: OrderId,
    pub total_amount: Money,
    pub method: String,
    pub approved_at: DateTime<Utc>,
    /// The verbatim response body, retained in the ledger for dispute resolution.
    pub raw: String,
}

/// The gateway's response to a successful cancel call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GatewayCancellation {
    pub canceled_at: DateTime<Utc>,
    pub raw: String,
}

#[derive(Debug, Clone, Error)]
pub enum GatewayError {
    #[error("Gateway request failed: {0}")]
    RequestFailed(String),
    #[error("Gateway declined the call ({status}): {message}")]
    Declined { status: u16, message: String },
    #[error("Could not interpret the gateway response: {0}")]
    InvalidResponse(String),
}

/// Thin wrapper over the external payment provider's approve/cancel API.
#[async_trait]
pub trait PaymentProviderClient: Send + Sync {
    /// Ask the gateway to approve (capture) the payment. The `idempotency_token` is
    /// deterministic per logical confirmation so the gateway de-duplicates retries on its side
    /// too.
    async fn approve(
        &self,
        payment_key: &str,
        order_id: &OrderId,
        amount: Money,
        idempotency_token: &str,
    ) -> Result<GatewayApproval, GatewayError>;

    async fn cancel(&self, payment_key: &str, reason: &str) -> Result<GatewayCancellation, GatewayError>;
}

/// The slice of an order the engine needs for validation and propagation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderSummary {
    pub order_id: OrderId,
    pub user_id: String,
    pub store_id: String,
    pub total_price: Money,
    pub status: OrderStatusType,
}

#[derive(Debug, Clone, Error)]
pub enum CollaboratorError {
    #[error("Collaborator request failed: {0}")]
    RequestFailed(String),
    #[error("Collaborator returned an unexpected response: {0}")]
    UnexpectedResponse(String),
}

/// Read and (best-effort) write access to the order service.
#[async_trait]
pub trait OrderService: Send + Sync {
    /// Fetch the order as visible to `user_id`. Returns `None` when the order does not exist
    /// or is not readable by this user.
    async fn fetch_order(&self, order_id: &OrderId, user_id: &str) -> Result<Option<OrderSummary>, CollaboratorError>;

    async fn update_order_status(&self, order_id: &OrderId, status: OrderStatusType) -> Result<(), CollaboratorError>;
}

#[async_trait]
pub trait UserDirectory: Send + Sync {
    async fn user_exists(&self, user_id: &str) -> Result<bool, CollaboratorError>;
}

#[async_trait]
pub trait StoreDirectory: Send + Sync {
    async fn store_exists(&self, store_id: &str) -> Result<bool, CollaboratorError>;
}
