use pay_common::Money;
use serde::{Deserialize, Serialize};

use crate::db_types::{OrderId, Payment};

/// A payment confirmation request, as issued by the customer-facing client after the gateway
/// checkout flow has produced a payment key.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfirmRequest {
    pub payment_key: String,
    pub order_id: OrderId,
    pub amount: Money,
    pub user_id: String,
}

/// The webhook notification body the gateway posts on payment status changes.
///
/// The `status` vocabulary is gateway-defined; see [`crate::db_types::GatewayStatus`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WebhookNotification {
    pub payment_key: String,
    pub order_id: OrderId,
    pub status: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure: Option<WebhookFailure>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookFailure {
    pub message: String,
}

/// What a webhook delivery did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WebhookOutcome {
    /// The notification moved the payment to a new status.
    Applied(Payment),
    /// This (payment_key, status) pair has already been processed; nothing was touched.
    Duplicate,
    /// The payment was already in the reported status; idempotent by value.
    NoChange,
}
