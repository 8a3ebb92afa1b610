use std::fmt::Display;

use pay_common::Money;
use payment_engine::db_types::OrderId;
use serde::{Deserialize, Serialize};

/// Body of `POST /api/payments/confirm`. The requesting user comes from the access token, not
/// the body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfirmParams {
    pub payment_key: String,
    pub order_id: OrderId,
    pub amount: Money,
}

/// Body of `PATCH /api/payments/cancel/{order_id}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CancelParams {
    pub cancel_reason: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonResponse {
    pub success: bool,
    pub message: String,
}

impl JsonResponse {
    pub fn success<S: Display>(message: S) -> Self {
        Self { success: true, message: message.to_string() }
    }

    pub fn failure<S: Display>(message: S) -> Self {
        Self { success: false, message: message.to_string() }
    }
}
