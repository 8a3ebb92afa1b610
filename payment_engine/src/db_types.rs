use std::{fmt::Display, str::FromStr};

use chrono::{DateTime, Utc};
use pay_common::Money;
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, Type};
use thiserror::Error;

#[derive(Debug, Clone, Error)]
#[error("Invalid status value: {0}")]
pub struct ConversionError(pub String);

//--------------------------------------   PaymentStatus   -----------------------------------------------------------

/// The lifecycle state of a payment transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Type, Serialize, Deserialize)]
pub enum PaymentStatus {
    /// The gateway has issued a payment key, but the payment has not been confirmed yet.
    Ready,
    /// The gateway has approved the payment. Money has moved.
    Approved,
    /// The approved payment was cancelled, either by the user or by a gateway-side event.
    Canceled,
    /// The gateway rejected or revoked the payment.
    Failed,
}

impl Display for PaymentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PaymentStatus::Ready => write!(f, "Ready"),
            PaymentStatus::Approved => write!(f, "Approved"),
            PaymentStatus::Canceled => write!(f, "Canceled"),
            PaymentStatus::Failed => write!(f, "Failed"),
        }
    }
}

impl FromStr for PaymentStatus {
    type Err = ConversionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Ready" => Ok(Self::Ready),
            "Approved" => Ok(Self::Approved),
            "Canceled" => Ok(Self::Canceled),
            "Failed" => Ok(Self::Failed),
            s => Err(ConversionError(format!("Invalid payment status: {s}"))),
        }
    }
}

//--------------------------------------   GatewayStatus   -----------------------------------------------------------

/// The status vocabulary the gateway uses in webhook notifications.
///
/// `DONE` and `APPROVED` are synonyms in the gateway's API. Anything outside this vocabulary is
/// rejected distinctly from a malformed payload, see
/// [`crate::flow_api::WebhookError::UnknownStatus`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GatewayStatus {
    Approved,
    Canceled,
    Failed,
}

impl FromStr for GatewayStatus {
    type Err = ConversionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "DONE" | "APPROVED" => Ok(Self::Approved),
            "CANCELED" => Ok(Self::Canceled),
            "FAILED" => Ok(Self::Failed),
            s => Err(ConversionError(format!("Unknown gateway status: {s}"))),
        }
    }
}

impl Display for GatewayStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            GatewayStatus::Approved => write!(f, "APPROVED"),
            GatewayStatus::Canceled => write!(f, "CANCELED"),
            GatewayStatus::Failed => write!(f, "FAILED"),
        }
    }
}

//--------------------------------------   OrderStatusType   ---------------------------------------------------------

/// The order lifecycle vocabulary of the order service.
///
/// The order service owns orders; the gateway only reads an order's status during confirmation
/// and pushes a new status after a payment event (best effort).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatusType {
    /// The order has been placed and is waiting for a successful payment.
    AwaitingPayment,
    /// The order has been paid for in full.
    OrderComplete,
    /// The order has been cancelled.
    OrderCanceled,
}

impl Display for OrderStatusType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OrderStatusType::AwaitingPayment => write!(f, "AWAITING_PAYMENT"),
            OrderStatusType::OrderComplete => write!(f, "ORDER_COMPLETE"),
            OrderStatusType::OrderCanceled => write!(f, "ORDER_CANCELED"),
        }
    }
}

impl FromStr for OrderStatusType {
    type Err = ConversionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "AWAITING_PAYMENT" => Ok(Self::AwaitingPayment),
            "ORDER_COMPLETE" => Ok(Self::OrderComplete),
            "ORDER_CANCELED" => Ok(Self::OrderCanceled),
            s => Err(ConversionError(format!("Invalid order status: {s}"))),
        }
    }
}

//--------------------------------------        OrderId        -------------------------------------------------------

/// A lightweight wrapper around the order id issued by the order service.
#[derive(Debug, Clone, PartialEq, Eq, Type, Serialize, Deserialize)]
#[sqlx(transparent)]
#[serde(transparent)]
pub struct OrderId(pub String);

impl FromStr for OrderId {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(s.to_string()))
    }
}

impl From<String> for OrderId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl Display for OrderId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

impl OrderId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

//--------------------------------------        Payment        -------------------------------------------------------

/// One row per attempted-or-completed payment transaction. Never physically deleted.
#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize, Deserialize)]
pub struct Payment {
    pub id: i64,
    /// The gateway-issued opaque payment key. Unique per transaction attempt.
    pub payment_key: String,
    pub order_id: OrderId,
    pub user_id: String,
    /// The amount in minor currency units.
    pub amount: Money,
    /// The payment method as reported by the gateway (e.g. "CARD").
    pub payment_method: Option<String>,
    pub status: PaymentStatus,
    pub approved_at: Option<DateTime<Utc>>,
    pub canceled_at: Option<DateTime<Utc>>,
    pub failed_reason: Option<String>,
    /// Verbatim serialized gateway response, retained for dispute resolution.
    pub raw_response: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

//--------------------------------------      NewPayment       -------------------------------------------------------

/// The data needed to create a payment row on the first confirmation attempt.
#[derive(Debug, Clone)]
pub struct NewPayment {
    pub payment_key: String,
    pub order_id: OrderId,
    pub user_id: String,
    pub amount: Money,
}

impl NewPayment {
    pub fn new(payment_key: String, order_id: OrderId, user_id: String, amount: Money) -> Self {
        Self { payment_key, order_id, user_id, amount }
    }
}

//--------------------------------------    PaymentHistory     -------------------------------------------------------

/// One immutable row per observed payment state transition. This is the audit ledger.
#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize, Deserialize)]
pub struct PaymentHistory {
    pub id: i64,
    pub payment_id: i64,
    /// `None` for the first transition of a payment.
    pub previous_status: Option<PaymentStatus>,
    pub current_status: PaymentStatus,
    /// Which trigger caused the transition (confirm, cancel, webhook) and why.
    pub change_reason: String,
    /// Gateway response snapshot at the moment of the transition.
    pub raw_response: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn payment_status_round_trips() {
        for s in [PaymentStatus::Ready, PaymentStatus::Approved, PaymentStatus::Canceled, PaymentStatus::Failed] {
            assert_eq!(s.to_string().parse::<PaymentStatus>().unwrap(), s);
        }
        assert!("Pending".parse::<PaymentStatus>().is_err());
    }

    #[test]
    fn gateway_status_vocabulary() {
        assert_eq!("DONE".parse::<GatewayStatus>().unwrap(), GatewayStatus::Approved);
        assert_eq!("APPROVED".parse::<GatewayStatus>().unwrap(), GatewayStatus::Approved);
        assert_eq!("CANCELED".parse::<GatewayStatus>().unwrap(), GatewayStatus::Canceled);
        assert_eq!("FAILED".parse::<GatewayStatus>().unwrap(), GatewayStatus::Failed);
        assert!("WEIRD".parse::<GatewayStatus>().is_err());
        // case matters in the gateway vocabulary
        assert!("done".parse::<GatewayStatus>().is_err());
    }

    #[test]
    fn order_status_round_trips() {
        for s in [OrderStatusType::AwaitingPayment, OrderStatusType::OrderComplete, OrderStatusType::OrderCanceled] {
            assert_eq!(s.to_string().parse::<OrderStatusType>().unwrap(), s);
        }
    }
}
