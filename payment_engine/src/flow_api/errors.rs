use pay_common::Money;
use thiserror::Error;

use crate::{
    db_types::{OrderId, OrderStatusType, PaymentStatus},
    traits::PaymentStoreError,
};

/// Failures of the synchronous confirm/cancel entry points. Validation variants carry no side
/// effects; gateway variants may leave an auditable `Failed` payment row behind (confirm only).
#[derive(Debug, Error)]
pub enum PaymentFlowError {
    #[error("The requesting user {0} does not exist")]
    UserNotFound(String),
    #[error("The order {0} does not exist")]
    OrderNotFound(OrderId),
    #[error("The store {0} referenced by this order does not exist")]
    StoreNotFound(String),
    #[error("The order does not belong to the requesting user")]
    OrderOwnershipMismatch,
    #[error("The requested amount {requested} does not match the order total {expected}")]
    AmountMismatch { expected: Money, requested: Money },
    #[error("The order is not awaiting payment (current status: {0})")]
    OrderNotPayable(OrderStatusType),
    #[error("An identical request is already being processed")]
    OperationInFlight,
    #[error("The gateway did not approve the payment. {0}")]
    ApprovalFailed(String),
    #[error("The gateway did not cancel the payment. {0}")]
    CancelFailed(String),
    #[error("No payment exists for order {0}")]
    PaymentNotFound(OrderId),
    #[error("The payment cannot be cancelled from status {0}")]
    NotCancelable(PaymentStatus),
    #[error("The {service} service could not be reached. {message}")]
    CollaboratorUnavailable { service: &'static str, message: String },
    #[error("{0}")]
    StorageError(#[from] PaymentStoreError),
    #[error("Internal serialization error. {0}")]
    SnapshotError(String),
}

/// Failures of the webhook reconciliation path. The transport layer decides which of these
/// warrant a retry-inducing response to the gateway.
#[derive(Debug, Error)]
pub enum WebhookError {
    #[error("Could not parse webhook payload. {0}")]
    InvalidPayload(String),
    #[error("Unknown gateway status: {0}")]
    UnknownStatus(String),
    #[error("No payment exists for payment key {0}")]
    PaymentNotFound(String),
    #[error("The gateway reported {to} but the payment is {from}")]
    IllegalTransition { from: PaymentStatus, to: PaymentStatus },
    #[error("{0}")]
    StorageError(#[from] PaymentStoreError),
}
