use serde::{Deserialize, Serialize};

use crate::db_types::{Payment, PaymentHistory};

/// Emitted after a payment has been durably recorded as approved, whether via the confirm path
/// or via webhook reconciliation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentApprovedEvent {
    pub payment: Payment,
}

impl PaymentApprovedEvent {
    pub fn new(payment: Payment) -> Self {
        Self { payment }
    }
}

/// Emitted after a gateway rejection (or a gateway-side FAILED notification) has been recorded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentFailedEvent {
    pub payment: Payment,
}

impl PaymentFailedEvent {
    pub fn new(payment: Payment) -> Self {
        Self { payment }
    }
}

/// Emitted after a cancellation has been recorded, carrying the ledger entry that observed it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentCanceledEvent {
    pub payment: Payment,
    pub history: PaymentHistory,
}

impl PaymentCanceledEvent {
    pub fn new(payment: Payment, history: PaymentHistory) -> Self {
        Self { payment, history }
    }
}
