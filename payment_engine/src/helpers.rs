//! Small pure helpers: the deterministic gateway idempotency token and the status-mapping
//! tables. The mappings are deliberately standalone functions rather than inline match arms so
//! that they can be tested on their own.

use blake2::{digest::consts::U32, Blake2b, Digest};

use crate::db_types::{GatewayStatus, OrderId, OrderStatusType, PaymentStatus};

/// Derive the idempotency token sent to the gateway on an approval call.
///
/// The token is a pure function of (payment_key, order_id), so a retried confirmation presents
/// the same token and the gateway de-duplicates on its side as well, even if the local
/// idempotency store were bypassed.
pub fn gateway_idempotency_token(payment_key: &str, order_id: &OrderId) -> String {
    let mut hasher = Blake2b::<U32>::new();
    hasher.update(payment_key.as_bytes());
    hasher.update(b":");
    hasher.update(order_id.as_str().as_bytes());
    let digest = hasher.finalize();
    digest.iter().fold(String::with_capacity(64), |mut s, b| {
        use std::fmt::Write;
        let _ = write!(s, "{b:02x}");
        s
    })
}

/// Map the gateway's webhook vocabulary onto the internal payment state.
pub fn payment_status_for(status: GatewayStatus) -> PaymentStatus {
    match status {
        GatewayStatus::Approved => PaymentStatus::Approved,
        GatewayStatus::Canceled => PaymentStatus::Canceled,
        GatewayStatus::Failed => PaymentStatus::Failed,
    }
}

/// Map a payment state onto the order status pushed to the order service.
///
/// A failed payment sends the order back to `AwaitingPayment` so the customer can try again.
pub fn order_status_for(status: PaymentStatus) -> OrderStatusType {
    match status {
        PaymentStatus::Approved => OrderStatusType::OrderComplete,
        PaymentStatus::Canceled => OrderStatusType::OrderCanceled,
        PaymentStatus::Ready | PaymentStatus::Failed => OrderStatusType::AwaitingPayment,
    }
}
