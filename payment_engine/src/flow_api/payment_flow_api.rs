use std::{fmt::Debug, sync::Arc};

use chrono::Utc;
use log::*;

use crate::{
    db_types::{GatewayStatus, NewPayment, OrderId, OrderStatusType, Payment, PaymentHistory, PaymentStatus},
    events::{EventProducers, PaymentApprovedEvent, PaymentCanceledEvent, PaymentFailedEvent},
    flow_api::{
        errors::{PaymentFlowError, WebhookError},
        payment_objects::{ConfirmRequest, WebhookNotification, WebhookOutcome},
    },
    helpers::{gateway_idempotency_token, order_status_for, payment_status_for},
    traits::{
        CollaboratorError,
        IdempotencyClaim,
        OrderService,
        PaymentProviderClient,
        PaymentStore,
        StatusUpdate,
        StoreDirectory,
        UserDirectory,
    },
};

fn approval_key(payment_key: &str, order_id: &OrderId) -> String {
    format!("approve:{payment_key}:{}", order_id.as_str())
}

fn cancel_key(payment_id: i64, reason: &str) -> String {
    format!("cancel:{payment_id}:{reason}")
}

fn webhook_key(payment_key: &str, gateway_status: &str) -> String {
    format!("webhook:{payment_key}:{gateway_status}")
}

/// `PaymentFlowApi` is the payment authorization engine: it orchestrates confirmation,
/// cancellation and webhook-driven reconciliation against the payment gateway, keeps the local
/// ledger, and propagates resulting state to the order service on a best-effort basis.
///
/// The gateway, not the order service, is the source of truth for whether money moved: once the
/// gateway has spoken and the local ledger is written, neither order-status propagation nor
/// event emission can fail the operation.
pub struct PaymentFlowApi<B> {
    db: B,
    gateway: Arc<dyn PaymentProviderClient>,
    orders: Arc<dyn OrderService>,
    users: Arc<dyn UserDirectory>,
    stores: Arc<dyn StoreDirectory>,
    producers: EventProducers,
}

impl<B> Debug for PaymentFlowApi<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "PaymentFlowApi")
    }
}

impl<B> PaymentFlowApi<B> {
    pub fn new(
        db: B,
        gateway: Arc<dyn PaymentProviderClient>,
        orders: Arc<dyn OrderService>,
        users: Arc<dyn UserDirectory>,
        stores: Arc<dyn StoreDirectory>,
        producers: EventProducers,
    ) -> Self {
        Self { db, gateway, orders, users, stores, producers }
    }
}

fn unavailable(service: &'static str, e: CollaboratorError) -> PaymentFlowError {
    PaymentFlowError::CollaboratorUnavailable { service, message: e.to_string() }
}

impl<B> PaymentFlowApi<B>
where B: PaymentStore
{
    /// Confirm (capture) a payment with the gateway.
    ///
    /// Preconditions are validated before anything else; a validation failure leaves zero side
    /// effects behind. The approval idempotency key is then claimed atomically, so even
    /// racing identical requests produce exactly one gateway approval call. A replayed request
    /// returns the previously produced payment unchanged.
    ///
    /// On gateway rejection a `Failed` payment row is still durably recorded for audit, the
    /// claim is released so a legitimate retry may call the gateway again, and the caller sees
    /// [`PaymentFlowError::ApprovalFailed`].
    pub async fn confirm(&self, request: ConfirmRequest) -> Result<Payment, PaymentFlowError> {
        let ConfirmRequest { payment_key, order_id, amount, user_id } = request;
        debug!("🔄️💳️ Confirming payment [{payment_key}] for order {order_id}");
        if !self.users.user_exists(&user_id).await.map_err(|e| unavailable("user", e))? {
            return Err(PaymentFlowError::UserNotFound(user_id));
        }
        let order = self
            .orders
            .fetch_order(&order_id, &user_id)
            .await
            .map_err(|e| unavailable("order", e))?
            .ok_or_else(|| PaymentFlowError::OrderNotFound(order_id.clone()))?;
        if !self.stores.store_exists(&order.store_id).await.map_err(|e| unavailable("store", e))? {
            return Err(PaymentFlowError::StoreNotFound(order.store_id));
        }
        if order.user_id != user_id {
            return Err(PaymentFlowError::OrderOwnershipMismatch);
        }
        if order.total_price != amount {
            return Err(PaymentFlowError::AmountMismatch { expected: order.total_price, requested: amount });
        }
        if order.status != OrderStatusType::AwaitingPayment {
            return Err(PaymentFlowError::OrderNotPayable(order.status));
        }

        let op_key = approval_key(&payment_key, &order_id);
        match self.db.claim_operation(&op_key).await? {
            IdempotencyClaim::Replayed(snapshot) => {
                debug!("🔄️💳️ Confirmation for [{payment_key}] replayed from the idempotency store");
                let payment: Payment =
                    serde_json::from_str(&snapshot).map_err(|e| PaymentFlowError::SnapshotError(e.to_string()))?;
                return Ok(payment);
            },
            IdempotencyClaim::InFlight => return Err(PaymentFlowError::OperationInFlight),
            IdempotencyClaim::Won => {},
        }

        let token = gateway_idempotency_token(&payment_key, &order_id);
        match self.gateway.approve(&payment_key, &order_id, amount, &token).await {
            Ok(approval) => {
                let new_payment = NewPayment::new(payment_key, order_id.clone(), user_id, amount);
                let result = self
                    .db
                    .upsert_confirmed_payment(
                        new_payment,
                        Some(approval.method.clone()),
                        approval.approved_at,
                        &approval.raw,
                        "confirm: gateway approved the payment",
                    )
                    .await;
                let (payment, _entry) = match result {
                    Ok(v) => v,
                    Err(e) => {
                        self.release_claim(&op_key).await;
                        return Err(e.into());
                    },
                };
                let snapshot =
                    serde_json::to_string(&payment).map_err(|e| PaymentFlowError::SnapshotError(e.to_string()))?;
                if let Err(e) = self.db.complete_operation(&op_key, &snapshot).await {
                    // don't leave a permanently pending claim behind
                    self.release_claim(&op_key).await;
                    return Err(e.into());
                }
                self.push_order_status(&order_id, OrderStatusType::OrderComplete).await;
                self.call_payment_approved_hook(&payment).await;
                info!("🔄️💳️ Payment [{}] approved for order {order_id}", payment.payment_key);
                Ok(payment)
            },
            Err(e) => {
                warn!("🔄️💳️ Gateway rejected payment [{payment_key}] for order {order_id}. {e}");
                self.release_claim(&op_key).await;
                let new_payment = NewPayment::new(payment_key, order_id, user_id, amount);
                match self
                    .db
                    .upsert_failed_payment(
                        new_payment,
                        &e.to_string(),
                        None,
                        "confirm: gateway rejected the approval",
                    )
                    .await
                {
                    Ok((payment, _)) => self.call_payment_failed_hook(&payment).await,
                    Err(se) => error!("🔄️💳️ Could not record the failed payment attempt. {se}"),
                }
                Err(PaymentFlowError::ApprovalFailed(e.to_string()))
            },
        }
    }

    /// Cancel an approved payment.
    ///
    /// The payment is looked up by (order, user), so ownership is encoded in the key: a payment
    /// belonging to someone else is "not found", not "forbidden". Retrying with the same reason
    /// string replays the original cancellation instead of calling the gateway again.
    pub async fn cancel(
        &self,
        order_id: &OrderId,
        user_id: &str,
        reason: &str,
    ) -> Result<PaymentHistory, PaymentFlowError> {
        debug!("🔄️❌️ Cancelling payment for order {order_id}");
        let payment = self
            .db
            .fetch_payment_for_order(order_id, user_id)
            .await?
            .ok_or_else(|| PaymentFlowError::PaymentNotFound(order_id.clone()))?;
        if payment.status != PaymentStatus::Approved {
            return Err(PaymentFlowError::NotCancelable(payment.status));
        }

        let op_key = cancel_key(payment.id, reason);
        match self.db.claim_operation(&op_key).await? {
            IdempotencyClaim::Replayed(snapshot) => {
                debug!("🔄️❌️ Cancellation for order {order_id} replayed from the idempotency store");
                let entry: PaymentHistory =
                    serde_json::from_str(&snapshot).map_err(|e| PaymentFlowError::SnapshotError(e.to_string()))?;
                return Ok(entry);
            },
            IdempotencyClaim::InFlight => return Err(PaymentFlowError::OperationInFlight),
            IdempotencyClaim::Won => {},
        }

        match self.gateway.cancel(&payment.payment_key, reason).await {
            Ok(cancellation) => {
                let update = StatusUpdate::Cancel {
                    canceled_at: cancellation.canceled_at,
                    raw_response: cancellation.raw,
                };
                let result = self
                    .db
                    .transition_payment(payment.id, PaymentStatus::Approved, update, &format!("cancel: {reason}"))
                    .await;
                let (payment, entry) = match result {
                    Ok(v) => v,
                    Err(e) => {
                        self.release_claim(&op_key).await;
                        return Err(e.into());
                    },
                };
                let snapshot =
                    serde_json::to_string(&entry).map_err(|e| PaymentFlowError::SnapshotError(e.to_string()))?;
                if let Err(e) = self.db.complete_operation(&op_key, &snapshot).await {
                    self.release_claim(&op_key).await;
                    return Err(e.into());
                }
                self.push_order_status(order_id, OrderStatusType::OrderCanceled).await;
                self.call_payment_canceled_hook(&payment, &entry).await;
                info!("🔄️❌️ Payment [{}] cancelled for order {order_id}", payment.payment_key);
                Ok(entry)
            },
            Err(e) => {
                warn!("🔄️❌️ Gateway rejected the cancellation for order {order_id}. {e}");
                self.release_claim(&op_key).await;
                Err(PaymentFlowError::CancelFailed(e.to_string()))
            },
        }
    }

    /// Apply an asynchronously delivered gateway status notification against the local ledger.
    ///
    /// This path races freely with [`Self::confirm`] and [`Self::cancel`] on the same payment;
    /// duplicate deliveries are dropped via the idempotency claim, a notification matching the
    /// current status is a no-op by value, and anything outside the allowed transitions
    /// (Ready→Approved, Approved→Canceled, Approved→Failed) is rejected. The signature has
    /// already been verified by the transport layer.
    pub async fn handle_webhook(&self, body: &[u8]) -> Result<WebhookOutcome, WebhookError> {
        let notification: WebhookNotification =
            serde_json::from_slice(body).map_err(|e| WebhookError::InvalidPayload(e.to_string()))?;
        trace!("🔄️📨️ Webhook for payment [{}]: {}", notification.payment_key, notification.status);
        let gateway_status = notification
            .status
            .parse::<GatewayStatus>()
            .map_err(|_| WebhookError::UnknownStatus(notification.status.clone()))?;

        let op_key = webhook_key(&notification.payment_key, &notification.status);
        match self.db.claim_operation(&op_key).await? {
            IdempotencyClaim::Replayed(_) => {
                debug!("🔄️📨️ Duplicate webhook delivery for [{}], ignoring", notification.payment_key);
                return Ok(WebhookOutcome::Duplicate);
            },
            // another delivery of the same notification is being processed right now
            IdempotencyClaim::InFlight => return Ok(WebhookOutcome::Duplicate),
            IdempotencyClaim::Won => {},
        }

        let payment = match self.db.fetch_payment_by_key(&notification.payment_key).await {
            Ok(Some(p)) => p,
            Ok(None) => {
                self.release_claim(&op_key).await;
                return Err(WebhookError::PaymentNotFound(notification.payment_key));
            },
            Err(e) => {
                self.release_claim(&op_key).await;
                return Err(e.into());
            },
        };

        let target = payment_status_for(gateway_status);
        if payment.status == target {
            debug!("🔄️📨️ Payment [{}] is already {target}; webhook is a no-op", payment.payment_key);
            let snapshot = serde_json::to_string(&payment).unwrap_or_default();
            self.db.complete_operation(&op_key, &snapshot).await?;
            return Ok(WebhookOutcome::NoChange);
        }

        let raw = String::from_utf8_lossy(body).to_string();
        let update = match (payment.status, target) {
            (PaymentStatus::Ready, PaymentStatus::Approved) => StatusUpdate::Approve {
                payment_method: None,
                approved_at: Utc::now(),
                raw_response: raw,
            },
            (PaymentStatus::Approved, PaymentStatus::Canceled) => {
                StatusUpdate::Cancel { canceled_at: Utc::now(), raw_response: raw }
            },
            (PaymentStatus::Approved, PaymentStatus::Failed) => {
                let failed_reason = notification
                    .failure
                    .map(|f| f.message)
                    .unwrap_or_else(|| "gateway reported FAILED".to_string());
                StatusUpdate::Fail { failed_reason, raw_response: Some(raw) }
            },
            (from, to) => {
                self.release_claim(&op_key).await;
                return Err(WebhookError::IllegalTransition { from, to });
            },
        };

        let reason = format!("webhook: gateway reported {}", notification.status);
        let result = self.db.transition_payment(payment.id, payment.status, update, &reason).await;
        let (payment, entry) = match result {
            Ok(v) => v,
            Err(e) => {
                self.release_claim(&op_key).await;
                return Err(e.into());
            },
        };
        let snapshot = serde_json::to_string(&payment).unwrap_or_default();
        self.db.complete_operation(&op_key, &snapshot).await?;

        self.push_order_status(&payment.order_id, order_status_for(target)).await;
        match target {
            PaymentStatus::Approved => self.call_payment_approved_hook(&payment).await,
            PaymentStatus::Canceled => self.call_payment_canceled_hook(&payment, &entry).await,
            PaymentStatus::Failed => self.call_payment_failed_hook(&payment).await,
            PaymentStatus::Ready => {},
        }
        info!("🔄️📨️ Webhook applied: payment [{}] is now {target}", payment.payment_key);
        Ok(WebhookOutcome::Applied(payment))
    }

    /// Pure lookup: the payment for an order, as visible to its owner.
    pub async fn payment_for_order(
        &self,
        order_id: &OrderId,
        user_id: &str,
    ) -> Result<Option<Payment>, PaymentFlowError> {
        let payment = self.db.fetch_payment_for_order(order_id, user_id).await?;
        Ok(payment)
    }

    /// Pure lookup: all payments made by a user, most recent first.
    pub async fn payments_for_user(&self, user_id: &str) -> Result<Vec<Payment>, PaymentFlowError> {
        let payments = self.db.fetch_payments_for_user(user_id).await?;
        Ok(payments)
    }

    /// Pure lookup: the audit ledger for a payment, oldest entry first.
    pub async fn history_for_payment(&self, payment_id: i64) -> Result<Vec<PaymentHistory>, PaymentFlowError> {
        let rows = self.db.fetch_history_for_payment(payment_id).await?;
        Ok(rows)
    }

    /// Best-effort propagation of a payment outcome to the order service. Failure is logged and
    /// swallowed: the payment's durability must not depend on the order service being up.
    async fn push_order_status(&self, order_id: &OrderId, status: OrderStatusType) {
        if let Err(e) = self.orders.update_order_status(order_id, status).await {
            warn!("🔄️📦️ Could not propagate status {status} to order {order_id}. {e}");
        }
    }

    async fn release_claim(&self, op_key: &str) {
        if let Err(e) = self.db.release_operation(op_key).await {
            error!("🔄️🔑️ Could not release idempotency claim {op_key}. {e}");
        }
    }

    async fn call_payment_approved_hook(&self, payment: &Payment) {
        for emitter in &self.producers.payment_approved_producer {
            emitter.publish_event(PaymentApprovedEvent::new(payment.clone())).await;
        }
    }

    async fn call_payment_failed_hook(&self, payment: &Payment) {
        for emitter in &self.producers.payment_failed_producer {
            emitter.publish_event(PaymentFailedEvent::new(payment.clone())).await;
        }
    }

    async fn call_payment_canceled_hook(&self, payment: &Payment, entry: &PaymentHistory) {
        for emitter in &self.producers.payment_canceled_producer {
            emitter.publish_event(PaymentCanceledEvent::new(payment.clone(), entry.clone())).await;
        }
    }

    pub fn db(&self) -> &B {
        &self.db
    }

    pub fn db_mut(&mut self) -> &mut B {
        &mut self.db
    }
}
