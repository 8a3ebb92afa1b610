//! End-to-end tests of the payment flow API against a real SQLite store, with the gateway and
//! the collaborator services mocked out.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use mockall::mock;
use pay_common::Money;
use payment_engine::{
    db_types::{OrderId, OrderStatusType, PaymentStatus},
    events::EventProducers,
    CollaboratorError,
    ConfirmRequest,
    GatewayApproval,
    GatewayCancellation,
    GatewayError,
    OrderService,
    OrderSummary,
    PaymentFlowApi,
    PaymentFlowError,
    PaymentProviderClient,
    SqlitePaymentStore,
    StoreDirectory,
    UserDirectory,
    WebhookError,
    WebhookOutcome,
};
use tempfile::TempDir;

mock! {
    pub Gateway {}

    #[async_trait]
    impl PaymentProviderClient for Gateway {
        async fn approve(
            &self,
            payment_key: &str,
            order_id: &OrderId,
            amount: Money,
            idempotency_token: &str,
        ) -> Result<GatewayApproval, GatewayError>;

        async fn cancel(&self, payment_key: &str, reason: &str) -> Result<GatewayCancellation, GatewayError>;
    }
}

mock! {
    pub Orders {}

    #[async_trait]
    impl OrderService for Orders {
        async fn fetch_order(
            &self,
            order_id: &OrderId,
            user_id: &str,
        ) -> Result<Option<OrderSummary>, CollaboratorError>;

        async fn update_order_status(
            &self,
            order_id: &OrderId,
            status: OrderStatusType,
        ) -> Result<(), CollaboratorError>;
    }
}

mock! {
    pub Users {}

    #[async_trait]
    impl UserDirectory for Users {
        async fn user_exists(&self, user_id: &str) -> Result<bool, CollaboratorError>;
    }
}

mock! {
    pub Stores {}

    #[async_trait]
    impl StoreDirectory for Stores {
        async fn store_exists(&self, store_id: &str) -> Result<bool, CollaboratorError>;
    }
}

struct Rig {
    // keeps the sqlite file alive for the duration of the test
    _dir: TempDir,
    api: PaymentFlowApi<SqlitePaymentStore>,
}

async fn rig(gateway: MockGateway, orders: MockOrders, users: MockUsers, stores: MockStores) -> Rig {
    dotenvy::from_filename(".env.test").ok();
    let _ = env_logger::try_init();
    let dir = TempDir::new().expect("could not create a temp dir");
    let url = format!("sqlite://{}/payments.db?mode=rwc", dir.path().display());
    let db = SqlitePaymentStore::new_with_url(&url, 5).await.expect("could not create the test database");
    let api = PaymentFlowApi::new(
        db,
        Arc::new(gateway),
        Arc::new(orders),
        Arc::new(users),
        Arc::new(stores),
        EventProducers::default(),
    );
    Rig { _dir: dir, api }
}

fn awaiting_order(order_id: &str, user_id: &str, total: i64) -> OrderSummary {
    OrderSummary {
        order_id: OrderId(order_id.to_string()),
        user_id: user_id.to_string(),
        store_id: "store-1".to_string(),
        total_price: Money::from(total),
        status: OrderStatusType::AwaitingPayment,
    }
}

fn agreeable_users() -> MockUsers {
    let mut users = MockUsers::new();
    users.expect_user_exists().returning(|_| Ok(true));
    users
}

fn agreeable_stores() -> MockStores {
    let mut stores = MockStores::new();
    stores.expect_store_exists().returning(|_| Ok(true));
    stores
}

fn order_book(order: OrderSummary) -> MockOrders {
    let mut orders = MockOrders::new();
    orders.expect_fetch_order().returning(move |_, _| Ok(Some(order.clone())));
    orders.expect_update_order_status().returning(|_, _| Ok(()));
    orders
}

fn approving_gateway(times: usize) -> MockGateway {
    let mut gateway = MockGateway::new();
    gateway.expect_approve().times(times).returning(|pk, oid, amount, _| {
        Ok(GatewayApproval {
            payment_key: pk.to_string(),
            order_id: oid.clone(),
            total_amount: amount,
            method: "CARD".to_string(),
            approved_at: Utc::now(),
            raw: r#"{"status":"DONE","method":"CARD"}"#.to_string(),
        })
    });
    gateway
}

fn confirm_request(payment_key: &str, order_id: &str, user_id: &str, amount: i64) -> ConfirmRequest {
    ConfirmRequest {
        payment_key: payment_key.to_string(),
        order_id: OrderId(order_id.to_string()),
        amount: Money::from(amount),
        user_id: user_id.to_string(),
    }
}

fn webhook_body(payment_key: &str, order_id: &str, status: &str) -> Vec<u8> {
    format!(r#"{{"paymentKey":"{payment_key}","orderId":"{order_id}","status":"{status}"}}"#).into_bytes()
}

#[tokio::test]
async fn confirm_records_an_approved_payment() {
    let mut orders = MockOrders::new();
    let order = awaiting_order("order-1", "alice", 15_000);
    orders.expect_fetch_order().returning(move |_, _| Ok(Some(order.clone())));
    orders
        .expect_update_order_status()
        .withf(|oid, status| oid.as_str() == "order-1" && *status == OrderStatusType::OrderComplete)
        .times(1)
        .returning(|_, _| Ok(()));
    let rig = rig(approving_gateway(1), orders, agreeable_users(), agreeable_stores()).await;

    let payment = rig.api.confirm(confirm_request("pk-1", "order-1", "alice", 15_000)).await.unwrap();
    assert_eq!(payment.status, PaymentStatus::Approved);
    assert_eq!(payment.payment_method.as_deref(), Some("CARD"));
    assert!(payment.approved_at.is_some());
    assert_eq!(payment.amount, Money::from(15_000));

    let ledger = rig.api.history_for_payment(payment.id).await.unwrap();
    assert_eq!(ledger.len(), 1);
    assert_eq!(ledger[0].previous_status, None);
    assert_eq!(ledger[0].current_status, PaymentStatus::Approved);
}

#[tokio::test]
async fn repeated_confirms_call_the_gateway_once() {
    let order = awaiting_order("order-2", "alice", 9_900);
    let rig = rig(approving_gateway(1), order_book(order), agreeable_users(), agreeable_stores()).await;

    let first = rig.api.confirm(confirm_request("pk-2", "order-2", "alice", 9_900)).await.unwrap();
    let second = rig.api.confirm(confirm_request("pk-2", "order-2", "alice", 9_900)).await.unwrap();
    assert_eq!(first, second);

    // the ledger saw exactly one transition
    let ledger = rig.api.history_for_payment(first.id).await.unwrap();
    assert_eq!(ledger.len(), 1);
}

#[tokio::test]
async fn amount_mismatch_has_no_side_effects() {
    let order = awaiting_order("order-3", "alice", 5_000);
    let mut gateway = MockGateway::new();
    gateway.expect_approve().times(0);
    let rig = rig(gateway, order_book(order), agreeable_users(), agreeable_stores()).await;

    let err = rig.api.confirm(confirm_request("pk-3", "order-3", "alice", 4_999)).await.unwrap_err();
    assert!(matches!(err, PaymentFlowError::AmountMismatch { .. }));
    let payment = rig.api.payment_for_order(&OrderId("order-3".to_string()), "alice").await.unwrap();
    assert!(payment.is_none());
}

#[tokio::test]
async fn validation_rejects_foreign_and_unpayable_orders() {
    let mut orders = MockOrders::new();
    let mut order = awaiting_order("order-4", "alice", 5_000);
    order.status = OrderStatusType::OrderComplete;
    orders.expect_fetch_order().returning(move |_, _| Ok(Some(order.clone())));
    let mut gateway = MockGateway::new();
    gateway.expect_approve().times(0);
    let rig = rig(gateway, orders, agreeable_users(), agreeable_stores()).await;

    let err = rig.api.confirm(confirm_request("pk-4", "order-4", "alice", 5_000)).await.unwrap_err();
    assert!(matches!(err, PaymentFlowError::OrderNotPayable(OrderStatusType::OrderComplete)));
}

#[tokio::test]
async fn gateway_rejection_is_recorded_and_retryable() {
    let order = awaiting_order("order-5", "bob", 30_000);
    let mut gateway = MockGateway::new();
    let mut calls = 0u32;
    gateway.expect_approve().times(2).returning(move |pk, oid, amount, _| {
        calls += 1;
        if calls == 1 {
            Err(GatewayError::Declined { status: 402, message: "INSUFFICIENT_FUNDS".to_string() })
        } else {
            Ok(GatewayApproval {
                payment_key: pk.to_string(),
                order_id: oid.clone(),
                total_amount: amount,
                method: "CARD".to_string(),
                approved_at: Utc::now(),
                raw: r#"{"status":"DONE"}"#.to_string(),
            })
        }
    });
    let rig = rig(gateway, order_book(order), agreeable_users(), agreeable_stores()).await;

    let err = rig.api.confirm(confirm_request("pk-5", "order-5", "bob", 30_000)).await.unwrap_err();
    assert!(matches!(err, PaymentFlowError::ApprovalFailed(_)));

    // the rejection is durably auditable
    let failed = rig.api.payment_for_order(&OrderId("order-5".to_string()), "bob").await.unwrap().unwrap();
    assert_eq!(failed.status, PaymentStatus::Failed);
    assert!(failed.failed_reason.as_deref().unwrap().contains("INSUFFICIENT_FUNDS"));

    // and the claim was released, so a retry reaches the gateway again
    let payment = rig.api.confirm(confirm_request("pk-5", "order-5", "bob", 30_000)).await.unwrap();
    assert_eq!(payment.status, PaymentStatus::Approved);
    assert!(payment.failed_reason.is_none());

    let ledger = rig.api.history_for_payment(payment.id).await.unwrap();
    let statuses = ledger.iter().map(|h| (h.previous_status, h.current_status)).collect::<Vec<_>>();
    assert_eq!(statuses, vec![
        (None, PaymentStatus::Failed),
        (Some(PaymentStatus::Failed), PaymentStatus::Approved)
    ]);
}

#[tokio::test]
async fn cancel_is_idempotent_per_reason() {
    let order = awaiting_order("order-6", "carol", 12_000);
    let mut gateway = approving_gateway(1);
    gateway.expect_cancel().times(1).returning(|_, _| {
        Ok(GatewayCancellation { canceled_at: Utc::now(), raw: r#"{"status":"CANCELED"}"#.to_string() })
    });
    let rig = rig(gateway, order_book(order), agreeable_users(), agreeable_stores()).await;

    let oid = OrderId("order-6".to_string());
    rig.api.confirm(confirm_request("pk-6", "order-6", "carol", 12_000)).await.unwrap();
    let entry = rig.api.cancel(&oid, "carol", "customer request").await.unwrap();
    assert_eq!(entry.previous_status, Some(PaymentStatus::Approved));
    assert_eq!(entry.current_status, PaymentStatus::Canceled);

    // same reason replays the stored result instead of hitting the gateway again
    let replay = rig.api.cancel(&oid, "carol", "customer request").await.unwrap();
    assert_eq!(entry, replay);

    let payment = rig.api.payment_for_order(&oid, "carol").await.unwrap().unwrap();
    assert_eq!(payment.status, PaymentStatus::Canceled);
    assert!(payment.canceled_at.is_some());
}

#[tokio::test]
async fn only_approved_payments_can_be_cancelled() {
    let order = awaiting_order("order-7", "dave", 8_000);
    let mut gateway = MockGateway::new();
    gateway
        .expect_approve()
        .returning(|_, _, _, _| Err(GatewayError::Declined { status: 402, message: "DECLINED".to_string() }));
    gateway.expect_cancel().times(0);
    let rig = rig(gateway, order_book(order), agreeable_users(), agreeable_stores()).await;

    let oid = OrderId("order-7".to_string());
    let _ = rig.api.confirm(confirm_request("pk-7", "order-7", "dave", 8_000)).await.unwrap_err();
    let err = rig.api.cancel(&oid, "dave", "changed my mind").await.unwrap_err();
    assert!(matches!(err, PaymentFlowError::NotCancelable(PaymentStatus::Failed)));

    // a payment belonging to someone else is not found, not forbidden
    let err = rig.api.cancel(&oid, "mallory", "changed my mind").await.unwrap_err();
    assert!(matches!(err, PaymentFlowError::PaymentNotFound(_)));
}

#[tokio::test]
async fn webhook_applies_and_deduplicates() {
    let order = awaiting_order("order-8", "erin", 22_000);
    let mut orders = MockOrders::new();
    orders.expect_fetch_order().returning(move |_, _| Ok(Some(order.clone())));
    orders
        .expect_update_order_status()
        .withf(|_, status| *status == OrderStatusType::OrderComplete)
        .times(1)
        .returning(|_, _| Ok(()));
    orders
        .expect_update_order_status()
        .withf(|_, status| *status == OrderStatusType::OrderCanceled)
        .times(1)
        .returning(|_, _| Ok(()));
    let rig = rig(approving_gateway(1), orders, agreeable_users(), agreeable_stores()).await;

    rig.api.confirm(confirm_request("pk-8", "order-8", "erin", 22_000)).await.unwrap();
    let body = webhook_body("pk-8", "order-8", "CANCELED");
    let outcome = rig.api.handle_webhook(&body).await.unwrap();
    let payment = match outcome {
        WebhookOutcome::Applied(p) => p,
        other => panic!("expected Applied, got {other:?}"),
    };
    assert_eq!(payment.status, PaymentStatus::Canceled);

    // a redelivery of the same notification is dropped without touching the ledger
    let outcome = rig.api.handle_webhook(&body).await.unwrap();
    assert_eq!(outcome, WebhookOutcome::Duplicate);
    let ledger = rig.api.history_for_payment(payment.id).await.unwrap();
    assert_eq!(ledger.len(), 2);
}

#[tokio::test]
async fn webhook_matching_current_status_is_a_no_op() {
    let order = awaiting_order("order-9", "erin", 7_000);
    let rig = rig(approving_gateway(1), order_book(order), agreeable_users(), agreeable_stores()).await;

    let confirmed = rig.api.confirm(confirm_request("pk-9", "order-9", "erin", 7_000)).await.unwrap();
    let outcome = rig.api.handle_webhook(&webhook_body("pk-9", "order-9", "DONE")).await.unwrap();
    assert_eq!(outcome, WebhookOutcome::NoChange);
    let ledger = rig.api.history_for_payment(confirmed.id).await.unwrap();
    assert_eq!(ledger.len(), 1);
}

#[tokio::test]
async fn cancelled_payments_are_never_reapproved() {
    let order = awaiting_order("order-10", "frank", 50_000);
    let mut gateway = approving_gateway(1);
    gateway.expect_cancel().returning(|_, _| {
        Ok(GatewayCancellation { canceled_at: Utc::now(), raw: r#"{"status":"CANCELED"}"#.to_string() })
    });
    let rig = rig(gateway, order_book(order), agreeable_users(), agreeable_stores()).await;

    let oid = OrderId("order-10".to_string());
    rig.api.confirm(confirm_request("pk-10", "order-10", "frank", 50_000)).await.unwrap();
    rig.api.cancel(&oid, "frank", "fraud review").await.unwrap();

    let err = rig.api.handle_webhook(&webhook_body("pk-10", "order-10", "DONE")).await.unwrap_err();
    assert!(matches!(err, WebhookError::IllegalTransition {
        from: PaymentStatus::Canceled,
        to: PaymentStatus::Approved
    }));
    let payment = rig.api.payment_for_order(&oid, "frank").await.unwrap().unwrap();
    assert_eq!(payment.status, PaymentStatus::Canceled);
}

#[tokio::test]
async fn unknown_webhook_status_does_not_poison_the_payment() {
    let order = awaiting_order("order-11", "grace", 3_000);
    let rig = rig(approving_gateway(1), order_book(order), agreeable_users(), agreeable_stores()).await;

    rig.api.confirm(confirm_request("pk-11", "order-11", "grace", 3_000)).await.unwrap();
    let err = rig.api.handle_webhook(&webhook_body("pk-11", "order-11", "REFUNDED")).await.unwrap_err();
    assert!(matches!(err, WebhookError::UnknownStatus(_)));

    // a later, valid notification for the same payment still applies
    let outcome = rig.api.handle_webhook(&webhook_body("pk-11", "order-11", "CANCELED")).await.unwrap();
    assert!(matches!(outcome, WebhookOutcome::Applied(_)));
}

#[tokio::test]
async fn failed_webhook_demotes_an_approved_payment() {
    let order = awaiting_order("order-12", "heidi", 18_000);
    let mut orders = MockOrders::new();
    orders.expect_fetch_order().returning(move |_, _| Ok(Some(order.clone())));
    orders
        .expect_update_order_status()
        .withf(|_, status| *status == OrderStatusType::OrderComplete)
        .times(1)
        .returning(|_, _| Ok(()));
    orders
        .expect_update_order_status()
        .withf(|_, status| *status == OrderStatusType::AwaitingPayment)
        .times(1)
        .returning(|_, _| Ok(()));
    let rig = rig(approving_gateway(1), orders, agreeable_users(), agreeable_stores()).await;

    rig.api.confirm(confirm_request("pk-12", "order-12", "heidi", 18_000)).await.unwrap();
    let body = r#"{"paymentKey":"pk-12","orderId":"order-12","status":"FAILED","failure":{"message":"chargeback"}}"#;
    let outcome = rig.api.handle_webhook(body.as_bytes()).await.unwrap();
    let payment = match outcome {
        WebhookOutcome::Applied(p) => p,
        other => panic!("expected Applied, got {other:?}"),
    };
    assert_eq!(payment.status, PaymentStatus::Failed);
    assert_eq!(payment.failed_reason.as_deref(), Some("chargeback"));
}

#[tokio::test]
async fn ledger_folds_to_the_current_status() {
    let order = awaiting_order("order-13", "ivan", 40_000);
    let mut gateway = MockGateway::new();
    let mut calls = 0u32;
    gateway.expect_approve().returning(move |pk, oid, amount, _| {
        calls += 1;
        if calls == 1 {
            Err(GatewayError::RequestFailed("connection reset".to_string()))
        } else {
            Ok(GatewayApproval {
                payment_key: pk.to_string(),
                order_id: oid.clone(),
                total_amount: amount,
                method: "TRANSFER".to_string(),
                approved_at: Utc::now(),
                raw: r#"{"status":"DONE"}"#.to_string(),
            })
        }
    });
    let rig = rig(gateway, order_book(order), agreeable_users(), agreeable_stores()).await;

    let _ = rig.api.confirm(confirm_request("pk-13", "order-13", "ivan", 40_000)).await.unwrap_err();
    rig.api.confirm(confirm_request("pk-13", "order-13", "ivan", 40_000)).await.unwrap();
    rig.api.handle_webhook(&webhook_body("pk-13", "order-13", "CANCELED")).await.unwrap();

    let payment = rig.api.payment_for_order(&OrderId("order-13".to_string()), "ivan").await.unwrap().unwrap();
    let ledger = rig.api.history_for_payment(payment.id).await.unwrap();
    // replaying the ledger in insertion order reproduces the payment's current status
    let folded = ledger.iter().fold(None, |prev, entry| {
        assert_eq!(entry.previous_status, prev);
        Some(entry.current_status)
    });
    assert_eq!(folded, Some(payment.status));
    assert_eq!(payment.status, PaymentStatus::Canceled);
}

#[tokio::test]
async fn payments_for_user_lists_newest_first() {
    let mut orders = MockOrders::new();
    orders.expect_fetch_order().returning(|oid, user| {
        Ok(Some(OrderSummary {
            order_id: oid.clone(),
            user_id: user.to_string(),
            store_id: "store-1".to_string(),
            total_price: Money::from(1_000),
            status: OrderStatusType::AwaitingPayment,
        }))
    });
    orders.expect_update_order_status().returning(|_, _| Ok(()));
    let rig = rig(approving_gateway(3), orders, agreeable_users(), agreeable_stores()).await;

    for i in 1..=3 {
        rig.api.confirm(confirm_request(&format!("pk-14-{i}"), &format!("order-14-{i}"), "judy", 1_000)).await.unwrap();
    }
    let payments = rig.api.payments_for_user("judy").await.unwrap();
    assert_eq!(payments.len(), 3);
    assert_eq!(payments[0].payment_key, "pk-14-3");
    assert_eq!(payments[2].payment_key, "pk-14-1");
    assert!(rig.api.payments_for_user("nobody").await.unwrap().is_empty());
}
