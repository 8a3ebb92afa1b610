use std::{sync::Arc, time::Duration};

use actix_web::{dev::Server, http::KeepAlive, middleware::Logger, web, App, HttpServer};
use payment_engine::{
    events::{EventHandlers, EventHooks, EventProducers},
    OrderService,
    PaymentFlowApi,
    PaymentProviderClient,
    SqlitePaymentStore,
    StoreDirectory,
    UserDirectory,
};

use crate::{
    auth::TokenIssuer,
    config::ServerConfig,
    errors::ServerError,
    integrations::{GatewayClient, OrderServiceClient, StoreDirectoryClient, UserDirectoryClient},
    middleware::HmacMiddlewareFactory,
    routes::{health, CancelPaymentRoute, ConfirmPaymentRoute, MyPaymentsRoute, PaymentForOrderRoute},
    webhook_routes::GatewayWebhookRoute,
};

pub async fn run_server(config: ServerConfig) -> Result<(), ServerError> {
    let db = SqlitePaymentStore::new_with_url(&config.database_url, 25)
        .await
        .map_err(|e| ServerError::InitializeError(e.to_string()))?;
    let handlers = EventHandlers::new(config.event_buffer_size, EventHooks::default());
    let producers = handlers.producers();
    handlers.start_handlers().await;
    let srv = create_server_instance(config, db, producers)?;
    srv.await.map_err(|e| ServerError::Unspecified(e.to_string()))
}

pub fn create_server_instance(
    config: ServerConfig,
    db: SqlitePaymentStore,
    producers: EventProducers,
) -> Result<Server, ServerError> {
    let gateway: Arc<dyn PaymentProviderClient> = Arc::new(
        GatewayClient::new(config.gateway.clone()).map_err(|e| ServerError::InitializeError(e.to_string()))?,
    );
    let orders: Arc<dyn OrderService> = Arc::new(OrderServiceClient::new(&config.collaborators.order_service_url));
    let users: Arc<dyn UserDirectory> = Arc::new(UserDirectoryClient::new(&config.collaborators.user_service_url));
    let stores: Arc<dyn StoreDirectory> =
        Arc::new(StoreDirectoryClient::new(&config.collaborators.store_service_url));
    let host = config.host.clone();
    let port = config.port;
    let srv = HttpServer::new(move || {
        let flow_api = PaymentFlowApi::new(
            db.clone(),
            Arc::clone(&gateway),
            Arc::clone(&orders),
            Arc::clone(&users),
            Arc::clone(&stores),
            producers.clone(),
        );
        let jwt_signer = TokenIssuer::new(&config.auth);
        let app = App::new()
            .wrap(Logger::new("%t (%D ms) %s %a %{Host}i %U").log_target("mpg::access_log"))
            .app_data(web::Data::new(flow_api))
            .app_data(web::Data::new(jwt_signer));
        // Routes that require a bearer token
        let api_scope = web::scope("/api")
            .service(ConfirmPaymentRoute::<SqlitePaymentStore>::new())
            .service(CancelPaymentRoute::<SqlitePaymentStore>::new())
            .service(PaymentForOrderRoute::<SqlitePaymentStore>::new())
            .service(MyPaymentsRoute::<SqlitePaymentStore>::new());
        // The provider signs webhook bodies; nothing else may enter this scope
        let webhook_scope = web::scope("/gateway")
            .wrap(HmacMiddlewareFactory::new(
                "X-Gateway-Signature",
                config.gateway.webhook_secret.clone(),
                config.gateway.hmac_checks,
            ))
            .service(GatewayWebhookRoute::<SqlitePaymentStore>::new());
        app.service(health).service(api_scope).service(webhook_scope)
    })
    .keep_alive(KeepAlive::Timeout(Duration::from_secs(600)))
    .bind((host.as_str(), port))?
    .run();
    Ok(srv)
}

#[cfg(test)]
mod endpoint_tests {
    use actix_web::{http::StatusCode, test, web, App};
    use async_trait::async_trait;
    use chrono::Utc;
    use pay_common::{Money, Secret};
    use payment_engine::{
        db_types::{OrderId, OrderStatusType},
        CollaboratorError,
        ConfirmRequest,
        GatewayApproval,
        GatewayCancellation,
        GatewayError,
        OrderSummary,
    };
    use serde_json::Value;
    use tempfile::TempDir;

    use super::*;
    use crate::helpers::calculate_hmac;

    struct StubGateway;

    #[async_trait]
    impl PaymentProviderClient for StubGateway {
        async fn approve(
            &self,
            payment_key: &str,
            order_id: &OrderId,
            amount: Money,
            _idempotency_token: &str,
        ) -> Result<GatewayApproval, GatewayError> {
            Ok(GatewayApproval {
                payment_key: payment_key.to_string(),
                order_id: order_id.clone(),
                total_amount: amount,
                method: "CARD".to_string(),
                approved_at: Utc::now(),
                raw: r#"{"status":"DONE"}"#.to_string(),
            })
        }

        async fn cancel(&self, _payment_key: &str, _reason: &str) -> Result<GatewayCancellation, GatewayError> {
            Ok(GatewayCancellation { canceled_at: Utc::now(), raw: r#"{"status":"CANCELED"}"#.to_string() })
        }
    }

    struct StubOrders;

    #[async_trait]
    impl OrderService for StubOrders {
        async fn fetch_order(
            &self,
            order_id: &OrderId,
            user_id: &str,
        ) -> Result<Option<OrderSummary>, CollaboratorError> {
            Ok(Some(OrderSummary {
                order_id: order_id.clone(),
                user_id: user_id.to_string(),
                store_id: "store-1".to_string(),
                total_price: Money::from(10_000),
                status: OrderStatusType::AwaitingPayment,
            }))
        }

        async fn update_order_status(&self, _: &OrderId, _: OrderStatusType) -> Result<(), CollaboratorError> {
            Ok(())
        }
    }

    struct StubUsers;

    #[async_trait]
    impl UserDirectory for StubUsers {
        async fn user_exists(&self, _: &str) -> Result<bool, CollaboratorError> {
            Ok(true)
        }
    }

    struct StubStores;

    #[async_trait]
    impl StoreDirectory for StubStores {
        async fn store_exists(&self, _: &str) -> Result<bool, CollaboratorError> {
            Ok(true)
        }
    }

    async fn flow_api(dir: &TempDir) -> PaymentFlowApi<SqlitePaymentStore> {
        let _ = env_logger::try_init();
        let url = format!("sqlite://{}/payments.db?mode=rwc", dir.path().display());
        let db = SqlitePaymentStore::new_with_url(&url, 5).await.expect("could not create the test database");
        PaymentFlowApi::new(
            db,
            Arc::new(StubGateway),
            Arc::new(StubOrders),
            Arc::new(StubUsers),
            Arc::new(StubStores),
            EventProducers::default(),
        )
    }

    #[actix_web::test]
    async fn webhook_endpoint_policy() {
        let dir = TempDir::new().unwrap();
        let api = flow_api(&dir).await;
        // seed an approved payment through the flow API directly
        api.confirm(ConfirmRequest {
            payment_key: "pk-hook".to_string(),
            order_id: OrderId("order-hook".to_string()),
            amount: Money::from(10_000),
            user_id: "alice".to_string(),
        })
        .await
        .unwrap();

        let secret = Secret::new("hook-secret".to_string());
        let app = test::init_service(
            App::new().app_data(web::Data::new(api)).service(
                web::scope("/gateway")
                    .wrap(HmacMiddlewareFactory::new("X-Gateway-Signature", secret, true))
                    .service(GatewayWebhookRoute::<SqlitePaymentStore>::new()),
            ),
        )
        .await;

        // a signed CANCELED notification is applied
        let body = r#"{"paymentKey":"pk-hook","orderId":"order-hook","status":"CANCELED"}"#;
        let sig = calculate_hmac("hook-secret", body.as_bytes());
        let req = test::TestRequest::post()
            .uri("/gateway/webhook")
            .insert_header(("X-Gateway-Signature", sig.clone()))
            .set_payload(body)
            .to_request();
        let resp: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(resp["success"], Value::Bool(true));

        // a redelivery is still a 200, so the provider stops retrying
        let req = test::TestRequest::post()
            .uri("/gateway/webhook")
            .insert_header(("X-Gateway-Signature", sig))
            .set_payload(body)
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::OK);

        // an unknown payment is a handled rejection: 200 with success = false
        let body = r#"{"paymentKey":"pk-ghost","orderId":"order-ghost","status":"CANCELED"}"#;
        let sig = calculate_hmac("hook-secret", body.as_bytes());
        let req = test::TestRequest::post()
            .uri("/gateway/webhook")
            .insert_header(("X-Gateway-Signature", sig))
            .set_payload(body)
            .to_request();
        let resp: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(resp["success"], Value::Bool(false));
    }

    #[actix_web::test]
    async fn payment_routes_require_authentication() {
        let dir = TempDir::new().unwrap();
        let api = flow_api(&dir).await;
        let issuer = TokenIssuer::new(&crate::config::AuthConfig {
            jwt_secret: Secret::new("api-secret".to_string()),
            token_lifetime: chrono::Duration::hours(1),
        });
        let token = issuer.issue_token("alice").unwrap();
        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(api))
                .app_data(web::Data::new(issuer))
                .service(web::scope("/api").service(MyPaymentsRoute::<SqlitePaymentStore>::new())),
        )
        .await;

        let req = test::TestRequest::get().uri("/api/payments/me").to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);

        let req = test::TestRequest::get()
            .uri("/api/payments/me")
            .insert_header(("Authorization", format!("Bearer {token}")))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::OK);
    }
}
