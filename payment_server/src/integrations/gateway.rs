use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use log::*;
use pay_common::Money;
use payment_engine::{
    db_types::OrderId,
    GatewayApproval,
    GatewayCancellation,
    GatewayError,
    PaymentProviderClient,
};
use reqwest::{
    header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE},
    Client,
};
use serde_json::Value;

use crate::config::GatewayConfig;

/// Client for the payment provider's approve/cancel API.
///
/// The provider authenticates merchants with basic auth: the merchant secret key as the
/// username and an empty password. Approval calls additionally carry an `Idempotency-Key`
/// header so the provider de-duplicates retries on its side.
#[derive(Clone)]
pub struct GatewayClient {
    base_url: String,
    client: Arc<Client>,
}

impl GatewayClient {
    pub fn new(config: GatewayConfig) -> Result<Self, GatewayError> {
        let credentials = base64::encode(format!("{}:", config.secret_key.reveal()));
        let mut headers = HeaderMap::with_capacity(2);
        let val = HeaderValue::from_str(&format!("Basic {credentials}"))
            .map_err(|e| GatewayError::RequestFailed(e.to_string()))?;
        headers.insert(AUTHORIZATION, val);
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        let client = Client::builder()
            .default_headers(headers)
            .build()
            .map_err(|e| GatewayError::RequestFailed(e.to_string()))?;
        let base_url = config.base_url.trim_end_matches('/').to_string();
        Ok(Self { base_url, client: Arc::new(client) })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    async fn post(
        &self,
        path: &str,
        body: Value,
        idempotency_token: Option<&str>,
    ) -> Result<String, GatewayError> {
        let url = self.url(path);
        trace!("💳️ Sending provider request: {url}");
        let mut req = self.client.post(url).json(&body);
        if let Some(token) = idempotency_token {
            req = req.header("Idempotency-Key", token);
        }
        let response = req.send().await.map_err(|e| GatewayError::RequestFailed(e.to_string()))?;
        let status = response.status();
        let text = response.text().await.map_err(|e| GatewayError::RequestFailed(e.to_string()))?;
        if status.is_success() {
            trace!("💳️ Provider request successful. {status}");
            Ok(text)
        } else {
            let message = serde_json::from_str::<Value>(&text)
                .ok()
                .and_then(|v| v["message"].as_str().map(str::to_string))
                .unwrap_or(text);
            Err(GatewayError::Declined { status: status.as_u16(), message })
        }
    }
}

fn parse_timestamp(value: &Value, field: &str) -> DateTime<Utc> {
    value[field]
        .as_str()
        .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(Utc::now)
}

#[async_trait]
impl PaymentProviderClient for GatewayClient {
    async fn approve(
        &self,
        payment_key: &str,
        order_id: &OrderId,
        amount: Money,
        idempotency_token: &str,
    ) -> Result<GatewayApproval, GatewayError> {
        debug!("💳️ Requesting approval for payment [{payment_key}]");
        let body = serde_json::json!({
            "paymentKey": payment_key,
            "orderId": order_id.as_str(),
            "amount": amount,
        });
        let raw = self.post("/v1/payments/confirm", body, Some(idempotency_token)).await?;
        let value =
            serde_json::from_str::<Value>(&raw).map_err(|e| GatewayError::InvalidResponse(e.to_string()))?;
        let method = value["method"].as_str().unwrap_or("UNKNOWN").to_string();
        let approved_at = parse_timestamp(&value, "approvedAt");
        info!("💳️ Provider approved payment [{payment_key}] via {method}");
        Ok(GatewayApproval {
            payment_key: payment_key.to_string(),
            order_id: order_id.clone(),
            total_amount: amount,
            method,
            approved_at,
            raw,
        })
    }

    async fn cancel(&self, payment_key: &str, reason: &str) -> Result<GatewayCancellation, GatewayError> {
        debug!("💳️ Requesting cancellation of payment [{payment_key}]");
        let body = serde_json::json!({ "cancelReason": reason });
        let path = format!("/v1/payments/{payment_key}/cancel");
        let raw = self.post(&path, body, None).await?;
        let value =
            serde_json::from_str::<Value>(&raw).map_err(|e| GatewayError::InvalidResponse(e.to_string()))?;
        let canceled_at = parse_timestamp(&value, "canceledAt");
        info!("💳️ Provider cancelled payment [{payment_key}]");
        Ok(GatewayCancellation { canceled_at, raw })
    }
}
