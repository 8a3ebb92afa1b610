use std::sync::Arc;

use async_trait::async_trait;
use log::*;
use payment_engine::{
    db_types::{OrderId, OrderStatusType},
    CollaboratorError,
    OrderService,
    OrderSummary,
};
use reqwest::{Client, StatusCode};

/// Client for the order service's internal API.
#[derive(Clone)]
pub struct OrderServiceClient {
    base_url: String,
    client: Arc<Client>,
}

impl OrderServiceClient {
    pub fn new(base_url: &str) -> Self {
        Self { base_url: base_url.trim_end_matches('/').to_string(), client: Arc::new(Client::new()) }
    }
}

#[async_trait]
impl OrderService for OrderServiceClient {
    async fn fetch_order(
        &self,
        order_id: &OrderId,
        user_id: &str,
    ) -> Result<Option<OrderSummary>, CollaboratorError> {
        let url = format!("{}/internal/orders/{}", self.base_url, order_id.as_str());
        trace!("📦️ Fetching order {order_id}");
        let response = self
            .client
            .get(url)
            .query(&[("user_id", user_id)])
            .send()
            .await
            .map_err(|e| CollaboratorError::RequestFailed(e.to_string()))?;
        match response.status() {
            StatusCode::NOT_FOUND => Ok(None),
            s if s.is_success() => {
                let order = response
                    .json::<OrderSummary>()
                    .await
                    .map_err(|e| CollaboratorError::UnexpectedResponse(e.to_string()))?;
                Ok(Some(order))
            },
            s => {
                let message = response.text().await.unwrap_or_default();
                Err(CollaboratorError::RequestFailed(format!("{s}: {message}")))
            },
        }
    }

    async fn update_order_status(
        &self,
        order_id: &OrderId,
        status: OrderStatusType,
    ) -> Result<(), CollaboratorError> {
        let url = format!("{}/internal/orders/{}/status", self.base_url, order_id.as_str());
        debug!("📦️ Updating order {order_id} to {status}");
        let response = self
            .client
            .patch(url)
            .json(&serde_json::json!({ "status": status }))
            .send()
            .await
            .map_err(|e| CollaboratorError::RequestFailed(e.to_string()))?;
        if response.status().is_success() {
            Ok(())
        } else {
            let s = response.status();
            let message = response.text().await.unwrap_or_default();
            Err(CollaboratorError::RequestFailed(format!("{s}: {message}")))
        }
    }
}
