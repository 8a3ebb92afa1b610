use std::sync::Arc;

use async_trait::async_trait;
use log::*;
use payment_engine::{CollaboratorError, UserDirectory};
use reqwest::{Client, StatusCode};

/// Client for the user service's internal existence check.
#[derive(Clone)]
pub struct UserDirectoryClient {
    base_url: String,
    client: Arc<Client>,
}

impl UserDirectoryClient {
    pub fn new(base_url: &str) -> Self {
        Self { base_url: base_url.trim_end_matches('/').to_string(), client: Arc::new(Client::new()) }
    }
}

#[async_trait]
impl UserDirectory for UserDirectoryClient {
    async fn user_exists(&self, user_id: &str) -> Result<bool, CollaboratorError> {
        let url = format!("{}/internal/users/{user_id}", self.base_url);
        trace!("👤️ Checking user {user_id}");
        let response =
            self.client.get(url).send().await.map_err(|e| CollaboratorError::RequestFailed(e.to_string()))?;
        match response.status() {
            StatusCode::NOT_FOUND => Ok(false),
            s if s.is_success() => Ok(true),
            s => {
                let message = response.text().await.unwrap_or_default();
                Err(CollaboratorError::RequestFailed(format!("{s}: {message}")))
            },
        }
    }
}
