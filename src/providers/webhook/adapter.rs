use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;

use super::models::{extract_reply, WebhookRequest};
use crate::config::ExchangeConfig;
use crate::providers::session::SessionStore;
use crate::providers::traits::ChatProvider;
use crate::providers::types::ExchangeError;

/// Posts utterances to a chat webhook and returns its replies.
pub struct WebhookProvider {
    client: Client,
    url: String,
    sessions: SessionStore,
}

impl WebhookProvider {
    pub fn new(config: &ExchangeConfig, sessions: SessionStore) -> Result<Self> {
        config.validate()?;

        let mut builder = Client::builder();
        if let Some(timeout) = config.timeout {
            builder = builder.timeout(timeout);
        }
        let client = builder.build().context("Failed to build HTTP client")?;

        Ok(Self {
            client,
            url: config.chat_url(),
            sessions,
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl ChatProvider for WebhookProvider {
    async fn send_message(
        &self,
        text: &str,
        session_id: Option<&str>,
    ) -> Result<String, ExchangeError> {
        let session_id = self.sessions.resolve(session_id).await;
        let request = WebhookRequest::send_message(&session_id, text);

        tracing::debug!(url = %self.url, session_id = %session_id, "Sending chat message");

        let response = self
            .client
            .post(&self.url)
            .header("content-type", "application/json")
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                ExchangeError::Network(format!("Failed to connect to {}: {}", self.url, e))
            })?;

        let status = response.status();
        if !status.is_success() {
            // reqwest does not expose the reason phrase the server sent.
            return Err(ExchangeError::Transport {
                status: status.as_u16(),
                status_text: status.canonical_reason().unwrap_or_default().to_string(),
            });
        }

        let body = response
            .text()
            .await
            .map_err(|e| ExchangeError::Network(format!("Failed to read response: {}", e)))?;
        let data: Value = serde_json::from_str(&body)
            .map_err(|e| ExchangeError::InvalidResponse(format!("Response is not JSON: {}", e)))?;

        Ok(extract_reply(&data))
    }
}
