//! Outbound transport for relay messages

use async_trait::async_trait;
use reqwest::Client as HttpClient;
use serde::Serialize;
use std::time::Duration;
use tracing::debug;

use super::{RelayError, RelaySettings};

/// Delivers one message to the relay channel
#[async_trait]
pub trait RelayTransport: Send + Sync {
    async fn send(&self, settings: &RelaySettings, text: &str) -> Result<(), RelayError>;
}

#[derive(Debug, Serialize)]
struct SendMessageRequest<'a> {
    chat_id: &'a str,
    text: &'a str,
}

/// Telegram Bot API transport (`sendMessage`)
#[derive(Debug, Clone)]
pub struct TelegramTransport {
    http_client: HttpClient,
    base_url: String,
}

impl TelegramTransport {
    const DEFAULT_BASE_URL: &'static str = "https://api.telegram.org";

    /// Create a transport whose requests time out after `timeout`
    pub fn new(timeout: Duration) -> Result<Self, RelayError> {
        Self::with_base_url(Self::DEFAULT_BASE_URL.to_string(), timeout)
    }

    /// Create a transport against a custom endpoint (for testing)
    pub fn with_base_url(base_url: String, timeout: Duration) -> Result<Self, RelayError> {
        let http_client = HttpClient::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| RelayError::Transport(e.to_string()))?;
        Ok(Self {
            http_client,
            base_url,
        })
    }

    fn endpoint(&self, token: &str) -> String {
        format!(
            "{}/bot{}/sendMessage",
            self.base_url.trim_end_matches('/'),
            token
        )
    }
}

#[async_trait]
impl RelayTransport for TelegramTransport {
    async fn send(&self, settings: &RelaySettings, text: &str) -> Result<(), RelayError> {
        let (Some(token), Some(recipient)) = (settings.token.as_deref(), settings.recipient.as_deref())
        else {
            return Err(RelayError::MissingCredentials);
        };

        let response = self
            .http_client
            .post(self.endpoint(token))
            .json(&SendMessageRequest {
                chat_id: recipient,
                text,
            })
            .send()
            .await
            .map_err(|e| RelayError::Transport(e.to_string()))?;

        let status = response.status();
        if status.is_success() {
            debug!(status = status.as_u16(), "relay message delivered");
            return Ok(());
        }

        let body = response.text().await.unwrap_or_default();
        // Telegram reports failures as {"ok": false, "description": "..."}
        let message = serde_json::from_str::<serde_json::Value>(&body)
            .ok()
            .and_then(|v| v.get("description").and_then(|d| d.as_str()).map(str::to_string))
            .unwrap_or(body);

        Err(RelayError::Http {
            status: status.as_u16(),
            message,
        })
    }
}
