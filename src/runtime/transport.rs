//! HTTP transport to the prompt composer

use super::traits::{ChatTransport, ChunkStream, TransportError};
use crate::api::ScriptChatRequest;
use async_trait::async_trait;
use futures::{StreamExt, TryStreamExt};
use reqwest::Client;
use std::time::Duration;

const DEFAULT_URL: &str = "http://127.0.0.1:8000/functions/v1/script-chat";

/// Where the composer lives and how to authenticate against it
#[derive(Debug, Clone)]
pub struct TransportConfig {
    pub url: String,
    /// Sent as a bearer token when present
    pub publishable_key: Option<String>,
}

impl TransportConfig {
    #[must_use]
    pub fn from_env() -> Self {
        Self {
            url: std::env::var("SCRIPT_CHAT_URL").unwrap_or_else(|_| DEFAULT_URL.to_string()),
            publishable_key: std::env::var("SCRIPT_CHAT_PUBLISHABLE_KEY")
                .ok()
                .filter(|k| !k.is_empty()),
        }
    }
}

/// `ChatTransport` over reqwest
pub struct HttpTransport {
    client: Client,
    config: TransportConfig,
}

impl HttpTransport {
    /// # Errors
    ///
    /// Fails when the HTTP client cannot be built.
    pub fn new(config: TransportConfig) -> Result<Self, TransportError> {
        // No overall timeout: replies stream for as long as the model talks
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| TransportError::Connection(format!("Failed to create HTTP client: {e}")))?;
        Ok(Self { client, config })
    }
}

#[async_trait]
impl ChatTransport for HttpTransport {
    async fn open(&self, request: &ScriptChatRequest) -> Result<ChunkStream, TransportError> {
        let mut builder = self.client.post(&self.config.url).json(request);
        if let Some(key) = &self.config.publishable_key {
            builder = builder.bearer_auth(key);
        }

        let response = builder
            .send()
            .await
            .map_err(|e| TransportError::Connection(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::warn!(status = status.as_u16(), body = %body, "Composer rejected request");
            return Err(TransportError::from_status(status.as_u16(), &body));
        }

        tracing::debug!(mode = %request.mode, messages = request.messages.len(), "Stream opened");
        Ok(response
            .bytes_stream()
            .map_err(|e| TransportError::Body(e.to_string()))
            .boxed())
    }
}
