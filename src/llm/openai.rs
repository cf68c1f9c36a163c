//! `OpenAI`-compatible chat-completions client

use super::types::{ByteStream, CompletionRequest, CompletionResponse, Usage};
use super::{CompletionService, LlmError};
use crate::api::WireMessage;
use async_trait::async_trait;
use futures::{StreamExt, TryStreamExt};
use reqwest::header::RETRY_AFTER;
use reqwest::{Client, Response, StatusCode};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Non-streaming completions must finish within this
const COMPLETE_TIMEOUT: Duration = Duration::from_mins(5);

/// Chat-completions service behind an `OpenAI`-compatible gateway
pub struct OpenAICompatService {
    client: Client,
    api_key: String,
    url: String,
    model: String,
}

impl OpenAICompatService {
    /// # Errors
    ///
    /// Fails when the HTTP client cannot be built.
    pub fn new(api_key: String, url: String, model: String) -> Result<Self, LlmError> {
        // Streams stay open as long as the model talks, so only connecting is bounded
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| LlmError::unknown(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self {
            client,
            api_key,
            url,
            model,
        })
    }

    fn translate_request(&self, request: &CompletionRequest, stream: bool) -> ChatRequest {
        ChatRequest {
            model: self.model.clone(),
            messages: request.wire_messages(),
            stream,
        }
    }

    async fn post(
        &self,
        body: &ChatRequest,
        timeout: Option<Duration>,
    ) -> Result<Response, LlmError> {
        let mut builder = self
            .client
            .post(&self.url)
            .bearer_auth(&self.api_key)
            .json(body);
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }

        let response = builder.send().await.map_err(|e| {
            if e.is_timeout() {
                LlmError::network(format!("Request timeout: {e}"))
            } else if e.is_connect() {
                LlmError::network(format!("Connection failed: {e}"))
            } else {
                LlmError::unknown(format!("Request failed: {e}"))
            }
        })?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let retry_after = response
            .headers()
            .get(RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse::<u64>().ok())
            .map(Duration::from_secs);
        let text = response.text().await.unwrap_or_default();
        Err(classify_error(status, &text, retry_after))
    }
}

/// Map a failed gateway response to an error, preferring the gateway's own message
fn classify_error(status: StatusCode, body: &str, retry_after: Option<Duration>) -> LlmError {
    let detail = serde_json::from_str::<GatewayErrorResponse>(body)
        .map_or_else(|_| body.to_string(), |e| e.error.message);
    LlmError::from_status(status.as_u16(), &detail, retry_after)
}

#[async_trait]
impl CompletionService for OpenAICompatService {
    async fn stream(&self, request: &CompletionRequest) -> Result<ByteStream, LlmError> {
        let body = self.translate_request(request, true);
        let response = self.post(&body, None).await?;
        Ok(response
            .bytes_stream()
            .map_err(|e| LlmError::network(format!("Stream interrupted: {e}")))
            .boxed())
    }

    async fn complete(&self, request: &CompletionRequest) -> Result<CompletionResponse, LlmError> {
        let body = self.translate_request(request, false);
        let response = self.post(&body, Some(COMPLETE_TIMEOUT)).await?;
        let text = response
            .text()
            .await
            .map_err(|e| LlmError::network(format!("Failed to read response: {e}")))?;

        let parsed: ChatResponse = serde_json::from_str(&text).map_err(|e| {
            LlmError::unknown(format!("Failed to parse response: {e} - body: {text}"))
        })?;

        let usage = parsed.usage.map_or_else(Usage::default, |u| Usage {
            input_tokens: u64::from(u.prompt_tokens),
            output_tokens: u64::from(u.completion_tokens),
        });
        let text = parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .unwrap_or_default();

        Ok(CompletionResponse { text, usage })
    }

    fn model_id(&self) -> &str {
        &self.model
    }
}

// Wire types

#[derive(Debug, Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<WireMessage>,
    stream: bool,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
    usage: Option<ChatUsage>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
#[allow(clippy::struct_field_names)]
struct ChatUsage {
    prompt_tokens: u32,
    completion_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct GatewayErrorResponse {
    error: GatewayError,
}

#[derive(Debug, Deserialize)]
struct GatewayError {
    message: String,
}
