//! Upstream completion service
//!
//! Chat-completions client used by the prompt composer, plus a logging decorator.

mod config;
mod error;
mod openai;
mod types;

pub use config::LlmConfig;
pub use error::{LlmError, LlmErrorKind};
pub use openai::OpenAICompatService;
pub use types::*;

use async_trait::async_trait;
use std::sync::Arc;

/// Common interface for completion providers
#[async_trait]
pub trait CompletionService: Send + Sync {
    /// Start a streaming completion; yields the raw server-sent-event body
    async fn stream(&self, request: &CompletionRequest) -> Result<ByteStream, LlmError>;

    /// Make a non-streaming completion request
    async fn complete(&self, request: &CompletionRequest) -> Result<CompletionResponse, LlmError>;

    /// Get the model ID
    fn model_id(&self) -> &str;
}

/// Logging wrapper for completion services
pub struct LoggingService {
    inner: Arc<dyn CompletionService>,
    model_id: String,
}

impl LoggingService {
    #[must_use]
    pub fn new(inner: Arc<dyn CompletionService>) -> Self {
        let model_id = inner.model_id().to_string();
        Self { inner, model_id }
    }

    fn log_failure(&self, call: &'static str, duration: std::time::Duration, e: &LlmError) {
        tracing::error!(
            model = %self.model_id,
            call,
            duration_ms = %duration.as_millis(),
            kind = ?e.kind,
            error = %e.message,
            retry_after_secs = e.retry_after.map(|d| d.as_secs()),
            "Upstream request failed"
        );
    }
}

#[async_trait]
impl CompletionService for LoggingService {
    async fn stream(&self, request: &CompletionRequest) -> Result<ByteStream, LlmError> {
        let start = std::time::Instant::now();
        let result = self.inner.stream(request).await;
        let duration = start.elapsed();

        match &result {
            Ok(_) => tracing::info!(
                model = %self.model_id,
                duration_ms = %duration.as_millis(),
                messages = request.messages.len(),
                "Upstream stream opened"
            ),
            Err(e) => self.log_failure("stream", duration, e),
        }

        result
    }

    async fn complete(&self, request: &CompletionRequest) -> Result<CompletionResponse, LlmError> {
        let start = std::time::Instant::now();
        let result = self.inner.complete(request).await;
        let duration = start.elapsed();

        match &result {
            Ok(response) => tracing::info!(
                model = %self.model_id,
                duration_ms = %duration.as_millis(),
                input_tokens = response.usage.input_tokens,
                output_tokens = response.usage.output_tokens,
                "Upstream request completed"
            ),
            Err(e) => self.log_failure("complete", duration, e),
        }

        result
    }

    fn model_id(&self) -> &str {
        &self.model_id
    }
}
