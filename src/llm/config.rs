//! Upstream configuration

use super::{CompletionService, LlmError, LoggingService, OpenAICompatService};
use std::sync::Arc;

const DEFAULT_GATEWAY_URL: &str = "https://ai.gateway.lovable.dev/v1/chat/completions";
const DEFAULT_MODEL: &str = "google/gemini-3-flash-preview";

/// Configuration for the upstream gateway
#[derive(Debug, Clone)]
pub struct LlmConfig {
    pub api_key: Option<String>,
    pub gateway_url: String,
    pub model: String,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            gateway_url: DEFAULT_GATEWAY_URL.to_string(),
            model: DEFAULT_MODEL.to_string(),
        }
    }
}

impl LlmConfig {
    #[must_use]
    pub fn from_env() -> Self {
        let api_key = std::env::var("SCRIPT_CHAT_API_KEY")
            .or_else(|_| std::env::var("LOVABLE_API_KEY"))
            .ok()
            .filter(|k| !k.is_empty());
        Self {
            api_key,
            gateway_url: std::env::var("SCRIPT_CHAT_GATEWAY_URL")
                .unwrap_or_else(|_| DEFAULT_GATEWAY_URL.to_string()),
            model: std::env::var("SCRIPT_CHAT_MODEL").unwrap_or_else(|_| DEFAULT_MODEL.to_string()),
        }
    }

    /// Build the logged upstream service; `None` when no API key is configured
    ///
    /// # Errors
    ///
    /// Fails when the HTTP client cannot be built.
    pub fn build_service(&self) -> Result<Option<Arc<dyn CompletionService>>, LlmError> {
        let Some(api_key) = &self.api_key else {
            return Ok(None);
        };
        let service = OpenAICompatService::new(
            api_key.clone(),
            self.gateway_url.clone(),
            self.model.clone(),
        )?;
        Ok(Some(Arc::new(LoggingService::new(Arc::new(service)))))
    }
}
