//! Common types for upstream completions

use super::LlmError;
use crate::api::WireMessage;
use axum::body::Bytes;
use futures::stream::BoxStream;

/// Raw server-sent-event body of a streaming completion
pub type ByteStream = BoxStream<'static, Result<Bytes, LlmError>>;

/// Chat-completion request: system preamble plus conversation
#[derive(Debug, Clone, PartialEq)]
pub struct CompletionRequest {
    pub system: String,
    pub messages: Vec<WireMessage>,
}

impl CompletionRequest {
    #[must_use]
    pub fn new(system: impl Into<String>, messages: Vec<WireMessage>) -> Self {
        Self {
            system: system.into(),
            messages,
        }
    }

    /// Messages as sent upstream, system preamble first
    #[must_use]
    pub fn wire_messages(&self) -> Vec<WireMessage> {
        let mut messages = Vec::with_capacity(self.messages.len() + 1);
        messages.push(WireMessage::system(self.system.clone()));
        messages.extend(self.messages.iter().cloned());
        messages
    }
}

/// Non-streaming completion result
#[derive(Debug, Clone, Default)]
pub struct CompletionResponse {
    pub text: String,
    pub usage: Usage,
}

/// Token usage
#[derive(Debug, Clone, Default)]
pub struct Usage {
    pub input_tokens: u64,
    pub output_tokens: u64,
}
