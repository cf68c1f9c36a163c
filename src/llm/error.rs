//! Gateway failures and how they are classified

use std::time::Duration;
use thiserror::Error;

/// A failed gateway call
#[derive(Debug, Error)]
#[error("{message}")]
pub struct LlmError {
    pub kind: LlmErrorKind,
    pub message: String,
    /// Wait requested by the gateway's `Retry-After` header
    pub retry_after: Option<Duration>,
}

impl LlmError {
    #[must_use]
    pub fn new(kind: LlmErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            retry_after: None,
        }
    }

    /// Transport-level failure before or during the response
    #[must_use]
    pub fn network(message: impl Into<String>) -> Self {
        Self::new(LlmErrorKind::Network, message)
    }

    #[must_use]
    pub fn unknown(message: impl Into<String>) -> Self {
        Self::new(LlmErrorKind::Unknown, message)
    }

    /// Classify a non-success gateway status. `detail` is the gateway's own
    /// error text; `retry_after` is only kept for rate limits.
    #[must_use]
    pub fn from_status(status: u16, detail: &str, retry_after: Option<Duration>) -> Self {
        let kind = LlmErrorKind::from_status(status);
        let message = match kind {
            LlmErrorKind::Unknown => format!("HTTP {status}: {detail}"),
            _ => format!("{}: {detail}", kind.label()),
        };
        Self {
            kind,
            message,
            retry_after: retry_after.filter(|_| kind == LlmErrorKind::RateLimit),
        }
    }
}

/// What went wrong upstream, as far as the composer's callers care
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LlmErrorKind {
    Network,
    /// 429
    RateLimit,
    /// 402, out of gateway credits
    PaymentRequired,
    /// 5xx
    ServerError,
    /// 401 or 403, usually a wrong `SCRIPT_CHAT_API_KEY`
    Auth,
    /// 400
    InvalidRequest,
    Unknown,
}

impl LlmErrorKind {
    #[must_use]
    pub fn from_status(status: u16) -> Self {
        match status {
            401 | 403 => Self::Auth,
            402 => Self::PaymentRequired,
            429 => Self::RateLimit,
            400 => Self::InvalidRequest,
            500..=599 => Self::ServerError,
            _ => Self::Unknown,
        }
    }

    fn label(self) -> &'static str {
        match self {
            Self::Network => "Network error",
            Self::RateLimit => "Rate limit exceeded",
            Self::PaymentRequired => "Payment required",
            Self::ServerError => "Server error",
            Self::Auth => "Authentication failed",
            Self::InvalidRequest => "Invalid request",
            Self::Unknown => "Unexpected response",
        }
    }
}
