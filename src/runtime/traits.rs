//! Trait abstractions for runtime I/O
//!
//! These traits enable testing the orchestrator with mock implementations.

use crate::api::{ErrorResponse, ObjectionSummary, ScriptChatRequest};
use async_trait::async_trait;
use axum::body::Bytes;
use futures::stream::BoxStream;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;

/// Raw response body of the prompt composer
pub type ChunkStream = BoxStream<'static, Result<Bytes, TransportError>>;

/// Failure talking to the prompt composer
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    #[error("Rate limited")]
    RateLimited,
    #[error("Payment required")]
    PaymentRequired,
    #[error("HTTP {status}: {message}")]
    Status { status: u16, message: String },
    #[error("Connection failed: {0}")]
    Connection(String),
    #[error("Stream interrupted: {0}")]
    Body(String),
}

impl TransportError {
    /// Classify a non-success response from the composer
    #[must_use]
    pub fn from_status(status: u16, body: &str) -> Self {
        match status {
            429 => Self::RateLimited,
            402 => Self::PaymentRequired,
            _ => {
                let message = serde_json::from_str::<ErrorResponse>(body)
                    .map_or_else(|_| body.trim().to_string(), |e| e.error);
                Self::Status { status, message }
            }
        }
    }
}

/// Opens a streaming reply from the prompt composer
#[async_trait]
pub trait ChatTransport: Send + Sync {
    /// Send the request; on success the returned stream yields the raw body
    async fn open(&self, request: &ScriptChatRequest) -> Result<ChunkStream, TransportError>;
}

#[async_trait]
impl<T: ChatTransport + ?Sized> ChatTransport for Arc<T> {
    async fn open(&self, request: &ScriptChatRequest) -> Result<ChunkStream, TransportError> {
        (**self).open(request).await
    }
}

/// Source of fresh message ids
pub trait IdGenerator: Send + Sync {
    fn next_id(&self) -> String;
}

/// Random v4 UUIDs
#[derive(Debug, Default, Clone, Copy)]
pub struct UuidGenerator;

impl IdGenerator for UuidGenerator {
    fn next_id(&self) -> String {
        uuid::Uuid::new_v4().to_string()
    }
}

// ============================================================================
// Notifications
// ============================================================================

/// Transient warning shown to the user when a turn fails
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Notification {
    RateLimited,
    PaymentRequired,
    ConnectionError,
}

impl Notification {
    #[must_use]
    pub fn message(self) -> &'static str {
        match self {
            Notification::RateLimited => "Слишком много запросов, попробуйте позже",
            Notification::PaymentRequired => "Требуется пополнение баланса AI",
            Notification::ConnectionError => "Ошибка соединения с AI",
        }
    }
}

impl From<&TransportError> for Notification {
    fn from(error: &TransportError) -> Self {
        match error {
            TransportError::RateLimited => Notification::RateLimited,
            TransportError::PaymentRequired => Notification::PaymentRequired,
            TransportError::Status { .. }
            | TransportError::Connection(_)
            | TransportError::Body(_) => Notification::ConnectionError,
        }
    }
}

/// Where user-visible notifications go
pub trait NotificationSink: Send + Sync {
    fn notify(&self, notification: Notification);
}

/// Default sink: log at warn level
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingNotifier;

impl NotificationSink for TracingNotifier {
    fn notify(&self, notification: Notification) {
        tracing::warn!(?notification, "{}", notification.message());
    }
}

// ============================================================================
// Script source
// ============================================================================

/// Provides the script and objection list included with every request
pub trait ScriptSource: Send + Sync {
    fn script_content(&self) -> String;
    fn objections(&self) -> Vec<ObjectionSummary>;
}

#[derive(Debug, Error)]
pub enum ScriptLoadError {
    #[error("Failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Invalid objections file {path}: {source}")]
    Objections {
        path: PathBuf,
        source: serde_json::Error,
    },
}

/// Script fixed for the lifetime of the session
#[derive(Debug, Clone, Default)]
pub struct StaticScript {
    content: String,
    objections: Vec<ObjectionSummary>,
}

impl StaticScript {
    #[must_use]
    pub fn new(content: impl Into<String>, objections: Vec<ObjectionSummary>) -> Self {
        Self {
            content: content.into(),
            objections,
        }
    }

    /// Load a plain-text script and an optional JSON array of objections
    ///
    /// # Errors
    ///
    /// Fails when either file cannot be read or the objections are not valid JSON.
    pub fn from_files(script: &Path, objections: Option<&Path>) -> Result<Self, ScriptLoadError> {
        let read = |path: &Path| {
            std::fs::read_to_string(path).map_err(|source| ScriptLoadError::Io {
                path: path.to_path_buf(),
                source,
            })
        };

        let content = read(script)?;
        let objections = match objections {
            Some(path) => {
                let raw = read(path)?;
                serde_json::from_str(&raw).map_err(|source| ScriptLoadError::Objections {
                    path: path.to_path_buf(),
                    source,
                })?
            }
            None => Vec::new(),
        };

        tracing::debug!(
            script = %script.display(),
            objections = objections.len(),
            "Loaded script"
        );
        Ok(Self::new(content, objections))
    }
}

impl ScriptSource for StaticScript {
    fn script_content(&self) -> String {
        self.content.clone()
    }

    fn objections(&self) -> Vec<ObjectionSummary> {
        self.objections.clone()
    }
}
