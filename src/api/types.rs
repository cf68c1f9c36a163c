//! API request and response types
//!
//! These are shared by the composer endpoints and the client-side transport,
//! so both ends of the script-chat protocol serialize the same shapes.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Who the model impersonates for a conversation session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConversationMode {
    /// The model is the sales manager; the user answers as the client
    Manager,
    /// The model is the prospect; the user rehearses as the manager
    #[default]
    Client,
    /// The model writes both sides of the call
    Auto,
}

impl ConversationMode {
    pub const ALL: [ConversationMode; 3] = [Self::Manager, Self::Client, Self::Auto];

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Manager => "manager",
            Self::Client => "client",
            Self::Auto => "auto",
        }
    }

    /// Whether the user authors turns in this mode
    #[must_use]
    pub fn accepts_user_turns(self) -> bool {
        !matches!(self, Self::Auto)
    }
}

impl fmt::Display for ConversationMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ConversationMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "manager" => Ok(Self::Manager),
            "client" => Ok(Self::Client),
            "auto" => Ok(Self::Auto),
            other => Err(format!("unknown mode '{other}' (expected manager, client or auto)")),
        }
    }
}

/// Objection reference data handed to the composer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectionSummary {
    pub category: String,
    pub trigger: String,
    #[serde(default)]
    pub keywords: Vec<String>,
}

/// Role of a message on the wire
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WireRole {
    System,
    User,
    Assistant,
}

/// A message as exchanged with the composer and the upstream model
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WireMessage {
    pub role: WireRole,
    pub content: String,
}

impl WireMessage {
    #[must_use]
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: WireRole::System,
            content: content.into(),
        }
    }

    #[must_use]
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: WireRole::User,
            content: content.into(),
        }
    }

    #[must_use]
    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: WireRole::Assistant,
            content: content.into(),
        }
    }
}

/// Body of `POST /functions/v1/script-chat`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScriptChatRequest {
    pub messages: Vec<WireMessage>,
    #[serde(default)]
    pub script_content: String,
    #[serde(default)]
    pub objections: Vec<ObjectionSummary>,
    #[serde(default)]
    pub mode: ConversationMode,
}

/// Body of `POST /functions/v1/auto-dialog`
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AutoDialogRequest {
    #[serde(default)]
    pub script_content: String,
    #[serde(default)]
    pub objections: Vec<ObjectionSummary>,
}

/// Response of a completed auto-dialog run
#[derive(Debug, Serialize, Deserialize)]
pub struct AutoDialogResponse {
    pub conversation: String,
    pub model: String,
}

/// Response for `GET /version`
#[derive(Debug, Serialize)]
pub struct VersionResponse {
    pub version: &'static str,
}

/// Error response
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

impl ErrorResponse {
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            error: message.into(),
        }
    }
}
