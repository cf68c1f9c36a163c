//! Effects produced by state transitions

use super::state::Role;
use crate::api::{ConversationMode, WireMessage};
use crate::runtime::Notification;

/// Effects to be executed after a state transition
#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    /// Drop the whole message log
    ClearMessages,

    /// Replace the session mode
    SetMode { mode: ConversationMode },

    /// Append a new message to the log
    AppendMessage {
        id: String,
        role: Role,
        content: String,
    },

    /// Extend the content of an existing message
    AppendFragment { id: String, text: String },

    /// Send a request to the composer and stream the reply
    OpenStream {
        generation: u64,
        messages: Vec<WireMessage>,
    },

    /// Abort the in-flight stream
    CancelStream,

    /// Show a transient warning to the user
    Notify(Notification),
}

impl Effect {
    #[must_use]
    pub fn append_user(id: impl Into<String>, content: impl Into<String>) -> Self {
        Effect::AppendMessage {
            id: id.into(),
            role: Role::User,
            content: content.into(),
        }
    }

    #[must_use]
    pub fn append_assistant(id: impl Into<String>, content: impl Into<String>) -> Self {
        Effect::AppendMessage {
            id: id.into(),
            role: Role::Assistant,
            content: content.into(),
        }
    }
}
