//! Conversation session state

use super::Effect;
use crate::api::{ConversationMode, WireMessage};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Author of a chat message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    User,
    Assistant,
}

/// One entry of the message log
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub id: String,
    pub role: Role,
    pub content: String,
    pub timestamp: DateTime<Utc>,
}

impl Message {
    #[must_use]
    pub fn to_wire(&self) -> WireMessage {
        match self.role {
            Role::User => WireMessage::user(self.content.clone()),
            Role::Assistant => WireMessage::assistant(self.content.clone()),
        }
    }
}

/// Whether a reply is currently streaming
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum TurnState {
    #[default]
    Idle,
    /// Fragments of stream `generation` go to `assistant_id`
    Streaming {
        generation: u64,
        assistant_id: String,
    },
}

impl TurnState {
    #[must_use]
    pub fn is_streaming(&self) -> bool {
        matches!(self, TurnState::Streaming { .. })
    }

    #[must_use]
    pub fn generation(&self) -> Option<u64> {
        match self {
            TurnState::Streaming { generation, .. } => Some(*generation),
            TurnState::Idle => None,
        }
    }
}

/// Everything one conversation session owns
#[derive(Debug, Clone)]
pub struct Session {
    pub mode: ConversationMode,
    pub messages: Vec<Message>,
    pub turn: TurnState,
    /// Last generation handed out; never reused
    pub generation: u64,
}

impl Session {
    #[must_use]
    pub fn new(mode: ConversationMode) -> Self {
        Self {
            mode,
            messages: Vec::new(),
            turn: TurnState::Idle,
            generation: 0,
        }
    }

    /// The loading flag shown to the user
    #[must_use]
    pub fn is_loading(&self) -> bool {
        self.turn.is_streaming()
    }

    /// Message log as sent to the composer
    #[must_use]
    pub fn history(&self) -> Vec<WireMessage> {
        self.messages.iter().map(Message::to_wire).collect()
    }

    /// Install the state produced by a transition
    pub fn commit(&mut self, turn: TurnState) {
        if let Some(generation) = turn.generation() {
            self.generation = self.generation.max(generation);
        }
        self.turn = turn;
    }

    /// Apply an effect that only touches the message log or the mode.
    ///
    /// I/O effects are left to the runtime and ignored here.
    pub fn apply(&mut self, effect: &Effect, now: DateTime<Utc>) {
        match effect {
            Effect::ClearMessages => self.messages.clear(),
            Effect::SetMode { mode } => self.mode = *mode,
            Effect::AppendMessage { id, role, content } => self.messages.push(Message {
                id: id.clone(),
                role: *role,
                content: content.clone(),
                timestamp: now,
            }),
            Effect::AppendFragment { id, text } => {
                if let Some(message) = self.messages.iter_mut().rev().find(|m| m.id == *id) {
                    message.content.push_str(text);
                }
            }
            Effect::OpenStream { .. } | Effect::CancelStream | Effect::Notify(_) => {}
        }
    }
}
