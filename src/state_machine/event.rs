//! Events that can occur in a conversation session

use crate::api::ConversationMode;
use crate::runtime::TransportError;

/// Events that trigger state transitions
///
/// Ids are allocated by the runtime before dispatch so the transition stays pure.
#[derive(Debug, Clone)]
pub enum Event {
    // User actions
    Start { assistant_id: String },
    Send {
        text: String,
        user_id: String,
        assistant_id: String,
    },
    ContinueAuto { assistant_id: String },
    Reset,
    SwitchMode { mode: ConversationMode },

    // Stream events, tagged with the generation that produced them
    Fragment { generation: u64, text: String },
    StreamFinished { generation: u64 },
    StreamFailed {
        generation: u64,
        error: TransportError,
    },
}
