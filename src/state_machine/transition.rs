//! Pure state transition function
//!
//! Decides, for each user action or stream event, how the turn state changes
//! and which effects the runtime must carry out. No I/O happens here.

use super::state::{Session, TurnState};
use super::{Effect, Event};
use crate::api::{ConversationMode, WireMessage};
use crate::runtime::Notification;
use crate::system_prompt::{opening_instruction, CONTINUE_INSTRUCTION};
use thiserror::Error;

/// Result of a state transition
#[derive(Debug)]
pub struct TransitionResult {
    pub new_state: TurnState,
    pub effects: Vec<Effect>,
}

impl TransitionResult {
    #[must_use]
    pub fn new(state: TurnState) -> Self {
        Self {
            new_state: state,
            effects: vec![],
        }
    }

    #[must_use]
    pub fn with_effect(mut self, effect: Effect) -> Self {
        self.effects.push(effect);
        self
    }
}

/// Reasons an event is rejected without touching the session
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransitionError {
    #[error("A reply is still streaming (reset first)")]
    Busy,
    #[error("Message is empty")]
    EmptyMessage,
    #[error("{operation} is not available in {mode} mode")]
    WrongMode {
        operation: &'static str,
        mode: ConversationMode,
    },
    #[error("Stream {generation} is no longer current")]
    StaleStream { generation: u64 },
}

/// Pure transition function
///
/// # Errors
///
/// Returns a [`TransitionError`] when the event is not valid in the current
/// state; the session must then be left untouched.
pub fn transition(session: &Session, event: Event) -> Result<TransitionResult, TransitionError> {
    match (&session.turn, event) {
        // ============================================================
        // Reset and mode switch: always accepted
        // ============================================================
        (turn, Event::Reset) => Ok(reset(turn)),

        (turn, Event::SwitchMode { mode }) => Ok(reset(turn).with_effect(Effect::SetMode { mode })),

        // ============================================================
        // User actions: one stream at a time
        // ============================================================
        (
            TurnState::Streaming { .. },
            Event::Start { .. } | Event::Send { .. } | Event::ContinueAuto { .. },
        ) => Err(TransitionError::Busy),

        (TurnState::Idle, Event::Start { assistant_id }) => {
            let opening = WireMessage::user(opening_instruction(session.mode));
            let mut result = open_turn(session, assistant_id, vec![opening]);
            result.effects.insert(0, Effect::ClearMessages);
            Ok(result)
        }

        (
            TurnState::Idle,
            Event::Send {
                text,
                user_id,
                assistant_id,
            },
        ) => {
            if !session.mode.accepts_user_turns() {
                return Err(TransitionError::WrongMode {
                    operation: "send",
                    mode: session.mode,
                });
            }
            if text.trim().is_empty() {
                return Err(TransitionError::EmptyMessage);
            }

            let mut messages = session.history();
            messages.push(WireMessage::user(text.clone()));
            let opened = open_turn(session, assistant_id, messages);
            let mut effects = vec![Effect::append_user(user_id, text)];
            effects.extend(opened.effects);
            Ok(TransitionResult {
                new_state: opened.new_state,
                effects,
            })
        }

        (TurnState::Idle, Event::ContinueAuto { assistant_id }) => {
            if session.mode != ConversationMode::Auto {
                return Err(TransitionError::WrongMode {
                    operation: "continue",
                    mode: session.mode,
                });
            }
            let mut messages = session.history();
            messages.push(WireMessage::user(CONTINUE_INSTRUCTION));
            Ok(open_turn(session, assistant_id, messages))
        }

        // ============================================================
        // Stream events for the current generation
        // ============================================================
        (
            TurnState::Streaming {
                generation,
                assistant_id,
            },
            Event::Fragment {
                generation: from,
                text,
            },
        ) if *generation == from => {
            let result = TransitionResult::new(session.turn.clone());
            if text.is_empty() {
                return Ok(result);
            }
            let started = session
                .messages
                .last()
                .is_some_and(|m| m.id == *assistant_id);
            let effect = if started {
                Effect::AppendFragment {
                    id: assistant_id.clone(),
                    text,
                }
            } else {
                Effect::append_assistant(assistant_id.clone(), text)
            };
            Ok(result.with_effect(effect))
        }

        (TurnState::Streaming { generation, .. }, Event::StreamFinished { generation: from })
            if *generation == from =>
        {
            Ok(TransitionResult::new(TurnState::Idle))
        }

        (
            TurnState::Streaming { generation, .. },
            Event::StreamFailed {
                generation: from,
                error,
            },
        ) if *generation == from => {
            let notice = Effect::Notify(Notification::from(&error));
            Ok(TransitionResult::new(TurnState::Idle).with_effect(notice))
        }

        // ============================================================
        // Anything else comes from an abandoned stream
        // ============================================================
        (
            _,
            Event::Fragment { generation, .. }
            | Event::StreamFinished { generation }
            | Event::StreamFailed { generation, .. },
        ) => Err(TransitionError::StaleStream { generation }),
    }
}

fn reset(turn: &TurnState) -> TransitionResult {
    let result = TransitionResult::new(TurnState::Idle);
    let result = if turn.is_streaming() {
        result.with_effect(Effect::CancelStream)
    } else {
        result
    };
    result.with_effect(Effect::ClearMessages)
}

/// Enter `Streaming` under a fresh generation and request the reply
fn open_turn(
    session: &Session,
    assistant_id: String,
    messages: Vec<WireMessage>,
) -> TransitionResult {
    let generation = session.generation + 1;
    TransitionResult::new(TurnState::Streaming {
        generation,
        assistant_id,
    })
    .with_effect(Effect::OpenStream {
        generation,
        messages,
    })
}
