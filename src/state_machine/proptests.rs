//! Property-based tests for the state machine
//!
//! These tests drive random interleavings of user actions and stream events
//! (including events from abandoned streams) and check the session invariants.

use super::*;
use crate::api::ConversationMode;
use crate::runtime::{Notification, TransportError};
use chrono::Utc;
use proptest::prelude::*;
use std::collections::{HashMap, HashSet};

// ============================================================================
// Arbitrary Generators
// ============================================================================

#[derive(Debug, Clone)]
enum Action {
    Start,
    Send(String),
    ContinueAuto,
    Reset,
    SwitchMode(ConversationMode),
    /// `stale_by == 0` targets the current stream
    Fragment { stale_by: u64, text: String },
    Finish { stale_by: u64 },
    Fail {
        stale_by: u64,
        error: TransportError,
    },
}

fn arb_mode() -> impl Strategy<Value = ConversationMode> {
    prop_oneof![
        Just(ConversationMode::Manager),
        Just(ConversationMode::Client),
        Just(ConversationMode::Auto),
    ]
}

fn arb_error() -> impl Strategy<Value = TransportError> {
    prop_oneof![
        Just(TransportError::RateLimited),
        Just(TransportError::PaymentRequired),
        "[a-z ]{1,10}".prop_map(TransportError::Connection),
        (400u16..600, "[a-z ]{0,10}")
            .prop_map(|(status, message)| TransportError::Status { status, message }),
    ]
}

fn arb_stale_by() -> impl Strategy<Value = u64> {
    prop_oneof![4 => Just(0u64), 1 => 1u64..3]
}

fn arb_action() -> impl Strategy<Value = Action> {
    prop_oneof![
        2 => Just(Action::Start),
        2 => "[ a-zA-Zа-я]{0,12}".prop_map(Action::Send),
        2 => Just(Action::ContinueAuto),
        1 => Just(Action::Reset),
        1 => arb_mode().prop_map(Action::SwitchMode),
        6 => (arb_stale_by(), "[a-zа-я?!]{0,6}")
            .prop_map(|(stale_by, text)| Action::Fragment { stale_by, text }),
        2 => arb_stale_by().prop_map(|stale_by| Action::Finish { stale_by }),
        1 => (arb_stale_by(), arb_error())
            .prop_map(|(stale_by, error)| Action::Fail { stale_by, error }),
    ]
}

// ============================================================================
// Driver
// ============================================================================

struct Driver {
    session: Session,
    next_id: u64,
    /// Expected assistant text per message id
    expected: HashMap<String, String>,
}

impl Driver {
    fn new(mode: ConversationMode) -> Self {
        Self {
            session: Session::new(mode),
            next_id: 0,
            expected: HashMap::new(),
        }
    }

    fn id(&mut self) -> String {
        self.next_id += 1;
        format!("id-{}", self.next_id)
    }

    /// Generation an action targets: the live one, or one that is not live
    fn target(&self, stale_by: u64) -> u64 {
        match (self.session.turn.generation(), stale_by) {
            (Some(live), 0) => live,
            (Some(live), n) if live > n => live - n,
            (Some(live), n) => live + n,
            (None, n) => self.session.generation + n,
        }
    }

    fn event(&mut self, action: Action) -> Event {
        match action {
            Action::Start => Event::Start {
                assistant_id: self.id(),
            },
            Action::Send(text) => Event::Send {
                text,
                user_id: self.id(),
                assistant_id: self.id(),
            },
            Action::ContinueAuto => Event::ContinueAuto {
                assistant_id: self.id(),
            },
            Action::Reset => Event::Reset,
            Action::SwitchMode(mode) => Event::SwitchMode { mode },
            Action::Fragment { stale_by, text } => Event::Fragment {
                generation: self.target(stale_by),
                text,
            },
            Action::Finish { stale_by } => Event::StreamFinished {
                generation: self.target(stale_by),
            },
            Action::Fail { stale_by, error } => Event::StreamFailed {
                generation: self.target(stale_by),
                error,
            },
        }
    }
}

fn is_stream_event(event: &Event) -> Option<u64> {
    match event {
        Event::Fragment { generation, .. }
        | Event::StreamFinished { generation }
        | Event::StreamFailed { generation, .. } => Some(*generation),
        _ => None,
    }
}

// ============================================================================
// Properties
// ============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(256))]

    #[test]
    fn session_invariants_hold(
        mode in arb_mode(),
        actions in proptest::collection::vec(arb_action(), 1..60),
    ) {
        let mut driver = Driver::new(mode);
        let mut highest_generation = 0u64;

        for action in actions {
            let event = driver.event(action);
            let live = driver.session.turn.generation();
            let was_idle = !driver.session.is_loading();
            let is_failure = matches!(event, Event::StreamFailed { .. });
            let is_clearing = matches!(event, Event::Reset | Event::SwitchMode { .. });
            let stream_generation = is_stream_event(&event);
            let fragment = match &event {
                Event::Fragment { text, .. } => Some(text.clone()),
                _ => None,
            };
            let before_messages = driver.session.messages.clone();

            let Ok(result) = transition(&driver.session, event) else {
                // Rejections never touch the session; stale streams are always rejected
                prop_assert_eq!(&driver.session.messages, &before_messages);
                continue;
            };

            if let Some(generation) = stream_generation {
                prop_assert_eq!(Some(generation), live, "only the live stream may be applied");
            }

            let opens: Vec<_> = result
                .effects
                .iter()
                .filter_map(|e| match e {
                    Effect::OpenStream { generation, .. } => Some(*generation),
                    _ => None,
                })
                .collect();
            prop_assert!(opens.len() <= 1);
            if let Some(&generation) = opens.first() {
                prop_assert!(was_idle, "a second stream must never be opened");
                prop_assert!(generation > highest_generation, "generations are never reused");
                prop_assert_eq!(result.new_state.generation(), Some(generation));
                highest_generation = generation;
            }

            let notifies = result.effects.iter().filter(|e| matches!(e, Effect::Notify(_))).count();
            prop_assert_eq!(notifies, usize::from(is_failure));

            for effect in &result.effects {
                driver.session.apply(effect, Utc::now());
            }
            driver.session.commit(result.new_state);

            if let (Some(text), TurnState::Streaming { assistant_id, .. }) =
                (fragment, &driver.session.turn)
            {
                driver.expected.entry(assistant_id.clone()).or_default().push_str(&text);
            }

            if is_clearing {
                prop_assert!(driver.session.messages.is_empty());
                prop_assert!(!driver.session.is_loading());
            }

            let ids: HashSet<_> = driver.session.messages.iter().map(|m| m.id.as_str()).collect();
            prop_assert_eq!(ids.len(), driver.session.messages.len(), "message ids are unique");

            if driver.session.mode == ConversationMode::Auto {
                prop_assert!(driver.session.messages.iter().all(|m| m.role == Role::Assistant));
            }

            for message in driver.session.messages.iter().filter(|m| m.role == Role::Assistant) {
                prop_assert_eq!(
                    Some(&message.content),
                    driver.expected.get(&message.id),
                    "assistant text is the in-order concatenation of its fragments"
                );
            }
        }
    }

    #[test]
    fn failure_notification_matches_error(error in arb_error()) {
        let mut session = Session::new(ConversationMode::Client);
        let start = Event::Start {
            assistant_id: "a".to_string(),
        };
        session.commit(transition(&session, start).unwrap().new_state);

        let failed = Event::StreamFailed {
            generation: 1,
            error: error.clone(),
        };
        let result = transition(&session, failed).unwrap();
        let expected = match error {
            TransportError::RateLimited => Notification::RateLimited,
            TransportError::PaymentRequired => Notification::PaymentRequired,
            _ => Notification::ConnectionError,
        };
        prop_assert_eq!(result.effects, vec![Effect::Notify(expected)]);
    }
}
