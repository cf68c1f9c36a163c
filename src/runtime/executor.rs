//! Conversation orchestrator
//!
//! Owns one session, feeds user actions and stream events through the pure
//! transition function, and carries out the resulting effects.

use super::traits::{
    ChatTransport, IdGenerator, NotificationSink, ScriptSource, TracingNotifier, TransportError,
    UuidGenerator,
};
use crate::api::{ConversationMode, ScriptChatRequest, WireMessage};
use crate::state_machine::{transition, Effect, Event, Message, Session, TransitionError};
use crate::stream_decoder::fragments;
use chrono::Utc;
use futures::StreamExt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

/// Change notifications for whoever renders the session
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChatEvent {
    MessageAppended(Message),
    FragmentAppended { id: String, text: String },
    Cleared,
    ModeChanged(ConversationMode),
    LoadingChanged(bool),
}

/// How a user action ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TurnOutcome {
    /// The reply streamed to the end
    Completed,
    /// Precondition not met; nothing happened
    Rejected(TransitionError),
    /// The request or stream failed; the user was notified
    Failed(TransportError),
    /// Superseded by a reset or mode switch
    Cancelled,
}

struct Inner {
    session: Session,
    stream_cancel: Option<CancellationToken>,
}

/// A stream the transition asked us to open
struct PendingStream {
    generation: u64,
    mode: ConversationMode,
    messages: Vec<WireMessage>,
    cancel: CancellationToken,
}

/// Script-chat session driven by an injected transport
pub struct ScriptChat<T: ChatTransport> {
    transport: T,
    script: Arc<dyn ScriptSource>,
    ids: Arc<dyn IdGenerator>,
    notifier: Arc<dyn NotificationSink>,
    inner: Mutex<Inner>,
    events: broadcast::Sender<ChatEvent>,
}

impl<T: ChatTransport> ScriptChat<T> {
    #[must_use]
    pub fn new(mode: ConversationMode, transport: T, script: Arc<dyn ScriptSource>) -> Self {
        let (events, _) = broadcast::channel(256);
        Self {
            transport,
            script,
            ids: Arc::new(UuidGenerator),
            notifier: Arc::new(TracingNotifier),
            inner: Mutex::new(Inner {
                session: Session::new(mode),
                stream_cancel: None,
            }),
            events,
        }
    }

    #[must_use]
    pub fn with_ids(mut self, ids: Arc<dyn IdGenerator>) -> Self {
        self.ids = ids;
        self
    }

    #[must_use]
    pub fn with_notifier(mut self, notifier: Arc<dyn NotificationSink>) -> Self {
        self.notifier = notifier;
        self
    }

    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<ChatEvent> {
        self.events.subscribe()
    }

    #[must_use]
    pub fn messages(&self) -> Vec<Message> {
        self.lock().session.messages.clone()
    }

    #[must_use]
    pub fn is_loading(&self) -> bool {
        self.lock().session.is_loading()
    }

    #[must_use]
    pub fn mode(&self) -> ConversationMode {
        self.lock().session.mode
    }

    // ========================================================================
    // Operations
    // ========================================================================

    /// Clear the conversation and have the model open it for the current mode
    pub async fn start(&self) -> TurnOutcome {
        let assistant_id = self.ids.next_id();
        self.run(Event::Start { assistant_id }).await
    }

    /// Send a user line and stream the reply
    pub async fn send(&self, text: &str) -> TurnOutcome {
        let event = Event::Send {
            text: text.to_string(),
            user_id: self.ids.next_id(),
            assistant_id: self.ids.next_id(),
        };
        self.run(event).await
    }

    /// Ask for the next exchange of an automatic dialogue
    pub async fn continue_auto(&self) -> TurnOutcome {
        let assistant_id = self.ids.next_id();
        self.run(Event::ContinueAuto { assistant_id }).await
    }

    /// Abort any stream and clear the conversation
    pub fn reset(&self) {
        self.dispatch_infallible(Event::Reset);
    }

    /// Switch mode; the conversation is cleared like a reset
    pub fn set_mode(&self, mode: ConversationMode) {
        self.dispatch_infallible(Event::SwitchMode { mode });
    }

    // ========================================================================
    // Effect execution
    // ========================================================================

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn dispatch_infallible(&self, event: Event) {
        if let Err(e) = self.dispatch(event) {
            tracing::error!(error = %e, "Event rejected");
        }
    }

    /// Apply one event; returns the stream to open, if the transition asked for one
    fn dispatch(&self, event: Event) -> Result<Option<PendingStream>, TransitionError> {
        let mut notifications = Vec::new();
        let mut open = None;
        {
            let mut inner = self.lock();
            let was_loading = inner.session.is_loading();
            let result = transition(&inner.session, event)?;
            let now = Utc::now();

            for effect in &result.effects {
                inner.session.apply(effect, now);
                let update = match effect {
                    Effect::ClearMessages => Some(ChatEvent::Cleared),
                    Effect::SetMode { mode } => Some(ChatEvent::ModeChanged(*mode)),
                    Effect::AppendMessage { .. } => {
                        let appended = inner.session.messages.last().cloned();
                        appended.map(ChatEvent::MessageAppended)
                    }
                    Effect::AppendFragment { id, text } => Some(ChatEvent::FragmentAppended {
                        id: id.clone(),
                        text: text.clone(),
                    }),
                    Effect::OpenStream {
                        generation,
                        messages,
                    } => {
                        let cancel = CancellationToken::new();
                        inner.stream_cancel = Some(cancel.clone());
                        open = Some(PendingStream {
                            generation: *generation,
                            mode: inner.session.mode,
                            messages: messages.clone(),
                            cancel,
                        });
                        None
                    }
                    Effect::CancelStream => {
                        if let Some(token) = inner.stream_cancel.take() {
                            tracing::info!("Cancelling in-flight stream");
                            token.cancel();
                        }
                        None
                    }
                    Effect::Notify(notification) => {
                        notifications.push(*notification);
                        None
                    }
                };
                if let Some(update) = update {
                    let _ = self.events.send(update);
                }
            }

            inner.session.commit(result.new_state);
            let loading = inner.session.is_loading();
            if !loading {
                inner.stream_cancel = None;
            }
            if loading != was_loading {
                let _ = self.events.send(ChatEvent::LoadingChanged(loading));
            }
        }

        for notification in notifications {
            self.notifier.notify(notification);
        }
        Ok(open)
    }

    async fn run(&self, event: Event) -> TurnOutcome {
        let open = match self.dispatch(event) {
            Ok(Some(open)) => open,
            Ok(None) => return TurnOutcome::Completed,
            Err(e) => {
                tracing::debug!(error = %e, "Action ignored");
                return TurnOutcome::Rejected(e);
            }
        };

        let _guard = TurnGuard {
            chat: self,
            generation: open.generation,
        };
        tracing::info!(generation = open.generation, mode = %open.mode, "Turn started");
        let started = std::time::Instant::now();
        let outcome = self.stream_reply(open).await;
        tracing::info!(
            ?outcome,
            duration_ms = started.elapsed().as_millis(),
            "Turn ended"
        );
        outcome
    }

    async fn stream_reply(&self, open: PendingStream) -> TurnOutcome {
        let PendingStream {
            generation,
            mode,
            messages,
            cancel,
        } = open;
        let request = ScriptChatRequest {
            messages,
            script_content: self.script.script_content(),
            objections: self.script.objections(),
            mode,
        };

        let opened = tokio::select! {
            biased;
            () = cancel.cancelled() => return TurnOutcome::Cancelled,
            result = self.transport.open(&request) => result,
        };
        let chunks = match opened {
            Ok(chunks) => chunks,
            Err(error) => return self.fail(generation, error),
        };

        let fragments = fragments(chunks);
        futures::pin_mut!(fragments);
        loop {
            let next = tokio::select! {
                biased;
                () = cancel.cancelled() => return TurnOutcome::Cancelled,
                next = fragments.next() => next,
            };
            match next {
                Some(Ok(text)) => {
                    if self.dispatch(Event::Fragment { generation, text }).is_err() {
                        return TurnOutcome::Cancelled;
                    }
                }
                Some(Err(error)) => return self.fail(generation, error),
                None => {
                    return match self.dispatch(Event::StreamFinished { generation }) {
                        Ok(_) => TurnOutcome::Completed,
                        Err(_) => TurnOutcome::Cancelled,
                    };
                }
            }
        }
    }

    fn fail(&self, generation: u64, error: TransportError) -> TurnOutcome {
        tracing::warn!(generation, error = %error, "Turn failed");
        let failed = Event::StreamFailed {
            generation,
            error: error.clone(),
        };
        match self.dispatch(failed) {
            Ok(_) => TurnOutcome::Failed(error),
            Err(_) => TurnOutcome::Cancelled,
        }
    }
}

/// Clears the loading flag of its turn however the turn future ends
struct TurnGuard<'a, T: ChatTransport> {
    chat: &'a ScriptChat<T>,
    generation: u64,
}

impl<T: ChatTransport> Drop for TurnGuard<'_, T> {
    fn drop(&mut self) {
        // Stale once the turn finished normally or was superseded
        let finished = Event::StreamFinished {
            generation: self.generation,
        };
        if self.chat.dispatch(finished).is_ok() {
            tracing::debug!(generation = self.generation, "Turn dropped mid-stream");
        }
    }
}
