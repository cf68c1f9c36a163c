//! Mock implementations for testing
//!
//! These mocks enable integration testing without real I/O.

use super::traits::*;
use crate::api::ScriptChatRequest;
use crate::llm::{ByteStream, CompletionRequest, CompletionResponse, CompletionService, LlmError};
use async_trait::async_trait;
use axum::body::Bytes;
use futures::stream::{self, BoxStream, StreamExt};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::{mpsc, Notify};
use tokio_stream::wrappers::UnboundedReceiverStream;

/// One server-sent event carrying a content delta
pub fn sse(text: &str) -> String {
    let payload = serde_json::json!({ "choices": [{ "delta": { "content": text } }] });
    format!("data: {payload}\n\n")
}

pub const DONE: &str = "data: [DONE]\n\n";

fn chunk_stream<E: Send + 'static>(chunks: Vec<String>) -> BoxStream<'static, Result<Bytes, E>> {
    let items: Vec<Result<Bytes, E>> = chunks.into_iter().map(|c| Ok(Bytes::from(c))).collect();
    stream::iter(items).boxed()
}

// ============================================================================
// Mock Transport
// ============================================================================

/// Scripted reply for one `open` call
pub enum TransportReply {
    /// Body delivered as these chunks, then end of stream
    Chunks(Vec<String>),
    /// Request fails before any body
    Error(TransportError),
    /// Body items are fed by the test through a channel
    Channel(mpsc::UnboundedReceiver<Result<Bytes, TransportError>>),
    /// Request never completes
    Hang,
}

/// Mock transport that plays back queued replies
pub struct MockTransport {
    replies: Mutex<VecDeque<TransportReply>>,
    requests: Mutex<Vec<ScriptChatRequest>>,
    /// Signalled every time `open` is entered
    pub request_started: Arc<Notify>,
}

#[allow(dead_code)]
impl MockTransport {
    pub fn new() -> Self {
        Self {
            replies: Mutex::new(VecDeque::new()),
            requests: Mutex::new(Vec::new()),
            request_started: Arc::new(Notify::new()),
        }
    }

    pub fn queue_chunks<S: Into<String>>(&self, chunks: impl IntoIterator<Item = S>) {
        let chunks = chunks.into_iter().map(Into::into).collect();
        self.push(TransportReply::Chunks(chunks));
    }

    /// Queue a reply of these fragments followed by `[DONE]`
    pub fn queue_reply(&self, fragments: &[&str]) {
        let mut chunks: Vec<String> = fragments.iter().map(|f| sse(f)).collect();
        chunks.push(DONE.to_string());
        self.push(TransportReply::Chunks(chunks));
    }

    pub fn queue_error(&self, error: TransportError) {
        self.push(TransportReply::Error(error));
    }

    /// Queue a channel-fed body; the returned sender drives it
    pub fn queue_channel(&self) -> mpsc::UnboundedSender<Result<Bytes, TransportError>> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.push(TransportReply::Channel(rx));
        tx
    }

    pub fn queue_hang(&self) {
        self.push(TransportReply::Hang);
    }

    pub fn requests(&self) -> Vec<ScriptChatRequest> {
        self.requests.lock().unwrap().clone()
    }

    fn push(&self, reply: TransportReply) {
        self.replies.lock().unwrap().push_back(reply);
    }
}

#[async_trait]
impl ChatTransport for MockTransport {
    async fn open(&self, request: &ScriptChatRequest) -> Result<ChunkStream, TransportError> {
        self.requests.lock().unwrap().push(request.clone());
        let reply = self.replies.lock().unwrap().pop_front();
        self.request_started.notify_one();

        match reply {
            Some(TransportReply::Chunks(chunks)) => Ok(chunk_stream(chunks)),
            Some(TransportReply::Error(error)) => Err(error),
            Some(TransportReply::Channel(rx)) => Ok(UnboundedReceiverStream::new(rx).boxed()),
            Some(TransportReply::Hang) => futures::future::pending().await,
            None => Err(TransportError::Connection("No mock reply queued".into())),
        }
    }
}

// ============================================================================
// Ids and notifications
// ============================================================================

/// Ids `id-1`, `id-2`, ...
#[derive(Default)]
pub struct SequentialIds(AtomicU64);

impl IdGenerator for SequentialIds {
    fn next_id(&self) -> String {
        format!("id-{}", self.0.fetch_add(1, Ordering::SeqCst) + 1)
    }
}

/// Sink that remembers every notification
#[derive(Default)]
pub struct RecordingNotifier {
    seen: Mutex<Vec<Notification>>,
}

impl RecordingNotifier {
    pub fn notifications(&self) -> Vec<Notification> {
        self.seen.lock().unwrap().clone()
    }
}

impl NotificationSink for RecordingNotifier {
    fn notify(&self, notification: Notification) {
        self.seen.lock().unwrap().push(notification);
    }
}

// ============================================================================
// Mock Completion Service
// ============================================================================

enum CompletionReply {
    Stream(Vec<String>),
    Text(String),
    Error(LlmError),
}

/// Mock upstream that returns queued replies
#[allow(dead_code)]
pub struct MockCompletionService {
    replies: Mutex<VecDeque<CompletionReply>>,
    requests: Mutex<Vec<CompletionRequest>>,
}

#[allow(dead_code)]
impl MockCompletionService {
    pub fn new() -> Self {
        Self {
            replies: Mutex::new(VecDeque::new()),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Queue a streaming body delivered as these chunks
    pub fn queue_stream(&self, chunks: Vec<&str>) {
        let chunks = chunks.into_iter().map(str::to_string).collect();
        self.push(CompletionReply::Stream(chunks));
    }

    /// Queue a non-streaming completion
    pub fn queue_text(&self, text: &str) {
        self.push(CompletionReply::Text(text.to_string()));
    }

    pub fn queue_error(&self, error: LlmError) {
        self.push(CompletionReply::Error(error));
    }

    pub fn requests(&self) -> Vec<CompletionRequest> {
        self.requests.lock().unwrap().clone()
    }

    fn push(&self, reply: CompletionReply) {
        self.replies.lock().unwrap().push_back(reply);
    }

    fn next_reply(&self, request: &CompletionRequest) -> Option<CompletionReply> {
        self.requests.lock().unwrap().push(request.clone());
        self.replies.lock().unwrap().pop_front()
    }
}

#[async_trait]
impl CompletionService for MockCompletionService {
    async fn stream(&self, request: &CompletionRequest) -> Result<ByteStream, LlmError> {
        match self.next_reply(request) {
            Some(CompletionReply::Stream(chunks)) => Ok(chunk_stream(chunks)),
            Some(CompletionReply::Text(text)) => Ok(chunk_stream(vec![sse(&text), DONE.into()])),
            Some(CompletionReply::Error(e)) => Err(e),
            None => Err(LlmError::network("No mock response queued")),
        }
    }

    async fn complete(&self, request: &CompletionRequest) -> Result<CompletionResponse, LlmError> {
        match self.next_reply(request) {
            Some(CompletionReply::Text(text)) => Ok(CompletionResponse {
                text,
                ..CompletionResponse::default()
            }),
            Some(CompletionReply::Stream(_)) => {
                Err(LlmError::unknown("Stream queued for complete"))
            }
            Some(CompletionReply::Error(e)) => Err(e),
            None => Err(LlmError::network("No mock response queued")),
        }
    }

    fn model_id(&self) -> &str {
        "mock-model"
    }
}

// ============================================================================
// Integration Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::{ConversationMode, ObjectionSummary, WireMessage};
    use crate::runtime::{ChatEvent, ScriptChat, StaticScript, TurnOutcome};
    use crate::state_machine::{Role, TransitionError};
    use crate::system_prompt::{opening_instruction, CONTINUE_INSTRUCTION};
    use std::time::Duration;

    struct Harness {
        chat: Arc<ScriptChat<Arc<MockTransport>>>,
        transport: Arc<MockTransport>,
        notifier: Arc<RecordingNotifier>,
    }

    fn harness(mode: ConversationMode) -> Harness {
        let transport = Arc::new(MockTransport::new());
        let notifier = Arc::new(RecordingNotifier::default());
        let script = StaticScript::new(
            "1. Приветствие\n2. Выявление потребностей",
            vec![ObjectionSummary {
                category: "Цена".to_string(),
                trigger: "дорого".to_string(),
                keywords: vec!["цена".to_string()],
            }],
        );
        let chat = ScriptChat::new(mode, transport.clone(), Arc::new(script))
            .with_ids(Arc::new(SequentialIds::default()))
            .with_notifier(notifier.clone());
        Harness {
            chat: Arc::new(chat),
            transport,
            notifier,
        }
    }

    fn contents(chat: &ScriptChat<Arc<MockTransport>>) -> Vec<(Role, String)> {
        chat.messages()
            .into_iter()
            .map(|m| (m.role, m.content))
            .collect()
    }

    #[tokio::test]
    async fn test_client_start_produces_single_assistant_message() {
        let h = harness(ConversationMode::Client);
        h.transport.queue_reply(&["Ал", "ло?"]);

        assert_eq!(h.chat.start().await, TurnOutcome::Completed);

        assert_eq!(
            contents(&h.chat),
            vec![(Role::Assistant, "Алло?".to_string())]
        );
        assert!(!h.chat.is_loading());
        assert!(h.notifier.notifications().is_empty());
    }

    #[tokio::test]
    async fn test_start_sends_mode_specific_opening() {
        for mode in ConversationMode::ALL {
            let h = harness(mode);
            h.transport.queue_reply(&["..."]);
            h.chat.start().await;

            let requests = h.transport.requests();
            assert_eq!(requests.len(), 1);
            assert_eq!(requests[0].mode, mode);
            assert_eq!(
                requests[0].messages,
                vec![WireMessage::user(opening_instruction(mode))]
            );
            assert!(requests[0].script_content.contains("Приветствие"));
            assert_eq!(requests[0].objections.len(), 1);
        }
    }

    #[tokio::test]
    async fn test_start_discards_previous_conversation() {
        let h = harness(ConversationMode::Manager);
        h.transport.queue_reply(&["Добрый день!"]);
        h.transport.queue_reply(&["Здравствуйте!"]);
        h.chat.start().await;
        h.chat.start().await;

        assert_eq!(
            contents(&h.chat),
            vec![(Role::Assistant, "Здравствуйте!".to_string())]
        );
    }

    #[tokio::test]
    async fn test_send_on_empty_history() {
        let h = harness(ConversationMode::Client);
        h.transport.queue_reply(&["Да, слушаю."]);

        assert_eq!(h.chat.send("Здравствуйте").await, TurnOutcome::Completed);

        assert_eq!(
            contents(&h.chat),
            vec![
                (Role::User, "Здравствуйте".to_string()),
                (Role::Assistant, "Да, слушаю.".to_string()),
            ]
        );
        assert_eq!(
            h.transport.requests()[0].messages,
            vec![WireMessage::user("Здравствуйте")]
        );
    }

    #[tokio::test]
    async fn test_send_carries_full_history() {
        let h = harness(ConversationMode::Manager);
        h.transport.queue_reply(&["Добрый день, это Алексей."]);
        h.transport.queue_reply(&["Отлично."]);
        h.chat.start().await;
        h.chat.send("Кто это?").await;

        let requests = h.transport.requests();
        assert_eq!(
            requests[1].messages,
            vec![
                WireMessage::assistant("Добрый день, это Алексей."),
                WireMessage::user("Кто это?"),
            ]
        );
    }

    #[tokio::test]
    async fn test_blank_send_is_ignored() {
        let h = harness(ConversationMode::Client);

        let outcome = h.chat.send("   \n").await;

        assert_eq!(
            outcome,
            TurnOutcome::Rejected(TransitionError::EmptyMessage)
        );
        assert!(h.transport.requests().is_empty());
        assert!(h.chat.messages().is_empty());
        assert!(!h.chat.is_loading());
    }

    #[tokio::test]
    async fn test_send_while_streaming_is_rejected() {
        let h = harness(ConversationMode::Client);
        let tx = h.transport.queue_channel();

        let chat = h.chat.clone();
        let turn = tokio::spawn(async move { chat.send("Первое").await });
        h.transport.request_started.notified().await;
        assert!(h.chat.is_loading());

        let second = h.chat.send("Второе").await;
        assert_eq!(second, TurnOutcome::Rejected(TransitionError::Busy));

        tx.send(Ok(Bytes::from(sse("Ответ")))).unwrap();
        drop(tx);
        assert_eq!(turn.await.unwrap(), TurnOutcome::Completed);
        assert_eq!(h.transport.requests().len(), 1);
        assert_eq!(
            contents(&h.chat),
            vec![
                (Role::User, "Первое".to_string()),
                (Role::Assistant, "Ответ".to_string()),
            ]
        );
    }

    #[tokio::test]
    async fn test_reset_mid_stream_discards_late_fragments() {
        let h = harness(ConversationMode::Client);
        let tx = h.transport.queue_channel();
        let mut events = h.chat.subscribe();

        let chat = h.chat.clone();
        let turn = tokio::spawn(async move { chat.start().await });
        h.transport.request_started.notified().await;
        tx.send(Ok(Bytes::from(sse("Ал")))).unwrap();
        loop {
            if let ChatEvent::MessageAppended(_) = events.recv().await.unwrap() {
                break;
            }
        }

        h.chat.reset();
        assert!(!h.chat.is_loading());
        let _ = tx.send(Ok(Bytes::from(sse("ло?"))));

        assert_eq!(turn.await.unwrap(), TurnOutcome::Cancelled);
        assert!(h.chat.messages().is_empty());
        assert!(!h.chat.is_loading());
        assert!(h.notifier.notifications().is_empty());
    }

    #[tokio::test]
    async fn test_reset_while_request_pending() {
        let h = harness(ConversationMode::Auto);
        h.transport.queue_hang();

        let chat = h.chat.clone();
        let turn = tokio::spawn(async move { chat.start().await });
        h.transport.request_started.notified().await;

        h.chat.reset();
        assert_eq!(turn.await.unwrap(), TurnOutcome::Cancelled);
        assert!(!h.chat.is_loading());
        assert!(h.notifier.notifications().is_empty());

        // A fresh turn works after the reset
        h.transport.queue_reply(&["Менеджер: Добрый день!"]);
        assert_eq!(h.chat.start().await, TurnOutcome::Completed);
    }

    #[tokio::test]
    async fn test_rate_limit_keeps_history_and_notifies_once() {
        let h = harness(ConversationMode::Client);
        h.transport.queue_error(TransportError::RateLimited);

        let outcome = h.chat.send("Здравствуйте").await;

        assert_eq!(outcome, TurnOutcome::Failed(TransportError::RateLimited));
        assert_eq!(
            contents(&h.chat),
            vec![(Role::User, "Здравствуйте".to_string())]
        );
        assert_eq!(
            h.notifier.notifications(),
            vec![Notification::RateLimited]
        );
        assert!(!h.chat.is_loading());
    }

    #[tokio::test]
    async fn test_payment_required_on_send() {
        let h = harness(ConversationMode::Manager);
        h.transport.queue_error(TransportError::PaymentRequired);

        h.chat.send("Алло").await;

        assert_eq!(
            h.notifier.notifications(),
            vec![Notification::PaymentRequired]
        );
        assert_eq!(
            h.notifier.notifications()[0].message(),
            "Требуется пополнение баланса AI"
        );
    }

    #[tokio::test]
    async fn test_connection_error_mid_stream_keeps_partial_reply() {
        let h = harness(ConversationMode::Client);
        let tx = h.transport.queue_channel();
        tx.send(Ok(Bytes::from(sse("Алло, я")))).unwrap();
        tx.send(Err(TransportError::Body("connection reset".to_string())))
            .unwrap();
        tx.send(Ok(Bytes::from(sse(" не слышу")))).unwrap();

        let outcome = h.chat.start().await;

        assert_eq!(
            outcome,
            TurnOutcome::Failed(TransportError::Body("connection reset".to_string()))
        );
        assert_eq!(
            contents(&h.chat),
            vec![(Role::Assistant, "Алло, я".to_string())]
        );
        assert_eq!(
            h.notifier.notifications(),
            vec![Notification::ConnectionError]
        );
        assert!(!h.chat.is_loading());
    }

    #[tokio::test]
    async fn test_wrong_mode_operations_are_ignored() {
        let auto = harness(ConversationMode::Auto);
        assert!(matches!(
            auto.chat.send("Привет").await,
            TurnOutcome::Rejected(TransitionError::WrongMode { .. })
        ));

        let client = harness(ConversationMode::Client);
        assert!(matches!(
            client.chat.continue_auto().await,
            TurnOutcome::Rejected(TransitionError::WrongMode { .. })
        ));

        assert!(auto.transport.requests().is_empty());
        assert!(client.transport.requests().is_empty());
        assert!(auto.notifier.notifications().is_empty());
    }

    #[tokio::test]
    async fn test_continue_auto_extends_dialogue() {
        let h = harness(ConversationMode::Auto);
        let opening = "Менеджер: Добрый день!\nКлиент: Слушаю.";
        h.transport.queue_reply(&[opening]);
        h.transport.queue_reply(&["Менеджер: Удобно говорить?"]);

        h.chat.start().await;
        assert_eq!(h.chat.continue_auto().await, TurnOutcome::Completed);

        let requests = h.transport.requests();
        assert_eq!(
            requests[1].messages,
            vec![
                WireMessage::assistant(opening),
                WireMessage::user(CONTINUE_INSTRUCTION),
            ]
        );
        let messages = h.chat.messages();
        assert_eq!(messages.len(), 2);
        assert!(messages.iter().all(|m| m.role == Role::Assistant));
    }

    #[tokio::test]
    async fn test_set_mode_clears_conversation() {
        let h = harness(ConversationMode::Client);
        h.transport.queue_reply(&["Алло?"]);
        h.chat.start().await;

        h.chat.set_mode(ConversationMode::Manager);

        assert_eq!(h.chat.mode(), ConversationMode::Manager);
        assert!(h.chat.messages().is_empty());
    }

    #[tokio::test]
    async fn test_dropped_turn_clears_loading() {
        let h = harness(ConversationMode::Client);
        h.transport.queue_hang();

        let wait = Duration::from_millis(50);
        let timed_out = tokio::time::timeout(wait, h.chat.start()).await;
        assert!(timed_out.is_err());
        assert!(!h.chat.is_loading());

        h.transport.queue_reply(&["Алло?"]);
        assert_eq!(h.chat.start().await, TurnOutcome::Completed);
    }

    #[tokio::test]
    async fn test_events_are_broadcast_in_order() {
        let h = harness(ConversationMode::Client);
        h.transport.queue_reply(&["Ал", "ло?"]);
        let mut events = h.chat.subscribe();

        h.chat.start().await;

        let mut seen = Vec::new();
        while let Ok(event) = events.try_recv() {
            seen.push(event);
        }
        assert_eq!(seen.len(), 5, "{seen:?}");
        assert_eq!(seen[0], ChatEvent::Cleared);
        assert_eq!(seen[1], ChatEvent::LoadingChanged(true));
        assert!(matches!(
            &seen[2],
            ChatEvent::MessageAppended(m) if m.id == "id-1" && m.content == "Ал"
        ));
        assert_eq!(
            seen[3],
            ChatEvent::FragmentAppended {
                id: "id-1".to_string(),
                text: "ло?".to_string(),
            }
        );
        assert_eq!(seen[4], ChatEvent::LoadingChanged(false));
    }
}
