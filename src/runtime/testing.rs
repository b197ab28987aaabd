//! Mock implementations for testing
//!
//! These mocks let the runtime run end to end without real I/O.

use super::traits::*;
use super::{ChatRuntime, Input, RuntimeHandle};
use crate::client::{AppParameters, ChatRequest, ClientError, HistoryRecord};
use crate::composer::Submission;
use crate::registry::{ConversationSummary, Inputs, NEW_CONVERSATION_ID};
use crate::session::{ChatSession, NotificationLevel, SessionConfig, SessionEvent};
use crate::stream::{EventMeta, MessageEndMetadata, StreamEvent};
use crate::transcript::{Rating, TranscriptSnapshot};
use async_trait::async_trait;
use futures::channel::mpsc::{unbounded, UnboundedSender};
use futures::StreamExt;
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

// ============================================================================
// Mock Backend
// ============================================================================

/// A recorded backend call
#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    AppParameters,
    Conversations { limit: u32 },
    Messages(String),
    OpenStream(ChatRequest),
    Feedback {
        message_id: String,
        rating: Option<Rating>,
    },
    Rename {
        conversation_id: String,
        auto_generate: bool,
    },
    Delete(String),
}

/// Backend returning queued responses.
///
/// Empty queues fall back to harmless defaults, except streams and renames,
/// which fail.
#[derive(Default)]
pub struct MockBackend {
    parameters: Mutex<VecDeque<Result<AppParameters, ClientError>>>,
    conversations: Mutex<VecDeque<Result<Vec<ConversationSummary>, ClientError>>>,
    histories: Mutex<HashMap<String, Vec<HistoryRecord>>>,
    streams: Mutex<VecDeque<Result<EventStream, ClientError>>>,
    renames: Mutex<VecDeque<Result<String, ClientError>>>,
    deletes: Mutex<VecDeque<Result<(), ClientError>>>,
    /// Record of all calls made
    pub calls: Mutex<Vec<Call>>,
}

impl MockBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn queue_parameters(&self, result: Result<AppParameters, ClientError>) {
        self.parameters.lock().unwrap().push_back(result);
    }

    pub fn queue_conversations(&self, result: Result<Vec<ConversationSummary>, ClientError>) {
        self.conversations.lock().unwrap().push_back(result);
    }

    pub fn set_history(&self, conversation_id: &str, records: Vec<HistoryRecord>) {
        self.histories
            .lock()
            .unwrap()
            .insert(conversation_id.to_string(), records);
    }

    /// Queue a stream that yields `events` and ends
    pub fn queue_stream(&self, events: Vec<StreamEvent>) {
        self.streams
            .lock()
            .unwrap()
            .push_back(Ok(futures::stream::iter(events).boxed()));
    }

    /// Queue a stream fed by the returned sender
    pub fn queue_live_stream(&self) -> UnboundedSender<StreamEvent> {
        let (tx, rx) = unbounded();
        self.streams.lock().unwrap().push_back(Ok(rx.boxed()));
        tx
    }

    pub fn queue_stream_error(&self, error: ClientError) {
        self.streams.lock().unwrap().push_back(Err(error));
    }

    pub fn queue_rename(&self, result: Result<String, ClientError>) {
        self.renames.lock().unwrap().push_back(result);
    }

    pub fn queue_delete(&self, result: Result<(), ClientError>) {
        self.deletes.lock().unwrap().push_back(result);
    }

    pub fn recorded_calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    fn record(&self, call: Call) {
        self.calls.lock().unwrap().push(call);
    }
}

#[async_trait]
impl AssistantBackend for MockBackend {
    async fn app_parameters(&self) -> Result<AppParameters, ClientError> {
        self.record(Call::AppParameters);
        self.parameters
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok(AppParameters::default()))
    }

    async fn conversations(&self, limit: u32) -> Result<Vec<ConversationSummary>, ClientError> {
        self.record(Call::Conversations { limit });
        self.conversations
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok(Vec::new()))
    }

    async fn messages(&self, conversation_id: &str) -> Result<Vec<HistoryRecord>, ClientError> {
        self.record(Call::Messages(conversation_id.to_string()));
        Ok(self
            .histories
            .lock()
            .unwrap()
            .get(conversation_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn open_stream(&self, request: &ChatRequest) -> Result<EventStream, ClientError> {
        self.record(Call::OpenStream(request.clone()));
        self.streams
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(ClientError::network("No mock stream queued")))
    }

    async fn submit_feedback(
        &self,
        message_id: &str,
        rating: Option<Rating>,
    ) -> Result<(), ClientError> {
        self.record(Call::Feedback {
            message_id: message_id.to_string(),
            rating,
        });
        Ok(())
    }

    async fn rename_conversation(
        &self,
        conversation_id: &str,
        _seed_text: &str,
        auto_generate: bool,
    ) -> Result<String, ClientError> {
        self.record(Call::Rename {
            conversation_id: conversation_id.to_string(),
            auto_generate,
        });
        self.renames
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(ClientError::network("No mock rename queued")))
    }

    async fn delete_conversation(&self, conversation_id: &str) -> Result<(), ClientError> {
        self.record(Call::Delete(conversation_id.to_string()));
        self.deletes.lock().unwrap().pop_front().unwrap_or(Ok(()))
    }
}

// ============================================================================
// In-memory pointer store
// ============================================================================

#[derive(Default)]
pub struct MemoryPointerStore {
    current: Mutex<HashMap<String, String>>,
}

impl MemoryPointerStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_current(app_id: &str, conversation_id: &str) -> Self {
        let store = Self::new();
        store
            .current
            .lock()
            .unwrap()
            .insert(app_id.to_string(), conversation_id.to_string());
        store
    }

    pub fn current(&self, app_id: &str) -> Option<String> {
        self.current.lock().unwrap().get(app_id).cloned()
    }
}

#[async_trait]
impl ConversationPointerStore for MemoryPointerStore {
    async fn get_current(&self, app_id: &str) -> Result<Option<String>, String> {
        Ok(self.current(app_id))
    }

    async fn set_current(&self, app_id: &str, conversation_id: &str) -> Result<(), String> {
        self.current
            .lock()
            .unwrap()
            .insert(app_id.to_string(), conversation_id.to_string());
        Ok(())
    }

    async fn clear_current(&self, app_id: &str) -> Result<(), String> {
        self.current.lock().unwrap().remove(app_id);
        Ok(())
    }
}

/// Memory store whose writes of one conversation id take a while
pub struct SlowPointerStore {
    inner: MemoryPointerStore,
    slow_id: String,
    delay: Duration,
}

impl SlowPointerStore {
    pub fn new(slow_id: &str, delay: Duration) -> Self {
        Self {
            inner: MemoryPointerStore::new(),
            slow_id: slow_id.to_string(),
            delay,
        }
    }

    pub fn current(&self, app_id: &str) -> Option<String> {
        self.inner.current(app_id)
    }
}

#[async_trait]
impl ConversationPointerStore for SlowPointerStore {
    async fn get_current(&self, app_id: &str) -> Result<Option<String>, String> {
        self.inner.get_current(app_id).await
    }

    async fn set_current(&self, app_id: &str, conversation_id: &str) -> Result<(), String> {
        if conversation_id == self.slow_id {
            tokio::time::sleep(self.delay).await;
        }
        self.inner.set_current(app_id, conversation_id).await
    }

    async fn clear_current(&self, app_id: &str) -> Result<(), String> {
        self.inner.clear_current(app_id).await
    }
}

// ============================================================================
// Harness
// ============================================================================

pub struct Harness {
    pub handle: RuntimeHandle,
    pub snapshots: broadcast::Receiver<TranscriptSnapshot>,
    pub events: broadcast::Receiver<SessionEvent>,
    join: JoinHandle<ChatSession>,
}

impl Harness {
    pub fn start<B, P>(backend: B, pointers: P) -> Self
    where
        B: AssistantBackend + 'static,
        P: ConversationPointerStore + 'static,
    {
        let session = ChatSession::new(SessionConfig {
            app_id: "app".to_string(),
            ..SessionConfig::default()
        });
        let snapshots = session.subscribe_transcript();
        let events = session.subscribe();
        let (runtime, handle) = ChatRuntime::new(session, backend, pointers);
        let join = tokio::spawn(runtime.run());
        Self {
            handle,
            snapshots,
            events,
            join,
        }
    }

    pub async fn snapshot_where(
        &mut self,
        mut pred: impl FnMut(&TranscriptSnapshot) -> bool,
    ) -> TranscriptSnapshot {
        wait_for(&mut self.snapshots, |s| pred(s)).await
    }

    pub async fn event_where(&mut self, mut pred: impl FnMut(&SessionEvent) -> bool) -> SessionEvent {
        wait_for(&mut self.events, |e| pred(e)).await
    }

    pub async fn finish(self) -> ChatSession {
        self.handle.send(Input::Shutdown).await;
        self.join.await.unwrap()
    }
}

async fn wait_for<T: Clone>(rx: &mut broadcast::Receiver<T>, mut pred: impl FnMut(&T) -> bool) -> T {
    tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            match rx.recv().await {
                Ok(value) if pred(&value) => return value,
                Ok(_) | Err(broadcast::error::RecvError::Lagged(_)) => {}
                Err(broadcast::error::RecvError::Closed) => panic!("channel closed"),
            }
        }
    })
    .await
    .expect("timed out waiting for event")
}

async fn eventually(mut cond: impl FnMut() -> bool) {
    for _ in 0..100 {
        if cond() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!("condition never became true");
}

// ============================================================================
// Fixtures
// ============================================================================

pub fn summary(id: &str) -> ConversationSummary {
    ConversationSummary {
        id: id.to_string(),
        name: format!("Conversation {id}"),
        inputs: Inputs::new(),
        introduction: String::new(),
    }
}

pub fn record(id: &str, query: &str, answer: &str) -> HistoryRecord {
    HistoryRecord {
        id: id.to_string(),
        query: query.to_string(),
        answer: answer.to_string(),
        message_files: vec![],
        agent_thoughts: vec![],
        feedback: None,
    }
}

pub fn meta(conversation_id: &str, message_id: &str) -> EventMeta {
    EventMeta {
        task_id: Some("task".to_string()),
        message_id: Some(message_id.to_string()),
        conversation_id: Some(conversation_id.to_string()),
    }
}

pub fn delta(text: &str, conversation_id: &str, message_id: &str) -> StreamEvent {
    StreamEvent::TextDelta {
        text: text.to_string(),
        meta: meta(conversation_id, message_id),
    }
}

pub fn end(conversation_id: &str, message_id: &str) -> StreamEvent {
    StreamEvent::MessageEnd {
        message_id: message_id.to_string(),
        metadata: MessageEndMetadata::default(),
        meta: meta(conversation_id, message_id),
    }
}

pub fn ask(query: &str) -> Submission {
    Submission {
        query: query.to_string(),
        files: vec![],
    }
}

fn is_ready(snapshot: &TranscriptSnapshot) -> bool {
    !snapshot.entries.is_empty()
}

// ============================================================================
// Integration Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::{AppStatus, SendError};
    use std::sync::Arc;

    #[tokio::test]
    async fn test_parameter_failure_makes_app_unavailable() {
        let backend = Arc::new(MockBackend::new());
        backend.queue_parameters(Err(ClientError::auth("invalid key")));

        let mut harness = Harness::start(backend.clone(), MemoryPointerStore::new());
        harness
            .event_where(|e| matches!(e, SessionEvent::StatusChanged(AppStatus::Unavailable { .. })))
            .await;

        let err = harness.handle.submit(ask("hi")).await.unwrap_err();
        assert_eq!(err, SendError::NotReady);
        harness.finish().await;
        assert!(!backend
            .recorded_calls()
            .iter()
            .any(|c| matches!(c, Call::OpenStream(_))));
    }

    #[tokio::test]
    async fn test_new_conversation_round_trip() {
        let backend = Arc::new(MockBackend::new());
        let pointers = Arc::new(MemoryPointerStore::new());
        backend.queue_conversations(Ok(vec![]));
        backend.queue_conversations(Ok(vec![summary("c1")]));
        backend.queue_stream(vec![
            delta("Hel", "c1", "m1"),
            delta("lo", "c1", "m1"),
            end("c1", "m1"),
            StreamEvent::Completed,
        ]);

        let mut harness = Harness::start(backend.clone(), pointers.clone());
        harness.snapshot_where(is_ready).await;

        harness.handle.submit(ask("hi")).await.unwrap();
        harness
            .event_where(|e| matches!(e, SessionEvent::RespondingChanged(false)))
            .await;
        eventually(|| pointers.current("app").as_deref() == Some("c1")).await;

        let session = harness.finish().await;
        assert_eq!(session.registry().current_id(), Some("c1"));
        assert_eq!(session.transcript().get("m1").unwrap().content, "Hello");
        assert!(backend.recorded_calls().iter().any(
            |c| matches!(c, Call::OpenStream(request) if request.conversation_id.is_none())
        ));
    }

    #[tokio::test]
    async fn test_open_failure_rolls_back_placeholder() {
        let backend = Arc::new(MockBackend::new());
        backend.queue_stream_error(ClientError::network("connection refused"));

        let mut harness = Harness::start(backend.clone(), MemoryPointerStore::new());
        let opening = harness.snapshot_where(is_ready).await;

        harness.handle.submit(ask("hi")).await.unwrap();
        let notification = harness
            .event_where(|e| matches!(e, SessionEvent::Notification(_)))
            .await;
        assert!(matches!(
            notification,
            SessionEvent::Notification(n) if n.level == NotificationLevel::Error
        ));

        let session = harness.finish().await;
        let entries = session.transcript().entries();
        assert_eq!(entries.len(), opening.entries.len() + 1);
        assert_eq!(entries.last().unwrap().content, "hi");
        assert!(!session.is_responding());
    }

    #[tokio::test]
    async fn test_restores_persisted_conversation() {
        let backend = Arc::new(MockBackend::new());
        backend.queue_conversations(Ok(vec![summary("c1"), summary("c2")]));
        backend.set_history("c2", vec![record("h1", "old", "reply")]);

        let mut harness = Harness::start(backend.clone(), MemoryPointerStore::with_current("app", "c2"));
        let snapshot = harness
            .snapshot_where(|s| s.entries.iter().any(|e| e.id == "h1"))
            .await;
        assert!(snapshot.entries.iter().any(|e| e.id == "question-h1"));

        harness.finish().await;
        assert!(backend
            .recorded_calls()
            .contains(&Call::Messages("c2".to_string())));
    }

    #[tokio::test]
    async fn test_second_send_rejected_while_streaming() {
        let backend = Arc::new(MockBackend::new());
        let live = backend.queue_live_stream();

        let mut harness = Harness::start(backend.clone(), MemoryPointerStore::new());
        harness.snapshot_where(is_ready).await;

        harness.handle.submit(ask("first")).await.unwrap();
        let err = harness.handle.submit(ask("second")).await.unwrap_err();
        assert_eq!(err, SendError::Busy);

        live.unbounded_send(delta("ok", "c1", "m1")).unwrap();
        live.unbounded_send(end("c1", "m1")).unwrap();
        live.unbounded_send(StreamEvent::Completed).unwrap();
        harness
            .event_where(|e| matches!(e, SessionEvent::RespondingChanged(false)))
            .await;

        let session = harness.finish().await;
        let opens = backend
            .recorded_calls()
            .iter()
            .filter(|c| matches!(c, Call::OpenStream(_)))
            .count();
        assert_eq!(opens, 1);
        assert!(session.transcript().entries().iter().all(|e| e.content != "second"));
    }

    #[tokio::test]
    async fn test_switch_mid_stream_leaves_other_conversation_alone() {
        let backend = Arc::new(MockBackend::new());
        backend.queue_conversations(Ok(vec![summary("c1"), summary("c2")]));
        backend.set_history("c1", vec![record("h1", "one", "first")]);
        backend.set_history("c2", vec![record("h2", "two", "second")]);
        let live = backend.queue_live_stream();

        let mut harness = Harness::start(backend.clone(), MemoryPointerStore::with_current("app", "c1"));
        harness
            .snapshot_where(|s| s.entries.iter().any(|e| e.id == "h1"))
            .await;

        harness.handle.submit(ask("question for c1")).await.unwrap();
        live.unbounded_send(delta("partial", "c1", "m9")).unwrap();
        harness
            .snapshot_where(|s| s.entries.iter().any(|e| e.id == "m9"))
            .await;

        harness
            .handle
            .send(Input::SelectConversation("c2".to_string()))
            .await;
        let c2 = harness
            .snapshot_where(|s| s.entries.iter().any(|e| e.id == "h2"))
            .await;

        live.unbounded_send(delta(" more", "c1", "m9")).unwrap();
        live.unbounded_send(end("c1", "m9")).unwrap();
        live.unbounded_send(StreamEvent::Completed).unwrap();
        harness
            .event_where(|e| matches!(e, SessionEvent::RespondingChanged(false)))
            .await;

        let session = harness.finish().await;
        assert_eq!(session.registry().current_id(), Some("c2"));
        assert_eq!(session.transcript().snapshot().entries, c2.entries);
    }

    #[tokio::test]
    async fn test_quick_switches_persist_the_last_selection() {
        let backend = Arc::new(MockBackend::new());
        backend.queue_conversations(Ok(vec![summary("a"), summary("b")]));
        let pointers = Arc::new(SlowPointerStore::new("a", Duration::from_millis(100)));

        let mut harness = Harness::start(backend.clone(), pointers.clone());
        harness.snapshot_where(is_ready).await;

        harness
            .handle
            .send(Input::SelectConversation("a".to_string()))
            .await;
        harness
            .handle
            .send(Input::SelectConversation("b".to_string()))
            .await;
        harness
            .event_where(|e| {
                matches!(e, SessionEvent::ConversationsChanged { current_id: Some(id), .. } if id == "b")
            })
            .await;
        eventually(|| pointers.current("app").as_deref() == Some("b")).await;

        // The slow write for "a" must not land after "b".
        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(pointers.current("app").as_deref(), Some("b"));
        harness.finish().await;
    }

    #[tokio::test]
    async fn test_deleting_last_conversation_leaves_placeholder() {
        let backend = Arc::new(MockBackend::new());
        backend.queue_conversations(Ok(vec![summary("c1")]));

        let mut harness = Harness::start(backend.clone(), MemoryPointerStore::with_current("app", "c1"));
        harness
            .event_where(|e| {
                matches!(e, SessionEvent::ConversationsChanged { current_id: Some(id), .. } if id == "c1")
            })
            .await;

        harness
            .handle
            .send(Input::DeleteConversation("c1".to_string()))
            .await;
        let event = harness
            .event_where(|e| {
                matches!(e, SessionEvent::ConversationsChanged { current_id: Some(id), .. } if id == NEW_CONVERSATION_ID)
            })
            .await;
        let SessionEvent::ConversationsChanged { conversations, .. } = event else {
            unreachable!()
        };
        assert_eq!(conversations.len(), 1);
        assert!(conversations[0].is_placeholder());

        harness.finish().await;
        assert!(backend
            .recorded_calls()
            .contains(&Call::Delete("c1".to_string())));
    }

    #[tokio::test]
    async fn test_feedback_updates_answer() {
        let backend = Arc::new(MockBackend::new());
        backend.queue_conversations(Ok(vec![summary("c1")]));
        backend.set_history("c1", vec![record("h1", "q", "a")]);

        let mut harness = Harness::start(backend.clone(), MemoryPointerStore::with_current("app", "c1"));
        harness
            .snapshot_where(|s| s.entries.iter().any(|e| e.id == "h1"))
            .await;

        harness
            .handle
            .send(Input::Feedback {
                message_id: "h1".to_string(),
                rating: Some(Rating::Like),
            })
            .await;
        let snapshot = harness
            .snapshot_where(|s| {
                s.entries
                    .iter()
                    .any(|e| e.id == "h1" && e.feedback.is_some_and(|f| f.rating == Some(Rating::Like)))
            })
            .await;
        assert!(!snapshot.entries.is_empty());
        harness.finish().await;
    }

    #[tokio::test]
    async fn test_rename_after_third_exchange() {
        let backend = Arc::new(MockBackend::new());
        backend.queue_conversations(Ok(vec![summary("c1")]));
        for i in 0..3 {
            let message_id = format!("m{i}");
            backend.queue_stream(vec![
                delta("answer", "c1", &message_id),
                end("c1", &message_id),
                StreamEvent::Completed,
            ]);
        }
        backend.queue_rename(Ok("Greetings".to_string()));

        let mut harness = Harness::start(backend.clone(), MemoryPointerStore::with_current("app", "c1"));
        harness.snapshot_where(is_ready).await;

        for i in 0..3 {
            harness.handle.submit(ask(&format!("question {i}"))).await.unwrap();
            harness
                .event_where(|e| matches!(e, SessionEvent::RespondingChanged(false)))
                .await;
        }
        harness
            .event_where(|e| {
                matches!(e, SessionEvent::ConversationsChanged { conversations, .. }
                    if conversations.iter().any(|c| c.id == "c1" && c.name == "Greetings"))
            })
            .await;

        harness.finish().await;
        let renames: Vec<Call> = backend
            .recorded_calls()
            .into_iter()
            .filter(|c| matches!(c, Call::Rename { .. }))
            .collect();
        assert_eq!(
            renames,
            vec![Call::Rename {
                conversation_id: "c1".to_string(),
                auto_generate: true
            }]
        );
    }

    #[tokio::test]
    async fn test_delete_failure_keeps_conversation() {
        let backend = Arc::new(MockBackend::new());
        backend.queue_conversations(Ok(vec![summary("c1"), summary("c2")]));
        backend.queue_delete(Err(ClientError::server_error("storage offline")));

        let mut harness = Harness::start(backend.clone(), MemoryPointerStore::with_current("app", "c1"));
        harness
            .event_where(|e| {
                matches!(e, SessionEvent::ConversationsChanged { current_id: Some(id), .. } if id == "c1")
            })
            .await;

        harness
            .handle
            .send(Input::DeleteConversation("c2".to_string()))
            .await;
        harness
            .event_where(|e| {
                matches!(e, SessionEvent::Notification(n) if n.level == NotificationLevel::Error)
            })
            .await;

        let session = harness.finish().await;
        assert!(session.registry().contains("c2"));
        assert_eq!(session.registry().current_id(), Some("c1"));
    }
}
