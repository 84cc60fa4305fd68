use std::collections::BTreeMap;
use std::sync::Arc;

use tokio::sync::{mpsc, watch};
use tracing::{debug, info};

use crate::auth::{AuthProvider, EnvTokenProvider};
use crate::config::ClientConfig;
use crate::content::{InputPart, UserInput};
use crate::errors::ChatError;
use crate::event::{ErrorEvent, StreamEvent};
use crate::message::Message;
use crate::model::{AgentId, ConversationId};
use crate::orchestrator::{StreamOrchestrator, StreamRequest};
use crate::persistence::{MessageSink, NoopSink};
use crate::reducer::{SessionSnapshot, SessionState, SessionStatus, Transition};
use crate::registry::AgentRegistry;
use crate::transport::{HttpTransport, Transport};

pub(crate) struct ClientInner {
    config: ClientConfig,
    transport: Arc<dyn Transport>,
    auth: Arc<dyn AuthProvider>,
    sink: Arc<dyn MessageSink>,
    registry: Option<Arc<dyn AgentRegistry>>,
}

/// Entry point for opening chat sessions against one agent endpoint.
#[derive(Clone)]
pub struct ChatClient {
    inner: Arc<ClientInner>,
}

impl ChatClient {
    /// Starts a builder for the given configuration.
    pub fn builder(config: ClientConfig) -> ChatClientBuilder {
        ChatClientBuilder {
            config,
            transport: None,
            auth: None,
            sink: None,
            registry: None,
        }
    }

    pub fn config(&self) -> &ClientConfig {
        &self.inner.config
    }

    /// Opens a session with a fresh conversation id.
    pub fn session(&self, agent_id: impl Into<AgentId>) -> ChatSession {
        ChatSession::new(self.inner.clone(), agent_id.into())
    }

    /// Opens a session for an agent picked by display name or id.
    ///
    /// Without a registry the selection is used as the agent id directly.
    pub fn session_for(&self, selection: &str) -> Result<ChatSession, ChatError> {
        let agent_id = match &self.inner.registry {
            Some(registry) => registry.resolve(selection).ok_or_else(|| {
                ChatError::Validation(format!("unknown agent `{}`", selection.trim()))
            })?,
            None => AgentId::new(selection.trim()),
        };
        Ok(self.session(agent_id))
    }
}

/// Builder wiring transport, auth, and persistence before creating a `ChatClient`.
pub struct ChatClientBuilder {
    config: ClientConfig,
    transport: Option<Arc<dyn Transport>>,
    auth: Option<Arc<dyn AuthProvider>>,
    sink: Option<Arc<dyn MessageSink>>,
    registry: Option<Arc<dyn AgentRegistry>>,
}

impl ChatClientBuilder {
    /// Overrides the HTTP transport built from the configuration.
    pub fn transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Token source. Defaults to [`EnvTokenProvider`].
    pub fn auth(mut self, auth: Arc<dyn AuthProvider>) -> Self {
        self.auth = Some(auth);
        self
    }

    /// Receives finalized assistant messages. Defaults to [`NoopSink`].
    pub fn sink(mut self, sink: Arc<dyn MessageSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    pub fn registry(mut self, registry: Arc<dyn AgentRegistry>) -> Self {
        self.registry = Some(registry);
        self
    }

    /// Validates the configuration and builds the client.
    pub fn build(self) -> Result<ChatClient, ChatError> {
        self.config.validate()?;
        let transport = match self.transport {
            Some(transport) => transport,
            None => Arc::new(HttpTransport::new(&self.config)?),
        };
        Ok(ChatClient {
            inner: Arc::new(ClientInner {
                config: self.config,
                transport,
                auth: self
                    .auth
                    .unwrap_or_else(|| Arc::new(EnvTokenProvider::default())),
                sink: self.sink.unwrap_or_else(|| Arc::new(NoopSink)),
                registry: self.registry,
            }),
        })
    }
}

#[derive(Debug)]
struct Delivery {
    message_id: uuid::Uuid,
    event: StreamEvent,
}

/// One conversation with one agent.
///
/// Stream events are queued by the orchestrator and applied when the owner
/// polls [`ChatSession::next_update`], so all state changes happen on the
/// owner's task. Every change is also published as a [`SessionSnapshot`].
pub struct ChatSession {
    state: SessionState,
    orchestrator: StreamOrchestrator,
    sink: Arc<dyn MessageSink>,
    updates_tx: mpsc::UnboundedSender<Delivery>,
    updates_rx: mpsc::UnboundedReceiver<Delivery>,
    snapshots: watch::Sender<SessionSnapshot>,
    variables: BTreeMap<String, String>,
    config_override: Option<serde_json::Value>,
}

impl ChatSession {
    fn new(client: Arc<ClientInner>, agent_id: AgentId) -> Self {
        let state = SessionState::new(agent_id);
        let (updates_tx, updates_rx) = mpsc::unbounded_channel();
        let (snapshots, _) = watch::channel(state.snapshot());
        info!(conversation_id = %state.conversation_id(), agent_id = %state.agent_id(), "chat session opened");
        Self {
            orchestrator: StreamOrchestrator::new(
                client.transport.clone(),
                client.auth.clone(),
                client.config.endpoint.clone(),
            ),
            sink: client.sink.clone(),
            state,
            updates_tx,
            updates_rx,
            snapshots,
            variables: BTreeMap::new(),
            config_override: None,
        }
    }

    pub fn conversation_id(&self) -> ConversationId {
        self.state.conversation_id()
    }

    pub fn agent_id(&self) -> &AgentId {
        self.state.agent_id()
    }

    pub fn status(&self) -> SessionStatus {
        self.state.status()
    }

    pub fn messages(&self) -> &[Message] {
        self.state.messages()
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        self.state.snapshot()
    }

    /// Watches snapshots published after every state change.
    pub fn subscribe(&self) -> watch::Receiver<SessionSnapshot> {
        self.snapshots.subscribe()
    }

    /// Sets a template variable sent with every following request.
    pub fn set_variable(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.variables.insert(key.into(), value.into());
    }

    pub fn clear_variables(&mut self) {
        self.variables.clear();
    }

    /// Per-request agent configuration overrides (a JSON object), or `None`.
    pub fn set_config_override(&mut self, config: Option<serde_json::Value>) {
        self.config_override = config;
    }

    /// Sends a text message.
    pub fn send(&mut self, text: impl Into<String>) -> Result<(), ChatError> {
        self.send_input(UserInput::Text(text.into()))
    }

    /// Sends a multi-part message (text plus attachments).
    pub fn send_parts(&mut self, parts: Vec<InputPart>) -> Result<(), ChatError> {
        self.send_input(UserInput::Parts(parts))
    }

    /// Appends the user and assistant messages and starts the agent stream.
    ///
    /// Fails without changing state when a turn is already in flight or the
    /// input is invalid. Failures after the request is issued arrive through
    /// [`ChatSession::next_update`] as an error transition.
    pub fn send_input(&mut self, input: UserInput) -> Result<(), ChatError> {
        if self.state.status().is_busy() {
            return Err(ChatError::AlreadyExecuting);
        }
        let mut request = StreamRequest::new(
            self.state.agent_id().clone(),
            self.state.conversation_id(),
            input,
        );
        request.variables = self.variables.clone();
        request.config = self.config_override.clone();
        request.validate()?;

        let message_id = self.state.begin_send(&request.input)?;
        self.publish();

        let tx = self.updates_tx.clone();
        let started = self.orchestrator.start(request, move |event| {
            let _ = tx.send(Delivery { message_id, event });
        });
        if let Err(err) = started {
            let error = ErrorEvent::new(
                "request",
                err.to_string(),
                "The message could not be sent.",
            );
            self.settle(message_id, StreamEvent::Error(error));
        }
        Ok(())
    }

    /// Re-sends the most recent input as a new turn.
    pub fn retry(&mut self) -> Result<(), ChatError> {
        let input = self
            .state
            .last_input()
            .cloned()
            .ok_or(ChatError::NothingToRetry)?;
        self.send_input(input)
    }

    /// Waits for the next event of the in-flight turn and applies it.
    ///
    /// Returns `None` once no turn is in flight. Cancel-safe.
    pub async fn next_update(&mut self) -> Option<Transition> {
        loop {
            if !self.state.status().is_busy() {
                return None;
            }
            let delivery = self.updates_rx.recv().await?;
            match self.settle(delivery.message_id, delivery.event) {
                Transition::Ignored => continue,
                transition => return Some(transition),
            }
        }
    }

    /// Drives the in-flight turn to completion.
    ///
    /// Returns the finalized assistant message, if a turn was in flight.
    pub async fn run_until_idle(&mut self) -> Option<Message> {
        let mut finalized = None;
        while let Some(transition) = self.next_update().await {
            if let Transition::Finalized(message) = transition {
                finalized = Some(message);
            }
        }
        finalized
    }

    /// Cancels the in-flight turn, keeping whatever content arrived.
    ///
    /// Does nothing when idle. Safe to call repeatedly.
    pub fn cancel(&mut self) -> Option<Message> {
        self.orchestrator.cancel();
        let message = self.state.cancel()?;
        debug!(conversation_id = %self.state.conversation_id(), message_id = %message.id, "turn cancelled");
        self.sink
            .on_message_finalized(&self.state.conversation_id(), &message);
        self.publish();
        Some(message)
    }

    /// Cancels any turn and starts a new conversation with the same agent.
    pub fn new_session(&mut self) {
        self.cancel();
        self.state.reset();
        while self.updates_rx.try_recv().is_ok() {}
        info!(conversation_id = %self.state.conversation_id(), agent_id = %self.state.agent_id(), "new conversation started");
        self.publish();
    }

    fn settle(&mut self, message_id: uuid::Uuid, event: StreamEvent) -> Transition {
        let transition = self.state.apply(message_id, event);
        match &transition {
            Transition::Ignored => return transition,
            Transition::Updated => {}
            Transition::Finalized(message) => {
                self.sink
                    .on_message_finalized(&self.state.conversation_id(), message);
            }
        }
        self.publish();
        transition
    }

    fn publish(&self) {
        self.snapshots.send_replace(self.state.snapshot());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::StaticTokenProvider;
    use crate::errors::TransportError;
    use crate::message::MessageStatus;
    use crate::transport::{FragmentStream, TransportRequest};
    use bytes::Bytes;
    use futures::StreamExt as _;
    use std::sync::Mutex;
    use tokio::sync::oneshot;

    enum FakeBehavior {
        Body(Vec<&'static str>),
        Gated(oneshot::Receiver<()>, Vec<&'static str>),
        Pending,
    }

    #[derive(Default)]
    struct FakeTransport {
        behaviors: Mutex<Vec<FakeBehavior>>,
        bodies: Mutex<Vec<serde_json::Value>>,
    }

    impl FakeTransport {
        fn new(mut behaviors: Vec<FakeBehavior>) -> Arc<Self> {
            behaviors.reverse();
            Arc::new(Self {
                behaviors: Mutex::new(behaviors),
                bodies: Mutex::new(Vec::new()),
            })
        }
    }

    fn body_stream(pieces: Vec<&'static str>) -> impl futures::Stream<Item = Result<Bytes, TransportError>> {
        futures::stream::iter(
            pieces
                .into_iter()
                .map(|p| Ok::<_, TransportError>(Bytes::from_static(p.as_bytes()))),
        )
    }

    #[async_trait::async_trait]
    impl Transport for FakeTransport {
        async fn open(&self, request: TransportRequest) -> Result<FragmentStream, TransportError> {
            self.bodies.lock().expect("bodies").push(request.body);
            let behavior = self
                .behaviors
                .lock()
                .expect("behaviors")
                .pop()
                .expect("unexpected request");
            match behavior {
                FakeBehavior::Body(pieces) => Ok(Box::pin(body_stream(pieces))),
                FakeBehavior::Gated(release, pieces) => {
                    let wait = futures::stream::once(async move {
                        let _ = release.await;
                        Ok::<_, TransportError>(Bytes::new())
                    });
                    Ok(Box::pin(wait.chain(body_stream(pieces))))
                }
                FakeBehavior::Pending => Ok(Box::pin(futures::stream::pending::<
                    Result<Bytes, TransportError>,
                >())),
            }
        }
    }

    #[derive(Default)]
    struct RecordingSink {
        finalized: Mutex<Vec<Message>>,
    }

    impl MessageSink for RecordingSink {
        fn on_message_finalized(&self, _conversation_id: &ConversationId, message: &Message) {
            self.finalized.lock().expect("sink").push(message.clone());
        }
    }

    fn session_with(transport: Arc<FakeTransport>) -> (ChatSession, Arc<RecordingSink>) {
        let sink = Arc::new(RecordingSink::default());
        let client = ChatClient::builder(ClientConfig::new("http://agents.test/execute"))
            .transport(transport)
            .auth(Arc::new(StaticTokenProvider::new("tok")))
            .sink(sink.clone())
            .build()
            .expect("build client");
        (client.session("agt_test"), sink)
    }

    #[tokio::test]
    async fn chunks_then_end_produce_a_complete_reply() {
        let transport = FakeTransport::new(vec![FakeBehavior::Body(vec![
            "{\"event\":\"chunk\",\"data\":\"Hel\"}\n",
            "{\"event\":\"chunk\",\"data\":\"lo\"}\n",
            "{\"event\":\"end\",\"data\":true}\n",
        ])]);
        let (mut session, sink) = session_with(transport);

        session.send("Hi").expect("send");
        assert_eq!(session.status(), SessionStatus::Connecting);
        let reply = session.run_until_idle().await.expect("reply");

        assert_eq!(reply.content, "Hello");
        assert_eq!(reply.status, MessageStatus::Complete);
        assert_eq!(session.status(), SessionStatus::Idle);
        assert_eq!(session.messages().len(), 2);
        assert_eq!(session.messages()[0].content, "Hi");
        assert_eq!(sink.finalized.lock().expect("sink").len(), 1);
    }

    #[tokio::test]
    async fn final_data_overwrites_chunks_and_is_persisted_once() {
        let transport = FakeTransport::new(vec![FakeBehavior::Body(vec![
            "{\"event\":\"chunk\",\"data\":\"draft\"}\n",
            "{\"event\":\"final\",\"data\":{\"output\":\"Polished\",\"usage\":{\"totalTokens\":12}}}\n",
            "{\"event\":\"end\"}\n",
        ])]);
        let (mut session, sink) = session_with(transport);

        session.send("Hi").expect("send");
        session.run_until_idle().await;

        let reply = &session.messages()[1];
        assert_eq!(reply.content, "Polished");
        assert_eq!(reply.usage.as_ref().and_then(|u| u.total_tokens), Some(12));
        let finalized = sink.finalized.lock().expect("sink");
        assert_eq!(finalized.len(), 1);
        assert_eq!(finalized[0].content, "Polished");
    }

    #[tokio::test]
    async fn malformed_lines_do_not_interrupt_the_turn() {
        let transport = FakeTransport::new(vec![FakeBehavior::Body(vec![
            "{\"event\":\"status\",\"data\":\"Thinking\"}\n",
            "{\"event\":\"chunk\",\"data\":\"a\"}\nnot-json\n",
            "{\"event\":\"mystery\",\"data\":1}\n{\"event\":\"chunk\",\"data\":\"b\"}\n",
            "{\"event\":\"end\"}\n",
        ])]);
        let (mut session, _sink) = session_with(transport);

        session.send("Hi").expect("send");
        let reply = session.run_until_idle().await.expect("reply");
        assert_eq!(reply.content, "ab");
    }

    #[tokio::test]
    async fn stream_closing_without_end_still_completes() {
        let transport = FakeTransport::new(vec![FakeBehavior::Body(vec![
            "{\"event\":\"chunk\",\"data\":\"partial\"}",
        ])]);
        let (mut session, _sink) = session_with(transport);
        session.send("Hi").expect("send");
        let reply = session.run_until_idle().await.expect("reply");
        assert_eq!(reply.content, "partial");
        assert_eq!(reply.status, MessageStatus::Complete);
    }

    #[tokio::test]
    async fn server_error_event_marks_the_reply_failed() {
        let transport = FakeTransport::new(vec![FakeBehavior::Body(vec![
            "{\"event\":\"error\",\"data\":{\"kind\":\"agent\",\"message\":\"tool crashed\",\"userMessage\":\"The agent hit a problem.\"}}\n",
        ])]);
        let (mut session, _sink) = session_with(transport);
        session.send("Hi").expect("send");
        let reply = session.run_until_idle().await.expect("reply");
        assert_eq!(reply.status, MessageStatus::Error);
        assert_eq!(reply.content, "The agent hit a problem.");
        assert_eq!(session.status(), SessionStatus::Error);
    }

    #[tokio::test]
    async fn second_send_while_streaming_is_rejected() {
        let transport = FakeTransport::new(vec![FakeBehavior::Pending]);
        let (mut session, _sink) = session_with(transport);
        session.send("one").expect("send");
        assert!(matches!(session.send("two"), Err(ChatError::AlreadyExecuting)));
        assert_eq!(session.messages().len(), 2);
        assert!(matches!(session.retry(), Err(ChatError::AlreadyExecuting)));
        assert_eq!(session.messages().len(), 2);
        session.cancel();
    }

    #[tokio::test]
    async fn cancel_then_send_ignores_the_cancelled_stream() {
        let (release_a, gate_a) = oneshot::channel();
        let transport = FakeTransport::new(vec![
            FakeBehavior::Gated(gate_a, vec!["{\"event\":\"chunk\",\"data\":\"stale\"}\n"]),
            FakeBehavior::Body(vec![
                "{\"event\":\"chunk\",\"data\":\"fresh\"}\n",
                "{\"event\":\"end\"}\n",
            ]),
        ]);
        let (mut session, sink) = session_with(transport);

        session.send("a").expect("send a");
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        let cancelled = session.cancel().expect("cancelled reply");
        assert_eq!(cancelled.content, "");
        assert_eq!(session.cancel(), None);

        session.send("b").expect("send b");
        let _ = release_a.send(());
        let reply = session.run_until_idle().await.expect("reply");

        assert_eq!(reply.content, "fresh");
        assert_eq!(session.messages()[1].content, "");
        assert_eq!(session.messages()[3].content, "fresh");
        assert_eq!(sink.finalized.lock().expect("sink").len(), 2);
    }

    #[tokio::test]
    async fn retry_resends_the_last_input() {
        let transport = FakeTransport::new(vec![
            FakeBehavior::Body(vec!["{\"event\":\"error\",\"data\":\"overloaded\"}\n"]),
            FakeBehavior::Body(vec!["{\"event\":\"chunk\",\"data\":\"ok\"}\n{\"event\":\"end\"}\n"]),
        ]);
        let (mut session, _sink) = session_with(transport.clone());
        assert!(matches!(session.retry(), Err(ChatError::NothingToRetry)));

        session.send("question").expect("send");
        session.run_until_idle().await;
        assert_eq!(session.status(), SessionStatus::Error);

        session.retry().expect("retry");
        let reply = session.run_until_idle().await.expect("reply");
        assert_eq!(reply.content, "ok");
        assert_eq!(session.messages().len(), 4);
        let bodies = transport.bodies.lock().expect("bodies");
        assert_eq!(bodies[0]["input"], bodies[1]["input"]);
        assert_eq!(bodies[0]["conversationId"], bodies[1]["conversationId"]);
    }

    #[tokio::test]
    async fn new_session_resets_history_and_conversation_id() {
        let transport = FakeTransport::new(vec![FakeBehavior::Pending]);
        let (mut session, sink) = session_with(transport);
        let before = session.conversation_id();
        session.send("Hi").expect("send");
        session.new_session();

        assert_ne!(session.conversation_id(), before);
        assert!(session.messages().is_empty());
        assert_eq!(session.status(), SessionStatus::Idle);
        assert!(session.next_update().await.is_none());
        assert_eq!(sink.finalized.lock().expect("sink").len(), 1);
    }

    #[tokio::test]
    async fn request_carries_variables_and_config_overrides() {
        let transport = FakeTransport::new(vec![FakeBehavior::Body(vec!["{\"event\":\"end\"}\n"])]);
        let (mut session, _sink) = session_with(transport.clone());
        session.set_variable("locale", "de-DE");
        session.set_config_override(Some(serde_json::json!({"temperature": 0.1})));
        session
            .send_parts(vec![
                InputPart::text("What is in this picture?"),
                InputPart::image("https://cdn.test/cat.png"),
            ])
            .expect("send");
        session.run_until_idle().await;

        let bodies = transport.bodies.lock().expect("bodies");
        assert_eq!(bodies[0]["variables"]["locale"], "de-DE");
        assert_eq!(bodies[0]["config"]["temperature"], 0.1);
        assert_eq!(bodies[0]["input"][1]["type"], "image");
        assert_eq!(session.messages()[0].content, "What is in this picture?\n[image]");
    }

    #[tokio::test]
    async fn snapshots_follow_state_changes() {
        let transport = FakeTransport::new(vec![FakeBehavior::Body(vec![
            "{\"event\":\"chunk\",\"data\":\"x\"}\n{\"event\":\"end\"}\n",
        ])]);
        let (mut session, _sink) = session_with(transport);
        let mut snapshots = session.subscribe();

        session.send("Hi").expect("send");
        assert!(snapshots.has_changed().expect("watch open"));
        assert_eq!(snapshots.borrow_and_update().status, SessionStatus::Connecting);

        session.run_until_idle().await;
        let latest = snapshots.borrow_and_update().clone();
        assert_eq!(latest.status, SessionStatus::Idle);
        assert_eq!(latest.messages[1].content, "x");
    }

    #[test]
    fn session_for_resolves_through_the_registry() {
        let registry = crate::registry::StaticAgentRegistry::new().register("Support", "agt_support");
        let client = ChatClient::builder(ClientConfig::new("http://agents.test/execute"))
            .transport(FakeTransport::new(vec![]))
            .auth(Arc::new(StaticTokenProvider::new("tok")))
            .registry(Arc::new(registry))
            .build()
            .expect("client");
        let session = client.session_for("support").expect("session");
        assert_eq!(session.agent_id().as_str(), "agt_support");
        assert!(matches!(client.session_for("sales"), Err(ChatError::Validation(_))));
    }

    #[test]
    fn build_rejects_invalid_endpoint() {
        let err = ChatClient::builder(ClientConfig::new("ftp://nope"))
            .transport(FakeTransport::new(vec![]))
            .build();
        assert!(matches!(err, Err(ChatError::Config(_))));
    }
}
