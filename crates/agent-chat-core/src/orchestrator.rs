use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use futures::StreamExt as _;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::auth::AuthProvider;
use crate::config::DeliveryMode;
use crate::content::UserInput;
use crate::decoder::EventDecoder;
use crate::errors::{ChatError, StreamFailure};
use crate::event::StreamEvent;
use crate::framer::LineFramer;
use crate::model::{AgentId, ConversationId};
use crate::transport::{FragmentStream, Transport, TransportRequest, cumulative_to_incremental};

/// Everything needed to run one agent turn.
#[derive(Clone, Debug, PartialEq)]
pub struct StreamRequest {
    pub agent_id: AgentId,
    pub conversation_id: ConversationId,
    pub input: UserInput,
    pub variables: BTreeMap<String, String>,
    pub config: Option<serde_json::Value>,
}

#[derive(serde::Serialize)]
#[serde(rename_all = "camelCase")]
struct RequestBody<'a> {
    agent_id: &'a AgentId,
    conversation_id: &'a ConversationId,
    input: &'a UserInput,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    variables: &'a BTreeMap<String, String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    config: Option<&'a serde_json::Value>,
    stream: bool,
}

impl StreamRequest {
    pub fn new(agent_id: AgentId, conversation_id: ConversationId, input: UserInput) -> Self {
        Self {
            agent_id,
            conversation_id,
            input,
            variables: BTreeMap::new(),
            config: None,
        }
    }

    /// Rejects descriptors that can never produce a valid request.
    pub fn validate(&self) -> Result<(), ChatError> {
        if self.agent_id.as_str().trim().is_empty() {
            return Err(ChatError::Validation("agent id must not be empty".into()));
        }
        if let Some(config) = &self.config
            && !config.is_object()
        {
            return Err(ChatError::Validation(
                "config overrides must be a JSON object".into(),
            ));
        }
        self.input.validate()
    }

    /// JSON body sent to the agent execution endpoint.
    pub fn body(&self) -> serde_json::Value {
        let body = RequestBody {
            agent_id: &self.agent_id,
            conversation_id: &self.conversation_id,
            input: &self.input,
            variables: &self.variables,
            config: self.config.as_ref(),
            stream: true,
        };
        // Only strings, maps and JSON values: serialization cannot fail.
        serde_json::to_value(body).unwrap_or(serde_json::Value::Null)
    }
}

#[derive(Debug, Default)]
struct DispatchGate {
    active: Option<u64>,
}

fn lock_gate(gate: &Mutex<DispatchGate>) -> MutexGuard<'_, DispatchGate> {
    gate.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Cancels one started stream.
///
/// Cancelling is synchronous from the caller's side: once `cancel` returns no
/// further event of that stream is dispatched. Repeated calls, or calls after
/// the stream finished, do nothing.
#[derive(Clone)]
pub struct CancelHandle {
    generation: u64,
    gate: Arc<Mutex<DispatchGate>>,
    abort: Arc<watch::Sender<bool>>,
}

impl CancelHandle {
    pub fn cancel(&self) {
        {
            let mut gate = lock_gate(&self.gate);
            if gate.active == Some(self.generation) {
                gate.active = None;
            }
        }
        self.abort.send_replace(true);
    }

    /// Generation number assigned when the stream started.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// True while the stream may still dispatch events.
    pub fn is_active(&self) -> bool {
        lock_gate(&self.gate).active == Some(self.generation)
    }
}

impl std::fmt::Debug for CancelHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CancelHandle")
            .field("generation", &self.generation)
            .field("active", &self.is_active())
            .finish()
    }
}

/// Sequences transport, framer and decoder for one session, keeping at most
/// one stream active.
///
/// `start` requires a Tokio runtime. The `on_event` callback runs on the
/// stream task while the dispatch gate is held, so it must not call back into
/// the orchestrator; forwarding into a channel is the intended use.
pub struct StreamOrchestrator {
    transport: Arc<dyn Transport>,
    auth: Arc<dyn AuthProvider>,
    endpoint: String,
    gate: Arc<Mutex<DispatchGate>>,
    last_generation: u64,
    current: Option<CancelHandle>,
}

impl StreamOrchestrator {
    pub fn new(
        transport: Arc<dyn Transport>,
        auth: Arc<dyn AuthProvider>,
        endpoint: impl Into<String>,
    ) -> Self {
        Self {
            transport,
            auth,
            endpoint: endpoint.into(),
            gate: Arc::new(Mutex::new(DispatchGate::default())),
            last_generation: 0,
            current: None,
        }
    }

    /// Starts a stream, cancelling any stream this orchestrator started before.
    ///
    /// Events are passed to `on_event` in arrival order. Failures after this
    /// call returns arrive as `StreamEvent::Error`; only an invalid request is
    /// rejected here.
    pub fn start<F>(&mut self, request: StreamRequest, on_event: F) -> Result<CancelHandle, ChatError>
    where
        F: FnMut(StreamEvent) + Send + 'static,
    {
        request.validate()?;
        if let Some(prior) = self.current.take() {
            if prior.is_active() {
                debug!(generation = prior.generation(), "superseding active stream");
            }
            prior.cancel();
        }

        self.last_generation += 1;
        let generation = self.last_generation;
        lock_gate(&self.gate).active = Some(generation);

        let (abort_tx, abort_rx) = watch::channel(false);
        let handle = CancelHandle {
            generation,
            gate: self.gate.clone(),
            abort: Arc::new(abort_tx),
        };
        let task = StreamTask {
            transport: self.transport.clone(),
            auth: self.auth.clone(),
            endpoint: self.endpoint.clone(),
            request,
            abort_rx,
            dispatcher: Dispatcher {
                generation,
                gate: self.gate.clone(),
                on_event,
            },
        };
        tokio::spawn(task.run());

        self.current = Some(handle.clone());
        Ok(handle)
    }

    /// Cancels the current stream, if any. Idempotent.
    pub fn cancel(&mut self) {
        if let Some(handle) = self.current.take() {
            handle.cancel();
        }
    }

    /// True while the most recently started stream may still dispatch.
    pub fn is_active(&self) -> bool {
        self.current.as_ref().is_some_and(CancelHandle::is_active)
    }
}

impl Drop for StreamOrchestrator {
    fn drop(&mut self) {
        self.cancel();
    }
}

struct Dispatcher<F> {
    generation: u64,
    gate: Arc<Mutex<DispatchGate>>,
    on_event: F,
}

impl<F> Dispatcher<F>
where
    F: FnMut(StreamEvent),
{
    /// Delivers an event if this generation is still active.
    ///
    /// Returns `false` when the stream must stop: either the event was
    /// terminal or the generation was cancelled or superseded.
    fn deliver(&mut self, event: StreamEvent) -> bool {
        let mut gate = lock_gate(&self.gate);
        if gate.active != Some(self.generation) {
            debug!(
                generation = self.generation,
                kind = event.kind_name(),
                "discarding event from inactive stream"
            );
            return false;
        }
        let terminal = event.is_terminal();
        if terminal {
            gate.active = None;
        }
        (self.on_event)(event);
        !terminal
    }

    fn fail(&mut self, failure: StreamFailure) {
        warn!(generation = self.generation, kind = failure.kind(), error = %failure, "agent stream failed");
        if let Some(event) = failure.into_event() {
            self.deliver(event);
        }
    }

    /// Closes the generation without delivering anything upward.
    fn close_quietly(&mut self) {
        let mut gate = lock_gate(&self.gate);
        if gate.active == Some(self.generation) {
            gate.active = None;
        }
    }
}

struct StreamTask<F> {
    transport: Arc<dyn Transport>,
    auth: Arc<dyn AuthProvider>,
    endpoint: String,
    request: StreamRequest,
    abort_rx: watch::Receiver<bool>,
    dispatcher: Dispatcher<F>,
}

impl<F> StreamTask<F>
where
    F: FnMut(StreamEvent) + Send + 'static,
{
    async fn run(mut self) {
        let generation = self.dispatcher.generation;
        let conversation_id = self.request.conversation_id;
        debug!(generation, %conversation_id, agent_id = %self.request.agent_id, "starting agent stream");

        let outcome = self.drive().await;
        match outcome {
            Outcome::Finished { skipped_lines } => {
                info!(generation, %conversation_id, skipped_lines, "agent stream finished")
            }
            Outcome::Failed => {}
            Outcome::Cancelled => {
                self.dispatcher.close_quietly();
                // Bookkeeping mirrors a quiet End; nothing is delivered.
                debug!(
                    generation,
                    %conversation_id,
                    synthesized = StreamEvent::End.kind_name(),
                    "agent stream cancelled"
                );
            }
        }
    }

    async fn drive(&mut self) -> Outcome {
        let token = tokio::select! {
            biased;
            _ = aborted(&mut self.abort_rx) => return Outcome::Cancelled,
            token = self.auth.access_token() => token,
        };
        let Some(token) = token.filter(|t| !t.trim().is_empty()) else {
            self.dispatcher
                .fail(StreamFailure::auth("no access token available"));
            return Outcome::Failed;
        };

        let transport_request =
            TransportRequest::post(self.endpoint.clone(), self.request.body()).bearer(&token);
        let opened = tokio::select! {
            biased;
            _ = aborted(&mut self.abort_rx) => return Outcome::Cancelled,
            opened = self.transport.open(transport_request) => opened,
        };
        let mut fragments: FragmentStream = match opened {
            Ok(stream) => stream,
            Err(err) => {
                self.dispatcher.fail(err.into());
                return Outcome::Failed;
            }
        };
        if self.transport.delivery() == DeliveryMode::Cumulative {
            fragments = cumulative_to_incremental(fragments);
        }

        let mut framer = LineFramer::new();
        let mut decoder = EventDecoder::new();
        loop {
            let next = tokio::select! {
                biased;
                _ = aborted(&mut self.abort_rx) => return Outcome::Cancelled,
                next = fragments.next() => next,
            };
            match next {
                Some(Ok(bytes)) => {
                    for line in framer.push(&bytes) {
                        if let Some(event) = decoder.decode(&line)
                            && !self.dispatcher.deliver(event)
                        {
                            return self.stopped(decoder.skipped());
                        }
                    }
                }
                Some(Err(err)) => {
                    self.dispatcher.fail(err.into());
                    return Outcome::Failed;
                }
                None => {
                    if let Some(line) = framer.finish()
                        && let Some(event) = decoder.decode(&line)
                        && !self.dispatcher.deliver(event)
                    {
                        return self.stopped(decoder.skipped());
                    }
                    // Clean close without a terminal event still completes the turn.
                    self.dispatcher.deliver(StreamEvent::End);
                    return self.stopped(decoder.skipped());
                }
            }
        }
    }

    fn stopped(&self, skipped_lines: u64) -> Outcome {
        if *self.abort_rx.borrow() {
            Outcome::Cancelled
        } else {
            Outcome::Finished { skipped_lines }
        }
    }
}

enum Outcome {
    Finished { skipped_lines: u64 },
    Failed,
    Cancelled,
}

/// Resolves once cancellation is requested. Pends forever if the sender is
/// gone without having cancelled.
async fn aborted(rx: &mut watch::Receiver<bool>) {
    loop {
        if *rx.borrow_and_update() {
            return;
        }
        if rx.changed().await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}
