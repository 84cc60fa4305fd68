//! Pure conversation state transitions.
//!
//! The reducer owns the message list and session status. It never performs
//! I/O; the session feeds it stream events tagged with the assistant message
//! they were started for, and events for any other message are ignored.
use tracing::debug;

use crate::content::UserInput;
use crate::errors::ChatError;
use crate::event::StreamEvent;
use crate::message::{Message, MessageStatus};
use crate::model::{AgentId, ConversationId};

/// Session-level lifecycle.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    #[default]
    Idle,
    /// Request issued, no event received yet.
    Connecting,
    Streaming,
    /// Last turn failed. A new send is allowed.
    Error,
}

impl SessionStatus {
    /// True while a turn is in flight.
    pub fn is_busy(self) -> bool {
        matches!(self, Self::Connecting | Self::Streaming)
    }
}

/// Outcome of applying one event.
#[derive(Clone, Debug, PartialEq)]
pub enum Transition {
    /// Event belonged to a stale or finished message.
    Ignored,
    /// State changed; the turn continues.
    Updated,
    /// The in-flight assistant message reached its final form.
    Finalized(Message),
}

/// Read-only view published to observers after every change.
#[derive(Clone, Debug, PartialEq, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSnapshot {
    pub conversation_id: ConversationId,
    pub agent_id: AgentId,
    pub status: SessionStatus,
    pub status_text: Option<String>,
    pub messages: Vec<Message>,
}

#[derive(Clone, Debug)]
pub struct SessionState {
    conversation_id: ConversationId,
    agent_id: AgentId,
    messages: Vec<Message>,
    status: SessionStatus,
    status_text: Option<String>,
    in_flight: Option<uuid::Uuid>,
    last_input: Option<UserInput>,
}

impl SessionState {
    pub fn new(agent_id: AgentId) -> Self {
        Self {
            conversation_id: ConversationId::generate(),
            agent_id,
            messages: Vec::new(),
            status: SessionStatus::Idle,
            status_text: None,
            in_flight: None,
            last_input: None,
        }
    }

    pub fn conversation_id(&self) -> ConversationId {
        self.conversation_id
    }

    pub fn agent_id(&self) -> &AgentId {
        &self.agent_id
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn status(&self) -> SessionStatus {
        self.status
    }

    /// Latest status or tool progress line of the in-flight turn.
    pub fn status_text(&self) -> Option<&str> {
        self.status_text.as_deref()
    }

    /// Id of the assistant message currently receiving events.
    pub fn in_flight(&self) -> Option<uuid::Uuid> {
        self.in_flight
    }

    pub fn last_input(&self) -> Option<&UserInput> {
        self.last_input.as_ref()
    }

    /// Appends the user message and an empty streaming assistant message.
    ///
    /// Returns the assistant message id that subsequent events must carry.
    pub fn begin_send(&mut self, input: &UserInput) -> Result<uuid::Uuid, ChatError> {
        if self.status.is_busy() {
            return Err(ChatError::AlreadyExecuting);
        }
        input.validate()?;

        self.messages.push(Message::user(input.display_text()));
        let assistant = Message::assistant_placeholder();
        let id = assistant.id;
        self.messages.push(assistant);
        self.status = SessionStatus::Connecting;
        self.status_text = None;
        self.in_flight = Some(id);
        self.last_input = Some(input.clone());
        Ok(id)
    }

    /// Applies one stream event addressed to `message_id`.
    pub fn apply(&mut self, message_id: uuid::Uuid, event: StreamEvent) -> Transition {
        if self.in_flight != Some(message_id) {
            debug!(%message_id, kind = event.kind_name(), "ignoring event for inactive message");
            return Transition::Ignored;
        }
        let Some(index) = self.messages.iter().rposition(|m| m.id == message_id) else {
            self.in_flight = None;
            return Transition::Ignored;
        };
        if self.status == SessionStatus::Connecting {
            self.status = SessionStatus::Streaming;
        }

        match event {
            StreamEvent::Chunk { text } => {
                self.messages[index].content.push_str(&text);
                Transition::Updated
            }
            StreamEvent::StatusUpdate { message } | StreamEvent::ToolUpdate { message } => {
                self.status_text = Some(message);
                Transition::Updated
            }
            StreamEvent::FinalData { output, usage } => {
                let message = &mut self.messages[index];
                message.content = output;
                message.usage = usage;
                message.status = MessageStatus::Complete;
                self.finish(SessionStatus::Idle, index)
            }
            StreamEvent::Error(error) => {
                let message = &mut self.messages[index];
                message.content = error.user_message;
                message.status = MessageStatus::Error;
                self.finish(SessionStatus::Error, index)
            }
            StreamEvent::End => {
                self.messages[index].status = MessageStatus::Complete;
                self.finish(SessionStatus::Idle, index)
            }
        }
    }

    /// Finishes the in-flight turn locally, keeping the partial content.
    ///
    /// Returns the finalized assistant message, or `None` when nothing was in
    /// flight.
    pub fn cancel(&mut self) -> Option<Message> {
        if !self.status.is_busy() {
            return None;
        }
        let id = self.in_flight?;
        let index = self.messages.iter().rposition(|m| m.id == id)?;
        self.messages[index].status = MessageStatus::Complete;
        match self.finish(SessionStatus::Idle, index) {
            Transition::Finalized(message) => Some(message),
            _ => None,
        }
    }

    /// Starts a fresh conversation with the same agent.
    pub fn reset(&mut self) {
        *self = Self::new(self.agent_id.clone());
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            conversation_id: self.conversation_id,
            agent_id: self.agent_id.clone(),
            status: self.status,
            status_text: self.status_text.clone(),
            messages: self.messages.clone(),
        }
    }

    fn finish(&mut self, status: SessionStatus, index: usize) -> Transition {
        self.status = status;
        self.status_text = None;
        self.in_flight = None;
        Transition::Finalized(self.messages[index].clone())
    }
}
