//! Common imports for typical chat client usage.
pub use crate::{
    AuthProvider, CancelHandle, ChatClient, ChatClientBuilder, ChatError, ChatSession,
    ClientConfig, ConversationId, AgentId, InputPart, Message, MessageSink, MessageStatus,
    SessionSnapshot, SessionStatus, StreamEvent, Transition, UserInput,
};
