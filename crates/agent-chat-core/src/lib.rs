//! Streaming chat client core for talking to hosted AI agents.
//!
//! A [`ChatSession`] owns one conversation. Sending a message appends the user
//! message plus an empty assistant reply, then streams newline-delimited JSON
//! events from the agent endpoint into that reply.
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use agent_chat_core::prelude::*;
//! use agent_chat_core::StaticTokenProvider;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> Result<(), ChatError> {
//! let client = ChatClient::builder(ClientConfig::from_env()?)
//!     .auth(Arc::new(StaticTokenProvider::new("token")))
//!     .build()?;
//!
//! let mut session = client.session("agt_support");
//! session.send("Where is my order?")?;
//! while let Some(transition) = session.next_update().await {
//!     if let Transition::Finalized(message) = transition {
//!         println!("{}", message.content);
//!     }
//! }
//! # Ok(())
//! # }
//! ```

/// Access-token providers.
pub mod auth;
/// Client configuration.
pub mod config;
/// User input types.
pub mod content;
/// NDJSON line decoding into stream events.
pub mod decoder;
/// Public error types.
pub mod errors;
/// Normalized stream events.
pub mod event;
/// Newline framing over arbitrary byte fragments.
pub mod framer;
/// Conversation messages.
pub mod message;
/// Agent and conversation identifiers.
pub mod model;
/// Process-wide logging setup.
pub mod observability;
/// Single-active-stream orchestration and cancellation.
pub mod orchestrator;
/// Finalized-message persistence hooks.
pub mod persistence;
/// Common imports for typical usage.
pub mod prelude;
/// Session state transitions.
pub mod reducer;
/// Agent selection.
pub mod registry;
/// Client, builder, and session handle.
pub mod session;
/// Byte-stream transports.
pub mod transport;

pub use auth::{AuthProvider, EnvTokenProvider, StaticTokenProvider};
pub use config::{ClientConfig, DeliveryMode};
pub use content::{InputPart, UserInput};
pub use decoder::{EventDecoder, parse_line};
pub use errors::{ChatError, StreamFailure, TransportError};
pub use event::{ErrorEvent, StreamEvent, UsageStats};
pub use framer::LineFramer;
pub use message::{Message, MessageStatus, Role};
pub use model::{AgentId, ConversationId};
pub use observability::init_observability;
pub use orchestrator::{CancelHandle, StreamOrchestrator, StreamRequest};
pub use persistence::{JsonlTranscriptSink, MessageSink, NoopSink};
pub use reducer::{SessionSnapshot, SessionState, SessionStatus, Transition};
pub use registry::{AgentRegistry, StaticAgentRegistry};
pub use session::{ChatClient, ChatClientBuilder, ChatSession};
pub use transport::{FragmentStream, HttpTransport, Transport, TransportRequest};
