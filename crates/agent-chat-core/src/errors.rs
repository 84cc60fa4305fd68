use crate::event::{ErrorEvent, StreamEvent};

/// Errors produced by a transport reader while opening or reading a stream.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    /// Connection could not be established or was lost mid-stream.
    #[error("network error: {message}")]
    Network { message: String },
    /// Server answered with a non-success status.
    #[error("http error (status {status}): {detail}")]
    Http { status: u16, detail: String },
    /// Generic read failure while consuming the response body.
    #[error("stream read error: {message}")]
    Stream { message: String },
}

impl TransportError {
    /// Creates a network error.
    pub fn network(message: impl Into<String>) -> Self {
        Self::Network {
            message: message.into(),
        }
    }

    /// Creates an HTTP status error.
    pub fn http(status: u16, detail: impl Into<String>) -> Self {
        Self::Http {
            status,
            detail: detail.into(),
        }
    }

    /// Creates a generic stream read error.
    pub fn stream(message: impl Into<String>) -> Self {
        Self::Stream {
            message: message.into(),
        }
    }
}

/// Failure taxonomy for a single streamed request.
///
/// `Parse` is recovered locally by the decoder and `Cancelled` resolves
/// quietly; every other kind terminates the stream as one `StreamEvent::Error`.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StreamFailure {
    /// No usable access token; raised before the transport opens.
    #[error("auth error: {message}")]
    Auth { message: String },
    /// Connection refused, DNS failure, or mid-stream disconnect.
    #[error("network error: {message}")]
    Network { message: String },
    /// Non-2xx response with server-supplied detail.
    #[error("http error (status {status}): {detail}")]
    Http { status: u16, detail: String },
    /// A line failed to decode.
    #[error("parse error: {message}")]
    Parse { message: String },
    /// Generic transport failure during read.
    #[error("stream error: {message}")]
    Stream { message: String },
    /// Caller-initiated cancellation.
    #[error("stream cancelled")]
    Cancelled,
}

impl StreamFailure {
    /// Creates an auth failure.
    pub fn auth(message: impl Into<String>) -> Self {
        Self::Auth {
            message: message.into(),
        }
    }

    /// Creates a parse failure.
    pub fn parse(message: impl Into<String>) -> Self {
        Self::Parse {
            message: message.into(),
        }
    }

    /// Wire-level `kind` string used in `ErrorEvent`.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Auth { .. } => "auth",
            Self::Network { .. } => "network",
            Self::Http { .. } => "http",
            Self::Parse { .. } => "parse",
            Self::Stream { .. } => "stream",
            Self::Cancelled => "cancelled",
        }
    }

    /// Short explanation suitable for showing in place of the assistant reply.
    pub fn user_message(&self) -> String {
        match self {
            Self::Auth { .. } => "You are signed out. Sign in again, then retry.".into(),
            Self::Network { .. } => {
                "Could not reach the agent. Check your connection and retry.".into()
            }
            Self::Http { status, .. } => match status {
                401 | 403 => "Your session has expired. Sign in again, then retry.".into(),
                429 => "The agent is busy right now. Please retry in a moment.".into(),
                500..=599 => "The agent service is unavailable. Please retry.".into(),
                _ => format!("The agent could not handle this request ({status})."),
            },
            Self::Parse { .. } => "The agent sent a reply that could not be read.".into(),
            Self::Stream { .. } => {
                "The connection to the agent was interrupted. Please retry.".into()
            }
            Self::Cancelled => "Cancelled.".into(),
        }
    }

    /// Converts the failure into the terminal event delivered to the session.
    ///
    /// Returns `None` for `Cancelled`, which never surfaces as an error.
    pub fn into_event(self) -> Option<StreamEvent> {
        if matches!(self, Self::Cancelled) {
            return None;
        }
        let code = match &self {
            Self::Http { status, .. } => Some(status.to_string()),
            _ => None,
        };
        let user_message = self.user_message();
        let message = self.to_string();
        Some(StreamEvent::Error(ErrorEvent {
            kind: self.kind().to_string(),
            message,
            user_message,
            code,
        }))
    }
}

impl From<TransportError> for StreamFailure {
    fn from(value: TransportError) -> Self {
        match value {
            TransportError::Network { message } => Self::Network { message },
            TransportError::Http { status, detail } => Self::Http { status, detail },
            TransportError::Stream { message } => Self::Stream { message },
        }
    }
}

/// Top-level error type for the public chat API.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ChatError {
    /// Invalid client configuration.
    #[error("config error: {0}")]
    Config(String),
    /// Invalid input or request descriptor.
    #[error("validation error: {0}")]
    Validation(String),
    /// A send was attempted while a stream is connecting or streaming.
    #[error("a message is already being processed")]
    AlreadyExecuting,
    /// `retry` was called before any message was sent in this session.
    #[error("no previous message to retry")]
    NothingToRetry,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cancelled_never_becomes_an_error_event() {
        assert_eq!(StreamFailure::Cancelled.into_event(), None);
    }

    #[test]
    fn http_failure_carries_status_code_and_kind() {
        let event = StreamFailure::from(TransportError::http(503, "overloaded"))
            .into_event()
            .expect("error event");
        let StreamEvent::Error(error) = event else {
            panic!("expected error event");
        };
        assert_eq!(error.kind, "http");
        assert_eq!(error.code.as_deref(), Some("503"));
        assert!(error.message.contains("overloaded"));
        assert_eq!(
            error.user_message,
            "The agent service is unavailable. Please retry."
        );
    }

    #[test]
    fn auth_failure_kind_is_auth() {
        let failure = StreamFailure::auth("no token");
        assert_eq!(failure.kind(), "auth");
        assert!(failure.user_message().contains("Sign in"));
    }

    #[test]
    fn transport_errors_map_onto_matching_failure_kinds() {
        assert_eq!(
            StreamFailure::from(TransportError::network("refused")).kind(),
            "network"
        );
        assert_eq!(
            StreamFailure::from(TransportError::stream("decode")).kind(),
            "stream"
        );
    }
}
