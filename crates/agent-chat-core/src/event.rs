/// Token accounting reported with the final payload.
#[derive(Clone, Debug, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UsageStats {
    #[serde(
        default,
        alias = "input_tokens",
        alias = "promptTokens",
        alias = "prompt_tokens",
        skip_serializing_if = "Option::is_none"
    )]
    pub input_tokens: Option<u64>,
    #[serde(
        default,
        alias = "output_tokens",
        alias = "completionTokens",
        alias = "completion_tokens",
        skip_serializing_if = "Option::is_none"
    )]
    pub output_tokens: Option<u64>,
    #[serde(
        default,
        alias = "total_tokens",
        skip_serializing_if = "Option::is_none"
    )]
    pub total_tokens: Option<u64>,
}

/// Terminal error payload.
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorEvent {
    /// Machine-readable category (`auth`, `network`, `http`, or a server kind).
    pub kind: String,
    /// Diagnostic message, not meant for end users.
    pub message: String,
    /// Short explanation shown in place of the assistant reply.
    pub user_message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
}

impl ErrorEvent {
    pub fn new(
        kind: impl Into<String>,
        message: impl Into<String>,
        user_message: impl Into<String>,
    ) -> Self {
        Self {
            kind: kind.into(),
            message: message.into(),
            user_message: user_message.into(),
            code: None,
        }
    }
}

/// Decoded event from the agent stream.
#[derive(Clone, Debug, PartialEq)]
pub enum StreamEvent {
    /// Human-readable progress. Non-terminal.
    StatusUpdate { message: String },
    /// Progress attributed to an intermediate tool invocation. Non-terminal.
    ToolUpdate { message: String },
    /// Content fragment appended to the in-flight assistant message.
    Chunk { text: String },
    /// Authoritative complete content; replaces any accumulated chunks.
    FinalData {
        output: String,
        usage: Option<UsageStats>,
    },
    /// Terminal failure.
    Error(ErrorEvent),
    /// Terminal success marker.
    End,
}

impl StreamEvent {
    /// True for `Error` and `End`; nothing is dispatched after either.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Error(_) | Self::End)
    }

    /// Short name used in log fields.
    pub fn kind_name(&self) -> &'static str {
        match self {
            Self::StatusUpdate { .. } => "status_update",
            Self::ToolUpdate { .. } => "tool_update",
            Self::Chunk { .. } => "chunk",
            Self::FinalData { .. } => "final_data",
            Self::Error(_) => "error",
            Self::End => "end",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_error_and_end_are_terminal() {
        assert!(StreamEvent::End.is_terminal());
        assert!(StreamEvent::Error(ErrorEvent::new("http", "boom", "Retry")).is_terminal());
        assert!(!StreamEvent::Chunk { text: "a".into() }.is_terminal());
        assert!(
            !StreamEvent::FinalData {
                output: "a".into(),
                usage: None
            }
            .is_terminal()
        );
    }

    #[test]
    fn usage_accepts_snake_and_prompt_aliases() {
        let usage: UsageStats = serde_json::from_value(serde_json::json!({
            "prompt_tokens": 12,
            "completionTokens": 30,
            "totalTokens": 42
        }))
        .expect("usage");
        assert_eq!(usage.input_tokens, Some(12));
        assert_eq!(usage.output_tokens, Some(30));
        assert_eq!(usage.total_tokens, Some(42));
    }
}
