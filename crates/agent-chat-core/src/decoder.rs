use serde_json::Value;
use tracing::debug;

use crate::errors::StreamFailure;
use crate::event::{ErrorEvent, StreamEvent, UsageStats};

/// Decodes complete NDJSON lines into `StreamEvent`s.
///
/// Malformed lines are logged and skipped; the decoder only counts them.
#[derive(Debug, Default)]
pub struct EventDecoder {
    skipped: u64,
}

impl EventDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the decoded event, or `None` for blank or malformed lines.
    pub fn decode(&mut self, line: &str) -> Option<StreamEvent> {
        match parse_line(line) {
            Ok(event) => event,
            Err(err) => {
                self.skipped = self.skipped.saturating_add(1);
                debug!(error = %err, line = %preview(line), "skipping malformed stream line");
                None
            }
        }
    }

    /// Number of malformed lines skipped so far.
    pub fn skipped(&self) -> u64 {
        self.skipped
    }
}

/// Parses one line.
///
/// `Ok(None)` means the line was blank. Unknown discriminators and payloads
/// of the wrong shape are `StreamFailure::Parse`.
pub fn parse_line(line: &str) -> Result<Option<StreamEvent>, StreamFailure> {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return Ok(None);
    }
    let value: Value = serde_json::from_str(trimmed)
        .map_err(|e| StreamFailure::parse(format!("invalid JSON line: {e}")))?;
    let Some(kind) = value.get("event").and_then(Value::as_str) else {
        return Err(StreamFailure::parse("missing `event` discriminator"));
    };
    let data = value.get("data").unwrap_or(&Value::Null);

    let event = match kind {
        "status" | "status_update" | "statusUpdate" => StreamEvent::StatusUpdate {
            message: text_payload(kind, data, &["message", "status", "text"])?,
        },
        "tool" | "tool_update" | "toolUpdate" => StreamEvent::ToolUpdate {
            message: tool_message(kind, data)?,
        },
        "chunk" => StreamEvent::Chunk {
            text: text_payload(kind, data, &["text", "content", "delta"])?,
        },
        "final" | "final_data" | "finalData" => final_payload(kind, data)?,
        "error" => StreamEvent::Error(error_payload(data)),
        "end" | "done" => StreamEvent::End,
        other => {
            return Err(StreamFailure::parse(format!(
                "unknown event kind `{other}`"
            )));
        }
    };
    Ok(Some(event))
}

fn text_payload(kind: &str, data: &Value, keys: &[&str]) -> Result<String, StreamFailure> {
    if let Some(text) = data.as_str() {
        return Ok(text.to_string());
    }
    keys.iter()
        .find_map(|key| data.get(*key).and_then(Value::as_str))
        .map(ToOwned::to_owned)
        .ok_or_else(|| StreamFailure::parse(format!("`{kind}` event without text payload")))
}

fn tool_message(kind: &str, data: &Value) -> Result<String, StreamFailure> {
    if let Ok(message) = text_payload(kind, data, &["message", "status"]) {
        return Ok(message);
    }
    let tool = data
        .get("tool")
        .or_else(|| data.get("name"))
        .and_then(Value::as_str)
        .ok_or_else(|| StreamFailure::parse(format!("`{kind}` event without message")))?;
    Ok(format!("Using {tool}"))
}

fn final_payload(kind: &str, data: &Value) -> Result<StreamEvent, StreamFailure> {
    if let Some(output) = data.as_str() {
        return Ok(StreamEvent::FinalData {
            output: output.to_string(),
            usage: None,
        });
    }
    let output = data
        .get("output")
        .and_then(Value::as_str)
        .ok_or_else(|| StreamFailure::parse(format!("`{kind}` event without output")))?;
    let usage = match data.get("usage") {
        None | Some(Value::Null) => None,
        Some(raw) => match serde_json::from_value::<UsageStats>(raw.clone()) {
            Ok(usage) => Some(usage),
            Err(e) => {
                debug!(error = %e, "ignoring unreadable usage block");
                None
            }
        },
    };
    Ok(StreamEvent::FinalData {
        output: output.to_string(),
        usage,
    })
}

fn error_payload(data: &Value) -> ErrorEvent {
    const FALLBACK_USER_MESSAGE: &str = "The agent ran into a problem. Please retry.";
    if let Some(message) = data.as_str() {
        return ErrorEvent::new("agent", message, FALLBACK_USER_MESSAGE);
    }
    let field = |key: &str| data.get(key).and_then(Value::as_str).map(ToOwned::to_owned);
    let message = field("message").unwrap_or_else(|| "agent stream error".to_string());
    let user_message = field("userMessage")
        .or_else(|| field("user_message"))
        .unwrap_or_else(|| FALLBACK_USER_MESSAGE.to_string());
    let code = field("code").or_else(|| {
        data.get("code")
            .and_then(Value::as_i64)
            .map(|c| c.to_string())
    });
    ErrorEvent {
        kind: field("kind").unwrap_or_else(|| "agent".to_string()),
        message,
        user_message,
        code,
    }
}

fn preview(line: &str) -> String {
    line.chars().take(120).collect()
}
