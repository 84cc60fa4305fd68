//! Persistence hooks for finalized assistant messages.
//!
//! Storage itself is owned by collaborators; sinks must not fail the session,
//! so write errors are logged and swallowed.
use std::fs::{File, OpenOptions};
use std::io::Write as _;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use tracing::warn;

use crate::message::Message;
use crate::model::ConversationId;

/// Receives each assistant message exactly once, when it is finalized.
pub trait MessageSink: Send + Sync {
    fn on_message_finalized(&self, conversation_id: &ConversationId, message: &Message);
}

/// Sink that discards everything.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoopSink;

impl MessageSink for NoopSink {
    fn on_message_finalized(&self, _conversation_id: &ConversationId, _message: &Message) {}
}

#[derive(serde::Serialize)]
#[serde(rename_all = "camelCase")]
struct TranscriptLine<'a> {
    conversation_id: &'a ConversationId,
    message: &'a Message,
}

/// Appends finalized messages to a JSON Lines file.
pub struct JsonlTranscriptSink {
    path: PathBuf,
    file: Mutex<File>,
}

impl JsonlTranscriptSink {
    /// Opens (creating parents and the file if needed) in append mode.
    pub fn open(path: impl AsRef<Path>) -> std::io::Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        Ok(Self {
            path,
            file: Mutex::new(file),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl MessageSink for JsonlTranscriptSink {
    fn on_message_finalized(&self, conversation_id: &ConversationId, message: &Message) {
        let line = match serde_json::to_string(&TranscriptLine {
            conversation_id,
            message,
        }) {
            Ok(line) => line,
            Err(e) => {
                warn!(error = %e, "failed to serialize transcript line");
                return;
            }
        };
        let mut file = self.file.lock().unwrap_or_else(PoisonError::into_inner);
        if let Err(e) = writeln!(file, "{line}") {
            warn!(error = %e, path = %self.path.display(), "failed to append transcript line");
        }
    }
}
