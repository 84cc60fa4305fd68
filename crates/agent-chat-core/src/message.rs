use chrono::{DateTime, Utc};

use crate::event::UsageStats;

#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

/// Lifecycle of a message.
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageStatus {
    /// Not yet sent. Only appears in transcripts restored by collaborators.
    Pending,
    /// Assistant reply still receiving content.
    Streaming,
    Complete,
    Error,
}

/// One entry of the conversation history.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: uuid::Uuid,
    pub role: Role,
    pub content: String,
    pub status: MessageStatus,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<UsageStats>,
}

impl Message {
    pub(crate) fn user(content: String) -> Self {
        Self {
            id: uuid::Uuid::new_v4(),
            role: Role::User,
            content,
            status: MessageStatus::Complete,
            created_at: Utc::now(),
            usage: None,
        }
    }

    pub(crate) fn assistant_placeholder() -> Self {
        Self {
            id: uuid::Uuid::new_v4(),
            role: Role::Assistant,
            content: String::new(),
            status: MessageStatus::Streaming,
            created_at: Utc::now(),
            usage: None,
        }
    }

    /// True once the message can no longer change.
    pub fn is_finalized(&self) -> bool {
        matches!(self.status, MessageStatus::Complete | MessageStatus::Error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serializes_with_lowercase_enums_and_camel_case_fields() {
        let message = Message::assistant_placeholder();
        let value = serde_json::to_value(&message).expect("serialize");
        assert_eq!(value["role"], "assistant");
        assert_eq!(value["status"], "streaming");
        assert!(value.get("createdAt").is_some());
        assert!(value.get("usage").is_none());
        assert!(!message.is_finalized());
    }
}
