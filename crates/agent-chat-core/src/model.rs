use std::fmt;

/// Backend identifier of the agent a session talks to.
#[derive(Clone, Debug, Eq, PartialEq, Hash, PartialOrd, Ord, serde::Serialize, serde::Deserialize)]
pub struct AgentId(pub String);

impl AgentId {
    /// Creates an agent id from any string-like value.
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Returns the agent id as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AgentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for AgentId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for AgentId {
    fn from(value: String) -> Self {
        Self::new(value)
    }
}

/// Client-generated conversation identifier, fixed for a session's lifetime.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(transparent)]
pub struct ConversationId(uuid::Uuid);

impl ConversationId {
    /// Generates a fresh random conversation id.
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4())
    }

    pub fn as_uuid(&self) -> uuid::Uuid {
        self.0
    }
}

impl fmt::Display for ConversationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_conversation_ids_are_unique() {
        assert_ne!(ConversationId::generate(), ConversationId::generate());
    }

    #[test]
    fn conversation_id_serializes_as_plain_string() {
        let id = ConversationId::generate();
        let value = serde_json::to_value(id).expect("serialize");
        assert_eq!(value.as_str(), Some(id.to_string().as_str()));
    }
}
