use std::collections::BTreeMap;

use crate::errors::ChatError;
use crate::model::AgentId;

/// Resolves a human-selected agent to its backend identifier.
pub trait AgentRegistry: Send + Sync {
    fn resolve(&self, selection: &str) -> Option<AgentId>;
}

/// In-memory registry keyed by display name (case-insensitive).
#[derive(Clone, Debug, Default)]
pub struct StaticAgentRegistry {
    entries: BTreeMap<String, AgentId>,
}

impl StaticAgentRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a display name for a backend id.
    pub fn register(mut self, name: impl AsRef<str>, id: impl Into<AgentId>) -> Self {
        self.entries
            .insert(name.as_ref().trim().to_ascii_lowercase(), id.into());
        self
    }

    /// Parses `name=id` pairs separated by commas, e.g. `support=agt_1,sales=agt_2`.
    pub fn parse(mappings: &str) -> Result<Self, ChatError> {
        let mut registry = Self::new();
        for pair in mappings.split(',').map(str::trim).filter(|p| !p.is_empty()) {
            let Some((name, id)) = pair.split_once('=') else {
                return Err(ChatError::Config(format!(
                    "agent mapping `{pair}` must look like name=id"
                )));
            };
            let (name, id) = (name.trim(), id.trim());
            if name.is_empty() || id.is_empty() {
                return Err(ChatError::Config(format!(
                    "agent mapping `{pair}` has an empty side"
                )));
            }
            registry = registry.register(name, id);
        }
        Ok(registry)
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl AgentRegistry for StaticAgentRegistry {
    fn resolve(&self, selection: &str) -> Option<AgentId> {
        let key = selection.trim().to_ascii_lowercase();
        if let Some(id) = self.entries.get(&key) {
            return Some(id.clone());
        }
        // Already a backend id.
        self.entries
            .values()
            .find(|id| id.as_str() == selection.trim())
            .cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolves_names_case_insensitively_and_known_ids_verbatim() {
        let registry = StaticAgentRegistry::parse("Support=agt_support, sales = agt_sales")
            .expect("registry");
        assert_eq!(registry.resolve("SUPPORT"), Some(AgentId::new("agt_support")));
        assert_eq!(registry.resolve("agt_sales"), Some(AgentId::new("agt_sales")));
        assert_eq!(registry.resolve("billing"), None);
    }

    #[test]
    fn parse_rejects_malformed_pairs() {
        assert!(StaticAgentRegistry::parse("support").is_err());
        assert!(StaticAgentRegistry::parse("=agt").is_err());
        assert!(StaticAgentRegistry::parse("").expect("empty ok").is_empty());
    }
}
