use std::time::Duration;

use crate::errors::ChatError;

const ENDPOINT_VAR: &str = "AGENT_CHAT_ENDPOINT";
const CONNECT_TIMEOUT_VAR: &str = "AGENT_CHAT_CONNECT_TIMEOUT_MS";
const REQUEST_TIMEOUT_VAR: &str = "AGENT_CHAT_REQUEST_TIMEOUT_MS";
const DELIVERY_VAR: &str = "AGENT_CHAT_DELIVERY";

/// How a transport hands response text to the stream orchestrator.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum DeliveryMode {
    /// Each fragment contains only bytes not delivered before.
    #[default]
    Incremental,
    /// Each fragment is the whole body received so far; the orchestrator
    /// diffs against a read cursor. `HttpTransport` emulates a buffered
    /// reader in this mode, copying the whole body per fragment.
    Cumulative,
}

/// Configuration for the agent execution client.
#[derive(Clone, Debug)]
pub struct ClientConfig {
    /// Agent execution endpoint receiving the streaming POST.
    pub endpoint: String,
    /// Deadline for establishing the connection.
    pub connect_timeout: Duration,
    /// Optional deadline for the whole request, body included.
    pub request_timeout: Option<Duration>,
    /// Delivery mode of the underlying transport.
    pub delivery: DeliveryMode,
}

impl ClientConfig {
    /// Creates a config with defaults for the given endpoint.
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            connect_timeout: Duration::from_secs(15),
            request_timeout: None,
            delivery: DeliveryMode::Incremental,
        }
    }

    /// Builds a config from `AGENT_CHAT_*` environment variables.
    pub fn from_env() -> Result<Self, ChatError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds a config from an arbitrary key lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ChatError> {
        let endpoint = lookup(ENDPOINT_VAR).unwrap_or_default();
        if endpoint.trim().is_empty() {
            return Err(ChatError::Config(format!(
                "missing {ENDPOINT_VAR} for agent chat client"
            )));
        }
        let mut config = Self::new(endpoint.trim());
        if let Some(ms) = parse_millis(&lookup, CONNECT_TIMEOUT_VAR)? {
            config.connect_timeout = ms;
        }
        config.request_timeout = parse_millis(&lookup, REQUEST_TIMEOUT_VAR)?;
        if let Some(raw) = lookup(DELIVERY_VAR) {
            config.delivery = match raw.trim().to_ascii_lowercase().as_str() {
                "" | "incremental" => DeliveryMode::Incremental,
                "cumulative" => DeliveryMode::Cumulative,
                other => {
                    return Err(ChatError::Config(format!(
                        "{DELIVERY_VAR} must be `incremental` or `cumulative`, got `{other}`"
                    )));
                }
            };
        }
        Ok(config)
    }

    /// Overrides the connect timeout.
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Sets a whole-request timeout.
    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = Some(timeout);
        self
    }

    /// Overrides the delivery mode.
    pub fn delivery(mut self, delivery: DeliveryMode) -> Self {
        self.delivery = delivery;
        self
    }

    pub(crate) fn validate(&self) -> Result<(), ChatError> {
        let endpoint = self.endpoint.trim();
        if endpoint.is_empty() {
            return Err(ChatError::Config("endpoint must not be empty".into()));
        }
        if !(endpoint.starts_with("http://") || endpoint.starts_with("https://")) {
            return Err(ChatError::Config(format!(
                "endpoint must be an http(s) url, got `{endpoint}`"
            )));
        }
        if self.connect_timeout.is_zero() {
            return Err(ChatError::Config(
                "connect_timeout must be greater than 0".into(),
            ));
        }
        Ok(())
    }
}

fn parse_millis(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
) -> Result<Option<Duration>, ChatError> {
    match lookup(key) {
        None => Ok(None),
        Some(raw) if raw.trim().is_empty() => Ok(None),
        Some(raw) => raw
            .trim()
            .parse::<u64>()
            .map(|ms| Some(Duration::from_millis(ms)))
            .map_err(|e| ChatError::Config(format!("{key} must be milliseconds: {e}"))),
    }
}
