//! Access-token providers consumed by the stream orchestrator.
//!
//! Token issuance and refresh live outside this crate; the orchestrator only
//! asks for the current token before each request.

/// Source of bearer tokens for agent requests.
#[async_trait::async_trait]
pub trait AuthProvider: Send + Sync {
    /// Returns the current access token, or `None` when signed out.
    async fn access_token(&self) -> Option<String>;
}

/// Provider returning a fixed token (or none).
#[derive(Clone, Debug, Default)]
pub struct StaticTokenProvider {
    token: Option<String>,
}

impl StaticTokenProvider {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: Some(token.into()),
        }
    }

    /// A provider that is always signed out.
    pub fn signed_out() -> Self {
        Self { token: None }
    }
}

#[async_trait::async_trait]
impl AuthProvider for StaticTokenProvider {
    async fn access_token(&self) -> Option<String> {
        self.token.clone()
    }
}

/// Provider reading the token from an environment variable on every request.
#[derive(Clone, Debug)]
pub struct EnvTokenProvider {
    var: String,
}

impl EnvTokenProvider {
    pub const DEFAULT_VAR: &'static str = "AGENT_CHAT_TOKEN";

    pub fn new(var: impl Into<String>) -> Self {
        Self { var: var.into() }
    }
}

impl Default for EnvTokenProvider {
    fn default() -> Self {
        Self::new(Self::DEFAULT_VAR)
    }
}

#[async_trait::async_trait]
impl AuthProvider for EnvTokenProvider {
    async fn access_token(&self) -> Option<String> {
        std::env::var(&self.var)
            .ok()
            .map(|token| token.trim().to_string())
            .filter(|token| !token.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn static_provider_returns_configured_token() {
        assert_eq!(
            StaticTokenProvider::new("abc").access_token().await.as_deref(),
            Some("abc")
        );
        assert_eq!(StaticTokenProvider::signed_out().access_token().await, None);
    }

    #[tokio::test]
    async fn env_provider_treats_missing_variable_as_signed_out() {
        let provider = EnvTokenProvider::new("AGENT_CHAT_TOKEN_THAT_IS_NEVER_SET_IN_TESTS");
        assert_eq!(provider.access_token().await, None);
    }
}
