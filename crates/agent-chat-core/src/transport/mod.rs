//! Transport readers: open one streaming request and expose the response
//! body as raw byte fragments.
//!
//! Cancellation is cooperative. The orchestrator races every await on a
//! transport against its abort signal and drops the fragment stream, which
//! closes the underlying connection.
mod cumulative;
mod http;

use std::pin::Pin;

pub use cumulative::{CumulativeDelta, cumulative_to_incremental};
pub use http::HttpTransport;

use crate::config::DeliveryMode;
use crate::errors::TransportError;

/// Response body fragments. An `Err` item is terminal.
pub type FragmentStream =
    Pin<Box<dyn futures::Stream<Item = Result<bytes::Bytes, TransportError>> + Send + 'static>>;

/// Descriptor for one streaming request.
#[derive(Clone, Debug, PartialEq)]
pub struct TransportRequest {
    pub url: String,
    pub method: reqwest::Method,
    pub headers: Vec<(String, String)>,
    pub body: serde_json::Value,
}

impl TransportRequest {
    /// Creates a JSON POST request.
    pub fn post(url: impl Into<String>, body: serde_json::Value) -> Self {
        Self {
            url: url.into(),
            method: reqwest::Method::POST,
            headers: vec![("Accept".into(), "application/x-ndjson".into())],
            body,
        }
    }

    /// Adds a header.
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Adds an `Authorization: Bearer` header.
    pub fn bearer(self, token: &str) -> Self {
        self.header("Authorization", format!("Bearer {token}"))
    }

    /// Returns the first header value with a case-insensitive name match.
    pub fn header_value(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

/// Opens streaming requests.
///
/// Each call opens exactly one connection. Non-success statuses and
/// connection failures are returned as `TransportError`, never as panics.
#[async_trait::async_trait]
pub trait Transport: Send + Sync {
    /// How fragments produced by this transport relate to each other.
    fn delivery(&self) -> DeliveryMode {
        DeliveryMode::Incremental
    }

    /// Sends the request and returns the body as a fragment stream.
    async fn open(&self, request: TransportRequest) -> Result<FragmentStream, TransportError>;
}
