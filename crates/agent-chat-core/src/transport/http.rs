use futures::StreamExt as _;
use tracing::debug;

use super::{FragmentStream, Transport, TransportRequest};
use crate::config::{ClientConfig, DeliveryMode};
use crate::errors::{ChatError, TransportError};

const MAX_ERROR_DETAIL: usize = 512;

/// Transport backed by `reqwest`'s incremental body stream.
pub struct HttpTransport {
    client: reqwest::Client,
    delivery: DeliveryMode,
}

impl HttpTransport {
    /// Builds the HTTP client from configuration.
    pub fn new(config: &ClientConfig) -> Result<Self, ChatError> {
        config.validate()?;
        let mut builder = reqwest::Client::builder().connect_timeout(config.connect_timeout);
        if let Some(timeout) = config.request_timeout {
            builder = builder.timeout(timeout);
        }
        let client = builder
            .build()
            .map_err(|e| ChatError::Config(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            client,
            delivery: config.delivery,
        })
    }
}

#[async_trait::async_trait]
impl Transport for HttpTransport {
    fn delivery(&self) -> DeliveryMode {
        self.delivery
    }

    async fn open(&self, request: TransportRequest) -> Result<FragmentStream, TransportError> {
        debug!(url = %request.url, method = %request.method, "opening agent stream");
        let mut http_req = self
            .client
            .request(request.method.clone(), &request.url)
            .json(&request.body);
        for (name, value) in &request.headers {
            http_req = http_req.header(name.as_str(), value.as_str());
        }

        let response = http_req
            .send()
            .await
            .map_err(|e| TransportError::network(format!("agent request failed: {e}")))?;
        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<unreadable body>".to_string());
            return Err(TransportError::http(status.as_u16(), error_detail(&body)));
        }

        let stream = response.bytes_stream().map(|item| {
            item.map_err(|e| {
                if e.is_decode() {
                    TransportError::stream(format!("agent stream read failed: {e}"))
                } else {
                    TransportError::network(format!("connection lost while streaming: {e}"))
                }
            })
        });
        match self.delivery {
            DeliveryMode::Incremental => Ok(Box::pin(stream)),
            // Buffered-read fallback: every item is the whole body so far.
            // Each item copies the body once, so cost grows quadratically with
            // response size; use it only against short replies.
            DeliveryMode::Cumulative => Ok(Box::pin(stream.scan(
                bytes::BytesMut::new(),
                |body, item| {
                    let item = item.map(|chunk| {
                        body.extend_from_slice(&chunk);
                        body.clone().freeze()
                    });
                    futures::future::ready(Some(item))
                },
            ))),
        }
    }
}

/// Extracts a server-supplied detail from an error body.
///
/// Understands `{"detail": ..}`, `{"message": ..}` and `{"error": {"message": ..}}`;
/// anything else is returned trimmed and truncated.
fn error_detail(body: &str) -> String {
    if let Ok(value) = serde_json::from_str::<serde_json::Value>(body) {
        let detail = value
            .get("detail")
            .and_then(|v| v.as_str())
            .or_else(|| value.get("message").and_then(|v| v.as_str()))
            .or_else(|| {
                value
                    .get("error")
                    .and_then(|e| e.get("message"))
                    .and_then(|v| v.as_str())
            });
        if let Some(detail) = detail {
            return detail.to_string();
        }
    }
    let trimmed = body.trim();
    if trimmed.is_empty() {
        return "<empty body>".to_string();
    }
    trimmed.chars().take(MAX_ERROR_DETAIL).collect()
}
