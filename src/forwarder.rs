//! HTTP forwarder: POSTs each record to the sink and classifies the answer.

use crate::config::SinkSettings;
use crate::transform::truncate_chars;
use crate::{BridgeError, BridgeResult, DeliveryOutcome, ForwardRecord, Forwarder};
use async_trait::async_trait;
use std::error::Error as _;
use std::time::Duration;
use tracing::debug;

/// Forwarder backed by a pooled `reqwest` client
///
/// Every request carries the configured timeout, so a stalled sink costs at
/// most `request_timeout_ms` per attempt.
#[derive(Debug, Clone)]
pub struct HttpForwarder {
    client: reqwest::Client,
    url: String,
    timeout: Duration,
    max_body_excerpt: usize,
}

impl HttpForwarder {
    /// Build a forwarder for the configured sink
    pub fn new(settings: &SinkSettings) -> BridgeResult<Self> {
        let timeout = Duration::from_millis(settings.request_timeout_ms);
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .connect_timeout(Duration::from_millis(settings.connect_timeout_ms))
            .build()
            .map_err(|e| BridgeError::config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            url: settings.url.clone(),
            timeout,
            max_body_excerpt: settings.max_body_excerpt,
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Read at most enough of a rejected body to fill the excerpt
    ///
    /// The rest of the body is never buffered; dropping the response closes
    /// the connection.
    async fn body_excerpt(&self, mut response: reqwest::Response) -> String {
        // One char past the limit, at up to 4 bytes each, so truncation is detectable
        let byte_budget = self.max_body_excerpt.saturating_add(1).saturating_mul(4);
        let mut bytes = Vec::new();

        while bytes.len() < byte_budget {
            match response.chunk().await {
                Ok(Some(chunk)) => bytes.extend_from_slice(&chunk),
                Ok(None) => break,
                Err(e) if bytes.is_empty() => {
                    return format!("<unreadable body: {}>", self.describe_failure(&e));
                }
                Err(_) => break,
            }
        }

        truncate_chars(&String::from_utf8_lossy(&bytes), self.max_body_excerpt)
    }

    /// Map a request error to a readable cause, including its source chain
    fn describe_failure(&self, err: &reqwest::Error) -> String {
        if err.is_timeout() {
            return format!("request timed out after {:?}", self.timeout);
        }

        let mut cause = err.to_string();
        let mut source = err.source();
        while let Some(inner) = source {
            cause.push_str(": ");
            cause.push_str(&inner.to_string());
            source = inner.source();
        }
        cause
    }
}

#[async_trait]
impl Forwarder for HttpForwarder {
    async fn forward(&self, record: &ForwardRecord) -> DeliveryOutcome {
        // `.json()` sets `Content-Type: application/json`
        let response = match self.client.post(&self.url).json(record).send().await {
            Ok(response) => response,
            Err(e) => {
                return DeliveryOutcome::TransportFailed {
                    cause: self.describe_failure(&e),
                }
            }
        };

        let status = response.status();
        debug!(status = status.as_u16(), url = %self.url, "Sink responded");

        if status.is_success() {
            return DeliveryOutcome::Delivered {
                status: status.as_u16(),
            };
        }

        DeliveryOutcome::Rejected {
            status: status.as_u16(),
            body: self.body_excerpt(response).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_forwarder_from_settings() {
        let mut settings = SinkSettings::new("http://localhost:8082/naranjas/");
        settings.request_timeout_ms = 2500;

        let forwarder = HttpForwarder::new(&settings).unwrap();
        assert_eq!(forwarder.url(), "http://localhost:8082/naranjas/");
        assert_eq!(forwarder.timeout, Duration::from_millis(2500));
        assert_eq!(forwarder.max_body_excerpt, 512);
    }
}
