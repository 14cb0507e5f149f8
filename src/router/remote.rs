//! HTTP client for the remote peer.

use crate::config::RemoteEndpoint;
use crate::protocol::Response;
use reqwest::header::{ACCEPT, CONTENT_TYPE};
use reqwest::{Client, StatusCode};
use serde_json::Value;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum ForwardError {
    #[error("connection to {endpoint} failed: {reason}")]
    Unreachable { endpoint: String, reason: String },
    #[error("no reply from {endpoint} within {}s", timeout.as_secs())]
    Timeout { endpoint: String, timeout: Duration },
    #[error("{endpoint} answered with HTTP {status}")]
    Status { endpoint: String, status: StatusCode },
    #[error("malformed reply from {endpoint}: {reason}")]
    Malformed { endpoint: String, reason: String },
}

impl ForwardError {
    /// True when the peer was never reached.
    pub fn is_unreachable(&self) -> bool {
        matches!(
            self,
            ForwardError::Unreachable { .. } | ForwardError::Timeout { .. }
        )
    }
}

/// Posts JSON-RPC documents to one remote peer.
#[derive(Clone)]
pub struct RemoteClient {
    client: Client,
    endpoint: RemoteEndpoint,
    timeout: Duration,
}

impl RemoteClient {
    pub fn new(endpoint: RemoteEndpoint, timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            endpoint,
            timeout,
        })
    }

    pub fn endpoint(&self) -> &RemoteEndpoint {
        &self.endpoint
    }

    /// Forward one document. `Ok(None)` means the peer accepted it without a
    /// reply body.
    pub async fn forward(&self, document: &Value) -> Result<Option<Response>, ForwardError> {
        let endpoint = self.endpoint.to_string();
        debug!(endpoint = %endpoint, "Forwarding request");

        let response = self
            .client
            .post(self.endpoint.url().clone())
            .header(CONTENT_TYPE, "application/json")
            .header(ACCEPT, "application/json, text/event-stream")
            .json(document)
            .send()
            .await
            .map_err(|e| self.transport_error(e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(ForwardError::Status { endpoint, status });
        }
        let is_sse = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|ct| ct.starts_with("text/event-stream"));
        let body = response.text().await.map_err(|e| self.transport_error(e))?;

        let payload = if is_sse {
            last_sse_data(&body)
        } else {
            Some(body.trim().to_string()).filter(|b| !b.is_empty())
        };
        let Some(payload) = payload else {
            return Ok(None);
        };

        let value: Value = serde_json::from_str(&payload).map_err(|e| ForwardError::Malformed {
            endpoint: endpoint.clone(),
            reason: e.to_string(),
        })?;
        Response::from_value(value)
            .map(Some)
            .ok_or_else(|| ForwardError::Malformed {
                endpoint,
                reason: "not a JSON-RPC response".to_string(),
            })
    }

    fn transport_error(&self, e: reqwest::Error) -> ForwardError {
        let endpoint = self.endpoint.to_string();
        if e.is_timeout() {
            ForwardError::Timeout {
                endpoint,
                timeout: self.timeout,
            }
        } else if e.is_decode() || e.is_body() {
            ForwardError::Malformed {
                endpoint,
                reason: e.to_string(),
            }
        } else {
            ForwardError::Unreachable {
                endpoint,
                reason: e.to_string(),
            }
        }
    }
}

/// Payload of the last `data:` event in an SSE body.
fn last_sse_data(body: &str) -> Option<String> {
    let mut last = None;
    let mut current: Vec<&str> = Vec::new();
    for line in body.lines().chain(std::iter::once("")) {
        if let Some(data) = line.strip_prefix("data:") {
            current.push(data.strip_prefix(' ').unwrap_or(data));
        } else if line.is_empty() && !current.is_empty() {
            last = Some(current.join("\n"));
            current.clear();
        }
    }
    last.filter(|d| !d.trim().is_empty())
}
