//! JSON-RPC envelope types.
//!
//! Requests are decoded loosely (any `jsonrpc` value, optional params and id)
//! because the router must classify and forward documents it does not own.
//! Responses always carry `"jsonrpc": "2.0"` and echo the request id.

use rmcp::model::ErrorCode;
use rmcp::ErrorData as McpError;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

pub const JSONRPC_VERSION: &str = "2.0";

/// Application-level code used when a request could not be forwarded.
pub const FORWARD_FAILED: ErrorCode = ErrorCode(-32000);

fn default_version() -> String {
    JSONRPC_VERSION.to_string()
}

/// Request identifier. `null` and absent ids both mark a notification.
///
/// Numbers are kept as decoded so any numeric id is echoed back unchanged.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RequestId {
    Number(serde_json::Number),
    String(String),
}

impl From<i64> for RequestId {
    fn from(n: i64) -> Self {
        RequestId::Number(n.into())
    }
}

/// Decoded request envelope.
#[derive(Debug, Clone, Deserialize)]
pub struct Request {
    pub method: String,
    #[serde(default)]
    pub params: Option<Value>,
    #[serde(default)]
    pub id: Option<RequestId>,
}

impl Request {
    /// Decode an envelope from a JSON document.
    ///
    /// On failure the error carries whatever id could be recovered so the
    /// caller can still address its `Invalid Request` reply.
    pub fn from_value(value: &Value) -> Result<Self, InvalidRequest> {
        serde_json::from_value(value.clone()).map_err(|e| InvalidRequest {
            id: value
                .get("id")
                .and_then(|id| serde_json::from_value(id.clone()).ok()),
            reason: e.to_string(),
        })
    }

    pub fn is_notification(&self) -> bool {
        self.id.is_none()
    }

    /// `params.name` of a `tools/call` request.
    pub fn tool_name(&self) -> Option<&str> {
        self.params
            .as_ref()
            .and_then(|p| p.get("name"))
            .and_then(Value::as_str)
    }
}

/// A document that is JSON but not a request envelope.
#[derive(Debug, Clone)]
pub struct InvalidRequest {
    pub id: Option<RequestId>,
    pub reason: String,
}

impl InvalidRequest {
    pub fn into_response(self) -> Response {
        Response::failure(
            self.id,
            McpError::invalid_request(format!("Invalid request: {}", self.reason), None),
        )
    }
}

/// Response envelope.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Response {
    #[serde(default = "default_version")]
    pub jsonrpc: String,
    pub id: Option<RequestId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<McpError>,
}

impl Response {
    pub fn success(id: Option<RequestId>, result: Value) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id,
            result: Some(result),
            error: None,
        }
    }

    pub fn failure(id: Option<RequestId>, error: McpError) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id,
            result: None,
            error: Some(error),
        }
    }

    /// Reply for a document that is not valid JSON.
    pub fn parse_error(reason: impl fmt::Display) -> Self {
        Self::failure(
            None,
            McpError::parse_error(format!("Parse error: {reason}"), None),
        )
    }

    /// Decode a peer reply; `None` when it is not a response envelope.
    pub fn from_value(value: Value) -> Option<Self> {
        let response: Response = serde_json::from_value(value).ok()?;
        if response.result.is_none() && response.error.is_none() {
            return None;
        }
        Some(response)
    }

    pub fn to_value(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}
