//! Local tool registry and JSON-RPC dispatch.
//!
//! The registry maps tool names to typed handlers and answers the MCP
//! protocol methods. It knows nothing about routing: the router decides
//! whether a request reaches it at all.

use crate::error::ToolError;
use crate::protocol::{Request, Response};
use rmcp::model::{CallToolResult, Content, ErrorCode, JsonObject, ServerInfo, Tool};
use rmcp::schemars::{schema_for, JsonSchema};
use rmcp::ErrorData as McpError;
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use tracing::debug;

type Handler = Box<dyn Fn(Value) -> Result<Value, HandlerError> + Send + Sync>;

enum HandlerError {
    Params(String),
    Tool(ToolError),
}

/// A tool call the local backend could not serve.
#[derive(Debug, Error)]
#[error("{tool}: {source}")]
pub struct DispatchFault {
    pub tool: String,
    #[source]
    pub source: ToolError,
}

struct Registered {
    tool: Tool,
    handler: Handler,
}

/// JSON schema for `P` without the `$schema` marker.
pub fn params_schema<P: JsonSchema>() -> JsonObject {
    let mut schema = serde_json::to_value(schema_for!(P))
        .ok()
        .and_then(|v| match v {
            Value::Object(map) => Some(map),
            _ => None,
        })
        .unwrap_or_default();
    schema.remove("$schema");
    if !schema.contains_key("type") {
        schema.insert("type".to_string(), json!("object"));
    }
    schema
}

/// Immutable (after construction) table of tools plus protocol handlers.
pub struct ToolRegistry {
    info: ServerInfo,
    tools: Vec<Registered>,
    index: HashMap<String, usize>,
}

impl ToolRegistry {
    pub fn new(info: ServerInfo) -> Self {
        Self {
            info,
            tools: Vec::new(),
            index: HashMap::new(),
        }
    }

    /// Register a tool. A later registration under the same name replaces
    /// the earlier one.
    pub fn register<P, F>(&mut self, name: &'static str, description: &'static str, handler: F)
    where
        P: DeserializeOwned + JsonSchema,
        F: Fn(P) -> Result<Value, ToolError> + Send + Sync + 'static,
    {
        let tool = Tool::new(name, description, Arc::new(params_schema::<P>()));
        let handler: Handler = Box::new(move |args: Value| {
            let params: P =
                serde_json::from_value(args).map_err(|e| HandlerError::Params(e.to_string()))?;
            handler(params).map_err(HandlerError::Tool)
        });
        let entry = Registered { tool, handler };
        match self.index.get(name) {
            Some(&pos) => self.tools[pos] = entry,
            None => {
                self.index.insert(name.to_string(), self.tools.len());
                self.tools.push(entry);
            }
        }
    }

    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    pub fn tools(&self) -> Vec<Tool> {
        self.tools.iter().map(|t| t.tool.clone()).collect()
    }

    /// Dispatch one request locally.
    ///
    /// Returns `Ok(None)` for notifications. `Err` means the backend could not
    /// serve the call and the caller may try elsewhere.
    pub fn dispatch(&self, request: &Request) -> Result<Option<Response>, DispatchFault> {
        let method = request.method.as_str();
        if method.starts_with("notifications/") {
            debug!(method, "Notification");
            return Ok(None);
        }

        let outcome = match method {
            "initialize" => self.initialize(),
            "ping" => Ok(json!({})),
            "tools/list" => Ok(json!({ "tools": self.tools() })),
            "resources/list" => Ok(json!({ "resources": [] })),
            "resources/templates/list" => Ok(json!({ "resourceTemplates": [] })),
            "prompts/list" => Ok(json!({ "prompts": [] })),
            "tools/call" => self.call_tool(request.params.as_ref())?,
            other => Err(McpError::new(
                ErrorCode::METHOD_NOT_FOUND,
                format!("Method not found: {other}"),
                None,
            )),
        };

        if request.is_notification() {
            return Ok(None);
        }
        let id = request.id.clone();
        Ok(Some(match outcome {
            Ok(result) => Response::success(id, result),
            Err(error) => Response::failure(id, error),
        }))
    }

    fn initialize(&self) -> Result<Value, McpError> {
        serde_json::to_value(&self.info)
            .map_err(|e| McpError::internal_error(format!("Failed to encode server info: {e}"), None))
    }

    fn call_tool(&self, params: Option<&Value>) -> Result<Result<Value, McpError>, DispatchFault> {
        let Some(name) = params.and_then(|p| p.get("name")).and_then(Value::as_str) else {
            return Ok(Err(McpError::invalid_params(
                "tools/call requires params.name",
                None,
            )));
        };
        let Some(entry) = self.index.get(name).map(|&pos| &self.tools[pos]) else {
            return Ok(Err(McpError::new(
                ErrorCode::METHOD_NOT_FOUND,
                format!("Unknown tool: {name}"),
                None,
            )));
        };

        let args = match params.and_then(|p| p.get("arguments")) {
            None | Some(Value::Null) => json!({}),
            Some(args) => args.clone(),
        };

        debug!(tool = name, "Tool call");
        let result = match (entry.handler)(args) {
            Ok(value) => CallToolResult::success(vec![Content::text(
                serde_json::to_string_pretty(&value).unwrap_or_else(|_| value.to_string()),
            )]),
            Err(HandlerError::Params(reason)) => {
                return Ok(Err(McpError::invalid_params(
                    format!("Invalid arguments for {name}: {reason}"),
                    None,
                )))
            }
            Err(HandlerError::Tool(e)) if e.is_backend_fault() => {
                return Err(DispatchFault {
                    tool: name.to_string(),
                    source: e,
                })
            }
            Err(HandlerError::Tool(e)) => e.to_tool_result(),
        };

        Ok(serde_json::to_value(result)
            .map_err(|e| McpError::internal_error(format!("Failed to encode result: {e}"), None)))
    }
}
