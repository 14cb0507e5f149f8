//! Error types for tool handlers.
//!
//! Tool execution errors are returned with `is_error: true` in CallToolResult,
//! while protocol errors (unknown tool, malformed args) become JSON-RPC errors
//! in the registry.

use crate::engine::EngineError;
use crate::session::SessionError;
use rmcp::model::{CallToolResult, Content};
use thiserror::Error;

/// Tool execution errors - returned with is_error: true in CallToolResult
#[derive(Error, Debug)]
pub enum ToolError {
    #[error("No active session. Use open_database() to open a binary first.")]
    NoSessionOpen,

    #[error(transparent)]
    Session(SessionError),

    #[error(transparent)]
    Engine(#[from] EngineError),

    #[error("Invalid address format: {0}")]
    InvalidAddress(String),

    #[error("Invalid parameters: {0}")]
    InvalidParams(String),

    #[error("Invalid tool category: {0}")]
    InvalidToolCategory(String),
}

impl ToolError {
    /// Convert to MCP CallToolResult with is_error: true
    pub fn to_tool_result(&self) -> CallToolResult {
        CallToolResult::error(vec![Content::text(self.to_string())])
    }

    /// True when the local backend could not serve the call at all, as
    /// opposed to the call itself being wrong.
    pub fn is_backend_fault(&self) -> bool {
        match self {
            ToolError::NoSessionOpen => true,
            ToolError::Engine(e) => e.is_unavailable(),
            _ => false,
        }
    }
}

impl From<SessionError> for ToolError {
    fn from(e: SessionError) -> Self {
        match e {
            SessionError::NoCurrentSession => ToolError::NoSessionOpen,
            SessionError::Engine(e) => ToolError::Engine(e),
            other => ToolError::Session(other),
        }
    }
}
