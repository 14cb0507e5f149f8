//! MCP tool request types.
//!
//! These structs define the parameters for each tool exposed by the server.

use rmcp::schemars::JsonSchema;
use serde::Deserialize;
use serde_json::Value;

fn default_true() -> bool {
    true
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct EmptyParams {}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct OpenDatabaseRequest {
    #[schemars(description = "Path to the binary to analyze (a leading ~/ is expanded)")]
    #[serde(alias = "path")]
    pub input_path: String,
    #[schemars(description = "Run auto-analysis before returning (default: true)")]
    #[serde(default = "default_true")]
    pub run_auto_analysis: bool,
    #[schemars(
        description = "Custom session ID (ASCII letters, digits, '-', '_', '.'). Generated if omitted."
    )]
    pub session_id: Option<String>,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct SessionIdRequest {
    #[schemars(description = "Session ID")]
    #[serde(alias = "id")]
    pub session_id: String,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct AnalyzeDatabaseRequest {
    #[schemars(description = "Session ID (default: the current session)")]
    #[serde(alias = "id")]
    pub session_id: Option<String>,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct GetBytesRequest {
    #[schemars(description = "File offset to read from (number, or string in decimal/0x/0b/0o)")]
    #[serde(alias = "address", alias = "addr")]
    pub offset: Option<Value>,
    #[schemars(description = "Number of bytes to read (1-65536, default: 32)")]
    #[serde(alias = "count")]
    pub size: Option<usize>,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct StringsRequest {
    #[schemars(description = "Offset for pagination (default: 0)")]
    pub offset: Option<usize>,
    #[schemars(description = "Maximum strings to return (1-10000, default: 100)")]
    #[serde(alias = "count")]
    pub limit: Option<usize>,
    #[schemars(description = "Optional filter - only return strings containing this text")]
    #[serde(alias = "query")]
    pub filter: Option<String>,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct FindRegexRequest {
    #[schemars(description = "Regular expression (matched case-insensitively)")]
    #[serde(alias = "regex")]
    pub pattern: String,
    #[schemars(description = "Offset for pagination (default: 0)")]
    pub offset: Option<usize>,
    #[schemars(description = "Maximum matches to return (1-10000, default: 100)")]
    #[serde(alias = "count")]
    pub limit: Option<usize>,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct ToolCatalogRequest {
    #[schemars(description = "What you're trying to accomplish (e.g., 'read bytes at an offset')")]
    pub query: Option<String>,
    #[schemars(description = "Filter by category: core, sessions, metadata, memory, search")]
    pub category: Option<String>,
    #[schemars(description = "Maximum number of tools to return (default: 7)")]
    pub limit: Option<usize>,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct ToolHelpRequest {
    #[schemars(description = "Name of the tool to get help for")]
    pub name: String,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct ExitServerRequest {
    #[schemars(description = "Process exit code (default: 0)")]
    #[serde(default)]
    pub code: i32,
}
