//! Tool handlers for session management and binary inspection.

mod requests;

pub use requests::*;

use crate::catalog::{self, ToolCategory};
use crate::engine::StringInfo;
use crate::error::ToolError;
use crate::lifecycle::Shutdown;
use crate::registry::{params_schema, ToolRegistry};
use crate::session::SessionManager;
use regex::RegexBuilder;
use rmcp::model::{Implementation, ServerCapabilities, ServerInfo};
use rmcp::schemars::JsonSchema;
use serde::Serialize;
use serde_json::{json, Value};
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info, instrument};

const DEFAULT_BYTES: usize = 32;
const MAX_BYTES: usize = 65536;
const DEFAULT_LIMIT: usize = 100;
const MAX_LIMIT: usize = 10000;

/// Paginated string listing.
#[derive(Debug, Serialize)]
pub struct StringListResult {
    pub strings: Vec<StringInfo>,
    pub total: usize,
    pub next_offset: Option<usize>,
}

fn server_info(engine: Option<&str>) -> ServerInfo {
    ServerInfo {
        capabilities: ServerCapabilities::builder().enable_tools().build(),
        server_info: Implementation {
            name: env!("CARGO_PKG_NAME").to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            ..Default::default()
        },
        instructions: Some(instructions(engine)),
        ..Default::default()
    }
}

fn instructions(engine: Option<&str>) -> String {
    let backend = match engine {
        Some(name) => format!("Local analysis engine: {name}."),
        None => "No local analysis engine; analysis tools are served by the remote instance."
            .to_string(),
    };
    format!(
        "Binary analysis server with multiple concurrent databases. {backend} \
         \n\nWorkflow: \
         \n1. open_database: Load a binary (ELF/PE/Mach-O/raw). It becomes the current session. \
         \n2. tool_catalog: Discover tools for your task (e.g., 'read bytes') \
         \n3. tool_help: Get full docs for a specific tool \
         \n4. switch_database / list_databases: Work with several binaries at once \
         \n5. close_database: Release a database when done \
         \n6. exit_server: Close everything and stop this server \
         \n\nTools without a session_id parameter operate on the current session. \
         \n\nTip: Use tool_catalog(query='what you want to do') to find the right tool."
    )
}

/// Build the registry. Session and analysis tools are only registered when
/// a local engine is available; `exit_server` triggers `shutdown`.
pub fn build_registry(sessions: Option<Arc<SessionManager>>, shutdown: &Shutdown) -> ToolRegistry {
    let mut registry = ToolRegistry::new(server_info(
        sessions.as_deref().map(SessionManager::engine_name),
    ));

    registry.register("tool_catalog", tool_description("tool_catalog"), tool_catalog);
    registry.register("tool_help", tool_description("tool_help"), tool_help);
    {
        let sessions = sessions.clone();
        let shutdown = shutdown.clone();
        registry.register("exit_server", tool_description("exit_server"), move |req| {
            exit_server(sessions.as_deref(), &shutdown, req)
        });
    }

    let Some(sessions) = sessions else {
        return registry;
    };
    let tools = Arc::new(SessionTools { sessions });

    macro_rules! route {
        ($name:literal, $method:ident) => {{
            let tools = Arc::clone(&tools);
            registry.register($name, tool_description($name), move |req| tools.$method(req));
        }};
    }

    route!("open_database", open_database);
    route!("close_database", close_database);
    route!("switch_database", switch_database);
    route!("list_databases", list_databases);
    route!("current_database", current_database);
    route!("analyze_database", analyze_database);
    route!("database_info", database_info);
    route!("analysis_status", analysis_status);
    route!("get_bytes", get_bytes);
    route!("strings", strings);
    route!("find_regex", find_regex);

    info!(tools = registry.tools().len(), "Tool registry ready");
    registry
}

fn tool_description(name: &str) -> &'static str {
    catalog::get_tool(name).map_or("", |t| t.short_desc)
}

/// Handlers that need the local session manager.
struct SessionTools {
    sessions: Arc<SessionManager>,
}

fn file_name(path: &str) -> &str {
    Path::new(path)
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or(path)
}

impl SessionTools {
    #[instrument(skip(self), fields(path = %req.input_path))]
    fn open_database(&self, req: OpenDatabaseRequest) -> Result<Value, ToolError> {
        let session_id = self.sessions.open(
            req.input_path.trim(),
            req.run_auto_analysis,
            req.session_id.as_deref(),
        )?;
        let session = self.sessions.get(&session_id)?;
        let message = format!(
            "Binary opened successfully: {}",
            file_name(&session.input_path)
        );
        Ok(json!({
            "success": true,
            "session": session,
            "message": message,
        }))
    }

    fn close_database(&self, req: SessionIdRequest) -> Result<Value, ToolError> {
        if self.sessions.close(&req.session_id) {
            Ok(json!({
                "success": true,
                "message": format!("Session closed: {}", req.session_id),
            }))
        } else {
            Ok(json!({
                "success": false,
                "error": format!("Session not found: {}", req.session_id),
            }))
        }
    }

    fn switch_database(&self, req: SessionIdRequest) -> Result<Value, ToolError> {
        let session = self.sessions.switch(&req.session_id)?;
        let message = format!(
            "Switched to session: {} ({})",
            session.session_id,
            file_name(&session.input_path)
        );
        Ok(json!({
            "success": true,
            "session": session,
            "message": message,
        }))
    }

    fn list_databases(&self, _: EmptyParams) -> Result<Value, ToolError> {
        let sessions = self.sessions.list();
        let current = sessions
            .iter()
            .find(|s| s.is_current)
            .map(|s| s.session_id.clone());
        Ok(json!({
            "count": sessions.len(),
            "sessions": sessions,
            "current_session_id": current,
        }))
    }

    fn current_database(&self, _: EmptyParams) -> Result<Value, ToolError> {
        let session = self.sessions.current().ok_or(ToolError::NoSessionOpen)?;
        Ok(json!(session))
    }

    fn analyze_database(&self, req: AnalyzeDatabaseRequest) -> Result<Value, ToolError> {
        let session = self.sessions.analyze(req.session_id.as_deref())?;
        Ok(json!({ "success": true, "session": session }))
    }

    fn database_info(&self, _: EmptyParams) -> Result<Value, ToolError> {
        let (session, db) = self.sessions.current_database()?;
        let summary = db.summary()?;
        Ok(json!({
            "session_id": session.session_id,
            "path": summary.path,
            "format": summary.format,
            "architecture": summary.architecture,
            "bits": summary.bits,
            "endianness": summary.endianness,
            "size": summary.size,
            "sha256": summary.sha256,
            "analysis_complete": session.analysis_complete,
        }))
    }

    fn analysis_status(&self, _: EmptyParams) -> Result<Value, ToolError> {
        let session = self.sessions.current().ok_or(ToolError::NoSessionOpen)?;
        Ok(json!({
            "session_id": session.session_id,
            "analysis_complete": session.analysis_complete,
        }))
    }

    fn get_bytes(&self, req: GetBytesRequest) -> Result<Value, ToolError> {
        let offset = match &req.offset {
            None => 0,
            Some(value) => value_to_offset(value)?,
        };
        let size = req.size.unwrap_or(DEFAULT_BYTES);
        if size == 0 {
            return Err(ToolError::InvalidParams(
                "size must be at least 1".to_string(),
            ));
        }
        let size = size.min(MAX_BYTES);

        let (_, db) = self.sessions.current_database()?;
        let bytes = db.read_bytes(offset, size)?;
        debug!(offset, size = bytes.len(), "Read bytes");
        Ok(json!({
            "address": format!("{:#x}", offset),
            "size": bytes.len(),
            "bytes": hex_encode(&bytes),
        }))
    }

    fn strings(&self, req: StringsRequest) -> Result<Value, ToolError> {
        let limit = req.limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT);
        let offset = req.offset.unwrap_or(0);
        let filter = req.filter.as_deref().map(str::to_lowercase);

        let (_, db) = self.sessions.current_database()?;
        let all = db.strings()?;
        let matching: Vec<&StringInfo> = all
            .iter()
            .filter(|s| {
                filter
                    .as_deref()
                    .map_or(true, |f| s.content.to_lowercase().contains(f))
            })
            .collect();

        let total = matching.len();
        let strings: Vec<StringInfo> = matching
            .into_iter()
            .skip(offset)
            .take(limit)
            .cloned()
            .collect();
        let next_offset = offset
            .checked_add(strings.len())
            .filter(|&next| next < total);

        let result = StringListResult {
            strings,
            total,
            next_offset,
        };
        Ok(json!(result))
    }

    fn find_regex(&self, req: FindRegexRequest) -> Result<Value, ToolError> {
        let limit = req.limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT);
        let offset = req.offset.unwrap_or(0);
        let re = RegexBuilder::new(&req.pattern)
            .case_insensitive(true)
            .build()
            .map_err(|e| ToolError::InvalidParams(format!("invalid regex: {e}")))?;

        let (_, db) = self.sessions.current_database()?;
        let matches: Vec<Value> = db
            .strings()?
            .iter()
            .filter(|s| re.is_match(&s.content))
            .skip(offset)
            .take(limit)
            .map(|s| json!({ "addr": s.address, "string": s.content }))
            .collect();

        Ok(json!({
            "pattern": req.pattern,
            "n": matches.len(),
            "matches": matches,
        }))
    }
}

fn tool_catalog(req: ToolCatalogRequest) -> Result<Value, ToolError> {
    let limit = req.limit.unwrap_or(7).clamp(1, 15);

    if let Some(cat_str) = &req.category {
        let cat = cat_str
            .parse::<ToolCategory>()
            .map_err(|_| ToolError::InvalidToolCategory(cat_str.clone()))?;
        let tools: Vec<_> = catalog::tools_by_category(cat)
            .take(limit)
            .map(|t| {
                json!({
                    "name": t.name,
                    "description": t.short_desc,
                    "category": t.category.as_str(),
                })
            })
            .collect();
        return Ok(json!({
            "category": cat.as_str(),
            "category_description": cat.description(),
            "tools": tools,
            "hint": "Use tool_help(name) for full documentation and examples"
        }));
    }

    if let Some(query) = &req.query {
        let tools: Vec<_> = catalog::search_tools(query, limit)
            .iter()
            .map(|(t, matched)| {
                json!({
                    "name": t.name,
                    "description": t.short_desc,
                    "category": t.category.as_str(),
                    "matched": matched,
                })
            })
            .collect();
        return Ok(json!({
            "query": query,
            "tools": tools,
            "hint": "Use tool_help(name) for full documentation and examples"
        }));
    }

    let categories: Vec<_> = ToolCategory::all()
        .iter()
        .map(|c| {
            json!({
                "category": c.as_str(),
                "description": c.description(),
                "tool_count": catalog::tools_by_category(*c).count(),
            })
        })
        .collect();
    Ok(json!({
        "categories": categories,
        "hint": "Use tool_catalog(category='...') to list tools in a category, or tool_catalog(query='...') to search."
    }))
}

fn exit_server(
    sessions: Option<&SessionManager>,
    shutdown: &Shutdown,
    req: ExitServerRequest,
) -> Result<Value, ToolError> {
    let closed = sessions.map_or(0, SessionManager::close_all);
    shutdown.request(req.code);
    Ok(json!({
        "success": true,
        "closed_sessions": closed,
        "message": format!("Exiting with code {}", req.code),
    }))
}

fn tool_help(req: ToolHelpRequest) -> Result<Value, ToolError> {
    debug!("Tool help for {}", req.name);
    match catalog::get_tool(&req.name) {
        Some(tool) => Ok(json!({
            "name": tool.name,
            "category": tool.category.as_str(),
            "description": tool.full_desc,
            "parameters": tool_params_schema(tool.name),
            "example": tool.example,
            "keywords": tool.keywords,
            "needs_engine": tool.needs_engine,
        })),
        None => {
            let suggestions: Vec<_> = catalog::search_tools(&req.name, 3)
                .iter()
                .map(|(t, _)| t.name)
                .collect();
            Ok(json!({
                "error": format!("Tool '{}' not found", req.name),
                "suggestions": suggestions,
                "hint": "Use tool_catalog to discover available tools"
            }))
        }
    }
}

/// Parameter schema for a catalog tool.
pub fn tool_params_schema(name: &str) -> Option<Value> {
    fn schema<T: JsonSchema>() -> Value {
        Value::Object(params_schema::<T>())
    }

    match name {
        "tool_catalog" => Some(schema::<ToolCatalogRequest>()),
        "tool_help" => Some(schema::<ToolHelpRequest>()),
        "exit_server" => Some(schema::<ExitServerRequest>()),
        "open_database" => Some(schema::<OpenDatabaseRequest>()),
        "close_database" | "switch_database" => Some(schema::<SessionIdRequest>()),
        "analyze_database" => Some(schema::<AnalyzeDatabaseRequest>()),
        "list_databases" | "current_database" | "database_info" | "analysis_status" => {
            Some(schema::<EmptyParams>())
        }
        "get_bytes" => Some(schema::<GetBytesRequest>()),
        "strings" => Some(schema::<StringsRequest>()),
        "find_regex" => Some(schema::<FindRegexRequest>()),
        _ => None,
    }
}

/// Parse an offset written as decimal, `0x`, `0b` or `0o`, with optional
/// underscores.
pub fn parse_address(s: &str) -> Result<u64, ToolError> {
    let mut s = s.trim().to_string();
    s.retain(|c| c != '_');
    let (digits, radix) = match s.get(..2) {
        Some("0x" | "0X") => (&s[2..], 16),
        Some("0b" | "0B") => (&s[2..], 2),
        Some("0o" | "0O") => (&s[2..], 8),
        _ => (s.as_str(), 10),
    };
    u64::from_str_radix(digits, radix).map_err(|_| ToolError::InvalidAddress(s.clone()))
}

fn value_to_offset(value: &Value) -> Result<u64, ToolError> {
    match value {
        Value::Number(n) => n
            .as_u64()
            .ok_or_else(|| ToolError::InvalidAddress(n.to_string())),
        Value::String(s) => parse_address(s),
        other => Err(ToolError::InvalidAddress(other.to_string())),
    }
}

fn hex_encode(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::ImageEngine;
    use crate::protocol::Request;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn sample() -> NamedTempFile {
        let mut file = NamedTempFile::new().expect("temp file");
        file.write_all(b"\x7fELF\x02\x01\x01\0http://example.com\0Error: bad\0error code\0")
            .expect("write");
        file
    }

    fn call(registry: &ToolRegistry, name: &str, arguments: Value) -> Value {
        let request = Request::from_value(&json!({
            "jsonrpc": "2.0", "id": 1, "method": "tools/call",
            "params": {"name": name, "arguments": arguments}
        }))
        .expect("envelope");
        registry
            .dispatch(&request)
            .expect("no fault")
            .expect("response")
            .to_value()
    }

    fn payload(response: &Value) -> Value {
        let text = response["result"]["content"][0]["text"]
            .as_str()
            .expect("text content");
        serde_json::from_str(text).unwrap_or_else(|_| json!(text))
    }

    fn with_engine() -> (ToolRegistry, Arc<SessionManager>) {
        let sessions = Arc::new(SessionManager::new(Arc::new(ImageEngine::new())));
        (build_registry(Some(Arc::clone(&sessions)), &Shutdown::new()), sessions)
    }

    #[test]
    fn test_parse_address() {
        assert_eq!(parse_address("0x10").ok(), Some(16));
        assert_eq!(parse_address("0b101").ok(), Some(5));
        assert_eq!(parse_address("0o17").ok(), Some(15));
        assert_eq!(parse_address(" 1_000 ").ok(), Some(1000));
        assert!(parse_address("0xzz").is_err());
        assert!(parse_address("").is_err());
    }

    #[test]
    fn catalog_tools_registered_without_engine() {
        let registry = build_registry(None, &Shutdown::new());
        assert!(registry.contains("tool_catalog"));
        assert!(registry.contains("tool_help"));
        assert!(registry.contains("exit_server"));
        assert!(!registry.contains("open_database"));
    }

    #[test]
    fn exit_server_closes_sessions_then_requests_shutdown() {
        let sessions = Arc::new(SessionManager::new(Arc::new(ImageEngine::new())));
        let shutdown = Shutdown::new();
        let registry = build_registry(Some(Arc::clone(&sessions)), &shutdown);
        let file = sample();
        sessions
            .open(&file.path().display().to_string(), false, None)
            .expect("open");

        let reply = payload(&call(&registry, "exit_server", json!({"code": 4})));
        assert_eq!(reply["success"], json!(true));
        assert_eq!(reply["closed_sessions"], json!(1));
        assert!(sessions.list().is_empty());
        assert!(shutdown.is_requested());
        assert!(shutdown.token().is_cancelled());
        assert_eq!(shutdown.exit_code(), 4);
    }

    #[test]
    fn exit_server_without_engine_defaults_to_zero() {
        let shutdown = Shutdown::new();
        let registry = build_registry(None, &shutdown);
        let reply = payload(&call(&registry, "exit_server", json!({})));
        assert_eq!(reply["closed_sessions"], json!(0));
        assert!(shutdown.is_requested());
        assert_eq!(shutdown.exit_code(), 0);
    }

    #[test]
    fn every_registered_tool_is_in_catalog() {
        let (registry, _) = with_engine();
        for tool in registry.tools() {
            assert!(catalog::get_tool(&tool.name).is_some(), "{}", tool.name);
            assert!(tool_params_schema(&tool.name).is_some(), "{}", tool.name);
        }
        assert_eq!(registry.tools().len(), catalog::TOOL_CATALOG.len());
    }

    #[test]
    fn open_then_inspect_current_database() {
        let (registry, _) = with_engine();
        let file = sample();
        let opened = payload(&call(
            &registry,
            "open_database",
            json!({"input_path": file.path(), "session_id": "elf"}),
        ));
        assert_eq!(opened["success"], json!(true));
        assert_eq!(opened["session"]["session_id"], json!("elf"));
        assert_eq!(opened["session"]["is_current"], json!(true));

        let info = payload(&call(&registry, "database_info", json!({})));
        assert_eq!(info["format"], json!("elf"));
        assert_eq!(info["bits"], json!(64));

        let bytes = payload(&call(&registry, "get_bytes", json!({"offset": "0x0", "size": 4})));
        assert_eq!(bytes["bytes"], json!("7f454c46"));

        let strings = payload(&call(&registry, "strings", json!({"filter": "ERROR"})));
        assert_eq!(strings["total"], json!(2));

        let found = payload(&call(&registry, "find_regex", json!({"pattern": "^https?://"})));
        assert_eq!(found["n"], json!(1));
        assert_eq!(found["matches"][0]["string"], json!("http://example.com"));
    }

    #[test]
    fn close_unknown_session_reports_failure_without_error_flag() {
        let (registry, _) = with_engine();
        let response = call(&registry, "close_database", json!({"session_id": "ghost"}));
        assert_ne!(response["result"]["isError"], json!(true));
        assert_eq!(payload(&response)["success"], json!(false));
    }

    #[test]
    fn switch_unknown_session_is_tool_error() {
        let (registry, _) = with_engine();
        let response = call(&registry, "switch_database", json!({"session_id": "ghost"}));
        assert_eq!(response["result"]["isError"], json!(true));
    }

    #[test]
    fn strings_paginate_with_next_offset() {
        let (registry, sessions) = with_engine();
        let file = sample();
        sessions
            .open(&file.path().display().to_string(), true, None)
            .expect("open");
        let page = payload(&call(&registry, "strings", json!({"offset": 0, "limit": 1})));
        assert_eq!(page["strings"].as_array().map(Vec::len), Some(1));
        assert_eq!(page["next_offset"], json!(1));
        let last = payload(&call(&registry, "strings", json!({"offset": 2, "limit": 5})));
        assert_eq!(last["next_offset"], Value::Null);
    }

    #[test]
    fn invalid_regex_is_tool_error() {
        let (registry, sessions) = with_engine();
        let file = sample();
        sessions
            .open(&file.path().display().to_string(), true, None)
            .expect("open");
        let response = call(&registry, "find_regex", json!({"pattern": "("}));
        assert_eq!(response["result"]["isError"], json!(true));
    }

    #[test]
    fn session_bound_tools_fault_without_current_session() {
        let (registry, _) = with_engine();
        let request = Request::from_value(&json!({
            "id": 1, "method": "tools/call", "params": {"name": "database_info"}
        }))
        .expect("envelope");
        let fault = registry.dispatch(&request).expect_err("no current session");
        assert_eq!(fault.tool, "database_info");
    }

    #[test]
    fn tool_help_includes_schema() {
        let registry = build_registry(None, &Shutdown::new());
        let help = payload(&call(&registry, "tool_help", json!({"name": "get_bytes"})));
        assert!(help["parameters"]["properties"]["size"].is_object());

        let missing = payload(&call(&registry, "tool_help", json!({"name": "bytes"})));
        assert!(missing["suggestions"]
            .as_array()
            .is_some_and(|s| s.contains(&json!("get_bytes"))));
    }

    #[test]
    fn tool_catalog_rejects_unknown_category() {
        let registry = build_registry(None, &Shutdown::new());
        let response = call(&registry, "tool_catalog", json!({"category": "debugger"}));
        assert_eq!(response["result"]["isError"], json!(true));
    }
}
