//! MCP router and multi-session manager for binary analysis.
//!
//! Clients speak JSON-RPC (MCP) to this process over stdio or HTTP. For every
//! request the [`Router`] decides whether to answer it in-process, against a
//! database managed by the [`SessionManager`], or to forward it to a separately
//! running remote instance.
//!
//! # Architecture
//!
//! ```text
//! transport (stdio lines | POST /mcp)
//!     └─▶ Router ── RoutingPolicy: handshake / discovery / session-open / bound
//!           ├─▶ ToolRegistry (blocking pool) ─▶ SessionManager ─▶ AnalysisEngine
//!           └─▶ RemoteClient ── POST http://host:port/mcp
//! ```
//!
//! # Tools
//!
//! ## Sessions
//! - `open_database`, `close_database`, `switch_database`
//! - `list_databases`, `current_database`, `analyze_database`
//!
//! ## Inspection
//! - `database_info`, `analysis_status`
//! - `get_bytes`, `strings`, `find_regex`
//!
//! ## Discovery and lifecycle
//! - `tool_catalog`, `tool_help`, `exit_server`

use std::path::PathBuf;

pub mod catalog;
pub mod config;
pub mod engine;
pub mod error;
pub mod lifecycle;
pub mod protocol;
pub mod registry;
pub mod router;
pub mod server;
pub mod session;
pub mod transport;

pub use catalog::{ToolCategory, ToolInfo, TOOL_CATALOG};
pub use config::{ConfigError, RouterConfig, RouterFlags, RoutingMode};
pub use engine::{AnalysisEngine, Database, EngineError, ImageEngine};
pub use error::ToolError;
pub use lifecycle::Shutdown;
pub use protocol::{Request, RequestId, Response};
pub use registry::ToolRegistry;
pub use router::{LocalOutcome, Router};
pub use server::build_registry;
pub use session::{SessionError, SessionInfo, SessionManager};

/// Expand `~/` prefix to the user's home directory.
pub fn expand_path(path: &str) -> PathBuf {
    path.strip_prefix("~/")
        .and_then(|stripped| std::env::var_os("HOME").map(|h| PathBuf::from(h).join(stripped)))
        .unwrap_or_else(|| PathBuf::from(path))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn expand_path_leaves_plain_paths_alone() {
        assert_eq!(expand_path("/bin/ls"), PathBuf::from("/bin/ls"));
        assert_eq!(expand_path("rel/~/x"), PathBuf::from("rel/~/x"));
    }

    #[test]
    fn expand_path_resolves_home() {
        if let Some(home) = std::env::var_os("HOME") {
            assert_eq!(expand_path("~/bin"), PathBuf::from(home).join("bin"));
        }
    }
}
