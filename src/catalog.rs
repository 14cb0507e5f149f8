//! Static tool catalog for discovery.
//!
//! Every tool is listed in tools/list; the catalog adds longer descriptions,
//! examples and keywords that `tool_catalog` and `tool_help` search.

use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Tool category for grouping related tools
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolCategory {
    /// Catalog, help and shutdown (always available)
    Core,
    /// Opening, closing and switching databases
    Sessions,
    /// Database info and analysis state
    Metadata,
    /// Raw bytes and extracted strings
    Memory,
    /// Pattern search
    Search,
}

impl ToolCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Core => "core",
            Self::Sessions => "sessions",
            Self::Metadata => "metadata",
            Self::Memory => "memory",
            Self::Search => "search",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            Self::Core => "Tool discovery, help and server shutdown",
            Self::Sessions => "Open, close, switch and list analysis databases",
            Self::Metadata => "Binary format, architecture and analysis status",
            Self::Memory => "Read bytes and printable strings",
            Self::Search => "Search extracted strings with regular expressions",
        }
    }

    pub fn all() -> &'static [ToolCategory] {
        &[
            Self::Core,
            Self::Sessions,
            Self::Metadata,
            Self::Memory,
            Self::Search,
        ]
    }
}

impl FromStr for ToolCategory {
    type Err = ();

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        let normalized = input.trim().to_lowercase().replace(['-', ' '], "_");
        match normalized.as_str() {
            "core" | "help" | "lifecycle" => Ok(Self::Core),
            "sessions" | "session" | "databases" | "database" => Ok(Self::Sessions),
            "metadata" | "meta" | "info" => Ok(Self::Metadata),
            "memory" | "data" | "bytes" => Ok(Self::Memory),
            "search" => Ok(Self::Search),
            _ => Err(()),
        }
    }
}

/// Metadata for a single tool
#[derive(Debug, Clone)]
pub struct ToolInfo {
    pub name: &'static str,
    pub category: ToolCategory,
    /// Short description (1 line, <100 chars) - used in tool_catalog results
    pub short_desc: &'static str,
    /// Full description with usage details - used in tool_help
    pub full_desc: &'static str,
    /// Example invocation (JSON)
    pub example: &'static str,
    /// Whether the tool needs a local analysis engine
    pub needs_engine: bool,
    /// Keywords for search
    pub keywords: &'static [&'static str],
}

/// Static catalog of all tools
pub static TOOL_CATALOG: &[ToolInfo] = &[
    // === CORE ===
    ToolInfo {
        name: "tool_catalog",
        category: ToolCategory::Core,
        short_desc: "Search the available tools",
        full_desc: "Search the tool catalog by free-text query and/or category. \
                    Without a query, lists every tool (optionally restricted to one category) \
                    together with the category descriptions. Results include the names of \
                    matched keywords so you can see why a tool was suggested.",
        example: r#"{"query": "read bytes", "limit": 5}"#,
        needs_engine: false,
        keywords: &["catalog", "discover", "tools", "search", "list", "help"],
    },
    ToolInfo {
        name: "tool_help",
        category: ToolCategory::Core,
        short_desc: "Full documentation and parameter schema for one tool",
        full_desc: "Return the full description, an example invocation and the JSON schema \
                    of the parameters for a single tool.",
        example: r#"{"name": "get_bytes"}"#,
        needs_engine: false,
        keywords: &["help", "docs", "schema", "usage", "parameters"],
    },
    ToolInfo {
        name: "exit_server",
        category: ToolCategory::Core,
        short_desc: "Close every database and stop this server",
        full_desc: "Close all open sessions, reply, then stop the server process with the \
                    given exit code (default 0). Always handled by the process that \
                    receives it and never forwarded to the remote instance.",
        example: r#"{"code": 0}"#,
        needs_engine: false,
        keywords: &["exit", "quit", "shutdown", "stop", "terminate"],
    },
    // === SESSIONS ===
    ToolInfo {
        name: "open_database",
        category: ToolCategory::Sessions,
        short_desc: "Open a binary and make it the current session",
        full_desc: "Load a binary into a new analysis session and make it current. \
                    Auto-analysis runs by default; pass run_auto_analysis=false to defer it \
                    (see analyze_database). Opening a path that is already open returns the \
                    existing session and makes it current. A custom session_id may be supplied \
                    (ASCII letters, digits, '-', '_' and '.'); otherwise an 8-character id is generated. \
                    A leading ~/ is expanded to the home directory.",
        example: r#"{"input_path": "/bin/ls", "run_auto_analysis": true, "session_id": "ls"}"#,
        needs_engine: true,
        keywords: &["open", "load", "binary", "database", "session", "elf", "pe", "macho"],
    },
    ToolInfo {
        name: "close_database",
        category: ToolCategory::Sessions,
        short_desc: "Close a session and release its database",
        full_desc: "Close the session with the given id and release its database. \
                    If it was the current session, no session is current afterwards. \
                    Unknown ids are reported with success=false.",
        example: r#"{"session_id": "ls"}"#,
        needs_engine: true,
        keywords: &["close", "release", "session", "database"],
    },
    ToolInfo {
        name: "switch_database",
        category: ToolCategory::Sessions,
        short_desc: "Make another open session current",
        full_desc: "Make the session with the given id current. Tools that do not take a \
                    session id operate on the current session.",
        example: r#"{"session_id": "ls"}"#,
        needs_engine: true,
        keywords: &["switch", "select", "activate", "session", "current"],
    },
    ToolInfo {
        name: "list_databases",
        category: ToolCategory::Sessions,
        short_desc: "List open sessions",
        full_desc: "List every open session in the order it was opened, with its path, \
                    open time, analysis state and whether it is current.",
        example: r#"{}"#,
        needs_engine: true,
        keywords: &["list", "sessions", "databases", "open"],
    },
    ToolInfo {
        name: "current_database",
        category: ToolCategory::Sessions,
        short_desc: "Describe the current session",
        full_desc: "Return the descriptor of the current session, or an error if none is open.",
        example: r#"{}"#,
        needs_engine: true,
        keywords: &["current", "active", "session", "database"],
    },
    ToolInfo {
        name: "analyze_database",
        category: ToolCategory::Sessions,
        short_desc: "Run auto-analysis on a session",
        full_desc: "Run auto-analysis on the given session (or the current one) if it was \
                    opened with run_auto_analysis=false, and mark it complete.",
        example: r#"{"session_id": "ls"}"#,
        needs_engine: true,
        keywords: &["analyze", "analysis", "auto", "session"],
    },
    // === METADATA ===
    ToolInfo {
        name: "database_info",
        category: ToolCategory::Metadata,
        short_desc: "Format, architecture, size and hash of the current binary",
        full_desc: "Describe the binary loaded in the current session: container format \
                    (elf, pe, mach-o, mach-o-universal or raw), architecture, bitness, \
                    endianness, file size and SHA-256.",
        example: r#"{}"#,
        needs_engine: true,
        keywords: &["info", "metadata", "format", "architecture", "arch", "hash", "sha256"],
    },
    ToolInfo {
        name: "analysis_status",
        category: ToolCategory::Metadata,
        short_desc: "Report auto-analysis status",
        full_desc: "Report whether auto-analysis has completed for the current session, so \
                    clients can tell if analysis-dependent results are final.",
        example: r#"{}"#,
        needs_engine: true,
        keywords: &["analysis", "status", "ready", "complete"],
    },
    // === MEMORY ===
    ToolInfo {
        name: "get_bytes",
        category: ToolCategory::Memory,
        short_desc: "Read raw bytes at a file offset",
        full_desc: "Read bytes from the current binary. The offset may be a number or a \
                    string in decimal, 0x hex, 0b binary or 0o octal (underscores allowed). \
                    size defaults to 32 and is capped at 65536; reads past the end are truncated.",
        example: r#"{"offset": "0x1000", "size": 64}"#,
        needs_engine: true,
        keywords: &["bytes", "read", "hex", "dump", "memory", "offset"],
    },
    ToolInfo {
        name: "strings",
        category: ToolCategory::Memory,
        short_desc: "List printable strings (paginated)",
        full_desc: "List printable ASCII strings of at least four characters found in the \
                    current binary. Supports pagination via offset/limit (default 100, max 10000) \
                    and an optional case-insensitive substring filter.",
        example: r#"{"offset": 0, "limit": 50, "filter": "error"}"#,
        needs_engine: true,
        keywords: &["strings", "text", "ascii", "list", "filter"],
    },
    // === SEARCH ===
    ToolInfo {
        name: "find_regex",
        category: ToolCategory::Search,
        short_desc: "Search strings with a regular expression",
        full_desc: "Search the printable strings of the current binary with a \
                    case-insensitive regular expression. Paginated via offset/limit.",
        example: r#"{"pattern": "https?://", "limit": 20}"#,
        needs_engine: true,
        keywords: &["regex", "pattern", "search", "find", "strings", "match"],
    },
];

/// Get tool by name
pub fn get_tool(name: &str) -> Option<&'static ToolInfo> {
    TOOL_CATALOG.iter().find(|t| t.name == name)
}

/// Get tools by category
pub fn tools_by_category(category: ToolCategory) -> impl Iterator<Item = &'static ToolInfo> {
    TOOL_CATALOG.iter().filter(move |t| t.category == category)
}

/// Search tools by query (simple keyword matching)
pub fn search_tools(query: &str, limit: usize) -> Vec<(&'static ToolInfo, Vec<&'static str>)> {
    let query_lower = query.to_lowercase();
    let query_words: Vec<&str> = query_lower.split_whitespace().collect();

    let mut results: Vec<(&'static ToolInfo, Vec<&'static str>, usize)> = Vec::new();

    for tool in TOOL_CATALOG {
        let mut matched = Vec::new();
        let mut score = 0usize;

        for word in &query_words {
            if tool.name.contains(word) {
                score += 10;
                if !matched.contains(&"name match") {
                    matched.push("name match");
                }
            }
            if tool.short_desc.to_lowercase().contains(word) {
                score += 5;
            }
            if tool.category.as_str().contains(word) {
                score += 2;
                if !matched.contains(&tool.category.as_str()) {
                    matched.push(tool.category.as_str());
                }
            }
        }

        for &keyword in tool.keywords {
            let hits = query_words
                .iter()
                .filter(|w| keyword.contains(**w) || w.contains(keyword))
                .count();
            if hits > 0 {
                score += 3 * hits;
                if !matched.contains(&keyword) {
                    matched.push(keyword);
                }
            }
        }

        if score > 0 {
            results.push((tool, matched, score));
        }
    }

    // Stable sort keeps catalog order among equal scores.
    results.sort_by(|a, b| b.2.cmp(&a.2));
    results
        .into_iter()
        .take(limit)
        .map(|(tool, matched, _)| (tool, matched))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_search_tools() {
        let results = search_tools("read bytes", 3);
        assert_eq!(results.first().map(|(t, _)| t.name), Some("get_bytes"));
    }

    #[test]
    fn test_get_tool() {
        assert!(get_tool("open_database").is_some());
        assert!(get_tool("no_such_tool").is_none());
    }

    #[test]
    fn test_category_aliases() {
        assert_eq!("Session".parse::<ToolCategory>(), Ok(ToolCategory::Sessions));
        assert_eq!("meta".parse::<ToolCategory>(), Ok(ToolCategory::Metadata));
        assert!("debugger".parse::<ToolCategory>().is_err());
    }

    #[test]
    fn every_category_has_tools() {
        for category in ToolCategory::all() {
            assert!(tools_by_category(*category).next().is_some(), "{category:?}");
        }
    }

    #[test]
    fn names_are_unique() {
        let mut names: Vec<_> = TOOL_CATALOG.iter().map(|t| t.name).collect();
        names.sort_unstable();
        names.dedup();
        assert_eq!(names.len(), TOOL_CATALOG.len());
    }
}
