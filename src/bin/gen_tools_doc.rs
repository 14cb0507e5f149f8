use bindb_mcp::{ToolCategory, ToolInfo, TOOL_CATALOG};
use std::collections::HashMap;
use std::fmt::Write as _;

fn category_title(cat: ToolCategory) -> &'static str {
    match cat {
        ToolCategory::Core => "Core",
        ToolCategory::Sessions => "Sessions",
        ToolCategory::Metadata => "Metadata",
        ToolCategory::Memory => "Memory",
        ToolCategory::Search => "Search",
    }
}

fn main() {
    let mut groups: HashMap<ToolCategory, Vec<&ToolInfo>> = HashMap::new();
    for tool in TOOL_CATALOG {
        groups.entry(tool.category).or_default().push(tool);
    }

    let mut out = String::new();
    let _ = writeln!(out, "# Tools\n");
    let _ = writeln!(
        out,
        "> Auto-generated from `src/catalog.rs`. Do not edit by hand."
    );
    let _ = writeln!(
        out,
        "> Regenerate with: `cargo run --bin gen_tools_doc -- docs/TOOLS.md`.\n"
    );

    let _ = writeln!(out, "## Routing\n");
    let _ = writeln!(
        out,
        "- `initialize`, `ping`, `notifications/*` and `exit_server` are always answered locally"
    );
    let _ = writeln!(
        out,
        "- Discovery (`tools/list`, ...) and `open_database` run locally whenever an engine is available"
    );
    let _ = writeln!(
        out,
        "- Other tool calls run locally while a session is current and are forwarded to the remote instance otherwise"
    );
    let _ = writeln!(
        out,
        "- Tools marked *engine* are only registered when a local engine is available\n"
    );

    for &cat in ToolCategory::all() {
        let Some(tools) = groups.get(&cat) else {
            continue;
        };
        let _ = writeln!(out, "## {} (`{}`)\n", category_title(cat), cat.as_str());
        let _ = writeln!(out, "{}\n", cat.description());
        let _ = writeln!(out, "| Tool | Description | Needs |");
        let _ = writeln!(out, "|------|-------------|-------|");
        for tool in tools {
            let needs = if tool.needs_engine { "engine" } else { "" };
            let _ = writeln!(out, "| `{}` | {} | {} |", tool.name, tool.short_desc, needs);
        }
        let _ = writeln!(out);
    }

    let _ = writeln!(out, "## Notes\n");
    let _ = writeln!(
        out,
        "- Offsets accept decimal (`4096`), hex (`0x1000`), binary (`0b1`) or octal (`0o7`)"
    );
    let _ = writeln!(
        out,
        "- Tools without a `session_id` parameter operate on the current session"
    );

    let args: Vec<String> = std::env::args().collect();
    if args.len() > 1 {
        if let Err(err) = std::fs::write(&args[1], out) {
            eprintln!("failed to write {}: {}", args[1], err);
            std::process::exit(1);
        }
    } else {
        print!("{out}");
    }
}
