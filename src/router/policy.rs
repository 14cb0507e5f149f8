//! Destination selection.

use crate::config::RoutingMode;
use crate::protocol::Request;

/// Method names the router treats specially.
#[derive(Debug, Clone)]
pub struct RoutingPolicy {
    pub handshake: &'static [&'static str],
    pub notification_prefix: &'static str,
    pub discovery: &'static [&'static str],
    pub session_open_tool: &'static str,
    /// Tools acting on this process itself; never forwarded.
    pub process_tools: &'static [&'static str],
}

impl Default for RoutingPolicy {
    fn default() -> Self {
        Self {
            handshake: &["initialize", "ping"],
            notification_prefix: "notifications/",
            discovery: &[
                "tools/list",
                "resources/list",
                "resources/templates/list",
                "prompts/list",
            ],
            session_open_tool: "open_database",
            process_tools: &["exit_server"],
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MethodClass {
    /// Protocol handshake and liveness; never leaves the process.
    Handshake,
    Notification,
    /// `tools/call` of a tool that controls this process.
    Process,
    Discovery,
    /// `tools/call` of the session-opening tool.
    SessionOpen,
    /// Anything that needs an open database.
    SessionBound,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    /// Answered by the local registry regardless of mode.
    Protocol,
    Local,
    Remote,
}

impl RoutingPolicy {
    pub fn classify(&self, request: &Request) -> MethodClass {
        let method = request.method.as_str();
        if self.handshake.contains(&method) {
            MethodClass::Handshake
        } else if method.starts_with(self.notification_prefix) {
            MethodClass::Notification
        } else if self.discovery.contains(&method) {
            MethodClass::Discovery
        } else if method == "tools/call" && request.tool_name() == Some(self.session_open_tool) {
            MethodClass::SessionOpen
        } else if method == "tools/call"
            && request
                .tool_name()
                .is_some_and(|name| self.process_tools.contains(&name))
        {
            MethodClass::Process
        } else {
            MethodClass::SessionBound
        }
    }
}

/// Pick a destination for a request of class `class`.
pub fn route(
    mode: RoutingMode,
    engine_available: bool,
    class: MethodClass,
    has_current: bool,
) -> Route {
    match class {
        MethodClass::Handshake | MethodClass::Notification | MethodClass::Process => {
            return Route::Protocol
        }
        _ if mode == RoutingMode::Remote || !engine_available => return Route::Remote,
        _ => {}
    }
    let local = mode == RoutingMode::Headless
        || matches!(class, MethodClass::Discovery | MethodClass::SessionOpen)
        || has_current;
    if local {
        Route::Local
    } else {
        Route::Remote
    }
}
