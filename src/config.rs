//! Router configuration, validated once at startup.

use reqwest::Url;
use std::fmt;
use std::time::Duration;
use thiserror::Error;

pub const DEFAULT_REMOTE: &str = "http://127.0.0.1:13337";
pub const DEFAULT_FORWARD_TIMEOUT_SECS: u64 = 30;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("--headless and --rpc-only are mutually exclusive")]
    BothModes,
    #[error("--headless requires a local analysis engine")]
    HeadlessWithoutEngine,
    #[error("Invalid remote endpoint {0:?}: expected http(s)://host:port")]
    InvalidRemote(String),
    #[error("Forward timeout must be at least one second")]
    ZeroTimeout,
}

/// Where requests that are not protocol-level go.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoutingMode {
    /// Local when possible, remote otherwise, with fallback on backend faults.
    Hybrid,
    /// Always local; faults are final.
    Headless,
    /// Always remote.
    Remote,
}

impl fmt::Display for RoutingMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RoutingMode::Hybrid => write!(f, "hybrid"),
            RoutingMode::Headless => write!(f, "headless"),
            RoutingMode::Remote => write!(f, "remote"),
        }
    }
}

/// Remote peer endpoint. Requests are POSTed to `<base>/mcp`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteEndpoint {
    url: Url,
}

impl RemoteEndpoint {
    /// Parse `scheme://host:port`. Any path on the input is replaced by `/mcp`.
    pub fn parse(input: &str) -> Result<Self, ConfigError> {
        let invalid = || ConfigError::InvalidRemote(input.to_string());
        let mut url = Url::parse(input.trim()).map_err(|_| invalid())?;
        if !matches!(url.scheme(), "http" | "https") || url.host_str().is_none() {
            return Err(invalid());
        }
        if url.port_or_known_default().is_none() {
            return Err(invalid());
        }
        url.set_path("/mcp");
        url.set_query(None);
        url.set_fragment(None);
        Ok(Self { url })
    }

    pub fn url(&self) -> &Url {
        &self.url
    }
}

impl fmt::Display for RemoteEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.url)
    }
}

/// Raw routing flags as given on the command line.
#[derive(Debug, Clone)]
pub struct RouterFlags {
    pub headless: bool,
    pub rpc_only: bool,
    pub engine_enabled: bool,
    pub remote: String,
    pub forward_timeout_secs: u64,
}

impl Default for RouterFlags {
    fn default() -> Self {
        Self {
            headless: false,
            rpc_only: false,
            engine_enabled: true,
            remote: DEFAULT_REMOTE.to_string(),
            forward_timeout_secs: DEFAULT_FORWARD_TIMEOUT_SECS,
        }
    }
}

#[derive(Debug, Clone)]
pub struct RouterConfig {
    pub mode: RoutingMode,
    pub engine_enabled: bool,
    pub remote: RemoteEndpoint,
    pub forward_timeout: Duration,
}

impl RouterConfig {
    pub fn from_flags(flags: &RouterFlags) -> Result<Self, ConfigError> {
        let mode = match (flags.headless, flags.rpc_only) {
            (true, true) => return Err(ConfigError::BothModes),
            (true, false) if !flags.engine_enabled => {
                return Err(ConfigError::HeadlessWithoutEngine)
            }
            (true, false) => RoutingMode::Headless,
            (false, true) => RoutingMode::Remote,
            (false, false) => RoutingMode::Hybrid,
        };
        if flags.forward_timeout_secs == 0 {
            return Err(ConfigError::ZeroTimeout);
        }
        Ok(Self {
            mode,
            engine_enabled: flags.engine_enabled,
            remote: RemoteEndpoint::parse(&flags.remote)?,
            forward_timeout: Duration::from_secs(flags.forward_timeout_secs),
        })
    }
}
