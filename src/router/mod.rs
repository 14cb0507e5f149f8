//! Request router.
//!
//! Each request is either answered by the local [`ToolRegistry`] or forwarded
//! to the remote peer. Local dispatch runs on the blocking pool because engine
//! calls block. A local *backend fault* (no usable database) falls through to
//! the remote peer unless the router runs headless.

mod policy;
mod remote;

pub use policy::{route, MethodClass, Route, RoutingPolicy};
pub use remote::{ForwardError, RemoteClient};

use crate::config::{RouterConfig, RoutingMode};
use crate::protocol::{Request, Response, FORWARD_FAILED};
use crate::registry::ToolRegistry;
use crate::session::SessionManager;
use rmcp::ErrorData as McpError;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{debug, error, warn};

/// Result of trying the local backend.
#[derive(Debug)]
pub enum LocalOutcome {
    /// The registry produced the final answer (possibly none, for notifications).
    Answered(Option<Response>),
    /// The local backend could not serve the request.
    Fault(String),
}

pub struct Router {
    policy: RoutingPolicy,
    mode: RoutingMode,
    registry: Arc<ToolRegistry>,
    sessions: Option<Arc<SessionManager>>,
    remote: RemoteClient,
}

impl Router {
    pub fn new(
        config: &RouterConfig,
        registry: Arc<ToolRegistry>,
        sessions: Option<Arc<SessionManager>>,
    ) -> Result<Self, reqwest::Error> {
        let remote = RemoteClient::new(config.remote.clone(), config.forward_timeout)?;
        Ok(Self {
            policy: RoutingPolicy::default(),
            mode: config.mode,
            registry,
            sessions,
            remote,
        })
    }

    pub fn mode(&self) -> RoutingMode {
        self.mode
    }

    pub fn sessions(&self) -> Option<&Arc<SessionManager>> {
        self.sessions.as_ref()
    }

    /// Handle one JSON document. Returns `None` when no reply is due.
    pub async fn handle(&self, document: Value) -> Option<Response> {
        let request = match Request::from_value(&document) {
            Ok(request) => request,
            Err(invalid) => {
                warn!(reason = %invalid.reason, "Invalid request envelope");
                return Some(invalid.into_response());
            }
        };

        let class = self.policy.classify(&request);
        let has_current = self.sessions.as_ref().is_some_and(|s| s.has_current());
        let destination = route(self.mode, self.sessions.is_some(), class, has_current);
        debug!(
            method = %request.method,
            id = ?request.id,
            ?class,
            ?destination,
            "Routing request"
        );

        match destination {
            Route::Protocol | Route::Local => match self.dispatch_local(request.clone()).await {
                LocalOutcome::Answered(response) => response,
                LocalOutcome::Fault(reason) if self.mode == RoutingMode::Headless => {
                    request.id.clone().map(|id| {
                        Response::failure(Some(id), McpError::internal_error(reason, None))
                    })
                }
                LocalOutcome::Fault(reason) => {
                    debug!(method = %request.method, %reason, "Local backend fault, forwarding");
                    self.forward(&request, &document).await
                }
            },
            Route::Remote => self.forward(&request, &document).await,
        }
    }

    async fn dispatch_local(&self, request: Request) -> LocalOutcome {
        let registry = Arc::clone(&self.registry);
        let id = request.id.clone();
        let method = request.method.clone();
        match tokio::task::spawn_blocking(move || registry.dispatch(&request)).await {
            Ok(Ok(response)) => LocalOutcome::Answered(response),
            Ok(Err(fault)) => LocalOutcome::Fault(fault.to_string()),
            Err(join) => {
                error!(%method, error = %join, "Local handler panicked");
                LocalOutcome::Answered(id.map(|id| {
                    Response::failure(
                        Some(id),
                        McpError::internal_error(format!("Handler for {method} failed"), None),
                    )
                }))
            }
        }
    }

    async fn forward(&self, request: &Request, document: &Value) -> Option<Response> {
        match self.remote.forward(document).await {
            Ok(Some(mut response)) => {
                if request.is_notification() {
                    return None;
                }
                if response.id.is_none() {
                    response.id = request.id.clone();
                }
                Some(response)
            }
            Ok(None) => {
                if !request.is_notification() {
                    warn!(method = %request.method, "Remote accepted a request without replying");
                }
                None
            }
            Err(e) => {
                warn!(method = %request.method, error = %e, "Forwarding failed");
                let id = request.id.clone()?;
                Some(Response::failure(
                    Some(id),
                    McpError::new(
                        FORWARD_FAILED,
                        self.forward_failure_message(&e),
                        Some(json!(e.to_string())),
                    ),
                ))
            }
        }
    }

    fn forward_failure_message(&self, e: &ForwardError) -> String {
        let endpoint = self.remote.endpoint();
        if !e.is_unreachable() {
            return format!(
                "Remote instance at {endpoint} was reached but failed to answer the request."
            );
        }
        match &self.sessions {
            None => format!(
                "No local analysis engine is available and the remote instance at {endpoint} \
                 is unreachable. Start the remote instance or run with a local engine."
            ),
            Some(_) => format!(
                "No local session is open and the remote instance at {endpoint} is unreachable. \
                 Use open_database to load a binary locally."
            ),
        }
    }
}
