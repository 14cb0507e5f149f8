//! Transports feeding JSON documents to the router.

mod http;
mod stdio;

pub use http::{serve_http, DEFAULT_ALLOWED_ORIGINS};
pub use stdio::serve_lines;

use crate::protocol::Response;
use crate::router::Router;
use serde_json::Value;
use tracing::debug;

/// Decode one serialized document, route it and serialize the reply.
pub(crate) async fn handle_document(router: &Router, raw: &[u8]) -> Option<Response> {
    match serde_json::from_slice::<Value>(raw) {
        Ok(document) => router.handle(document).await,
        Err(e) => {
            debug!(error = %e, "Unparseable request");
            Some(Response::parse_error(e))
        }
    }
}

/// Line-oriented wrapper around [`handle_document`]. Blank lines are ignored.
pub(crate) async fn handle_line(router: &Router, line: &str) -> Option<String> {
    let line = line.trim();
    if line.is_empty() {
        return None;
    }
    let response = handle_document(router, line.as_bytes()).await?;
    serde_json::to_string(&response).ok()
}
