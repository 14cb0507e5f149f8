//! `POST /mcp` HTTP listener.

use super::handle_document;
use crate::router::Router;
use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper::body::Incoming;
use hyper::header::{HeaderValue, ALLOW, CONTENT_TYPE, ORIGIN};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Method, Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use std::collections::HashSet;
use std::convert::Infallible;
use std::io;
use std::sync::Arc;
use tokio::net::TcpListener;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, info, warn};

pub const DEFAULT_ALLOWED_ORIGINS: &[&str] = &["http://localhost", "http://127.0.0.1"];

const MCP_PATH: &str = "/mcp";

/// How long open connections may finish their response after cancellation.
const DRAIN_GRACE: Duration = Duration::from_secs(2);

fn reply(status: StatusCode, content_type: &'static str, body: impl Into<Bytes>) -> Response<Full<Bytes>> {
    let mut response = Response::new(Full::new(body.into()));
    *response.status_mut() = status;
    response
        .headers_mut()
        .insert(CONTENT_TYPE, HeaderValue::from_static(content_type));
    response
}

fn empty(status: StatusCode) -> Response<Full<Bytes>> {
    let mut response = Response::new(Full::new(Bytes::new()));
    *response.status_mut() = status;
    response
}

async fn handle_request(
    req: Request<Incoming>,
    router: Arc<Router>,
    allowed_origins: Arc<HashSet<String>>,
) -> Result<Response<Full<Bytes>>, Infallible> {
    if let Some(origin) = req.headers().get(ORIGIN).and_then(|v| v.to_str().ok()) {
        if !allowed_origins.contains(origin) {
            warn!(origin, "Rejected request from disallowed origin");
            return Ok(reply(StatusCode::FORBIDDEN, "text/plain", "Forbidden"));
        }
    }
    if req.uri().path() != MCP_PATH {
        return Ok(reply(StatusCode::NOT_FOUND, "text/plain", "Not Found"));
    }
    if req.method() != Method::POST {
        let mut response = reply(StatusCode::METHOD_NOT_ALLOWED, "text/plain", "Method Not Allowed");
        response
            .headers_mut()
            .insert(ALLOW, HeaderValue::from_static("POST"));
        return Ok(response);
    }

    let body = match req.into_body().collect().await {
        Ok(collected) => collected.to_bytes(),
        Err(e) => {
            debug!(error = %e, "Failed to read request body");
            return Ok(reply(StatusCode::BAD_REQUEST, "text/plain", "Bad Request"));
        }
    };

    let Some(response) = handle_document(&router, &body).await else {
        return Ok(empty(StatusCode::ACCEPTED));
    };
    let status = match &response.error {
        Some(e) if e.code.0 == -32700 => StatusCode::BAD_REQUEST,
        _ => StatusCode::OK,
    };
    match serde_json::to_vec(&response) {
        Ok(json) => Ok(reply(status, "application/json", json)),
        Err(e) => {
            warn!(error = %e, "Failed to encode response");
            Ok(empty(StatusCode::INTERNAL_SERVER_ERROR))
        }
    }
}

/// Accept connections on `listener` until `cancel` fires, then let open
/// connections finish for up to [`DRAIN_GRACE`].
pub async fn serve_http(
    listener: TcpListener,
    router: Arc<Router>,
    allowed_origins: Arc<HashSet<String>>,
    cancel: CancellationToken,
) -> io::Result<()> {
    if let Ok(addr) = listener.local_addr() {
        info!("MCP HTTP server listening on http://{addr}{MCP_PATH}");
    }

    let connections = TaskTracker::new();
    loop {
        let (stream, peer) = tokio::select! {
            _ = cancel.cancelled() => break,
            accepted = listener.accept() => accepted?,
        };
        debug!(%peer, "Accepted connection");

        let router = Arc::clone(&router);
        let allowed_origins = Arc::clone(&allowed_origins);
        let cancel = cancel.clone();
        connections.spawn(async move {
            let service = service_fn(move |req| {
                handle_request(req, Arc::clone(&router), Arc::clone(&allowed_origins))
            });
            let conn = http1::Builder::new().serve_connection(TokioIo::new(stream), service);
            tokio::pin!(conn);
            tokio::select! {
                res = conn.as_mut() => {
                    if let Err(err) = res {
                        debug!("http connection error: {err}");
                    }
                }
                _ = cancel.cancelled() => {
                    conn.as_mut().graceful_shutdown();
                    if let Err(err) = conn.await {
                        debug!("http connection error during shutdown: {err}");
                    }
                }
            }
        });
    }

    info!(open = connections.len(), "HTTP server shutting down");
    connections.close();
    if tokio::time::timeout(DRAIN_GRACE, connections.wait()).await.is_err() {
        warn!(open = connections.len(), "Connections still open after shutdown grace");
    }
    Ok(())
}
