//! End-to-end routing: a front router forwarding to a headless peer served
//! over HTTP, plus the multi-session workflow through the public API.

use bindb_mcp::config::RouterFlags;
use bindb_mcp::transport::{serve_http, DEFAULT_ALLOWED_ORIGINS};
use bindb_mcp::{
    build_registry, ImageEngine, RequestId, Response, Router, RouterConfig, SessionManager,
    Shutdown,
};
use serde_json::{json, Value};
use std::collections::HashSet;
use std::io::Write;
use std::sync::Arc;
use tempfile::NamedTempFile;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

fn binary(contents: &[u8]) -> NamedTempFile {
    let mut file = NamedTempFile::new().expect("tempfile");
    file.write_all(contents).expect("write");
    file.flush().expect("flush");
    file
}

fn engine_sessions() -> Arc<SessionManager> {
    Arc::new(SessionManager::new(Arc::new(ImageEngine::new())))
}

fn router(flags: RouterFlags, sessions: Option<Arc<SessionManager>>) -> Router {
    let config = RouterConfig::from_flags(&flags).expect("config");
    let registry = Arc::new(build_registry(sessions.clone(), &Shutdown::new()));
    Router::new(&config, registry, sessions).expect("router")
}

/// Start a headless peer with `file` open. Returns its base URL.
async fn start_peer(file: &NamedTempFile) -> (String, CancellationToken) {
    let sessions = engine_sessions();
    sessions
        .open(file.path().to_str().expect("utf8 path"), true, None)
        .expect("open on peer");
    let peer = router(
        RouterFlags {
            headless: true,
            ..RouterFlags::default()
        },
        Some(sessions),
    );

    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let base = format!("http://{}", listener.local_addr().expect("addr"));
    let origins: HashSet<String> = DEFAULT_ALLOWED_ORIGINS
        .iter()
        .map(|s| s.to_string())
        .collect();
    let cancel = CancellationToken::new();
    tokio::spawn(serve_http(
        listener,
        Arc::new(peer),
        Arc::new(origins),
        cancel.clone(),
    ));
    (base, cancel)
}

async fn dead_endpoint() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let port = listener.local_addr().expect("addr").port();
    drop(listener);
    format!("http://127.0.0.1:{port}")
}

fn call(id: i64, tool: &str, arguments: Value) -> Value {
    json!({
        "jsonrpc": "2.0",
        "id": id,
        "method": "tools/call",
        "params": {"name": tool, "arguments": arguments},
    })
}

/// Decode the JSON text payload of a successful tool result.
fn payload(response: &Response) -> Value {
    assert!(response.error.is_none(), "unexpected error: {response:?}");
    let result = response.result.as_ref().expect("result");
    assert_ne!(result["isError"], json!(true), "tool failed: {result}");
    let text = result["content"][0]["text"].as_str().expect("text content");
    serde_json::from_str(text).expect("json payload")
}

async fn ask(router: &Router, document: Value) -> Response {
    router.handle(document).await.expect("reply")
}

fn file_name(file: &NamedTempFile) -> String {
    file.path()
        .file_name()
        .and_then(|n| n.to_str())
        .expect("file name")
        .to_string()
}

#[tokio::test]
async fn remote_mode_forwards_to_peer() {
    let file = binary(b"peer-side contents with a printable string");
    let (base, cancel) = start_peer(&file).await;
    let front = router(
        RouterFlags {
            rpc_only: true,
            remote: base,
            forward_timeout_secs: 5,
            ..RouterFlags::default()
        },
        None,
    );

    let tools = ask(&front, json!({"jsonrpc": "2.0", "id": 1, "method": "tools/list"})).await;
    let names: Vec<&str> = tools.result.as_ref().expect("result")["tools"]
        .as_array()
        .expect("tools")
        .iter()
        .filter_map(|t| t["name"].as_str())
        .collect();
    assert!(names.contains(&"get_bytes"));

    let current = ask(&front, call(2, "current_database", json!({}))).await;
    assert_eq!(current.id, Some(RequestId::from(2)));
    let session = payload(&current);
    assert!(session["input_path"]
        .as_str()
        .expect("input_path")
        .ends_with(&file_name(&file)));

    let bytes = ask(&front, call(3, "get_bytes", json!({"offset": "0x0", "size": 4}))).await;
    assert_eq!(payload(&bytes)["bytes"], json!("70656572"));

    cancel.cancel();
}

#[tokio::test]
async fn hybrid_without_session_uses_peer_then_local() {
    let peer_file = binary(b"remote database bytes");
    let local_file = binary(b"local database bytes");
    let (base, cancel) = start_peer(&peer_file).await;
    let front = router(
        RouterFlags {
            remote: base,
            forward_timeout_secs: 5,
            ..RouterFlags::default()
        },
        Some(engine_sessions()),
    );

    // Handshake never leaves the process.
    let init = ask(&front, json!({"jsonrpc": "2.0", "id": 1, "method": "initialize"})).await;
    assert!(init.result.is_some());

    let remote = payload(&ask(&front, call(2, "current_database", json!({}))).await);
    assert!(remote["input_path"]
        .as_str()
        .expect("input_path")
        .ends_with(&file_name(&peer_file)));

    let opened = payload(
        &ask(
            &front,
            call(
                3,
                "open_database",
                json!({"input_path": local_file.path().to_str().expect("utf8")}),
            ),
        )
        .await,
    );
    assert_eq!(opened["success"], json!(true));

    let local = payload(&ask(&front, call(4, "current_database", json!({}))).await);
    assert!(local["input_path"]
        .as_str()
        .expect("input_path")
        .ends_with(&file_name(&local_file)));

    cancel.cancel();
}

#[tokio::test]
async fn unreachable_peer_yields_forward_error() {
    let front = router(
        RouterFlags {
            remote: dead_endpoint().await,
            forward_timeout_secs: 2,
            ..RouterFlags::default()
        },
        Some(engine_sessions()),
    );

    let reply = ask(&front, call(7, "database_info", json!({}))).await;
    assert_eq!(reply.id, Some(RequestId::from(7)));
    let error = reply.error.expect("error");
    assert_eq!(error.code.0, -32000);
    assert!(error.message.contains("open_database"));

    let silent = front
        .handle(json!({"jsonrpc": "2.0", "method": "notifications/cancelled"}))
        .await;
    assert!(silent.is_none());
}

#[tokio::test]
async fn multi_session_workflow() {
    let a = binary(b"first binary AAAA contents");
    let b = binary(b"second binary BBBB contents");
    let sessions = engine_sessions();
    let front = router(
        RouterFlags {
            headless: true,
            ..RouterFlags::default()
        },
        Some(Arc::clone(&sessions)),
    );

    let open = |id: i64, file: &NamedTempFile| {
        call(
            id,
            "open_database",
            json!({"input_path": file.path().to_str().expect("utf8"), "run_auto_analysis": false}),
        )
    };
    let id_a = payload(&ask(&front, open(1, &a)).await)["session"]["session_id"]
        .as_str()
        .expect("id a")
        .to_string();
    let id_b = payload(&ask(&front, open(2, &b)).await)["session"]["session_id"]
        .as_str()
        .expect("id b")
        .to_string();
    assert_ne!(id_a, id_b);

    let switched = payload(&ask(&front, call(3, "switch_database", json!({"session_id": id_a}))).await);
    assert_eq!(switched["session"]["session_id"], json!(id_a));

    let listed = payload(&ask(&front, call(4, "list_databases", json!({}))).await);
    assert_eq!(listed["count"], json!(2));
    assert_eq!(listed["current_session_id"], json!(id_a));
    for session in listed["sessions"].as_array().expect("sessions") {
        let is_a = session["session_id"] == json!(id_a);
        assert_eq!(session["is_current"], json!(is_a));
    }

    let closed = payload(&ask(&front, call(5, "close_database", json!({"session_id": id_a}))).await);
    assert_eq!(closed["success"], json!(true));

    let listed = payload(&ask(&front, call(6, "list_databases", json!({}))).await);
    assert_eq!(listed["count"], json!(1));
    assert_eq!(listed["current_session_id"], Value::Null);

    // Headless: a call needing a current session is a local error, not a forward.
    let no_current = ask(&front, call(7, "database_info", json!({}))).await;
    assert_eq!(no_current.error.expect("error").code.0, -32603);

    assert_eq!(sessions.close_all(), 1);
    let listed = payload(&ask(&front, call(8, "list_databases", json!({}))).await);
    assert_eq!(listed["count"], json!(0));
}
