//! Newline-delimited JSON over a byte stream (stdin/stdout in production).

use super::handle_line;
use crate::router::Router;
use std::io;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// How long in-flight requests may finish after cancellation.
const DRAIN_GRACE: Duration = Duration::from_secs(2);

/// Serve requests read line by line from `reader` until EOF or cancellation.
///
/// Each line is handled on its own task, so replies may be written out of
/// order. On EOF in-flight requests are drained; on cancellation they get
/// [`DRAIN_GRACE`] to finish and are then aborted. Reading stops as soon as
/// the writer fails. Returns the writer once all replies are flushed.
pub async fn serve_lines<R, W>(
    reader: R,
    writer: W,
    router: Arc<Router>,
    cancel: CancellationToken,
) -> io::Result<W>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin + Send + 'static,
{
    let (tx, mut rx) = mpsc::unbounded_channel::<String>();
    let writer_task = tokio::spawn(async move {
        let mut writer = writer;
        while let Some(line) = rx.recv().await {
            writer.write_all(line.as_bytes()).await?;
            writer.write_all(b"\n").await?;
            writer.flush().await?;
        }
        Ok::<_, io::Error>(writer)
    });

    let mut lines = reader.lines();
    let mut tasks = JoinSet::new();
    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                info!("Line transport cancelled");
                break;
            }
            _ = tx.closed() => {
                warn!("Output closed, no longer reading requests");
                break;
            }
            line = lines.next_line() => match line? {
                Some(line) => {
                    let router = Arc::clone(&router);
                    let tx = tx.clone();
                    tasks.spawn(async move {
                        if let Some(reply) = handle_line(&router, &line).await {
                            if tx.send(reply).is_err() {
                                debug!("Reply dropped: output closed");
                            }
                        }
                    });
                }
                None => {
                    debug!("Input closed");
                    break;
                }
            },
            Some(joined) = tasks.join_next(), if !tasks.is_empty() => {
                if let Err(e) = joined {
                    warn!(error = %e, "Request task failed");
                }
            }
        }
    }

    if cancel.is_cancelled() || tx.is_closed() {
        let drained = tokio::time::timeout(DRAIN_GRACE, drain(&mut tasks)).await;
        if drained.is_err() {
            debug!(pending = tasks.len(), "Aborting in-flight requests");
            tasks.abort_all();
        }
    }
    drain(&mut tasks).await;

    drop(tx);
    writer_task.await.map_err(io::Error::other)?
}

async fn drain(tasks: &mut JoinSet<()>) {
    while let Some(joined) = tasks.join_next().await {
        if let Err(e) = joined {
            if !e.is_cancelled() {
                warn!(error = %e, "Request task failed");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{RouterConfig, RouterFlags};
    use crate::lifecycle::Shutdown;
    use crate::server::build_registry;
    use serde_json::Value;
    use std::pin::Pin;
    use std::task::{Context, Poll};
    use tokio::io::BufReader;

    fn router_with(shutdown: &Shutdown) -> Arc<Router> {
        let config = RouterConfig::from_flags(&RouterFlags {
            rpc_only: true,
            engine_enabled: false,
            ..RouterFlags::default()
        })
        .expect("config");
        let registry = Arc::new(build_registry(None, shutdown));
        Arc::new(Router::new(&config, registry, None).expect("router"))
    }

    fn router() -> Arc<Router> {
        router_with(&Shutdown::new())
    }

    /// Writer whose every write fails, like stdout after the client went away.
    #[derive(Debug)]
    struct BrokenPipe;

    impl AsyncWrite for BrokenPipe {
        fn poll_write(
            self: Pin<&mut Self>,
            _: &mut Context<'_>,
            _: &[u8],
        ) -> Poll<io::Result<usize>> {
            Poll::Ready(Err(io::ErrorKind::BrokenPipe.into()))
        }

        fn poll_flush(self: Pin<&mut Self>, _: &mut Context<'_>) -> Poll<io::Result<()>> {
            Poll::Ready(Ok(()))
        }

        fn poll_shutdown(self: Pin<&mut Self>, _: &mut Context<'_>) -> Poll<io::Result<()>> {
            Poll::Ready(Ok(()))
        }
    }

    #[tokio::test]
    async fn answers_each_request_line() {
        let input = concat!(
            "{\"jsonrpc\":\"2.0\",\"id\":1,\"method\":\"initialize\"}\n",
            "\n",
            "{\"jsonrpc\":\"2.0\",\"method\":\"notifications/initialized\"}\n",
            "{not json\n",
            "{\"jsonrpc\":\"2.0\",\"id\":2,\"method\":\"ping\"}\n",
        );
        let out = serve_lines(
            input.as_bytes(),
            Vec::new(),
            router(),
            CancellationToken::new(),
        )
        .await
        .expect("serve");

        let replies: Vec<Value> = String::from_utf8(out)
            .expect("utf8")
            .lines()
            .map(|l| serde_json::from_str(l).expect("json line"))
            .collect();
        assert_eq!(replies.len(), 3);

        let mut ids: Vec<Value> = replies.iter().map(|r| r["id"].clone()).collect();
        ids.sort_by_key(|id| id.as_i64().unwrap_or(-1));
        assert_eq!(ids, vec![Value::Null, Value::from(1), Value::from(2)]);

        let parse_error = replies
            .iter()
            .find(|r| r["id"].is_null())
            .expect("parse error reply");
        assert_eq!(parse_error["error"]["code"], Value::from(-32700));
    }

    #[tokio::test]
    async fn cancelled_transport_stops_reading() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let (_client, server) = tokio::io::duplex(64);
        let (read_half, _write_half) = tokio::io::split(server);
        let out = serve_lines(
            tokio::io::BufReader::new(read_half),
            Vec::new(),
            router(),
            cancel,
        )
        .await
        .expect("serve");
        assert!(out.is_empty());
    }

    #[tokio::test]
    async fn stops_reading_when_output_fails() {
        let (mut client, server) = tokio::io::duplex(256);
        client
            .write_all(b"{\"jsonrpc\":\"2.0\",\"id\":1,\"method\":\"ping\"}\n")
            .await
            .expect("write request");

        // The client end stays open: only the failed writer can end the loop.
        let served = tokio::time::timeout(
            Duration::from_secs(5),
            serve_lines(
                BufReader::new(server),
                BrokenPipe,
                router(),
                CancellationToken::new(),
            ),
        )
        .await
        .expect("transport returned without EOF");
        let err = served.expect_err("write failure is reported");
        assert_eq!(err.kind(), io::ErrorKind::BrokenPipe);
        drop(client);
    }

    #[tokio::test]
    async fn exit_request_is_answered_before_transport_stops() {
        let shutdown = Shutdown::new();
        let (mut client, server) = tokio::io::duplex(256);
        client
            .write_all(
                b"{\"jsonrpc\":\"2.0\",\"id\":9,\"method\":\"tools/call\",\
                  \"params\":{\"name\":\"exit_server\",\"arguments\":{\"code\":2}}}\n",
            )
            .await
            .expect("write request");

        let out = tokio::time::timeout(
            Duration::from_secs(5),
            serve_lines(
                BufReader::new(server),
                Vec::new(),
                router_with(&shutdown),
                shutdown.token(),
            ),
        )
        .await
        .expect("transport stopped")
        .expect("serve");

        assert!(shutdown.is_requested());
        assert_eq!(shutdown.exit_code(), 2);
        let out = String::from_utf8(out).expect("utf8");
        let replies: Vec<&str> = out.lines().collect();
        assert_eq!(replies.len(), 1);
        let reply: Value = serde_json::from_str(replies[0]).expect("json reply");
        assert_eq!(reply["id"], Value::from(9));
        assert_ne!(reply["result"]["isError"], Value::Bool(true));
        drop(client);
    }
}
