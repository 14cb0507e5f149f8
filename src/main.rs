//! bindb-mcp: MCP router for binary analysis sessions.
//!
//! Serves JSON-RPC over stdio (default) or `POST /mcp`, answering from a
//! local analysis engine where possible and forwarding to a remote instance
//! otherwise.

use anyhow::Context;
use bindb_mcp::config::{RouterFlags, DEFAULT_FORWARD_TIMEOUT_SECS, DEFAULT_REMOTE};
use bindb_mcp::transport::{serve_http, serve_lines};
use bindb_mcp::{
    build_registry, ImageEngine, Router, RouterConfig, RoutingMode, SessionManager, Shutdown,
};
use clap::{Args, Parser, Subcommand};
use std::collections::HashSet;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::BufReader;
use tokio::net::TcpListener;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

const RUNTIME_SHUTDOWN_GRACE: Duration = Duration::from_secs(1);

#[derive(Parser)]
#[command(name = "bindb-mcp", version, about = "MCP router for binary analysis databases")]
struct Cli {
    #[command(flatten)]
    router: RouterArgs,
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Serve newline-delimited JSON-RPC on stdin/stdout (default)
    Serve,
    /// Serve JSON-RPC on POST /mcp
    ServeHttp(ServeHttpArgs),
}

#[derive(Args)]
struct RouterArgs {
    /// Remote instance to forward to
    #[arg(long, global = true, env = "BINDB_MCP_REMOTE", default_value = DEFAULT_REMOTE)]
    remote_rpc: String,
    /// Answer everything locally; never forward
    #[arg(long, global = true)]
    headless: bool,
    /// Forward everything except the handshake
    #[arg(long, global = true)]
    rpc_only: bool,
    /// Run without a local analysis engine
    #[arg(long, global = true)]
    no_engine: bool,
    /// Timeout for forwarded requests, in seconds
    #[arg(long, global = true, default_value_t = DEFAULT_FORWARD_TIMEOUT_SECS)]
    forward_timeout_secs: u64,
    /// Open this binary at startup
    #[arg(long, global = true)]
    open: Option<String>,
    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

impl RouterArgs {
    fn flags(&self) -> RouterFlags {
        RouterFlags {
            headless: self.headless,
            rpc_only: self.rpc_only,
            engine_enabled: !self.no_engine,
            remote: self.remote_rpc.clone(),
            forward_timeout_secs: self.forward_timeout_secs,
        }
    }
}

#[derive(Args)]
struct ServeHttpArgs {
    /// Bind address (e.g., 127.0.0.1:8765)
    #[arg(long, default_value = "127.0.0.1:8765")]
    bind: String,
    /// Allowed Origin values (comma-separated). Defaults to localhost only.
    #[arg(
        long,
        value_delimiter = ',',
        default_value = "http://localhost,http://127.0.0.1"
    )]
    allow_origin: Vec<String>,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // stdout carries the protocol; logs go to stderr
    let default_filter = if cli.router.verbose {
        "bindb_mcp=debug"
    } else {
        "bindb_mcp=info"
    };
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter)))
        .init();

    let config = RouterConfig::from_flags(&cli.router.flags())?;
    let rt = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("failed to create tokio runtime")?;

    let shutdown = Shutdown::new();
    let served = rt.block_on(serve(cli, config, shutdown.clone()));

    // A pending stdin read parks a blocking thread until the peer closes its
    // end; do not wait for it.
    rt.shutdown_timeout(RUNTIME_SHUTDOWN_GRACE);
    served?;

    let code = shutdown.exit_code();
    if code != 0 {
        std::process::exit(code);
    }
    Ok(())
}

async fn serve(cli: Cli, config: RouterConfig, shutdown: Shutdown) -> anyhow::Result<()> {
    let router = Arc::new(start_router(&config, cli.router.open.as_deref(), &shutdown).await?);
    let cancel = shutdown.token();

    match shutdown_signal() {
        Ok(signal) => {
            let shutdown = shutdown.clone();
            tokio::spawn(async move {
                signal.await;
                info!("Shutdown signal received");
                shutdown.request(0);
            });
        }
        Err(e) => warn!(error = %e, "Shutdown signal handler failed; server will continue running"),
    }

    let served = match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => {
            info!(mode = %router.mode(), "MCP server listening on stdio");
            serve_lines(
                BufReader::new(tokio::io::stdin()),
                tokio::io::stdout(),
                Arc::clone(&router),
                cancel,
            )
            .await
            .map(|_| ())
        }
        Command::ServeHttp(args) => {
            let listener = TcpListener::bind(&args.bind)
                .await
                .with_context(|| format!("failed to bind {}", args.bind))?;
            let origins: HashSet<String> = args.allow_origin.into_iter().collect();
            serve_http(listener, Arc::clone(&router), Arc::new(origins), cancel).await
        }
    };

    close_sessions(&router).await;
    served.context("transport failed")
}

async fn start_router(
    config: &RouterConfig,
    open: Option<&str>,
    shutdown: &Shutdown,
) -> anyhow::Result<Router> {
    let sessions = (config.engine_enabled && config.mode != RoutingMode::Remote)
        .then(|| Arc::new(SessionManager::new(Arc::new(ImageEngine::new()))));
    match &sessions {
        Some(manager) => info!(engine = manager.engine_name(), mode = %config.mode, "Local engine enabled"),
        None => info!(mode = %config.mode, remote = %config.remote, "Running without a local engine"),
    }

    if let Some(path) = open {
        match &sessions {
            Some(manager) => {
                let manager = Arc::clone(manager);
                let path = path.to_string();
                let opened = tokio::task::spawn_blocking(move || manager.open(&path, true, None))
                    .await
                    .context("startup open task failed")?;
                match opened {
                    Ok(id) => info!(session_id = %id, "Opened startup database"),
                    Err(e) => error!(error = %e, "Failed to open startup database"),
                }
            }
            None => warn!(path, "--open ignored: no local engine"),
        }
    }

    let registry = Arc::new(build_registry(sessions.clone(), shutdown));
    Router::new(config, registry, sessions).context("failed to build HTTP client")
}

async fn close_sessions(router: &Router) {
    if let Some(manager) = router.sessions() {
        let manager = Arc::clone(manager);
        if let Err(e) = tokio::task::spawn_blocking(move || manager.close_all()).await {
            error!(error = %e, "Failed to close databases on shutdown");
        }
    }
    info!("Server stopped");
}

/// Install the termination signal handlers now and return a future that
/// resolves on the first signal.
#[cfg(unix)]
fn shutdown_signal() -> anyhow::Result<impl Future<Output = ()>> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut sigterm = signal(SignalKind::terminate())?;
    let mut sigint = signal(SignalKind::interrupt())?;
    let mut sigquit = signal(SignalKind::quit())?;
    Ok(async move {
        tokio::select! {
            _ = sigterm.recv() => {},
            _ = sigint.recv() => {},
            _ = sigquit.recv() => {},
        }
    })
}

#[cfg(not(unix))]
fn shutdown_signal() -> anyhow::Result<impl Future<Output = ()>> {
    Ok(async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Ctrl-C handler failed");
            std::future::pending::<()>().await;
        }
    })
}
