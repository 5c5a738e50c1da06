//! filenode server binary.
//!
//! Usage:
//!   filenode-server --mount /projects=/srv/projects
//!   filenode-server --config filenode.toml --port 6000
//!   filenode-server --auto-mount --log-json

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use filenode_kernel::FileNode;
use filenode_server::{Metrics, Server, ServerConfig, parse_mount_spec};

/// Sandboxed remote filesystem node.
#[derive(Parser, Debug)]
#[command(name = "filenode-server")]
#[command(about = "Serve a sandboxed view of the local filesystem over TCP")]
struct Args {
    /// TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// TCP port (overrides config and FILENODE_PORT)
    #[arg(short, long)]
    port: Option<u16>,

    /// Bind address
    #[arg(long)]
    bind: Option<String>,

    /// Mount a host directory, as /virtual=/real/path (repeatable)
    #[arg(short, long = "mount")]
    mounts: Vec<String>,

    /// Restrict access to this host directory (repeatable)
    #[arg(long = "allow-root")]
    allowed_roots: Vec<PathBuf>,

    /// Mount every local volume under its own prefix
    #[arg(long)]
    auto_mount: bool,

    /// Emit logs as JSON lines
    #[arg(long)]
    log_json: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();
    init_tracing(args.log_json);

    match run(args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("{e:#}");
            ExitCode::FAILURE
        }
    }
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        registry.with(fmt::layer().with_writer(std::io::stderr)).init();
    }
}

async fn run(args: Args) -> Result<()> {
    let mut config = ServerConfig::load(args.config.as_deref())?;
    config.apply_process_env()?;

    if let Some(port) = args.port {
        config.port = port;
    }
    if let Some(bind) = args.bind {
        config.bind = bind;
    }
    for spec in &args.mounts {
        config.node.mounts.push(parse_mount_spec(spec)?);
    }
    config.node.allowed_roots.extend(args.allowed_roots);
    config.node.auto_mount_volumes |= args.auto_mount;

    if config.node.uses_dev_secret() {
        tracing::warn!("using the built-in development signing secret; set FILENODE_HMAC_SECRET");
    }

    let addr = config.socket_addr()?;
    let node = FileNode::new(config.node.clone()).context("failed to initialize file node")?;
    for mount in node.list_mounts() {
        tracing::info!(prefix = %mount.virtual_prefix, root = %mount.real_root.display(), "mounted");
    }

    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;

    let shutdown = CancellationToken::new();
    let metrics = Arc::new(Metrics::new());
    let reporter = Arc::clone(&metrics).spawn_reporter(config.metrics_interval(), shutdown.clone());

    let server = Arc::new(Server::new(Arc::new(node), Arc::clone(&metrics)));
    let serving = tokio::spawn(server.serve(listener, shutdown.clone()));

    tokio::signal::ctrl_c().await.context("failed to listen for ctrl-c")?;
    tracing::info!("shutting down");
    shutdown.cancel();

    serving.await??;
    reporter.await?;
    metrics.log_snapshot();
    Ok(())
}
