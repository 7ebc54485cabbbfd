// peerd - Run a peer membership backend as a standalone daemon
//
// Logs every peer set change. SIGHUP re-reads the configuration file and
// Ctrl-C leaves the cluster cleanly.

use clap::Parser;
use meshpeers::config::LiveConfig;
use meshpeers::peers::{new_peers, Cancellation, Peers};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "peerd", version, about = "Peer membership daemon")]
struct Cli {
    /// Peer management configuration (TOML)
    #[arg(short, long)]
    config: PathBuf,

    /// Log filter used when RUST_LOG is unset
    #[arg(long, default_value = "info")]
    log: String,

    /// How long shutdown may take, in milliseconds
    #[arg(long, default_value_t = 5_000)]
    shutdown_timeout_ms: u64,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let config = Arc::new(LiveConfig::from_file(&cli.config)?);
    let ctx = Cancellation::new();

    // Ctrl-C during a slow join aborts startup
    let interrupt = {
        let ctx = ctx.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                ctx.cancel();
            }
        })
    };
    let peers: Arc<dyn Peers> = Arc::from(new_peers(config.clone(), &ctx).await?);
    interrupt.abort();

    let watcher = Arc::downgrade(&peers);
    peers.register_updated_peers_callback(Box::new(move || {
        if let Some(peers) = watcher.upgrade() {
            match peers.get_peers() {
                Ok(list) => tracing::info!(count = list.len(), peers = ?list, "peers updated"),
                Err(e) => tracing::warn!(error = %e, "cannot read peers"),
            }
        }
    }));

    let initial = peers.get_peers()?;
    tracing::info!(backend = %peers.kind(), peers = ?initial, "peer management running");

    serve(&config).await?;

    tracing::info!("shutting down");
    peers
        .close(Duration::from_millis(cli.shutdown_timeout_ms))
        .await?;
    Ok(())
}

/// Wait for Ctrl-C, reloading the configuration on every SIGHUP
#[cfg(unix)]
async fn serve(config: &LiveConfig) -> std::io::Result<()> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut hangup = signal(SignalKind::hangup())?;
    loop {
        tokio::select! {
            result = tokio::signal::ctrl_c() => return result,
            _ = hangup.recv() => {
                if let Err(e) = config.reload_from_file() {
                    tracing::warn!(error = %e, "reload failed, keeping previous configuration");
                }
            }
        }
    }
}

#[cfg(not(unix))]
async fn serve(_config: &LiveConfig) -> std::io::Result<()> {
    tokio::signal::ctrl_c().await
}
