//! filefan — demo CLI driving the fan-out engine end to end against an
//! in-memory metadata repository and in-process mock storage nodes.
//!
//! This binary exists to exercise the library; the real deployment is
//! a long-running process behind a REST front-end and real storage
//! nodes, neither of which lives in this crate.

use clap::{Parser, Subcommand};
use filefan::config::Config;
use filefan::coordinator::FanOutCoordinator;
use filefan::engine::TransferEngine;
use filefan::metrics::Metrics;
use filefan::protocol::mock::{MockClientFactory, MockStorageNode};
use filefan::registry::InFlightRegistry;
use filefan::repository::memory::InMemoryRepository;
use filefan::repository::MetadataRepository;
use filefan::store::StoreOrchestrator;
use filefan::types::{FileInfo, StorageNode};
use std::sync::Arc;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "filefan")]
#[command(version)]
#[command(author, about = "Distributed file-storage fan-out engine", long_about = None)]
struct Cli {
    /// Number of in-process mock storage nodes to stand up.
    #[arg(long, default_value_t = 3)]
    nodes: usize,

    /// Minimum nodes required to admit an upload.
    #[arg(long, default_value_t = 3)]
    min_storages: usize,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Store a local file under `name`, fanning it out across the demo nodes.
    Store {
        path: std::path::PathBuf,
        name: String,
    },
    /// Reassemble a previously stored file to stdout.
    Load { name: String },
    /// Stand up the demo nodes and exit — useful to sanity-check wiring.
    Ping,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();
    let config = Config::from_env();
    if let Err(e) = config.validate() {
        warn!(error = %e, "configuration invalid, continuing with demo defaults");
    }

    let repository: Arc<dyn MetadataRepository> = Arc::new(InMemoryRepository::new());
    let factory = MockClientFactory::new();
    for i in 0..cli.nodes {
        let host = format!("demo-node-{i}");
        factory.register(&host, MockStorageNode::new(u64::MAX));
        repository
            .create_or_update_storage(StorageNode::new(format!("s{i}"), host))
            .await?;
    }

    let metrics = Arc::new(Metrics::new());
    let coordinator = Arc::new(
        FanOutCoordinator::new(Arc::new(factory), cli.min_storages).with_metrics(metrics.clone()),
    );
    let engine = Arc::new(TransferEngine::default().with_metrics(metrics.clone()));
    let in_flight = Arc::new(InFlightRegistry::new().with_metrics(metrics.clone()));
    let orchestrator = StoreOrchestrator::new(repository, coordinator, engine, in_flight);

    match cli.command {
        Command::Ping => {
            info!(nodes = cli.nodes, "demo nodes registered");
        }
        Command::Store { path, name } => {
            let data = tokio::fs::read(&path).await?;
            let size = data.len() as u64;
            let file_id = orchestrator.prepare().await?;
            let info = FileInfo {
                name: name.clone(),
                content_type: None,
                size,
            };
            let cancel = CancellationToken::new();
            tokio::select! {
                result = orchestrator.store(&file_id, info, std::io::Cursor::new(data), cancel.clone()) => {
                    result?;
                    info!(name = %name, %size, "stored");
                }
                _ = shutdown_signal() => {
                    cancel.cancel();
                    warn!("store interrupted");
                }
            }
        }
        Command::Load { name } => {
            let mut out = Vec::new();
            let written = orchestrator.load(&name, &mut out, CancellationToken::new()).await?;
            use std::io::Write;
            std::io::stdout().write_all(&out)?;
            info!(%name, %written, "loaded");
        }
    }

    if let Ok(buf) = metrics.encode() {
        tracing::debug!(bytes = buf.len(), "metrics snapshot available");
    }

    Ok(())
}

/// Handle shutdown signals (SIGINT, SIGTERM) so an in-flight `Store`
/// can cancel its transfer instead of leaving a half-written part.
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c().await.expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}
