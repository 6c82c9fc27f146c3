use anyhow::Result;
use blobnode::{NodeConfig, NodeService};
use clap::Parser;
use std::path::PathBuf;
use tracing_subscriber::prelude::*;

#[derive(Parser, Debug)]
#[command(name = "blobnode")]
#[command(about = "Per-node storage service for immutable blobs and versioned tags")]
struct Args {
    /// Config file (JSON); overrides the individual flags below
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Node identity, embedded in derived blob and tag URLs
    #[arg(short, long, default_value = "node-1")]
    node_name: String,

    /// Root directory containing the storage volumes
    #[arg(short, long, default_value = "./data")]
    data_root: PathBuf,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&args.log_level)),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = match &args.config {
        Some(path) => NodeConfig::from_file(path)?,
        None => NodeConfig::new(args.node_name.clone(), args.data_root.clone()),
    };

    let handle = NodeService::start(config.clone()).await?;

    // The put/get listeners are separate processes; surface the handoff
    // settings they are expected to run with.
    if config.put_enabled {
        tracing::info!("put listener expected on port {}", config.put_port);
    }
    if config.get_enabled {
        tracing::info!(
            "get listener expected on port {} (read root: {})",
            config.get_port,
            config
                .read_root
                .as_deref()
                .unwrap_or(&config.data_root)
                .display()
        );
    }

    let (free, used) = handle.diskspace().await?;
    tracing::info!("✓ node service ready ({} free / {} used)", free, used);

    tokio::signal::ctrl_c().await?;
    tracing::info!("shutting down");

    Ok(())
}
