//! keel command-line entry point.

mod commands;
mod config;

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use keel_store::{LocalStore, ObjectStore};
use keel_transfer::{RemoteStorage, WorkerPool};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "keel", version, about = "Move objects in and out of a keel store")]
struct Cli {
    /// Configuration file (defaults to the platform config path).
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Store root directory, overriding the configuration.
    #[arg(long, global = true)]
    root: Option<PathBuf>,

    #[command(subcommand)]
    command: commands::Command,
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let mut config = config::CliConfig::load(cli.config.as_deref())?;
    if let Some(root) = cli.root {
        config.store_root = root.display().to_string();
    }
    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        root = %config.store_root,
        threads = config.transfer.worker_threads,
        "starting keel"
    );

    let pool = WorkerPool::new(config.transfer.worker_threads)?;
    let store = Arc::new(LocalStore::new(&config.store_root));
    let shared: Arc<dyn ObjectStore> = store.clone();
    let storage = RemoteStorage::new(shared, pool.clone(), config.transfer)?;

    pool.handle()
        .block_on(commands::run(&storage, &store, cli.command))?;
    Ok(())
}
