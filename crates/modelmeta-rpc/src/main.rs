//! modelmeta RPC server - JSON-RPC backend for desktop front ends.
//!
//! Exposes the metadata store, registry client and folder synchronizer over
//! JSON-RPC 2.0. The chosen port is printed on stdout as `RPC_PORT=<port>`.

mod handler;
mod server;
mod wrapper;

use anyhow::Result;
use clap::Parser;
use modelmeta_core::config::SyncConfig;
use modelmeta_core::{
    update_channel, CatalogClient, CatalogClientConfig, MetadataStore, Synchronizer, WatchFolder,
};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

#[derive(Parser, Debug)]
#[command(name = "modelmeta-rpc")]
#[command(about = "JSON-RPC server for model file metadata")]
struct Args {
    /// Port to listen on (0 = auto-assign)
    #[arg(short, long, default_value = "0")]
    port: u16,

    /// Host to bind to
    #[arg(long, default_value = "127.0.0.1")]
    host: String,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,

    /// Folder to watch for new models, as KIND=PATH (repeatable)
    #[arg(long = "watch", value_name = "KIND=PATH")]
    watch: Vec<WatchFolder>,

    /// Seconds between watch cycles
    #[arg(long, default_value_t = SyncConfig::DEFAULT_WATCH_INTERVAL.as_secs())]
    interval_secs: u64,

    /// Registry API base URL
    #[arg(long)]
    api_base: Option<String>,

    /// Registry API token (overrides the token file and environment)
    #[arg(long)]
    token: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Set up logging
    let log_level = if args.debug { Level::DEBUG } else { Level::INFO };
    FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .with_thread_ids(false)
        .compact()
        .init();

    info!("Starting modelmeta RPC server");

    let mut catalog_config = CatalogClientConfig::new().with_resolved_token(args.token.as_deref());
    if let Some(api_base) = args.api_base {
        catalog_config = catalog_config.with_api_base(api_base);
    }
    info!("Registry API: {}", catalog_config.api_base);
    let catalog = CatalogClient::new(catalog_config)?;

    let (tx, rx) = update_channel();
    let synchronizer =
        Synchronizer::new(Arc::new(MetadataStore::new()), Arc::new(catalog)).with_observer(tx);

    let state = Arc::new(server::AppState::new(
        Arc::new(synchronizer),
        rx,
        args.watch,
        Duration::from_secs(args.interval_secs.max(1)),
    ));
    state.start_watching().await;

    let addr = server::start_server(Arc::clone(&state), &args.host, args.port).await?;

    // Print port for the front end to read (intentional stdout for IPC)
    println!("RPC_PORT={}", addr.port());

    info!("RPC server running on {}", addr);

    // Wait for shutdown signal
    tokio::signal::ctrl_c().await?;
    info!("Shutdown signal received, stopping watch loop");
    state.stop_watching().await;

    Ok(())
}
