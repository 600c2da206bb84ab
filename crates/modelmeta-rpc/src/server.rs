//! HTTP server implementation using Axum.

use crate::handler::{handle_health, handle_rpc};
use axum::{
    routing::{get, post},
    Router,
};
use modelmeta_core::{MetadataStore, RecordUpdate, Synchronizer, WatchFolder, WatchHandle};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::sync::Mutex;
use tower::limit::ConcurrencyLimitLayer;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{error, info};

/// Upper bound on concurrently handled RPC requests.
const MAX_CONCURRENT_REQUESTS: usize = 64;

/// Application state shared across handlers.
pub struct AppState {
    /// Side-record store shared with the synchronizer
    pub store: Arc<MetadataStore>,
    pub synchronizer: Arc<Synchronizer>,
    /// Observer notifications waiting for the front end to poll them.
    /// Bounded; the oldest are dropped when nobody polls.
    pub updates: Mutex<broadcast::Receiver<RecordUpdate>>,
    pub watch_folders: Vec<WatchFolder>,
    pub watch_interval: Duration,
    /// Running watch loop, if any folders are configured
    pub watch: Mutex<Option<WatchHandle>>,
}

impl AppState {
    pub fn new(
        synchronizer: Arc<Synchronizer>,
        updates: broadcast::Receiver<RecordUpdate>,
        watch_folders: Vec<WatchFolder>,
        watch_interval: Duration,
    ) -> Self {
        Self {
            store: Arc::clone(synchronizer.store()),
            synchronizer,
            updates: Mutex::new(updates),
            watch_folders,
            watch_interval,
            watch: Mutex::new(None),
        }
    }

    /// Start the background watch loop over the configured folders.
    ///
    /// Does nothing when no folders are configured or a loop is running.
    pub async fn start_watching(&self) {
        if self.watch_folders.is_empty() {
            info!("No watch folders configured; background detection disabled");
            return;
        }
        let mut watch = self.watch.lock().await;
        if watch.is_some() {
            return;
        }
        *watch = Some(
            self.synchronizer
                .start_watching(self.watch_folders.clone(), Some(self.watch_interval)),
        );
    }

    /// Stop the watch loop and wait for it to exit.
    pub async fn stop_watching(&self) {
        if let Some(handle) = self.watch.lock().await.take() {
            handle.stop_and_join().await;
        }
    }
}

/// Build the router for the given state.
pub fn build_router(state: Arc<AppState>) -> Router {
    // Configure CORS for development
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(handle_health))
        .route("/rpc", post(handle_rpc))
        .layer(ConcurrencyLimitLayer::new(MAX_CONCURRENT_REQUESTS))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

/// Start the JSON-RPC HTTP server.
///
/// Returns the actual address the server is bound to (useful when port=0).
pub async fn start_server(state: Arc<AppState>, host: &str, port: u16) -> anyhow::Result<SocketAddr> {
    let app = build_router(state);

    // Parse the address
    let addr: SocketAddr = format!("{}:{}", host, port).parse()?;

    // Bind to the address
    let listener = tokio::net::TcpListener::bind(addr).await?;
    let actual_addr = listener.local_addr()?;

    info!("Server listening on {}", actual_addr);

    // Spawn the server in the background
    tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            error!("Server error: {}", e);
        }
    });

    Ok(actual_addr)
}
