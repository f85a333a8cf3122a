//! Lease Cache - refresh-ahead cache service
//!
//! Serves a refresh-ahead cache over HTTP. The shared store is Redis when
//! `REDIS_URL` is set, otherwise an in-process store; the source of truth is
//! an in-process map with configurable latency.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tokio::signal;
use tokio::task::JoinHandle;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use lease_cache::api::create_router;
use lease_cache::source::MemorySource;
use lease_cache::store::{MemoryStore, RedisStore};
use lease_cache::{spawn_cleanup_task, AppState, Config, KeyedStore};

/// Main entry point for the cache service.
///
/// # Startup Sequence
/// 1. Initialize tracing subscriber for logging
/// 2. Load configuration from environment variables
/// 3. Connect the shared store (Redis or in-memory with cleanup task)
/// 4. Build the refresh-ahead cache over the demo source
/// 5. Start HTTP server on configured port
/// 6. On SIGINT/SIGTERM stop serving, then cancel background reloads
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Defaults to "info" level, can be overridden with RUST_LOG env var
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "lease_cache=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting Lease Cache service");

    let config = Config::from_env();
    info!(
        "Configuration loaded: name={}, expire={}s, safety={}s, sync_refresh={}, port={}",
        config.cache_name,
        config.expire_secs,
        config.safety_secs,
        config.sync_refresh,
        config.server_port
    );

    let mut cleanup_handle = None;
    let store: Arc<dyn KeyedStore> = match &config.redis_url {
        Some(url) => {
            info!("Using redis store at {}", url);
            Arc::new(RedisStore::connect(url).await?)
        }
        None => {
            info!("Using in-memory store");
            let store = Arc::new(MemoryStore::new());
            cleanup_handle = Some(spawn_cleanup_task(store.clone(), config.cleanup_interval));
            store
        }
    };

    let source = Arc::new(MemorySource::<Value>::with_latency(Duration::from_millis(
        config.source_latency_ms,
    )));
    let state = AppState::from_parts(&config.cache_name, store, source, config.cache_options())?;
    let cache = state.cache.clone();

    let app = create_router(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.server_port));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("Server listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(cleanup_handle))
        .await?;

    cache.shutdown().await;
    info!("Server shutdown complete");
    Ok(())
}

/// Waits for shutdown signal (Ctrl+C or SIGTERM).
///
/// On shutdown signal, aborts the cleanup task and allows graceful shutdown.
async fn shutdown_signal(cleanup_handle: Option<JoinHandle<()>>) {
    let ctrl_c = async {
        if let Err(err) = signal::ctrl_c().await {
            warn!("Failed to install Ctrl+C handler: {}", err);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(err) => {
                warn!("Failed to install SIGTERM handler: {}", err);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, initiating shutdown...");
        }
        _ = terminate => {
            info!("Received SIGTERM, initiating shutdown...");
        }
    }

    if let Some(handle) = cleanup_handle {
        handle.abort();
        warn!("Cleanup task aborted");
    }
}
