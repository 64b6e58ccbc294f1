//! Headcount server binary entry point
//!
//! Starts the occupancy counting HTTP/WS service.
//!
//! # Usage
//!
//! ```bash
//! # Start with defaults (localhost:8080)
//! cargo run -p headcount-server
//!
//! # Start with a config file and custom address
//! HEADCOUNT_CONFIG=headcount.toml HEADCOUNT_BIND="0.0.0.0:8080" cargo run -p headcount-server
//!
//! # With logging
//! RUST_LOG=debug cargo run -p headcount-server
//! ```
//!
//! # Environment Variables
//!
//! - `HEADCOUNT_CONFIG`: Path to a TOML config file (optional)
//! - `HEADCOUNT_BIND`: Server bind address (default: `127.0.0.1:8080`)
//! - `HEADCOUNT_DETECTOR_URL`: Inference service base URL
//! - `RUST_LOG`: Logging level (default: `info`)

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;
use tracing::{error, info};

use headcount_core::HttpDetector;
use headcount_job_runner::{HistoryStore, JobManager, JobManagerConfig};
use headcount_server::api::{self, AppState};
use headcount_server::Config;

fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let config_path = std::env::var("HEADCOUNT_CONFIG").ok().map(PathBuf::from);
    let config = Config::load(config_path.as_deref())?;

    info!(
        version = env!("CARGO_PKG_VERSION"),
        bind_address = %config.server.bind,
        detector = %config.detector.base_url,
        "Headcount server starting"
    );

    // Create tokio runtime
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(num_cpus::get())
        .thread_name("headcount-http")
        .enable_all()
        .build()?;

    runtime.block_on(async move {
        let detector = Arc::new(HttpDetector::new(&config.detector.base_url).map_err(|e| {
            error!("Failed to build detector client: {}", e);
            e
        })?);

        let history = Arc::new(
            HistoryStore::with_file(config.history.path.clone(), config.history.limit).await,
        );

        let manager = Arc::new(JobManager::new(JobManagerConfig {
            max_jobs: config.jobs.max_jobs,
            retention: Duration::from_secs(config.jobs.retention_seconds),
            max_fps: config.jobs.max_fps,
        }));

        // Background eviction keeps the registry bounded.
        let (shutdown_tx, _) = broadcast::channel(1);
        tokio::spawn(manager.clone().run_eviction_loop(
            Duration::from_secs(config.jobs.eviction_interval_seconds),
            shutdown_tx.subscribe(),
        ));

        let state = AppState {
            manager,
            history,
            detector,
            config: Arc::new(config.clone()),
        };
        let app = api::router(state);

        let listener = tokio::net::TcpListener::bind(&config.server.bind)
            .await
            .map_err(|e| {
                error!(bind_address = %config.server.bind, "Failed to bind: {}", e);
                e
            })?;

        info!("Headcount server ready - listening for connections");

        let shutdown = shutdown_tx.clone();
        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = tokio::signal::ctrl_c().await;
                info!("Shutdown signal received");
                let _ = shutdown.send(());
            })
            .await
            .map_err(|e| {
                error!("Server error: {}", e);
                e
            })?;

        Ok::<(), anyhow::Error>(())
    })?;

    info!("Headcount server shutdown complete");
    Ok(())
}
