//! ccd dispatcher
//!
//! Runs the staging completion consumer against an in-process bus. Useful
//! for local development; production deployments embed the library.

use std::sync::Arc;

use anyhow::Result;
use ccd_dispatcher::{
    backend::MockLegacyScheduler,
    buildpacks::{InternalUrlGenerator, StaticBuildpackCatalog},
    bus::{BackoffPolicy, InMemoryBus, MessageBus, RetryingBus},
    config::DispatchConfig,
    repository::{AppRepository, InMemoryAppRepository},
    staging::CompletionWorker,
    Backends,
};
use ccd_messages::subjects;
use tokio::sync::watch;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

const PUBLISH_ATTEMPTS: u32 = 3;

#[tokio::main]
async fn main() -> Result<()> {
    let config = DispatchConfig::from_env()?;

    // Prefer RUST_LOG, fall back to CCD_LOG_LEVEL
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| config.log_level.clone().into()))
        .with(tracing_subscriber::fmt::layer().json())
        .init();

    info!("Starting ccd dispatcher");
    info!(
        staging = %config.staging,
        running = %config.running,
        diego_docker = config.diego_docker,
        max_staging_runtime_secs = config.staging_timeout_secs(),
        default_stack = %config.default_stack,
        "Configuration loaded"
    );

    let config = Arc::new(config);
    let bus = InMemoryBus::default();
    let publisher: Arc<dyn MessageBus> = Arc::new(RetryingBus::new(
        bus.clone(),
        PUBLISH_ATTEMPTS,
        BackoffPolicy::default(),
    ));
    let repository: Arc<dyn AppRepository> = Arc::new(InMemoryAppRepository::new());

    let backends = Arc::new(Backends::new(
        config.clone(),
        publisher,
        repository.clone(),
        Arc::new(MockLegacyScheduler::new()),
        Arc::new(StaticBuildpackCatalog::empty()),
        Arc::new(InternalUrlGenerator::new(config.blobstore_url.clone())),
    ));

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let worker = CompletionWorker::new(
        bus.subscribe(subjects::STAGING_FINISHED),
        backends,
        repository,
    );
    let worker_handle = tokio::spawn(worker.run(shutdown_rx));

    tokio::signal::ctrl_c().await?;
    info!("Received shutdown signal");

    let _ = shutdown_tx.send(true);

    let shutdown_timeout = std::time::Duration::from_secs(10);
    if let Err(e) = tokio::time::timeout(shutdown_timeout, worker_handle).await {
        warn!(error = %e, "Completion worker did not shut down in time");
    }

    info!("Dispatcher shutdown complete");
    Ok(())
}
