// Main entry point - Dependency injection and server setup
mod application;
mod domain;
mod infrastructure;
mod presentation;

use std::{net::SocketAddr, sync::Arc};
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

use crate::application::analysis_service::AnalysisService;
use crate::application::daily_service::DailyService;
use crate::application::ingestion_service::IngestionService;
use crate::application::snapshot::SnapshotStore;
use crate::application::telemetry_repository::TelemetryRepository;
use crate::infrastructure::config::{StorageBackend, load_config};
use crate::infrastructure::influx_repository::InfluxRepository;
use crate::infrastructure::memory_repository::MemoryRepository;
use crate::presentation::app_state::AppState;
use crate::presentation::router;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load configuration
    let config = load_config()?;

    // Initialize tracing; RUST_LOG wins over the configured filter
    let filter = EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new(&config.logging.filter))?;
    tracing_subscriber::fmt().with_env_filter(filter).init();

    // Create repository (infrastructure layer)
    let repository: Arc<dyn TelemetryRepository> = match (config.storage.backend, config.storage.influx.clone()) {
        (StorageBackend::Influx, Some(influx)) => Arc::new(InfluxRepository::new(
            influx.host,
            influx.token,
            influx.database,
            influx.retention_policy,
        )),
        (StorageBackend::Influx, None) => anyhow::bail!("storage.backend is influx but [storage.influx] is missing"),
        (StorageBackend::Memory, _) => {
            tracing::warn!("Using in-memory storage; samples and daily records are lost on restart");
            Arc::new(MemoryRepository::new())
        }
    };

    // Create services (application layer)
    let settings = config.engine.derivation();
    let store = Arc::new(SnapshotStore::default());
    let ingestion_service =
        IngestionService::new(repository.clone(), store.clone(), settings, config.engine.parse_policy);
    let analysis_service = AnalysisService::new(
        store.clone(),
        config.engine.decimation_factor,
        config.engine.max_stream_chunk,
    );
    let daily_service = DailyService::new(repository, store);

    match ingestion_service.hydrate().await {
        Ok(count) => tracing::info!("Startup hydration loaded {} samples", count),
        Err(e) => tracing::warn!("Startup hydration failed, starting with an empty series: {}", e),
    }

    // Create application state
    let state = Arc::new(AppState {
        ingestion_service,
        analysis_service,
        daily_service,
    });

    // Build router (presentation layer)
    // Compression is handled per response, so there is no CompressionLayer here
    let app = router(state).layer(TraceLayer::new_for_http());

    // Start server
    let addr: SocketAddr = config.server.bind_address.parse()?;
    tracing::info!("Starting heating-telemetry service on {}", addr);

    axum::serve(tokio::net::TcpListener::bind(addr).await?, app).await?;

    Ok(())
}
