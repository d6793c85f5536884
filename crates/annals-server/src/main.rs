//! Annals Server - Main entry point

use std::{net::SocketAddr, sync::Arc, time::Duration};

use anyhow::Result;
use annals_common::logging::{init_logging, LogConfig};
use tokio::signal;
use tracing::info;

use annals_server::{
    analysis::TemporalAnalyzer,
    config::{Config, StoreBackend},
    db::{self, DbConfig},
    features,
    ingest::IngestionPipeline,
    store::{EventStore, JobStore, MemoryEventStore, MemoryJobStore, PgEventStore, PgJobStore},
};

#[tokio::main]
async fn main() -> Result<()> {
    let log_config = LogConfig::builder()
        .log_file_prefix("annals-server")
        .filter_directives("annals_server=debug,tower_http=debug,sqlx=info")
        .build();

    // Environment variables take precedence over the defaults above
    let log_config = log_config.merge_env()?;

    let _log_guard = init_logging(&log_config)?;

    info!("Starting Annals Server");

    let config = Config::load()?;
    info!(
        "Configuration loaded - server will bind to {}:{}",
        config.server.host, config.server.port
    );

    let (events, jobs) = build_stores(&config).await?;

    let pipeline = IngestionPipeline::new(events.clone(), jobs, config.ingest.clone());
    let analyzer = TemporalAnalyzer::new(events.clone(), config.analysis.clone());
    info!(
        batch_size = config.ingest.batch_size,
        max_path_hops = config.analysis.max_path_hops,
        "Ingestion pipeline and analyzer ready"
    );

    let state = features::FeatureState {
        events,
        pipeline,
        analyzer,
    };
    let app = features::app(state, &config.cors);

    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port).parse()?;
    info!("Server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(config.server.shutdown_timeout_secs))
        .await?;

    info!("Server shut down gracefully");

    Ok(())
}

async fn build_stores(config: &Config) -> Result<(Arc<dyn EventStore>, Arc<dyn JobStore>)> {
    match config.store {
        StoreBackend::Postgres => {
            let pool = db::create_pool(&DbConfig::from(&config.database)).await?;
            info!("Database connection pool established");

            db::run_migrations(&pool).await?;
            info!("Database migrations completed");

            Ok((
                Arc::new(PgEventStore::new(pool.clone())),
                Arc::new(PgJobStore::new(pool)),
            ))
        },
        StoreBackend::Memory => {
            info!("Using in-memory event store; data is lost on shutdown");
            Ok((Arc::new(MemoryEventStore::new()), Arc::new(MemoryJobStore::new())))
        },
    }
}

/// Graceful shutdown signal handler
async fn shutdown_signal(timeout_secs: u64) {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", e);
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            },
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
            },
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, starting graceful shutdown");
        },
        _ = terminate => {
            info!("Received terminate signal, starting graceful shutdown");
        },
    }

    info!("Waiting up to {} seconds for connections to close", timeout_secs);
    tokio::time::sleep(Duration::from_secs(timeout_secs.min(5))).await;
}
