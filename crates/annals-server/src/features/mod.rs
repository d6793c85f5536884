//! HTTP feature slices
//!
//! Each slice owns its routes and is mounted under its own prefix:
//!
//! - **events**: `/events` - CRUD and search
//! - **ingestion**: `/ingestion` - job submission, status, cancellation
//! - **analysis**: `/analysis` - timelines, overlaps, gaps, paths, statistics

pub mod analysis;
pub mod events;
pub mod ingestion;

use std::sync::Arc;

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde_json::json;

use crate::analysis::TemporalAnalyzer;
use crate::config::CorsConfig;
use crate::ingest::IngestionPipeline;
use crate::middleware;
use crate::store::EventStore;

/// Shared state for all feature routes; every member is built once at startup
#[derive(Clone)]
pub struct FeatureState {
    pub events: Arc<dyn EventStore>,
    pub pipeline: IngestionPipeline,
    pub analyzer: TemporalAnalyzer,
}

/// Feature routes, to be nested under `/api/v1`
pub fn router(state: FeatureState) -> Router<()> {
    Router::new()
        .nest("/events", events::events_routes().with_state(state.events.clone()))
        .nest("/ingestion", ingestion::ingestion_routes().with_state(state.pipeline.clone()))
        .nest("/analysis", analysis::analysis_routes().with_state(state.analyzer.clone()))
}

/// Complete application: `/health`, `/api/v1/*` and the middleware stack
pub fn app(state: FeatureState, cors: &CorsConfig) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .with_state(state.events.clone())
        .nest("/api/v1", router(state))
        .layer(middleware::tracing_layer())
        .layer(middleware::cors_layer(cors))
}

async fn health_check(State(store): State<Arc<dyn EventStore>>) -> Response {
    match store.health_check().await {
        Ok(()) => (
            StatusCode::OK,
            Json(json!({
                "status": "healthy",
                "store": "connected"
            })),
        )
            .into_response(),
        Err(e) => {
            tracing::error!("Store health check failed: {}", e);
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(json!({
                    "status": "unhealthy",
                    "store": "unreachable"
                })),
            )
                .into_response()
        },
    }
}
