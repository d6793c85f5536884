//! Temporal analysis routes
//!
//! Window endpoints take `start` and `end` as RFC 3339 query parameters.
//!
//! - `GET /api/v1/analysis/timeline/:id`
//! - `GET /api/v1/analysis/overlaps?start=..&end=..`
//! - `GET /api/v1/analysis/gap?start=..&end=..`
//! - `GET /api/v1/analysis/path?source=..&target=..`
//! - `GET /api/v1/analysis/statistics?start=..&end=..`
//! - `GET /api/v1/analysis/hierarchy/:id`

use axum::{
    extract::{rejection::QueryRejection, Path, Query, State},
    routing::get,
    Json, Router,
};
use serde::Deserialize;
use serde_json::{json, Value};

use crate::analysis::{HierarchyAnalysis, TemporalAnalyzer, TemporalStatistics};
use crate::error::AppError;
use crate::models::TimeRange;
use crate::store::EventNode;
use crate::validation::parse_event_id;

#[derive(Debug, Deserialize)]
pub struct PathParams {
    pub source: String,
    pub target: String,
}

pub fn analysis_routes() -> Router<TemporalAnalyzer> {
    Router::new()
        .route("/timeline/:id", get(get_timeline))
        .route("/overlaps", get(find_overlaps))
        .route("/gap", get(find_gap))
        .route("/path", get(find_path))
        .route("/statistics", get(get_statistics))
        .route("/hierarchy/:id", get(hierarchy_analysis))
}

async fn get_timeline(
    State(analyzer): State<TemporalAnalyzer>,
    Path(id): Path<String>,
) -> Result<Json<EventNode>, AppError> {
    let root_id = parse_event_id("id", &id)?;
    Ok(Json(analyzer.get_timeline(root_id).await?))
}

async fn find_overlaps(
    State(analyzer): State<TemporalAnalyzer>,
    range: Result<Query<TimeRange>, QueryRejection>,
) -> Result<Json<Value>, AppError> {
    let Query(range) = range?;
    let overlaps = analyzer.find_overlaps(range).await?;
    Ok(Json(json!({ "count": overlaps.len(), "overlaps": overlaps })))
}

/// `{"gap": null}` when the window holds fewer than two events or no idle time
async fn find_gap(
    State(analyzer): State<TemporalAnalyzer>,
    range: Result<Query<TimeRange>, QueryRejection>,
) -> Result<Json<Value>, AppError> {
    let Query(range) = range?;
    let gap = analyzer.find_temporal_gap(range).await?;
    Ok(Json(json!({ "gap": gap })))
}

/// `{"path": null}` when the events are unconnected or too far apart
async fn find_path(
    State(analyzer): State<TemporalAnalyzer>,
    params: Result<Query<PathParams>, QueryRejection>,
) -> Result<Json<Value>, AppError> {
    let Query(params) = params?;
    let source = parse_event_id("source", &params.source)?;
    let target = parse_event_id("target", &params.target)?;

    let path = analyzer.find_influence_path(source, target).await?;
    Ok(Json(json!({ "path": path })))
}

async fn get_statistics(
    State(analyzer): State<TemporalAnalyzer>,
    range: Result<Query<TimeRange>, QueryRejection>,
) -> Result<Json<TemporalStatistics>, AppError> {
    let Query(range) = range?;
    Ok(Json(analyzer.get_statistics(range).await?))
}

async fn hierarchy_analysis(
    State(analyzer): State<TemporalAnalyzer>,
    Path(id): Path<String>,
) -> Result<Json<HierarchyAnalysis>, AppError> {
    let root_id = parse_event_id("id", &id)?;
    Ok(Json(analyzer.hierarchy_analysis(root_id).await?))
}
