//! Ingestion job routes
//!
//! - `POST /api/v1/ingestion/jobs` - Submit a file for background ingestion
//! - `GET /api/v1/ingestion/jobs` - List recent jobs, newest first
//! - `GET /api/v1/ingestion/jobs/:id` - Job status
//! - `POST /api/v1/ingestion/jobs/:id/cancel` - Request cancellation

use axum::{
    extract::{
        rejection::{JsonRejection, QueryRejection},
        Path, Query, State,
    },
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use serde_json::json;

use crate::error::AppError;
use crate::ingest::IngestionPipeline;
use crate::validation::parse_event_id;

/// Default number of jobs returned by the list endpoint
pub const DEFAULT_JOB_LIST_LIMIT: u32 = 50;

/// Upper bound on the list endpoint's `limit`
pub const MAX_JOB_LIST_LIMIT: u32 = 500;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct SubmitJobRequest {
    pub file_path: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct ListJobsParams {
    pub limit: Option<u32>,
}

pub fn ingestion_routes() -> Router<IngestionPipeline> {
    Router::new()
        .route("/jobs", get(list_jobs).post(submit_job))
        .route("/jobs/:id", get(get_job))
        .route("/jobs/:id/cancel", post(cancel_job))
}

/// Submit a file; answers before any line is read
///
/// # Response
///
/// - `202 Accepted` - `{"jobId": "..."}`
/// - `400 Bad Request` - Source missing, unreadable, or not a well-formed CSV
#[tracing::instrument(skip(pipeline, payload))]
async fn submit_job(
    State(pipeline): State<IngestionPipeline>,
    payload: Result<Json<SubmitJobRequest>, JsonRejection>,
) -> Result<Response, AppError> {
    let Json(request) = payload?;
    if request.file_path.trim().is_empty() {
        return Err(AppError::Validation("filePath is required".to_string()));
    }

    let job_id = pipeline.submit(request.file_path.trim()).await?;
    Ok((StatusCode::ACCEPTED, Json(json!({ "jobId": job_id }))).into_response())
}

async fn list_jobs(
    State(pipeline): State<IngestionPipeline>,
    params: Result<Query<ListJobsParams>, QueryRejection>,
) -> Result<Response, AppError> {
    let Query(params) = params?;
    let limit = params
        .limit
        .unwrap_or(DEFAULT_JOB_LIST_LIMIT)
        .clamp(1, MAX_JOB_LIST_LIMIT);

    let jobs = pipeline.list_jobs(limit).await?;
    Ok((StatusCode::OK, Json(json!({ "jobs": jobs }))).into_response())
}

async fn get_job(
    State(pipeline): State<IngestionPipeline>,
    Path(id): Path<String>,
) -> Result<Response, AppError> {
    let job_id = parse_event_id("jobId", &id)?;
    let status = pipeline.status(job_id).await?;
    Ok((StatusCode::OK, Json(status)).into_response())
}

/// Cancellation is cooperative; the job settles as CANCELLED at its next batch boundary
///
/// # Response
///
/// - `202 Accepted` - Cancellation signalled
/// - `404 Not Found` - Unknown job
/// - `409 Conflict` - Job already finished
#[tracing::instrument(skip(pipeline))]
async fn cancel_job(
    State(pipeline): State<IngestionPipeline>,
    Path(id): Path<String>,
) -> Result<Response, AppError> {
    let job_id = parse_event_id("jobId", &id)?;
    let status = pipeline.status(job_id).await?;

    if !pipeline.cancel(job_id) {
        return Err(AppError::Conflict(format!(
            "Ingestion job '{}' is not running (status {})",
            job_id, status.status
        )));
    }

    Ok((StatusCode::ACCEPTED, Json(json!({ "jobId": job_id, "cancelRequested": true }))).into_response())
}
