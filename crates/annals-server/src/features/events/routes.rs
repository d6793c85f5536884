//! Event API routes
//!
//! # Route Structure
//!
//! - `POST /api/v1/events` - Create an event
//! - `GET /api/v1/events` - Search events with filters, sorting and pagination
//! - `GET /api/v1/events/:id` - Get a single event
//! - `PATCH /api/v1/events/:id` - Partially update an event
//! - `DELETE /api/v1/events/:id` - Delete an event and its whole subtree

use std::sync::Arc;

use axum::{
    extract::{
        rejection::{JsonRejection, QueryRejection},
        Path, Query, State,
    },
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde_json::json;

use crate::error::AppError;
use crate::models::{EventPatch, NewEvent, SearchParams, SearchQuery};
use crate::store::EventStore;
use crate::validation::parse_event_id;

pub type EventsState = Arc<dyn EventStore>;

pub fn events_routes() -> Router<EventsState> {
    Router::new()
        .route("/", get(search_events).post(create_event))
        .route("/:id", get(get_event).patch(update_event).delete(delete_event))
}

/// Create a new event
///
/// # Response
///
/// - `201 Created` - Event created
/// - `400 Bad Request` - Validation error or self-referencing parent
/// - `404 Not Found` - Parent does not exist
/// - `409 Conflict` - An event with the given id already exists
#[tracing::instrument(skip(store, payload))]
async fn create_event(
    State(store): State<EventsState>,
    payload: Result<Json<NewEvent>, JsonRejection>,
) -> Result<Response, AppError> {
    let Json(new_event) = payload?;
    new_event.validate()?;

    let event = store.create(new_event).await?;
    tracing::info!(event_id = %event.id, "Event created via API");

    Ok((StatusCode::CREATED, Json(event)).into_response())
}

/// Search events
///
/// `GET /api/v1/events?name=war&start_after=...&end_before=...&sort=start_date&order=desc&page=1&limit=20`
async fn search_events(
    State(store): State<EventsState>,
    params: Result<Query<SearchParams>, QueryRejection>,
) -> Result<Response, AppError> {
    let Query(params) = params?;
    let query = SearchQuery::try_from(params)?;
    let page = store.search(&query).await?;
    Ok((StatusCode::OK, Json(page)).into_response())
}

async fn get_event(State(store): State<EventsState>, Path(id): Path<String>) -> Result<Response, AppError> {
    let id = parse_event_id("id", &id)?;
    let event = store.get(id).await?;
    Ok((StatusCode::OK, Json(event)).into_response())
}

/// Apply a partial update; unknown fields are rejected with 400
#[tracing::instrument(skip(store, payload))]
async fn update_event(
    State(store): State<EventsState>,
    Path(id): Path<String>,
    payload: Result<Json<EventPatch>, JsonRejection>,
) -> Result<Response, AppError> {
    let id = parse_event_id("id", &id)?;
    let Json(patch) = payload?;

    let event = store.update(id, patch).await?;
    tracing::info!(event_id = %event.id, "Event updated via API");

    Ok((StatusCode::OK, Json(event)).into_response())
}

#[tracing::instrument(skip(store))]
async fn delete_event(State(store): State<EventsState>, Path(id): Path<String>) -> Result<Response, AppError> {
    let id = parse_event_id("id", &id)?;
    let deleted = store.delete(id).await?;
    tracing::info!(event_id = %id, deleted, "Event subtree deleted via API");

    Ok((StatusCode::OK, Json(json!({ "deletedCount": deleted }))).into_response())
}
