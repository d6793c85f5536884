//! Event and job persistence
//!
//! Two backends implement the same traits:
//!
//! - [`postgres::PgEventStore`] / [`postgres::PgJobStore`]: PostgreSQL via SQLx,
//!   relying on unique, foreign-key and check constraints plus recursive CTEs
//!   for subtree and ancestor lookups
//! - [`memory::MemoryEventStore`] / [`memory::MemoryJobStore`]: in-process maps
//!   enforcing the same constraints, used by tests and by `ANNALS_STORE=memory`
//!
//! Hierarchy assembly over a flat list lives in [`hierarchy`] and is shared by
//! both backends.

use std::collections::HashMap;

use async_trait::async_trait;
use thiserror::Error;
use uuid::Uuid;

use crate::models::{
    EventPatch, HistoricalEvent, IngestionJob, NewEvent, SearchPage, SearchQuery, TimeRange,
};
use crate::validation::ValidationError;

pub mod hierarchy;
pub mod memory;
pub mod postgres;

pub use hierarchy::{build_hierarchy, EventNode};
pub use memory::{MemoryEventStore, MemoryJobStore};
pub use postgres::{PgEventStore, PgJobStore};

/// Storage errors shared by every backend
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Conflict(String),

    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// Connection, pool or I/O level fault; the store cannot be reached
    #[error("Store unavailable: {0}")]
    Unavailable(String),

    /// A stored row could not be decoded into a domain value
    #[error("Invalid stored data: {0}")]
    InvalidData(String),

    #[error("Database error: {0}")]
    Database(sqlx::Error),
}

impl StoreError {
    pub fn event_not_found(id: Uuid) -> Self {
        Self::NotFound(format!("Event '{}' not found", id))
    }

    pub fn parent_not_found(parent_id: Uuid) -> Self {
        Self::NotFound(format!("Parent event '{}' not found", parent_id))
    }

    pub fn job_not_found(id: Uuid) -> Self {
        Self::NotFound(format!("Ingestion job '{}' not found", id))
    }

    pub fn duplicate_event(id: Uuid) -> Self {
        Self::Conflict(format!("Event '{}' already exists", id))
    }

    /// Whether the error means the store itself is unreachable
    pub fn is_unavailable(&self) -> bool {
        matches!(self, StoreError::Unavailable(_))
    }
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => StoreError::NotFound("Record not found".to_string()),
            sqlx::Error::Database(db_err) => {
                let code = db_err.code().map(|c| c.into_owned());
                match code.as_deref() {
                    // unique_violation
                    Some("23505") => StoreError::Conflict(db_err.message().to_string()),
                    // foreign_key_violation
                    Some("23503") => StoreError::NotFound(db_err.message().to_string()),
                    // check_violation
                    Some("23514") => StoreError::Validation(ValidationError::Constraint(
                        db_err
                            .constraint()
                            .map(str::to_string)
                            .unwrap_or_else(|| db_err.message().to_string()),
                    )),
                    _ => StoreError::Database(sqlx::Error::Database(db_err)),
                }
            },
            sqlx::Error::Io(_)
            | sqlx::Error::Tls(_)
            | sqlx::Error::PoolTimedOut
            | sqlx::Error::PoolClosed
            | sqlx::Error::WorkerCrashed => StoreError::Unavailable(err.to_string()),
            sqlx::Error::ColumnDecode { .. } | sqlx::Error::Decode(_) => {
                StoreError::InvalidData(err.to_string())
            },
            other => StoreError::Database(other),
        }
    }
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Reject parent chains that loop among the new events of one batch.
///
/// Chains reaching an id outside the batch end there; those parents already
/// exist (or are rejected as missing) and cannot point back into the batch.
pub fn check_batch_acyclic(events: &[NewEvent]) -> Result<(), ValidationError> {
    let parents: HashMap<Uuid, Uuid> = events
        .iter()
        .filter_map(|e| Some((e.id?, e.parent_id?)))
        .collect();

    for (&start, &first_parent) in &parents {
        let mut current = first_parent;
        for _ in 0..parents.len() {
            if current == start {
                return Err(ValidationError::Cycle {
                    event_id: start,
                    parent_id: first_parent,
                });
            }
            match parents.get(&current) {
                Some(&next) => current = next,
                None => break,
            }
        }
    }
    Ok(())
}

/// Data access over persisted historical events
#[async_trait]
pub trait EventStore: Send + Sync {
    /// Persist one event. Fails with `NotFound` if the parent is unknown.
    async fn create(&self, event: NewEvent) -> StoreResult<HistoricalEvent>;

    /// Persist all events atomically or none of them.
    ///
    /// Parents may reference other events of the same batch.
    async fn batch_create(&self, events: Vec<NewEvent>) -> StoreResult<Vec<HistoricalEvent>>;

    async fn get(&self, id: Uuid) -> StoreResult<HistoricalEvent>;

    /// Apply a partial update, rejecting parent changes that would form a cycle
    async fn update(&self, id: Uuid, patch: EventPatch) -> StoreResult<HistoricalEvent>;

    /// Delete an event and its whole subtree, returning the number removed
    async fn delete(&self, id: Uuid) -> StoreResult<u64>;

    /// The root plus every transitive descendant, as a flat list
    async fn subtree(&self, root_id: Uuid) -> StoreResult<Vec<HistoricalEvent>>;

    /// Direct children of an event
    async fn children(&self, id: Uuid) -> StoreResult<Vec<HistoricalEvent>>;

    /// Events fully inside the window, ordered by start then id
    async fn in_range(&self, range: TimeRange) -> StoreResult<Vec<HistoricalEvent>>;

    async fn search(&self, query: &SearchQuery) -> StoreResult<SearchPage>;

    async fn count(&self) -> StoreResult<i64>;

    async fn health_check(&self) -> StoreResult<()>;
}

/// Persistence for ingestion job records
#[async_trait]
pub trait JobStore: Send + Sync {
    async fn insert_job(&self, job: &IngestionJob) -> StoreResult<()>;

    /// Overwrite the stored record with the current in-memory state
    async fn save_job(&self, job: &IngestionJob) -> StoreResult<()>;

    async fn get_job(&self, id: Uuid) -> StoreResult<IngestionJob>;

    /// Most recently created jobs first
    async fn list_jobs(&self, limit: u32) -> StoreResult<Vec<IngestionJob>>;
}
