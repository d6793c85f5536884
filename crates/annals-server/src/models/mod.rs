//! Domain models
//!
//! - `event`: historical events, creation input and partial patches
//! - `job`: ingestion job records and their status read model
//! - `search`: search filters, sort whitelist, pagination and time ranges

pub mod event;
pub mod job;
pub mod search;

pub use event::{EventPatch, HistoricalEvent, Metadata, NewEvent, MAX_DESCRIPTION_LENGTH, MAX_NAME_LENGTH};
pub use job::{IngestionJob, JobStatus, JobStatusView, JobTransitionError};
pub use search::{Pagination, SearchPage, SearchParams, SearchQuery, SortField, SortOrder, TimeRange};
