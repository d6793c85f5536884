//! Annals Server Library
//!
//! Stores historical events arranged in a parent/child forest, bulk-loads
//! them from delimited text, and answers temporal questions over them.
//!
//! # Overview
//!
//! - **Event store**: PostgreSQL (`sqlx`) or in-memory backend behind one async trait
//! - **Ingestion**: background jobs that stream a file, validate each line and
//!   commit in batches, isolating bad lines into the job's error list
//! - **CSV adapter**: converts header-mapped CSV into the canonical line format
//! - **Analysis**: timelines, overlaps, gaps, influence paths and statistics
//! - **HTTP API**: axum routes under `/api/v1`
//!
//! # Canonical line format
//!
//! ```text
//! EVENT_ID|EVENT_NAME|START_ISO8601|END_ISO8601|PARENT_ID_OR_NULL|DESCRIPTION
//! ```
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use annals_server::{
//!     analysis::{AnalysisConfig, TemporalAnalyzer},
//!     ingest::{IngestConfig, IngestionPipeline},
//!     store::{MemoryEventStore, MemoryJobStore},
//! };
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let events = Arc::new(MemoryEventStore::new());
//!     let pipeline = IngestionPipeline::new(
//!         events.clone(),
//!         Arc::new(MemoryJobStore::new()),
//!         IngestConfig::default(),
//!     );
//!     let job_id = pipeline.submit("events.txt").await?;
//!     println!("{:?}", pipeline.status(job_id).await?);
//!
//!     let analyzer = TemporalAnalyzer::new(events, AnalysisConfig::default());
//!     println!("max path hops: {}", analyzer.config().max_path_hops);
//!     Ok(())
//! }
//! ```

pub mod analysis;
pub mod config;
pub mod db;
pub mod error;
pub mod features;
pub mod ingest;
pub mod middleware;
pub mod models;
pub mod store;
pub mod validation;

pub use error::AppError;
