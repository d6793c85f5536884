//! Asynchronous bulk ingestion of historical events
//!
//! # Architecture
//!
//! - **config**: batch size, error cap, work directory (`INGEST_*` variables)
//! - **parser**: canonical pipe-delimited line format
//! - **csv_adapter**: CSV to canonical line conversion into a side file
//! - **batch**: accumulation of parsed records into bounded batches
//! - **registry**: cancellation tokens of running jobs
//! - **worker**: per-job streaming, batched commit with row-by-row fallback
//! - **pipeline**: submission, status, listing and cancellation
//!
//! A bad line never aborts a job; it is recorded as `Line <n>: <reason>` and
//! skipped. Only an unreadable source or an unreachable store fails a job.

pub mod batch;
pub mod config;
pub mod csv_adapter;
pub mod parser;
pub mod pipeline;
pub mod registry;
mod worker;

pub use config::{clamp_batch_size, CsvAdapterConfig, IngestConfig};
pub use csv_adapter::{ConversionReport, CsvAdapter, CsvError, RowError};
pub use parser::{parse_line, LineError, ParsedLine};
pub use pipeline::{IngestionPipeline, PipelineError};
pub use registry::JobRegistry;
