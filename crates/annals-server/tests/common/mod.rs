//! Shared fixtures for annals-server integration tests
//!
//! Everything here runs against the in-memory backends, so no database or
//! container is needed.

#![allow(dead_code)]

use std::io::Write;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use tempfile::{NamedTempFile, TempDir};
use tokio::sync::Notify;
use uuid::Uuid;

use annals_server::analysis::{AnalysisConfig, TemporalAnalyzer};
use annals_server::ingest::parser::to_canonical;
use annals_server::ingest::{IngestConfig, IngestionPipeline};
use annals_server::models::{
    EventPatch, HistoricalEvent, JobStatus, JobStatusView, NewEvent, SearchPage, SearchQuery,
    TimeRange,
};
use annals_server::store::{EventStore, MemoryEventStore, MemoryJobStore, StoreResult};

/// Fully wired in-memory service graph
pub struct TestEnv {
    pub events: Arc<MemoryEventStore>,
    pub jobs: Arc<MemoryJobStore>,
    pub pipeline: IngestionPipeline,
    pub analyzer: TemporalAnalyzer,
    pub work_dir: TempDir,
}

impl TestEnv {
    pub fn new() -> Self {
        Self::with_config(IngestConfig::default())
    }

    pub fn with_config(config: IngestConfig) -> Self {
        let work_dir = TempDir::new().expect("Failed to create work dir");
        let config = config.with_work_dir(work_dir.path());

        let events = Arc::new(MemoryEventStore::new());
        let jobs = Arc::new(MemoryJobStore::new());
        let pipeline = IngestionPipeline::new(events.clone(), jobs.clone(), config);
        let analyzer = TemporalAnalyzer::new(events.clone(), AnalysisConfig::default());

        Self {
            events,
            jobs,
            pipeline,
            analyzer,
            work_dir,
        }
    }

    /// Poll until the job reaches a terminal state
    pub async fn wait_for_job(&self, job_id: Uuid) -> JobStatusView {
        wait_for_job(&self.pipeline, job_id).await
    }
}

/// What [`SteppedEventStore`] does once its first batch has committed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AfterFirstBatch {
    /// Signal `first_batch` and hold the commit until `resume` is notified
    Pause,
    /// Take the backing store offline
    GoOffline,
}

/// Memory store that changes behaviour after the first successful batch
pub struct SteppedEventStore {
    pub inner: Arc<MemoryEventStore>,
    pub first_batch: Notify,
    pub resume: Notify,
    after_first_batch: AfterFirstBatch,
    batches: AtomicUsize,
}

impl SteppedEventStore {
    pub fn new(after_first_batch: AfterFirstBatch) -> Self {
        Self {
            inner: Arc::new(MemoryEventStore::new()),
            first_batch: Notify::new(),
            resume: Notify::new(),
            after_first_batch,
            batches: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl EventStore for SteppedEventStore {
    async fn create(&self, event: NewEvent) -> StoreResult<HistoricalEvent> {
        self.inner.create(event).await
    }

    async fn batch_create(&self, events: Vec<NewEvent>) -> StoreResult<Vec<HistoricalEvent>> {
        let result = self.inner.batch_create(events).await;
        if result.is_ok() && self.batches.fetch_add(1, Ordering::SeqCst) == 0 {
            match self.after_first_batch {
                AfterFirstBatch::Pause => {
                    self.first_batch.notify_one();
                    self.resume.notified().await;
                },
                AfterFirstBatch::GoOffline => self.inner.set_available(false),
            }
        }
        result
    }

    async fn get(&self, id: Uuid) -> StoreResult<HistoricalEvent> {
        self.inner.get(id).await
    }

    async fn update(&self, id: Uuid, patch: EventPatch) -> StoreResult<HistoricalEvent> {
        self.inner.update(id, patch).await
    }

    async fn delete(&self, id: Uuid) -> StoreResult<u64> {
        self.inner.delete(id).await
    }

    async fn subtree(&self, root_id: Uuid) -> StoreResult<Vec<HistoricalEvent>> {
        self.inner.subtree(root_id).await
    }

    async fn children(&self, id: Uuid) -> StoreResult<Vec<HistoricalEvent>> {
        self.inner.children(id).await
    }

    async fn in_range(&self, range: TimeRange) -> StoreResult<Vec<HistoricalEvent>> {
        self.inner.in_range(range).await
    }

    async fn search(&self, query: &SearchQuery) -> StoreResult<SearchPage> {
        self.inner.search(query).await
    }

    async fn count(&self) -> StoreResult<i64> {
        self.inner.count().await
    }

    async fn health_check(&self) -> StoreResult<()> {
        self.inner.health_check().await
    }
}

/// Pipeline over an arbitrary event store, with its own work directory
pub fn pipeline_over(events: Arc<dyn EventStore>, config: IngestConfig) -> (IngestionPipeline, TempDir) {
    let work_dir = TempDir::new().expect("Failed to create work dir");
    let config = config.with_work_dir(work_dir.path());
    let pipeline = IngestionPipeline::new(events, Arc::new(MemoryJobStore::new()), config);
    (pipeline, work_dir)
}

pub async fn wait_for_job(pipeline: &IngestionPipeline, job_id: Uuid) -> JobStatusView {
    for _ in 0..500 {
        let status = pipeline.status(job_id).await.expect("Job should exist");
        if status.status.is_terminal() && !pipeline.active_jobs().contains(&job_id) {
            return status;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("Job {} did not finish in time", job_id);
}

pub fn assert_status(view: &JobStatusView, expected: JobStatus) {
    assert_eq!(
        view.status, expected,
        "unexpected job status, errors: {:?}",
        view.errors
    );
}

/// Fixed base instant; offsets are in minutes
pub fn base_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()
}

pub fn minutes(offset: i64) -> DateTime<Utc> {
    base_time() + chrono::Duration::minutes(offset)
}

/// One canonical line for an event spanning `[start, end)` minutes after the base instant
pub fn line(id: Uuid, name: &str, start: i64, end: i64, parent: Option<Uuid>) -> String {
    to_canonical(id, name, minutes(start), minutes(end), parent, None)
}

/// Write lines to a temporary file with the given suffix
pub fn source_file(suffix: &str, lines: &[String]) -> NamedTempFile {
    let mut file = tempfile::Builder::new()
        .suffix(suffix)
        .tempfile()
        .expect("Failed to create source file");
    for line in lines {
        writeln!(file, "{}", line).expect("Failed to write source line");
    }
    file.flush().expect("Failed to flush source file");
    file
}

pub fn canonical_file(lines: &[String]) -> NamedTempFile {
    source_file(".txt", lines)
}
