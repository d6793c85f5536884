//! Background processing of one ingestion job
//!
//! The worker streams its source line by line, commits valid records in
//! batches and persists progress after every batch. Reading pauses while a
//! commit is outstanding, so memory stays bounded by one batch.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde_json::json;
use tokio::fs::File;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::batch::BatchAccumulator;
use super::config::IngestConfig;
use super::csv_adapter::CsvAdapter;
use super::parser::{parse_line, LineError, ParsedLine};
use super::registry::JobRegistry;
use crate::models::{IngestionJob, NewEvent};
use crate::store::{EventStore, JobStore, StoreError};
use crate::validation::ValidationError;

/// Result of committing one batch
#[derive(Debug, Default)]
pub struct FlushOutcome {
    pub committed: usize,
    /// Per-record failures, already formatted as `Line <n>: <reason>`
    pub failures: Vec<String>,
    /// Set when the store became unreachable; the job must fail
    pub fatal: Option<StoreError>,
}

/// How the read loop ended
enum StreamEnd {
    Exhausted,
    Cancelled,
    Failed(String),
}

pub(crate) struct JobWorker {
    pub(crate) events: Arc<dyn EventStore>,
    pub(crate) jobs: Arc<dyn JobStore>,
    pub(crate) config: Arc<IngestConfig>,
    pub(crate) registry: JobRegistry,
    pub(crate) csv: CsvAdapter,
}

impl JobWorker {
    /// Drive the job from PENDING to a terminal state
    pub(crate) async fn run(self, mut job: IngestionJob, source: PathBuf, token: CancellationToken) {
        let max_errors = self.config.max_recorded_errors;
        let side_file = CsvAdapter::is_csv(&source)
            .then(|| self.config.work_dir.join(format!("{}.lines", job.id)));

        if token.is_cancelled() {
            info!("Job cancelled before processing started");
            if let Err(e) = job.cancel(max_errors) {
                warn!(error = %e, "Unexpected job state");
            }
            self.persist(&job).await;
        } else {
            match job.start() {
                Ok(()) => {
                    self.persist(&job).await;
                    let end = self.process(&mut job, &source, side_file.as_deref(), &token).await;
                    self.finish(&mut job, end).await;
                },
                Err(e) => warn!(error = %e, "Job could not be started"),
            }
        }

        if let Some(path) = side_file {
            if let Err(e) = tokio::fs::remove_file(&path).await {
                if e.kind() != std::io::ErrorKind::NotFound {
                    warn!(path = %path.display(), error = %e, "Failed to remove side file");
                }
            }
        }
        self.registry.deregister(job.id);
    }

    async fn process(
        &self,
        job: &mut IngestionJob,
        source: &Path,
        side_file: Option<&Path>,
        token: &CancellationToken,
    ) -> StreamEnd {
        let max_errors = self.config.max_recorded_errors;

        let read_path = match side_file {
            Some(side_file) => match self.convert_csv(job, source, side_file).await {
                Ok(()) => side_file.to_path_buf(),
                Err(cause) => return StreamEnd::Failed(cause),
            },
            None => source.to_path_buf(),
        };

        match count_lines(&read_path).await {
            Ok(count) => job.total_lines = count as i64 + job.error_lines,
            Err(e) => return StreamEnd::Failed(format!("cannot read source: {}", e)),
        }
        self.persist(job).await;

        if token.is_cancelled() {
            return StreamEnd::Cancelled;
        }

        let file = match File::open(&read_path).await {
            Ok(file) => file,
            Err(e) => return StreamEnd::Failed(format!("cannot open source: {}", e)),
        };
        let mut reader = BufReader::new(file);
        let mut accumulator = BatchAccumulator::new(self.config.batch_size);
        let mut buf = Vec::new();
        let mut line_number = 0u64;

        loop {
            buf.clear();
            match reader.read_until(b'\n', &mut buf).await {
                Ok(0) => break,
                Ok(_) => line_number += 1,
                Err(e) => {
                    return StreamEnd::Failed(format!(
                        "source became unreadable after line {}: {}",
                        line_number, e
                    ))
                },
            }

            let text = match std::str::from_utf8(&buf) {
                Ok(text) => text,
                Err(_) => {
                    let err = LineError::new(
                        line_number,
                        ValidationError::Encoding("line is not valid UTF-8".to_string()),
                    );
                    job.record_error(err.to_string(), max_errors);
                    continue;
                },
            };
            if text.trim().is_empty() {
                continue;
            }

            let parsed = match parse_line(text, line_number) {
                Ok(parsed) => parsed,
                Err(err) => {
                    debug!(line = line_number, error = %err, "Line rejected");
                    job.record_error(err.to_string(), max_errors);
                    continue;
                },
            };

            if let Some(batch) = accumulator.push(stamp(parsed, job)) {
                if let Some(cause) = self.commit(job, batch).await {
                    return StreamEnd::Failed(cause);
                }
                if token.is_cancelled() {
                    return StreamEnd::Cancelled;
                }
            }
        }

        let remainder = accumulator.take();
        if !remainder.is_empty() {
            if let Some(cause) = self.commit(job, remainder).await {
                return StreamEnd::Failed(cause);
            }
        }

        StreamEnd::Exhausted
    }

    async fn convert_csv(
        &self,
        job: &mut IngestionJob,
        source: &Path,
        side_file: &Path,
    ) -> Result<(), String> {
        tokio::fs::create_dir_all(&self.config.work_dir)
            .await
            .map_err(|e| format!("cannot create work directory: {}", e))?;

        let adapter = self.csv.clone();
        let (src, dst) = (source.to_path_buf(), side_file.to_path_buf());
        let report = tokio::task::spawn_blocking(move || adapter.convert(&src, &dst))
            .await
            .map_err(|e| format!("CSV conversion task failed: {}", e))?
            .map_err(|e| e.to_string())?;

        for row_error in &report.errors {
            job.record_error(row_error.to_string(), self.config.max_recorded_errors);
        }
        Ok(())
    }

    /// Commit a batch and fold the outcome into the job; returns a fatal cause
    async fn commit(&self, job: &mut IngestionJob, batch: Vec<ParsedLine>) -> Option<String> {
        let outcome = self.flush_batch(batch).await;

        job.record_processed(outcome.committed);
        for failure in outcome.failures {
            job.record_error(failure, self.config.max_recorded_errors);
        }
        self.persist(job).await;

        outcome
            .fatal
            .map(|e| format!("event store unreachable: {}", e))
    }

    /// Try one bulk commit, falling back to row-by-row inserts on failure
    pub(crate) async fn flush_batch(&self, batch: Vec<ParsedLine>) -> FlushOutcome {
        let size = batch.len();
        let events: Vec<NewEvent> = batch.iter().map(|line| line.event.clone()).collect();

        let err = match self.events.batch_create(events).await {
            Ok(stored) => {
                debug!(committed = stored.len(), "Batch committed");
                return FlushOutcome {
                    committed: stored.len(),
                    ..Default::default()
                };
            },
            Err(e) if e.is_unavailable() => {
                return FlushOutcome {
                    fatal: Some(e),
                    ..Default::default()
                }
            },
            Err(e) => e,
        };

        warn!(size, error = %err, "Bulk commit failed, inserting records individually");

        let mut outcome = FlushOutcome::default();
        for line in batch {
            match self.events.create(line.event).await {
                Ok(_) => outcome.committed += 1,
                Err(e) if e.is_unavailable() => {
                    outcome.fatal = Some(e);
                    break;
                },
                Err(e) => outcome.failures.push(format!("Line {}: {}", line.line_number, e)),
            }
        }
        outcome
    }

    async fn finish(&self, job: &mut IngestionJob, end: StreamEnd) {
        let max_errors = self.config.max_recorded_errors;
        let result = match end {
            StreamEnd::Exhausted => job.complete(max_errors),
            StreamEnd::Cancelled => job.cancel(max_errors),
            StreamEnd::Failed(ref cause) => {
                error!(cause = %cause, "Ingestion job failed");
                job.fail(cause.clone(), max_errors)
            },
        };
        if let Err(e) = result {
            warn!(error = %e, "Unexpected job state at finalization");
        }

        info!(
            status = %job.status,
            processed = job.processed_lines,
            errors = job.error_lines,
            total = job.total_lines,
            "Ingestion job finished"
        );
        self.persist(job).await;
    }

    async fn persist(&self, job: &IngestionJob) {
        if let Err(e) = self.jobs.save_job(job).await {
            error!(error = %e, "Failed to persist job state");
        }
    }
}

/// Tag an ingested record with its provenance
fn stamp(mut parsed: ParsedLine, job: &IngestionJob) -> ParsedLine {
    let metadata = &mut parsed.event.metadata;
    metadata.insert("source".to_string(), json!("ingestion"));
    metadata.insert("job_id".to_string(), json!(job.id));
    metadata.insert("line".to_string(), json!(parsed.line_number));
    parsed
}

/// Non-blank lines in a file, read in one streaming pass
pub(crate) async fn count_lines(path: &Path) -> std::io::Result<u64> {
    let mut reader = BufReader::new(File::open(path).await?);
    let mut buf = Vec::new();
    let mut count = 0;
    loop {
        buf.clear();
        if reader.read_until(b'\n', &mut buf).await? == 0 {
            return Ok(count);
        }
        if !buf.iter().all(u8::is_ascii_whitespace) {
            count += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{MemoryEventStore, MemoryJobStore};
    use chrono::{TimeZone, Utc};
    use std::io::Write;
    use uuid::Uuid;

    fn worker(events: Arc<MemoryEventStore>) -> JobWorker {
        JobWorker {
            events,
            jobs: Arc::new(MemoryJobStore::new()),
            config: Arc::new(IngestConfig::default()),
            registry: JobRegistry::new(),
            csv: CsvAdapter::default(),
        }
    }

    fn parsed(n: u64, id: Uuid) -> ParsedLine {
        let start = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let end = Utc.with_ymd_and_hms(2024, 1, 2, 0, 0, 0).unwrap();
        ParsedLine {
            line_number: n,
            event: NewEvent::new(format!("event {}", n), start, end).with_id(id),
        }
    }

    #[tokio::test]
    async fn test_flush_commits_whole_batch() {
        let events = Arc::new(MemoryEventStore::new());
        let worker = worker(events.clone());
        let batch = (1..=10).map(|n| parsed(n, Uuid::new_v4())).collect();

        let outcome = worker.flush_batch(batch).await;
        assert_eq!(outcome.committed, 10);
        assert!(outcome.failures.is_empty());
        assert!(outcome.fatal.is_none());
        assert_eq!(events.count().await.unwrap(), 10);
    }

    #[tokio::test]
    async fn test_flush_falls_back_on_conflict() {
        let events = Arc::new(MemoryEventStore::new());
        let taken = Uuid::new_v4();
        events
            .create(parsed(0, taken).event)
            .await
            .unwrap();
        let worker = worker(events.clone());

        let batch = (1..=10)
            .map(|n| parsed(n, if n == 4 { taken } else { Uuid::new_v4() }))
            .collect();
        let outcome = worker.flush_batch(batch).await;

        assert_eq!(outcome.committed, 9);
        assert_eq!(outcome.failures.len(), 1);
        assert!(outcome.failures[0].starts_with("Line 4: "));
        assert_eq!(events.count().await.unwrap(), 10);
    }

    #[tokio::test]
    async fn test_flush_reports_unavailable_store() {
        let events = Arc::new(MemoryEventStore::new());
        events.set_available(false);
        let worker = worker(events);

        let outcome = worker.flush_batch(vec![parsed(1, Uuid::new_v4())]).await;
        assert_eq!(outcome.committed, 0);
        assert!(outcome.fatal.is_some_and(|e| e.is_unavailable()));
    }

    #[tokio::test]
    async fn test_count_lines_skips_blank_lines() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "one\n\n  \ntwo\nthree").unwrap();
        file.flush().unwrap();
        assert_eq!(count_lines(file.path()).await.unwrap(), 3);
    }

    #[test]
    fn test_stamp_metadata() {
        let job = IngestionJob::new("/data/x.txt");
        let stamped = stamp(parsed(7, Uuid::new_v4()), &job);
        assert_eq!(stamped.event.metadata["source"], "ingestion");
        assert_eq!(stamped.event.metadata["line"], 7);
        assert_eq!(stamped.event.metadata["job_id"], json!(job.id));
    }
}
