//! Ingestion pipeline entry point
//!
//! Submissions return a job id immediately; the file is processed by a
//! spawned task. Callers poll [`IngestionPipeline::status`] for progress.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use thiserror::Error;
use tracing::{info, info_span, Instrument};
use uuid::Uuid;

use super::config::IngestConfig;
use super::csv_adapter::CsvAdapter;
use super::registry::JobRegistry;
use super::worker::JobWorker;
use crate::models::{IngestionJob, JobStatusView};
use crate::store::{EventStore, JobStore, StoreError};

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Source {path} is not readable: {source}")]
    SourceUnreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Source {0} is not a regular file")]
    NotAFile(PathBuf),

    #[error("Invalid CSV format: {}", .0.join("; "))]
    InvalidFormat(Vec<String>),

    #[error("Ingestion job '{0}' not found")]
    JobNotFound(Uuid),

    #[error("Background task failed: {0}")]
    Task(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Owns job lifecycle; cheap to clone and share between handlers
#[derive(Clone)]
pub struct IngestionPipeline {
    events: Arc<dyn EventStore>,
    jobs: Arc<dyn JobStore>,
    config: Arc<IngestConfig>,
    registry: JobRegistry,
    csv: CsvAdapter,
}

impl IngestionPipeline {
    pub fn new(events: Arc<dyn EventStore>, jobs: Arc<dyn JobStore>, config: IngestConfig) -> Self {
        let csv = CsvAdapter::new(config.csv.clone());
        Self {
            events,
            jobs,
            config: Arc::new(config),
            registry: JobRegistry::new(),
            csv,
        }
    }

    pub fn config(&self) -> &IngestConfig {
        &self.config
    }

    /// Check the source, record a PENDING job and start processing it.
    ///
    /// Returns without waiting for any line to be read.
    #[tracing::instrument(skip(self, path), fields(path = %path.as_ref().display()))]
    pub async fn submit(&self, path: impl AsRef<Path>) -> Result<Uuid, PipelineError> {
        let path = path.as_ref().to_path_buf();
        let unreadable = |source| PipelineError::SourceUnreadable {
            path: path.clone(),
            source,
        };

        let metadata = tokio::fs::metadata(&path).await.map_err(unreadable)?;
        if !metadata.is_file() {
            return Err(PipelineError::NotAFile(path.clone()));
        }
        tokio::fs::File::open(&path).await.map_err(unreadable)?;

        if CsvAdapter::is_csv(&path) {
            let adapter = self.csv.clone();
            let sample = path.clone();
            let format_errors = tokio::task::spawn_blocking(move || adapter.validate_format(&sample))
                .await
                .map_err(|e| PipelineError::Task(e.to_string()))?;
            if !format_errors.is_empty() {
                return Err(PipelineError::InvalidFormat(format_errors));
            }
        }

        let job = IngestionJob::new(path.display().to_string());
        let job_id = job.id;
        self.jobs.insert_job(&job).await?;

        // Registered before spawning so an immediate cancel is never lost
        let token = self.registry.register(job_id);
        let worker = JobWorker {
            events: self.events.clone(),
            jobs: self.jobs.clone(),
            config: self.config.clone(),
            registry: self.registry.clone(),
            csv: self.csv.clone(),
        };
        tokio::spawn(
            worker
                .run(job, path, token)
                .instrument(info_span!("ingestion_job", job_id = %job_id)),
        );

        info!(job_id = %job_id, "Ingestion job submitted");
        Ok(job_id)
    }

    /// Current persisted state of a job
    pub async fn status(&self, job_id: Uuid) -> Result<JobStatusView, PipelineError> {
        match self.jobs.get_job(job_id).await {
            Ok(job) => Ok(JobStatusView::from(job)),
            Err(StoreError::NotFound(_)) => Err(PipelineError::JobNotFound(job_id)),
            Err(e) => Err(e.into()),
        }
    }

    pub async fn list_jobs(&self, limit: u32) -> Result<Vec<JobStatusView>, PipelineError> {
        Ok(self
            .jobs
            .list_jobs(limit)
            .await?
            .into_iter()
            .map(JobStatusView::from)
            .collect())
    }

    /// Request cooperative cancellation; false if the job is not running.
    ///
    /// Takes effect at the next batch boundary. Committed batches stay.
    pub fn cancel(&self, job_id: Uuid) -> bool {
        let signalled = self.registry.cancel(job_id);
        if signalled {
            info!(job_id = %job_id, "Cancellation requested");
        }
        signalled
    }

    /// Ids of jobs whose background task is still running
    pub fn active_jobs(&self) -> Vec<Uuid> {
        self.registry.active_jobs()
    }
}
