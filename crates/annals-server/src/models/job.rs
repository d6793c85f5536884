//! Ingestion job model
//!
//! A job is created `PENDING`, moves to `PROCESSING` once its background task
//! starts reading, and ends in exactly one terminal state.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// Ingestion job status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobStatus {
    Pending,
    Processing,
    Completed,
    Failed,
    Cancelled,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "PENDING",
            JobStatus::Processing => "PROCESSING",
            JobStatus::Completed => "COMPLETED",
            JobStatus::Failed => "FAILED",
            JobStatus::Cancelled => "CANCELLED",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed | JobStatus::Cancelled)
    }

    /// Allowed edges of the job state machine
    pub fn can_transition_to(&self, next: JobStatus) -> bool {
        match (self, next) {
            (JobStatus::Pending, JobStatus::Processing) => true,
            (JobStatus::Pending, JobStatus::Failed) => true,
            (JobStatus::Pending, JobStatus::Cancelled) => true,
            (JobStatus::Processing, next) => next.is_terminal(),
            _ => false,
        }
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for JobStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "PENDING" => Ok(JobStatus::Pending),
            "PROCESSING" => Ok(JobStatus::Processing),
            "COMPLETED" => Ok(JobStatus::Completed),
            "FAILED" => Ok(JobStatus::Failed),
            "CANCELLED" => Ok(JobStatus::Cancelled),
            other => Err(format!("Unknown job status '{}'", other)),
        }
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("Job {job_id} cannot move from {from} to {to}")]
pub struct JobTransitionError {
    pub job_id: Uuid,
    pub from: JobStatus,
    pub to: JobStatus,
}

/// Ingestion job record (maps to the ingestion_jobs table)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IngestionJob {
    pub id: Uuid,
    pub status: JobStatus,
    pub file_path: String,
    pub total_lines: i64,
    pub processed_lines: i64,
    pub error_lines: i64,
    pub errors: Vec<String>,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl IngestionJob {
    pub fn new(file_path: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            status: JobStatus::Pending,
            file_path: file_path.into(),
            total_lines: 0,
            processed_lines: 0,
            error_lines: 0,
            errors: Vec::new(),
            start_time: None,
            end_time: None,
            created_at: Utc::now(),
        }
    }

    fn transition(&mut self, next: JobStatus) -> Result<(), JobTransitionError> {
        if !self.status.can_transition_to(next) {
            return Err(JobTransitionError {
                job_id: self.id,
                from: self.status,
                to: next,
            });
        }
        self.status = next;
        if next.is_terminal() {
            self.end_time = Some(Utc::now());
        }
        Ok(())
    }

    /// PENDING -> PROCESSING
    pub fn start(&mut self) -> Result<(), JobTransitionError> {
        self.transition(JobStatus::Processing)?;
        self.start_time = Some(Utc::now());
        Ok(())
    }

    pub fn complete(&mut self, max_recorded_errors: usize) -> Result<(), JobTransitionError> {
        self.transition(JobStatus::Completed)?;
        self.summarize_omitted_errors(max_recorded_errors);
        Ok(())
    }

    pub fn cancel(&mut self, max_recorded_errors: usize) -> Result<(), JobTransitionError> {
        self.transition(JobStatus::Cancelled)?;
        self.summarize_omitted_errors(max_recorded_errors);
        Ok(())
    }

    /// Terminal failure; the cause is always recorded as the last error entry
    pub fn fail(
        &mut self,
        cause: impl Into<String>,
        max_recorded_errors: usize,
    ) -> Result<(), JobTransitionError> {
        self.transition(JobStatus::Failed)?;
        self.summarize_omitted_errors(max_recorded_errors);
        self.errors.push(format!("Job failed: {}", cause.into()));
        Ok(())
    }

    pub fn record_processed(&mut self, count: usize) {
        self.processed_lines += count as i64;
    }

    /// Count a rejected line, keeping at most `max_recorded_errors` messages
    pub fn record_error(&mut self, message: impl Into<String>, max_recorded_errors: usize) {
        self.error_lines += 1;
        if self.errors.len() < max_recorded_errors {
            self.errors.push(message.into());
        }
    }

    /// Number of error messages dropped because of the cap
    pub fn omitted_errors(&self) -> i64 {
        (self.error_lines - self.errors.len() as i64).max(0)
    }

    fn summarize_omitted_errors(&mut self, max_recorded_errors: usize) {
        let omitted = self.omitted_errors();
        if omitted > 0 && self.errors.len() >= max_recorded_errors {
            self.errors.push(format!("{} further errors omitted", omitted));
        }
    }
}

/// Read model returned to callers polling a job
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobStatusView {
    pub job_id: Uuid,
    pub status: JobStatus,
    pub file_path: String,
    pub processed_lines: i64,
    pub error_lines: i64,
    pub total_lines: i64,
    pub errors: Vec<String>,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
}

impl From<&IngestionJob> for JobStatusView {
    fn from(job: &IngestionJob) -> Self {
        Self {
            job_id: job.id,
            status: job.status,
            file_path: job.file_path.clone(),
            processed_lines: job.processed_lines,
            error_lines: job.error_lines,
            total_lines: job.total_lines,
            errors: job.errors.clone(),
            start_time: job.start_time,
            end_time: job.end_time,
        }
    }
}

impl From<IngestionJob> for JobStatusView {
    fn from(job: IngestionJob) -> Self {
        Self::from(&job)
    }
}
