//! Ingestion configuration
//!
//! Loaded from `INGEST_*` environment variables with documented defaults.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Default number of records committed per batch
pub const DEFAULT_BATCH_SIZE: usize = 100;

/// Smallest accepted batch size
pub const MIN_BATCH_SIZE: usize = 10;

/// Largest accepted batch size
pub const MAX_BATCH_SIZE: usize = 1000;

/// Default cap on error messages stored per job
pub const DEFAULT_MAX_RECORDED_ERRORS: usize = 1000;

/// Default number of CSV data rows inspected by the format check
pub const DEFAULT_CSV_SAMPLE_ROWS: usize = 10;

/// Default header fragment identifying the auxiliary numeric CSV column
pub const DEFAULT_CSV_AUX_COLUMN: &str = "value";

/// Clamp a requested batch size into `[MIN_BATCH_SIZE, MAX_BATCH_SIZE]`
pub fn clamp_batch_size(requested: usize) -> usize {
    let clamped = requested.clamp(MIN_BATCH_SIZE, MAX_BATCH_SIZE);
    if clamped != requested {
        tracing::warn!(
            requested,
            clamped,
            "Batch size outside [{}, {}], clamping",
            MIN_BATCH_SIZE,
            MAX_BATCH_SIZE
        );
    }
    clamped
}

/// CSV adapter settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CsvAdapterConfig {
    /// Data rows sampled by the format check
    pub sample_rows: usize,
    /// Case-insensitive header fragment of the auxiliary numeric column;
    /// `None` disables folding it into the description
    pub aux_column: Option<String>,
}

impl Default for CsvAdapterConfig {
    fn default() -> Self {
        Self {
            sample_rows: DEFAULT_CSV_SAMPLE_ROWS,
            aux_column: Some(DEFAULT_CSV_AUX_COLUMN.to_string()),
        }
    }
}

/// Main ingestion configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IngestConfig {
    /// Records per batch commit, always within `[10, 1000]`
    pub batch_size: usize,
    /// Cap on error messages stored per job (`error_lines` keeps counting)
    pub max_recorded_errors: usize,
    /// Directory for CSV side files
    pub work_dir: PathBuf,
    pub csv: CsvAdapterConfig,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            max_recorded_errors: DEFAULT_MAX_RECORDED_ERRORS,
            work_dir: std::env::temp_dir().join("annals-ingest"),
            csv: CsvAdapterConfig::default(),
        }
    }
}

impl IngestConfig {
    /// Load from environment variables
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let batch_size = std::env::var("INGEST_BATCH_SIZE")
            .ok()
            .and_then(|s| s.parse().ok())
            .map(clamp_batch_size)
            .unwrap_or(defaults.batch_size);

        let max_recorded_errors = std::env::var("INGEST_MAX_RECORDED_ERRORS")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(defaults.max_recorded_errors);

        let work_dir = std::env::var("INGEST_WORK_DIR")
            .ok()
            .filter(|s| !s.trim().is_empty())
            .map(PathBuf::from)
            .unwrap_or(defaults.work_dir);

        let sample_rows = std::env::var("INGEST_CSV_SAMPLE_ROWS")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(defaults.csv.sample_rows);

        // An empty value disables the auxiliary column
        let aux_column = match std::env::var("INGEST_CSV_AUX_COLUMN") {
            Ok(value) if value.trim().is_empty() => None,
            Ok(value) => Some(value.trim().to_string()),
            Err(_) => defaults.csv.aux_column,
        };

        Self {
            batch_size,
            max_recorded_errors,
            work_dir,
            csv: CsvAdapterConfig {
                sample_rows,
                aux_column,
            },
        }
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = clamp_batch_size(batch_size);
        self
    }

    pub fn with_max_recorded_errors(mut self, max_recorded_errors: usize) -> Self {
        self.max_recorded_errors = max_recorded_errors;
        self
    }

    pub fn with_work_dir(mut self, work_dir: impl Into<PathBuf>) -> Self {
        self.work_dir = work_dir.into();
        self
    }

    /// Validate settings that clamping cannot repair
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.max_recorded_errors == 0 {
            anyhow::bail!("INGEST_MAX_RECORDED_ERRORS must be greater than 0");
        }
        if self.csv.sample_rows == 0 {
            anyhow::bail!("INGEST_CSV_SAMPLE_ROWS must be greater than 0");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    fn test_clamp_batch_size() {
        assert_eq!(clamp_batch_size(1), MIN_BATCH_SIZE);
        assert_eq!(clamp_batch_size(250), 250);
        assert_eq!(clamp_batch_size(50_000), MAX_BATCH_SIZE);
    }

    #[test]
    fn test_defaults() {
        let config = IngestConfig::default();
        assert_eq!(config.batch_size, 100);
        assert_eq!(config.max_recorded_errors, 1000);
        assert_eq!(config.csv.sample_rows, 10);
        assert_eq!(config.csv.aux_column.as_deref(), Some("value"));
        assert!(config.validate().is_ok());
    }

    #[test]
    #[serial]
    fn test_from_env() {
        std::env::set_var("INGEST_BATCH_SIZE", "5");
        std::env::set_var("INGEST_MAX_RECORDED_ERRORS", "50");
        std::env::set_var("INGEST_CSV_AUX_COLUMN", "");

        let config = IngestConfig::from_env();
        assert_eq!(config.batch_size, MIN_BATCH_SIZE);
        assert_eq!(config.max_recorded_errors, 50);
        assert!(config.csv.aux_column.is_none());

        std::env::remove_var("INGEST_BATCH_SIZE");
        std::env::remove_var("INGEST_MAX_RECORDED_ERRORS");
        std::env::remove_var("INGEST_CSV_AUX_COLUMN");
    }

    #[test]
    fn test_validate_rejects_zero_error_cap() {
        let config = IngestConfig::default().with_max_recorded_errors(0);
        assert!(config.validate().is_err());
    }
}
