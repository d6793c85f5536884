//! CSV to canonical line conversion
//!
//! CSV exports are normalized into a side file of canonical pipe-delimited
//! lines which the regular line pipeline then consumes. Header columns are
//! located by case-insensitive name: an exact match wins, otherwise the first
//! unclaimed header containing the name.
//!
//! Row numbers in reported errors count data rows from 1 (the header is row 0).

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use annals_common::time::normalize_timestamp;
use csv::{ReaderBuilder, StringRecord, Trim};
use thiserror::Error;
use tracing::{debug, info};

use super::config::CsvAdapterConfig;
use super::parser::{parse_line, CanonicalLine, NULL_PARENT};

/// Columns every CSV source must provide
pub const REQUIRED_COLUMNS: [&str; 5] = ["eventId", "eventName", "startDate", "endDate", "parentId"];

/// Header fragment of the optional description column
pub const DESCRIPTION_COLUMN: &str = "description";

#[derive(Debug, Error)]
pub enum CsvError {
    #[error("Failed to read CSV source {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },

    #[error("Failed to write side file {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid CSV header: {}", .0.join("; "))]
    Header(Vec<String>),
}

/// A row that could not be converted
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Row {row}: {reason}")]
pub struct RowError {
    pub row: u64,
    pub reason: String,
}

/// Outcome of a conversion run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConversionReport {
    pub rows_read: u64,
    pub lines_written: u64,
    pub errors: Vec<RowError>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct ColumnMap {
    event_id: usize,
    event_name: usize,
    start_date: usize,
    end_date: usize,
    parent_id: usize,
    description: Option<usize>,
    aux: Option<(usize, String)>,
}

impl ColumnMap {
    fn resolve(headers: &StringRecord, aux_fragment: Option<&str>) -> Result<Self, Vec<String>> {
        let lowered: Vec<String> = headers.iter().map(|h| h.trim().to_lowercase()).collect();
        let mut claimed = vec![false; lowered.len()];
        let mut found: [Option<usize>; REQUIRED_COLUMNS.len()] = [None; REQUIRED_COLUMNS.len()];

        // Exact matches first so "eventId" is not claimed by "parentEventId"
        for (slot, name) in found.iter_mut().zip(REQUIRED_COLUMNS) {
            let name = name.to_lowercase();
            if let Some(idx) = lowered.iter().position(|h| *h == name) {
                if !claimed[idx] {
                    claimed[idx] = true;
                    *slot = Some(idx);
                }
            }
        }
        for (slot, name) in found.iter_mut().zip(REQUIRED_COLUMNS) {
            if slot.is_some() {
                continue;
            }
            let name = name.to_lowercase();
            if let Some(idx) = (0..lowered.len()).find(|&i| !claimed[i] && lowered[i].contains(&name)) {
                claimed[idx] = true;
                *slot = Some(idx);
            }
        }

        let missing: Vec<String> = found
            .iter()
            .zip(REQUIRED_COLUMNS)
            .filter(|(slot, _)| slot.is_none())
            .map(|(_, name)| format!("Missing required column '{}'", name))
            .collect();
        let [Some(event_id), Some(event_name), Some(start_date), Some(end_date), Some(parent_id)] =
            found
        else {
            return Err(missing);
        };

        let mut find_optional = |fragment: &str| {
            let fragment = fragment.to_lowercase();
            let idx = (0..lowered.len()).find(|&i| !claimed[i] && lowered[i].contains(&fragment))?;
            claimed[idx] = true;
            Some(idx)
        };
        let description = find_optional(DESCRIPTION_COLUMN);
        let aux = aux_fragment
            .filter(|f| !f.trim().is_empty())
            .and_then(|f| find_optional(f.trim()))
            .map(|idx| (idx, headers.get(idx).unwrap_or_default().trim().to_string()));

        Ok(Self {
            event_id,
            event_name,
            start_date,
            end_date,
            parent_id,
            description,
            aux,
        })
    }
}

/// Converts CSV exports into canonical line files
#[derive(Debug, Clone, Default)]
pub struct CsvAdapter {
    config: CsvAdapterConfig,
}

impl CsvAdapter {
    pub fn new(config: CsvAdapterConfig) -> Self {
        Self { config }
    }

    /// Whether the path has a `.csv` extension (any case)
    pub fn is_csv(path: &Path) -> bool {
        path.extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case("csv"))
    }

    fn reader_builder() -> ReaderBuilder {
        let mut builder = ReaderBuilder::new();
        builder.has_headers(true).flexible(true).trim(Trim::All);
        builder
    }

    /// Check the header and a sample of rows; never fails, returns problems found
    pub fn validate_format(&self, path: &Path) -> Vec<String> {
        let mut errors = Vec::new();

        let mut reader = match Self::reader_builder().from_path(path) {
            Ok(reader) => reader,
            Err(e) => {
                errors.push(format!("Cannot open {}: {}", path.display(), e));
                return errors;
            },
        };

        let headers = match reader.headers() {
            Ok(headers) if headers.iter().any(|h| !h.is_empty()) => headers.clone(),
            Ok(_) => {
                errors.push("CSV file is empty".to_string());
                return errors;
            },
            Err(e) => {
                errors.push(format!("Cannot read CSV header: {}", e));
                return errors;
            },
        };

        if let Err(missing) = ColumnMap::resolve(&headers, self.config.aux_column.as_deref()) {
            errors.extend(missing);
        }

        let mut sampled = 0u64;
        for result in reader.records().take(self.config.sample_rows) {
            sampled += 1;
            match result {
                Ok(record) if record.len() != headers.len() => errors.push(format!(
                    "Row {}: expected {} columns, found {}",
                    sampled,
                    headers.len(),
                    record.len()
                )),
                Ok(_) => {},
                Err(e) => errors.push(format!("Row {}: {}", sampled, e)),
            }
        }
        if sampled == 0 {
            errors.push("CSV file has a header but no data rows".to_string());
        }

        errors
    }

    /// Stream `source` into canonical lines at `destination`.
    ///
    /// Row problems are collected in the report; only unreadable input, an
    /// unusable header or a failed write abort the conversion.
    pub fn convert(&self, source: &Path, destination: &Path) -> Result<ConversionReport, CsvError> {
        let read_err = |source_err: csv::Error| CsvError::Read {
            path: source.to_path_buf(),
            source: source_err,
        };
        let write_err = |io_err: std::io::Error| CsvError::Write {
            path: destination.to_path_buf(),
            source: io_err,
        };

        let mut reader = Self::reader_builder().from_path(source).map_err(read_err)?;
        let headers = reader.headers().map_err(read_err)?.clone();
        let columns = ColumnMap::resolve(&headers, self.config.aux_column.as_deref())
            .map_err(CsvError::Header)?;

        let mut writer = BufWriter::new(File::create(destination).map_err(write_err)?);
        let mut report = ConversionReport::default();
        let mut record = StringRecord::new();

        loop {
            let row = report.rows_read + 1;
            match reader.read_record(&mut record) {
                Ok(false) => break,
                Ok(true) => {},
                Err(e) if e.is_io_error() => return Err(read_err(e)),
                Err(e) => {
                    report.rows_read += 1;
                    report.errors.push(RowError {
                        row,
                        reason: e.to_string(),
                    });
                    continue;
                },
            }
            report.rows_read += 1;

            match convert_row(&record, &columns) {
                Ok(line) => {
                    writeln!(writer, "{}", line).map_err(write_err)?;
                    report.lines_written += 1;
                },
                Err(reason) => report.errors.push(RowError { row, reason }),
            }
        }

        writer.flush().map_err(write_err)?;

        info!(
            source = %source.display(),
            rows = report.rows_read,
            written = report.lines_written,
            rejected = report.errors.len(),
            "CSV conversion finished"
        );
        Ok(report)
    }
}

fn field<'r>(record: &'r StringRecord, idx: usize, name: &str) -> Result<&'r str, String> {
    record
        .get(idx)
        .ok_or_else(|| format!("missing value for column '{}'", name))
}

fn reject_pipes(value: &str, name: &str) -> Result<(), String> {
    if value.contains(['|', '\n', '\r']) {
        return Err(format!("{} must not contain '|' or line breaks", name));
    }
    Ok(())
}

fn convert_row(record: &StringRecord, columns: &ColumnMap) -> Result<String, String> {
    let id = field(record, columns.event_id, "eventId")?;
    let name = field(record, columns.event_name, "eventName")?;
    let start = field(record, columns.start_date, "startDate")?;
    let end = field(record, columns.end_date, "endDate")?;
    let parent = field(record, columns.parent_id, "parentId")?;

    reject_pipes(id, "eventId")?;
    reject_pipes(name, "eventName")?;
    reject_pipes(parent, "parentId")?;

    let start = normalize_timestamp(start).map_err(|e| format!("startDate: {}", e))?;
    let end = normalize_timestamp(end).map_err(|e| format!("endDate: {}", e))?;

    let parent = Some(parent).filter(|p| !p.is_empty() && !p.eq_ignore_ascii_case(NULL_PARENT));

    let mut description: String = columns
        .description
        .and_then(|idx| record.get(idx))
        .unwrap_or_default()
        .chars()
        .map(|c| if matches!(c, '|' | '\n' | '\r') { ' ' } else { c })
        .collect();

    if let Some((idx, ref header)) = columns.aux {
        let raw = record.get(idx).unwrap_or_default().trim();
        match raw.parse::<f64>() {
            Ok(number) if number.is_finite() => {
                description.push_str(&format!(" [{}: {}]", header, raw));
            },
            _ if raw.is_empty() => {},
            _ => debug!(value = raw, column = %header, "Ignoring non-numeric auxiliary value"),
        }
    }

    let line = CanonicalLine {
        id,
        name,
        start: &start,
        end: &end,
        parent,
        description: description.trim(),
    }
    .to_string();

    // Reject here so the error carries the CSV row number
    parse_line(&line, 0).map_err(|e| e.source.to_string())?;
    Ok(line)
}
