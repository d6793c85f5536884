//! Canonical line format
//!
//! ```text
//! EVENT_ID|EVENT_NAME|START_ISO8601|END_ISO8601|PARENT_ID_OR_NULL|DESCRIPTION
//! ```
//!
//! Exactly six pipe-separated fields. The parent field holds the literal
//! `NULL` (any case) when the event has no parent.

use std::fmt;

use annals_common::time::format_timestamp;
use thiserror::Error;
use uuid::Uuid;

use crate::models::{NewEvent, MAX_DESCRIPTION_LENGTH, MAX_NAME_LENGTH};
use crate::validation::{
    parse_event_id, parse_event_timestamp, validate_description, validate_interval, validate_name,
    ValidationError,
};

/// Fields per canonical line
pub const FIELD_COUNT: usize = 6;

/// Field separator
pub const DELIMITER: char = '|';

/// Parent token meaning "no parent"
pub const NULL_PARENT: &str = "NULL";

/// A line that parsed and validated cleanly
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedLine {
    pub line_number: u64,
    pub event: NewEvent,
}

/// A rejected line; never fatal to the job
#[derive(Debug, Clone, PartialEq, Error)]
#[error("Line {line_number}: {source}")]
pub struct LineError {
    pub line_number: u64,
    pub source: ValidationError,
}

impl LineError {
    pub fn new(line_number: u64, source: ValidationError) -> Self {
        Self {
            line_number,
            source,
        }
    }
}

/// Parse and validate one canonical line (1-based `line_number`)
pub fn parse_line(line: &str, line_number: u64) -> Result<ParsedLine, LineError> {
    parse_fields(line.trim_end_matches(['\r', '\n']))
        .map(|event| ParsedLine { line_number, event })
        .map_err(|source| LineError::new(line_number, source))
}

fn parse_fields(line: &str) -> Result<NewEvent, ValidationError> {
    let fields: Vec<&str> = line.split(DELIMITER).collect();
    if fields.len() != FIELD_COUNT {
        return Err(ValidationError::FieldCount {
            expected: FIELD_COUNT,
            found: fields.len(),
        });
    }

    let id = parse_event_id("event id", fields[0])?;

    let name = fields[1].trim();
    validate_name(name, MAX_NAME_LENGTH)?;

    let start_date = parse_event_timestamp("start date", fields[2])?;
    let end_date = parse_event_timestamp("end date", fields[3])?;
    validate_interval(start_date, end_date)?;

    let parent_field = fields[4].trim();
    let parent_id = if parent_field.eq_ignore_ascii_case(NULL_PARENT) {
        None
    } else {
        Some(parse_event_id("parent id", parent_field)?)
    };
    if parent_id == Some(id) {
        return Err(ValidationError::SelfParent(id));
    }

    let description = Some(fields[5].trim()).filter(|d| !d.is_empty());
    validate_description(description, MAX_DESCRIPTION_LENGTH)?;

    let mut event = NewEvent::new(name, start_date, end_date).with_id(id);
    event.parent_id = parent_id;
    event.description = description.map(str::to_string);
    Ok(event)
}

/// Writer for a canonical line; used by the CSV adapter and by tests
#[derive(Debug, Clone, Copy)]
pub struct CanonicalLine<'a> {
    pub id: &'a str,
    pub name: &'a str,
    pub start: &'a str,
    pub end: &'a str,
    pub parent: Option<&'a str>,
    pub description: &'a str,
}

impl fmt::Display for CanonicalLine<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}|{}|{}|{}|{}|{}",
            self.id,
            self.name,
            self.start,
            self.end,
            self.parent.unwrap_or(NULL_PARENT),
            self.description
        )
    }
}

/// Render a stored event back into canonical form
pub fn to_canonical(
    id: Uuid,
    name: &str,
    start: chrono::DateTime<chrono::Utc>,
    end: chrono::DateTime<chrono::Utc>,
    parent_id: Option<Uuid>,
    description: Option<&str>,
) -> String {
    let id = id.to_string();
    let start = format_timestamp(start);
    let end = format_timestamp(end);
    let parent = parent_id.map(|p| p.to_string());
    CanonicalLine {
        id: &id,
        name,
        start: &start,
        end: &end,
        parent: parent.as_deref(),
        description: description.unwrap_or(""),
    }
    .to_string()
}
