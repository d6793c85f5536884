//! Shared validation rules
//!
//! The same rules guard direct API writes (where a failure is a request
//! rejection) and ingestion (where a failure only skips the offending line).
//!
//! # Examples
//!
//! ```rust
//! use annals_server::validation::{parse_event_id, validate_name};
//!
//! assert!(validate_name("Battle of Hastings", 255).is_ok());
//! assert!(parse_event_id("id", "not-a-uuid").is_err());
//! ```

use chrono::{DateTime, Utc};
use thiserror::Error;
use uuid::Uuid;

/// Errors produced by input validation
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ValidationError {
    #[error("Invalid {field} '{value}': expected a UUID")]
    InvalidId { field: &'static str, value: String },

    #[error("Name is required and cannot be empty")]
    NameRequired,

    #[error("Name must be at most {max_length} characters")]
    NameTooLong { max_length: usize },

    #[error("Description must be at most {max_length} characters")]
    DescriptionTooLong { max_length: usize },

    #[error("Invalid {field} '{value}': {reason}")]
    InvalidTimestamp {
        field: &'static str,
        value: String,
        reason: String,
    },

    #[error("End date {end} must be after start date {start}")]
    EndNotAfterStart {
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    },

    #[error("Event {0} cannot be its own parent")]
    SelfParent(Uuid),

    #[error("Setting parent {parent_id} on event {event_id} would create a cycle")]
    Cycle { event_id: Uuid, parent_id: Uuid },

    #[error("Expected {expected} fields, found {found}")]
    FieldCount { expected: usize, found: usize },

    #[error("{0}")]
    Encoding(String),

    #[error("Unknown sort field '{0}'")]
    UnknownSortField(String),

    #[error("Unknown sort order '{0}'")]
    UnknownSortOrder(String),

    #[error("Invalid time range: start {start} must be before end {end}")]
    InvalidRange {
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    },

    #[error("Constraint violated: {0}")]
    Constraint(String),
}

/// Validate an event name
///
/// # Rules
/// - Must not be empty after trimming whitespace
/// - Must not exceed `max_length` characters (after trimming)
pub fn validate_name(name: &str, max_length: usize) -> Result<(), ValidationError> {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        return Err(ValidationError::NameRequired);
    }
    if trimmed.chars().count() > max_length {
        return Err(ValidationError::NameTooLong { max_length });
    }
    Ok(())
}

pub fn validate_description(
    description: Option<&str>,
    max_length: usize,
) -> Result<(), ValidationError> {
    match description {
        Some(text) if text.trim().chars().count() > max_length => {
            Err(ValidationError::DescriptionTooLong { max_length })
        },
        _ => Ok(()),
    }
}

/// Events must end strictly after they start
pub fn validate_interval(start: DateTime<Utc>, end: DateTime<Utc>) -> Result<(), ValidationError> {
    if end <= start {
        return Err(ValidationError::EndNotAfterStart { start, end });
    }
    Ok(())
}

/// Parse an identifier field into a UUID
pub fn parse_event_id(field: &'static str, value: &str) -> Result<Uuid, ValidationError> {
    Uuid::parse_str(value.trim()).map_err(|_| ValidationError::InvalidId {
        field,
        value: value.to_string(),
    })
}

/// Parse an ISO-8601 timestamp with an explicit offset
pub fn parse_event_timestamp(
    field: &'static str,
    value: &str,
) -> Result<DateTime<Utc>, ValidationError> {
    annals_common::time::parse_timestamp(value).map_err(|e| ValidationError::InvalidTimestamp {
        field,
        value: value.to_string(),
        reason: match e {
            annals_common::AnnalsError::InvalidTimestamp { reason, .. } => reason,
            other => other.to_string(),
        },
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_validate_name() {
        assert!(validate_name("Moon landing", 255).is_ok());
        assert_eq!(validate_name("   ", 255), Err(ValidationError::NameRequired));
        assert_eq!(
            validate_name(&"x".repeat(256), 255),
            Err(ValidationError::NameTooLong { max_length: 255 })
        );
        // Surrounding whitespace does not count toward the limit
        assert!(validate_name(&format!("  {}  ", "x".repeat(255)), 255).is_ok());
    }

    #[test]
    fn test_validate_name_counts_characters() {
        let name = "é".repeat(255);
        assert!(validate_name(&name, 255).is_ok());
    }

    #[test]
    fn test_validate_description() {
        assert!(validate_description(None, 10).is_ok());
        assert!(validate_description(Some("short"), 10).is_ok());
        assert_eq!(
            validate_description(Some("far too long"), 10),
            Err(ValidationError::DescriptionTooLong { max_length: 10 })
        );
    }

    #[test]
    fn test_validate_interval() {
        let start = Utc.with_ymd_and_hms(2024, 1, 1, 9, 0, 0).unwrap();
        let end = Utc.with_ymd_and_hms(2024, 1, 1, 10, 0, 0).unwrap();
        assert!(validate_interval(start, end).is_ok());
        assert!(validate_interval(end, start).is_err());
        assert!(validate_interval(start, start).is_err());
    }

    #[test]
    fn test_parse_event_id() {
        let id = Uuid::new_v4();
        assert_eq!(parse_event_id("id", &id.to_string()).unwrap(), id);
        assert!(matches!(
            parse_event_id("parent id", "evt-42"),
            Err(ValidationError::InvalidId { field: "parent id", .. })
        ));
    }

    #[test]
    fn test_parse_event_timestamp() {
        assert!(parse_event_timestamp("start date", "2024-01-01T09:00:00Z").is_ok());
        let err = parse_event_timestamp("end date", "next tuesday").unwrap_err();
        assert!(err.to_string().starts_with("Invalid end date 'next tuesday'"));
    }
}
