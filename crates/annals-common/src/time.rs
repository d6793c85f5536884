//! Timestamp helpers shared by the canonical line parser and the CSV adapter
//!
//! Canonical ingestion lines must carry an explicit UTC offset. Foreign formats
//! (CSV exports in particular) frequently omit it, so [`normalize_timestamp`]
//! upgrades zone-less values to UTC before they reach the strict parser.

use chrono::{DateTime, NaiveDate, NaiveDateTime, SecondsFormat, Utc};

use crate::error::{AnnalsError, Result};

/// Naive date-time layouts accepted by [`normalize_timestamp`]
const NAIVE_LAYOUTS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M",
];

/// Parse a timestamp that carries an explicit offset into UTC.
///
/// Accepts RFC 3339 (`2024-03-01T09:00:00Z`, `2024-03-01T09:00:00+02:00`) and
/// the compact ISO-8601 offset form (`2024-03-01T09:00:00+0200`).
pub fn parse_timestamp(value: &str) -> Result<DateTime<Utc>> {
    let value = value.trim();
    if value.is_empty() {
        return Err(AnnalsError::invalid_timestamp(value, "value is empty"));
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Ok(dt.with_timezone(&Utc));
    }

    DateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S%.f%z")
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| AnnalsError::invalid_timestamp(value, e.to_string()))
}

/// Normalize a timestamp to its canonical RFC 3339 UTC form.
///
/// Values with an offset are converted to UTC. Values without one are taken
/// to be UTC already; a bare date becomes midnight UTC.
pub fn normalize_timestamp(value: &str) -> Result<String> {
    let value = value.trim();

    if let Ok(dt) = parse_timestamp(value) {
        return Ok(format_timestamp(dt));
    }

    for layout in NAIVE_LAYOUTS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(value, layout) {
            return Ok(format_timestamp(naive.and_utc()));
        }
    }

    if let Ok(date) = NaiveDate::parse_from_str(value, "%Y-%m-%d") {
        if let Some(midnight) = date.and_hms_opt(0, 0, 0) {
            return Ok(format_timestamp(midnight.and_utc()));
        }
    }

    Err(AnnalsError::invalid_timestamp(
        value,
        "expected an ISO-8601 date or date-time",
    ))
}

/// Render a UTC timestamp the way canonical lines carry it
pub fn format_timestamp(dt: DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::AutoSi, true)
}

/// Fractional minutes from `start` to `end` (negative when `end` precedes `start`)
pub fn minutes_between(start: DateTime<Utc>, end: DateTime<Utc>) -> f64 {
    let delta = end - start;
    match delta.num_microseconds() {
        Some(micros) => micros as f64 / 60_000_000.0,
        None => delta.num_seconds() as f64 / 60.0,
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use proptest::prelude::*;

    #[test]
    fn test_parse_timestamp_with_zone() {
        let dt = parse_timestamp("2024-03-01T09:00:00Z").unwrap();
        assert_eq!(dt, Utc.with_ymd_and_hms(2024, 3, 1, 9, 0, 0).unwrap());

        let shifted = parse_timestamp("2024-03-01T11:00:00+02:00").unwrap();
        assert_eq!(shifted, dt);

        let compact = parse_timestamp("2024-03-01T11:00:00+0200").unwrap();
        assert_eq!(compact, dt);
    }

    #[test]
    fn test_parse_timestamp_rejects_naive_and_garbage() {
        assert!(parse_timestamp("2024-03-01T09:00:00").is_err());
        assert!(parse_timestamp("yesterday").is_err());
        assert!(parse_timestamp("   ").is_err());
    }

    #[test]
    fn test_normalize_appends_utc_marker() {
        assert_eq!(
            normalize_timestamp("2024-03-01T09:00:00").unwrap(),
            "2024-03-01T09:00:00Z"
        );
        assert_eq!(
            normalize_timestamp("2024-03-01 09:00:00").unwrap(),
            "2024-03-01T09:00:00Z"
        );
        assert_eq!(normalize_timestamp("2024-03-01").unwrap(), "2024-03-01T00:00:00Z");
    }

    #[test]
    fn test_normalize_converts_offsets_to_utc() {
        assert_eq!(
            normalize_timestamp("2024-03-01T11:00:00+02:00").unwrap(),
            "2024-03-01T09:00:00Z"
        );
    }

    #[test]
    fn test_normalize_rejects_garbage() {
        let err = normalize_timestamp("03/01/2024").unwrap_err();
        assert!(matches!(err, AnnalsError::InvalidTimestamp { .. }));
    }

    #[test]
    fn test_minutes_between() {
        let start = Utc.with_ymd_and_hms(2024, 3, 1, 9, 0, 0).unwrap();
        let end = Utc.with_ymd_and_hms(2024, 3, 1, 9, 30, 30).unwrap();
        assert_eq!(minutes_between(start, end), 30.5);
        assert_eq!(minutes_between(end, start), -30.5);
    }

    proptest! {
        #[test]
        fn normalized_values_parse_strictly(secs in 0i64..4_000_000_000i64) {
            let dt = Utc.timestamp_opt(secs, 0).unwrap();
            let naive = dt.naive_utc().format("%Y-%m-%dT%H:%M:%S").to_string();
            let normalized = normalize_timestamp(&naive).unwrap();
            prop_assert_eq!(parse_timestamp(&normalized).unwrap(), dt);
        }
    }
}
