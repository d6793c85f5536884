//! Search, pagination and time-window types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::event::HistoricalEvent;
use crate::validation::ValidationError;

/// Default page size for event search
pub const DEFAULT_PAGE_LIMIT: u32 = 20;

/// Largest page size a caller may request
pub const MAX_PAGE_LIMIT: u32 = 100;

/// Time window used by the analyzer and range reads
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeRange {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl TimeRange {
    /// Build a range, rejecting empty or inverted windows
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Result<Self, ValidationError> {
        let range = Self { start, end };
        range.validate()?;
        Ok(range)
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.start >= self.end {
            return Err(ValidationError::InvalidRange {
                start: self.start,
                end: self.end,
            });
        }
        Ok(())
    }

    /// Whether the event lies fully inside the window
    pub fn contains(&self, event: &HistoricalEvent) -> bool {
        event.start_date >= self.start && event.end_date <= self.end
    }
}

/// Whitelisted sort keys
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortField {
    Name,
    #[default]
    StartDate,
    EndDate,
    Duration,
    CreatedAt,
}

impl SortField {
    /// SQL expression the Postgres backend orders by
    pub fn sql_expression(&self) -> &'static str {
        match self {
            SortField::Name => "name",
            SortField::StartDate => "start_date",
            SortField::EndDate => "end_date",
            SortField::Duration => "(end_date - start_date)",
            SortField::CreatedAt => "created_at",
        }
    }
}

impl std::str::FromStr for SortField {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "name" => Ok(SortField::Name),
            "start_date" | "startdate" => Ok(SortField::StartDate),
            "end_date" | "enddate" => Ok(SortField::EndDate),
            "duration" => Ok(SortField::Duration),
            "created_at" | "createdat" => Ok(SortField::CreatedAt),
            _ => Err(ValidationError::UnknownSortField(s.to_string())),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    #[default]
    Asc,
    Desc,
}

impl SortOrder {
    pub fn sql_keyword(&self) -> &'static str {
        match self {
            SortOrder::Asc => "ASC",
            SortOrder::Desc => "DESC",
        }
    }
}

impl std::str::FromStr for SortOrder {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "asc" => Ok(SortOrder::Asc),
            "desc" => Ok(SortOrder::Desc),
            _ => Err(ValidationError::UnknownSortOrder(s.to_string())),
        }
    }
}

/// Page selection; construct through [`Pagination::new`] to get clamped values
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pagination {
    pub page: u32,
    pub limit: u32,
}

impl Pagination {
    /// Clamp `limit` into `[1, 100]` and `page` to at least 1
    pub fn new(page: Option<i64>, limit: Option<i64>) -> Self {
        let page = page.unwrap_or(1).clamp(1, u32::MAX as i64) as u32;
        let limit = limit
            .unwrap_or(DEFAULT_PAGE_LIMIT as i64)
            .clamp(1, MAX_PAGE_LIMIT as i64) as u32;
        Self { page, limit }
    }

    pub fn offset(&self) -> u64 {
        (self.page as u64 - 1) * self.limit as u64
    }
}

impl Default for Pagination {
    fn default() -> Self {
        Self::new(None, None)
    }
}

/// Raw search parameters as they arrive in a query string
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SearchParams {
    pub name: Option<String>,
    pub start_after: Option<DateTime<Utc>>,
    pub end_before: Option<DateTime<Utc>>,
    pub sort: Option<String>,
    pub order: Option<String>,
    pub page: Option<i64>,
    pub limit: Option<i64>,
}

/// Validated event search
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SearchQuery {
    /// Case-insensitive substring of the event name
    pub name: Option<String>,
    /// Events starting at or after this instant
    pub start_after: Option<DateTime<Utc>>,
    /// Events ending at or before this instant
    pub end_before: Option<DateTime<Utc>>,
    pub sort: SortField,
    pub order: SortOrder,
    pub pagination: Pagination,
}

impl TryFrom<SearchParams> for SearchQuery {
    type Error = ValidationError;

    fn try_from(params: SearchParams) -> Result<Self, Self::Error> {
        let sort = params
            .sort
            .as_deref()
            .map(str::parse)
            .transpose()?
            .unwrap_or_default();
        let order = params
            .order
            .as_deref()
            .map(str::parse)
            .transpose()?
            .unwrap_or_default();

        Ok(Self {
            name: params
                .name
                .map(|n| n.trim().to_string())
                .filter(|n| !n.is_empty()),
            start_after: params.start_after,
            end_before: params.end_before,
            sort,
            order,
            pagination: Pagination::new(params.page, params.limit),
        })
    }
}

impl SearchQuery {
    /// Whether an event passes the name and time filters
    pub fn matches(&self, event: &HistoricalEvent) -> bool {
        if let Some(ref needle) = self.name {
            if !event.name.to_lowercase().contains(&needle.to_lowercase()) {
                return false;
            }
        }
        if let Some(after) = self.start_after {
            if event.start_date < after {
                return false;
            }
        }
        if let Some(before) = self.end_before {
            if event.end_date > before {
                return false;
            }
        }
        true
    }
}

/// One page of search results plus the total match count
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchPage {
    pub events: Vec<HistoricalEvent>,
    pub total_events: i64,
    pub page: u32,
    pub limit: u32,
}
