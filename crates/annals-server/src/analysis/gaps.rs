//! Largest idle interval between consecutive events

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;

use annals_common::time::minutes_between;

use super::EventSummary;
use crate::models::HistoricalEvent;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TemporalGap {
    pub preceding: EventSummary,
    pub succeeding: EventSummary,
    pub gap_start: DateTime<Utc>,
    pub gap_end: DateTime<Utc>,
    pub gap_minutes: f64,
}

/// The single largest positive gap between start-ordered neighbours.
///
/// `None` with fewer than two events or when every neighbour pair touches or
/// overlaps. On ties the earliest gap is kept.
pub fn find_largest_gap(events: &[HistoricalEvent]) -> Option<TemporalGap> {
    let mut sorted: Vec<&HistoricalEvent> = events.iter().collect();
    sorted.sort_by_key(|e| (e.start_date, e.id));

    let mut best: Option<(Duration, &HistoricalEvent, &HistoricalEvent)> = None;
    for pair in sorted.windows(2) {
        let (current, next) = (pair[0], pair[1]);
        let gap = next.start_date - current.end_date;
        if gap <= Duration::zero() {
            continue;
        }
        if best.as_ref().map_or(true, |(longest, _, _)| gap > *longest) {
            best = Some((gap, current, next));
        }
    }

    best.map(|(_, preceding, succeeding)| TemporalGap {
        preceding: EventSummary::from(preceding),
        succeeding: EventSummary::from(succeeding),
        gap_start: preceding.end_date,
        gap_end: succeeding.start_date,
        gap_minutes: minutes_between(preceding.end_date, succeeding.start_date),
    })
}
