//! Pairwise overlap detection
//!
//! Events are sorted by start and swept left to right; only events starting
//! before the current one ends are compared, so disjoint data stays linear.

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;

use annals_common::time::minutes_between;

use super::EventSummary;
use crate::models::HistoricalEvent;

/// Two events whose intervals intersect
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OverlapPair {
    /// The pair member that starts first
    pub first: EventSummary,
    pub second: EventSummary,
    pub overlap_start: DateTime<Utc>,
    pub overlap_end: DateTime<Utc>,
    pub overlap_minutes: f64,
}

impl OverlapPair {
    fn overlap(&self) -> Duration {
        self.overlap_end - self.overlap_start
    }
}

/// Every intersecting unordered pair, longest overlap first.
///
/// Two intervals overlap iff `start_a < end_b && start_b < end_a`; touching
/// endpoints do not count. Ties are ordered by the pair's start times, then ids.
pub fn find_overlaps(events: &[HistoricalEvent]) -> Vec<OverlapPair> {
    let mut sorted: Vec<&HistoricalEvent> = events.iter().collect();
    sorted.sort_by_key(|e| (e.start_date, e.id));
    sorted.dedup_by_key(|e| e.id);

    let mut pairs = Vec::new();
    for (i, a) in sorted.iter().enumerate() {
        // b.start >= a.start always holds here, so only one bound needs checking
        for b in sorted[i + 1..].iter().take_while(|b| b.start_date < a.end_date) {
            let overlap_start = b.start_date;
            let overlap_end = a.end_date.min(b.end_date);
            pairs.push(OverlapPair {
                first: EventSummary::from(*a),
                second: EventSummary::from(*b),
                overlap_start,
                overlap_end,
                overlap_minutes: minutes_between(overlap_start, overlap_end),
            });
        }
    }

    pairs.sort_by(|x, y| {
        y.overlap()
            .cmp(&x.overlap())
            .then(x.first.start_date.cmp(&y.first.start_date))
            .then(x.second.start_date.cmp(&y.second.start_date))
            .then(x.first.id.cmp(&y.first.id))
            .then(x.second.id.cmp(&y.second.id))
    });
    pairs
}
