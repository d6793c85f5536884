//! Aggregate folds over event sets and assembled hierarchies

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use annals_common::time::minutes_between;

use super::EventSummary;
use crate::models::HistoricalEvent;
use crate::store::EventNode;

/// Duration and composition figures for the events inside a window
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TemporalStatistics {
    pub total_events: usize,
    pub root_events: usize,
    pub child_events: usize,
    pub average_duration_minutes: Option<f64>,
    pub min_duration_minutes: Option<f64>,
    pub max_duration_minutes: Option<f64>,
    pub total_duration_minutes: f64,
    pub earliest_start: Option<DateTime<Utc>>,
    pub latest_end: Option<DateTime<Utc>>,
    /// Minutes from the earliest start to the latest end
    pub span_minutes: f64,
}

impl TemporalStatistics {
    pub fn from_events(events: &[HistoricalEvent]) -> Self {
        let durations: Vec<f64> = events.iter().map(HistoricalEvent::duration_minutes).collect();
        let total_duration_minutes: f64 = durations.iter().sum();
        let root_events = events.iter().filter(|e| e.is_root()).count();

        let earliest_start = events.iter().map(|e| e.start_date).min();
        let latest_end = events.iter().map(|e| e.end_date).max();
        let span_minutes = match (earliest_start, latest_end) {
            (Some(start), Some(end)) => minutes_between(start, end),
            _ => 0.0,
        };

        Self {
            total_events: events.len(),
            root_events,
            child_events: events.len() - root_events,
            average_duration_minutes: (!durations.is_empty())
                .then(|| total_duration_minutes / durations.len() as f64),
            min_duration_minutes: durations.iter().copied().reduce(f64::min),
            max_duration_minutes: durations.iter().copied().reduce(f64::max),
            total_duration_minutes,
            earliest_start,
            latest_end,
            span_minutes,
        }
    }
}

/// Shape of the tree below one root
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HierarchyAnalysis {
    pub root_id: Uuid,
    pub total_nodes: usize,
    /// Root is depth 0
    pub max_depth: usize,
    pub leaf_count: usize,
    /// Number of nodes at each depth
    pub depth_distribution: BTreeMap<usize, usize>,
    pub average_children_per_internal_node: f64,
    pub total_duration_minutes: f64,
    pub longest_event: EventSummary,
}

impl HierarchyAnalysis {
    pub fn from_tree(root: &EventNode) -> Self {
        let mut total_nodes = 0;
        let mut leaf_count = 0;
        let mut internal_nodes = 0;
        let mut child_links = 0;
        let mut total_duration_minutes = 0.0;
        let mut depth_distribution = BTreeMap::new();
        let mut longest = root;

        let mut stack = vec![(root, 0usize)];
        while let Some((node, depth)) = stack.pop() {
            total_nodes += 1;
            total_duration_minutes += node.duration_minutes;
            *depth_distribution.entry(depth).or_insert(0) += 1;

            if node.children.is_empty() {
                leaf_count += 1;
            } else {
                internal_nodes += 1;
                child_links += node.children.len();
            }

            // Ties keep the earlier-visited (shallower, earlier-starting) node
            if node.duration_minutes > longest.duration_minutes {
                longest = node;
            }

            stack.extend(node.children.iter().rev().map(|child| (child, depth + 1)));
        }

        let average_children_per_internal_node = if internal_nodes == 0 {
            0.0
        } else {
            child_links as f64 / internal_nodes as f64
        };

        Self {
            root_id: root.event.id,
            total_nodes,
            max_depth: depth_distribution.keys().next_back().copied().unwrap_or(0),
            leaf_count,
            depth_distribution,
            average_children_per_internal_node,
            total_duration_minutes,
            longest_event: EventSummary::from(&longest.event),
        }
    }
}
