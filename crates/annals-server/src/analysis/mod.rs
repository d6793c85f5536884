//! Temporal and hierarchy analysis over stored events
//!
//! [`TemporalAnalyzer`] reads through an [`EventStore`] and runs the
//! algorithms in the submodules over the result:
//!
//! - **overlaps**: intersecting pairs inside a window
//! - **gaps**: the largest idle interval inside a window
//! - **path**: the tree path connecting two events
//! - **stats**: aggregate folds over windows and subtrees

pub mod gaps;
pub mod overlaps;
pub mod path;
pub mod stats;

use std::sync::Arc;

use anyhow::bail;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;
use uuid::Uuid;

use crate::models::{HistoricalEvent, TimeRange};
use crate::store::{build_hierarchy, EventNode, EventStore, StoreError};
use crate::validation::ValidationError;

pub use gaps::TemporalGap;
pub use overlaps::OverlapPair;
pub use path::InfluencePath;
pub use stats::{HierarchyAnalysis, TemporalStatistics};

/// Default hop bound for influence path searches
pub const DEFAULT_MAX_PATH_HOPS: usize = 20;

/// Deepest timeline returned as a nested tree
pub const DEFAULT_MAX_TIMELINE_DEPTH: usize = 256;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalysisConfig {
    pub max_path_hops: usize,
    /// Nested responses are serialized recursively, so deeper timelines are refused
    pub max_timeline_depth: usize,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            max_path_hops: DEFAULT_MAX_PATH_HOPS,
            max_timeline_depth: DEFAULT_MAX_TIMELINE_DEPTH,
        }
    }
}

impl AnalysisConfig {
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.max_path_hops == 0 {
            bail!("Analysis max path hops must be at least 1");
        }
        if self.max_timeline_depth == 0 {
            bail!("Analysis max timeline depth must be at least 1");
        }
        Ok(())
    }
}

#[derive(Debug, Error)]
pub enum AnalysisError {
    #[error("{0}")]
    NotFound(String),

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("Timeline of {root_id} is {depth} levels deep, the limit is {limit}")]
    TooDeep { root_id: Uuid, depth: usize, limit: usize },

    #[error(transparent)]
    Store(StoreError),
}

impl From<StoreError> for AnalysisError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(message) => AnalysisError::NotFound(message),
            StoreError::Validation(e) => AnalysisError::Validation(e),
            other => AnalysisError::Store(other),
        }
    }
}

/// Compact reference to an event inside analysis results
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EventSummary {
    pub id: Uuid,
    pub name: String,
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
    pub duration_minutes: f64,
}

impl From<&HistoricalEvent> for EventSummary {
    fn from(event: &HistoricalEvent) -> Self {
        Self {
            id: event.id,
            name: event.name.clone(),
            start_date: event.start_date,
            end_date: event.end_date,
            duration_minutes: event.duration_minutes(),
        }
    }
}

/// Read-only analysis service; cheap to clone
#[derive(Clone)]
pub struct TemporalAnalyzer {
    store: Arc<dyn EventStore>,
    config: AnalysisConfig,
}

impl TemporalAnalyzer {
    pub fn new(store: Arc<dyn EventStore>, config: AnalysisConfig) -> Self {
        Self { store, config }
    }

    pub fn config(&self) -> &AnalysisConfig {
        &self.config
    }

    async fn events_in(&self, range: TimeRange) -> Result<Vec<HistoricalEvent>, AnalysisError> {
        range.validate()?;
        Ok(self.store.in_range(range).await?)
    }

    async fn assemble(&self, root_id: Uuid) -> Result<EventNode, AnalysisError> {
        let events = self.store.subtree(root_id).await?;
        build_hierarchy(events, root_id)
            .ok_or_else(|| AnalysisError::NotFound(StoreError::event_not_found(root_id).to_string()))
    }

    /// The root event with all transitive descendants nested under it.
    ///
    /// Trees deeper than `max_timeline_depth` are refused with
    /// [`AnalysisError::TooDeep`].
    #[tracing::instrument(skip(self))]
    pub async fn get_timeline(&self, root_id: Uuid) -> Result<EventNode, AnalysisError> {
        let tree = self.assemble(root_id).await?;
        let depth = tree.max_depth();
        debug!(nodes = tree.node_count(), depth, "Timeline assembled");
        if depth > self.config.max_timeline_depth {
            return Err(AnalysisError::TooDeep {
                root_id,
                depth,
                limit: self.config.max_timeline_depth,
            });
        }
        Ok(tree)
    }

    #[tracing::instrument(skip(self))]
    pub async fn find_overlaps(&self, range: TimeRange) -> Result<Vec<OverlapPair>, AnalysisError> {
        let events = self.events_in(range).await?;
        let pairs = overlaps::find_overlaps(&events);
        debug!(events = events.len(), pairs = pairs.len(), "Overlap sweep finished");
        Ok(pairs)
    }

    #[tracing::instrument(skip(self))]
    pub async fn find_temporal_gap(&self, range: TimeRange) -> Result<Option<TemporalGap>, AnalysisError> {
        let events = self.events_in(range).await?;
        Ok(gaps::find_largest_gap(&events))
    }

    /// Shortest path between two events over parent/child edges.
    ///
    /// `None` when they are in different trees or further apart than the
    /// configured hop bound.
    #[tracing::instrument(skip(self))]
    pub async fn find_influence_path(
        &self,
        source_id: Uuid,
        target_id: Uuid,
    ) -> Result<Option<InfluencePath>, AnalysisError> {
        let source = self.store.get(source_id).await?;
        // Fails with NotFound before any traversal
        self.store.get(target_id).await?;
        Ok(path::find_path(self.store.as_ref(), source, target_id, self.config.max_path_hops).await?)
    }

    #[tracing::instrument(skip(self))]
    pub async fn get_statistics(&self, range: TimeRange) -> Result<TemporalStatistics, AnalysisError> {
        let events = self.events_in(range).await?;
        Ok(TemporalStatistics::from_events(&events))
    }

    #[tracing::instrument(skip(self))]
    pub async fn hierarchy_analysis(&self, root_id: Uuid) -> Result<HierarchyAnalysis, AnalysisError> {
        let tree = self.assemble(root_id).await?;
        Ok(HierarchyAnalysis::from_tree(&tree))
    }
}
