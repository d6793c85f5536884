//! Shortest relational path through the parent/child forest
//!
//! Edges are undirected. The search expands breadth-first, fetching each
//! node's parent and children from the store on demand, and gives up once
//! the hop bound is reached.

use std::collections::{HashMap, HashSet, VecDeque};

use serde::Serialize;
use tracing::debug;
use uuid::Uuid;

use super::EventSummary;
use crate::models::HistoricalEvent;
use crate::store::{EventStore, StoreError, StoreResult};

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InfluencePath {
    /// Source first, target last
    pub events: Vec<EventSummary>,
    pub hops: usize,
    /// Sum of the durations of every event on the path
    pub total_duration_minutes: f64,
}

impl InfluencePath {
    fn from_events(events: &[HistoricalEvent]) -> Self {
        Self {
            events: events.iter().map(EventSummary::from).collect(),
            hops: events.len().saturating_sub(1),
            total_duration_minutes: events.iter().map(HistoricalEvent::duration_minutes).sum(),
        }
    }
}

/// Undirected neighbours of an event: its parent (if still present) and children
async fn neighbours(store: &dyn EventStore, event: &HistoricalEvent) -> StoreResult<Vec<HistoricalEvent>> {
    let mut found = store.children(event.id).await?;
    if let Some(parent_id) = event.parent_id {
        match store.get(parent_id).await {
            Ok(parent) => found.push(parent),
            // Removed concurrently; the edge no longer exists
            Err(StoreError::NotFound(_)) => {},
            Err(e) => return Err(e),
        }
    }
    Ok(found)
}

/// Breadth-first search from `source` to `target_id` within `max_hops` edges
pub async fn find_path(
    store: &dyn EventStore,
    source: HistoricalEvent,
    target_id: Uuid,
    max_hops: usize,
) -> StoreResult<Option<InfluencePath>> {
    if source.id == target_id {
        return Ok(Some(InfluencePath::from_events(&[source])));
    }

    let source_id = source.id;
    let mut came_from: HashMap<Uuid, Uuid> = HashMap::new();
    let mut nodes: HashMap<Uuid, HistoricalEvent> = HashMap::new();
    let mut visited: HashSet<Uuid> = HashSet::from([source_id]);
    let mut frontier: VecDeque<(Uuid, usize)> = VecDeque::from([(source_id, 0)]);
    nodes.insert(source_id, source);

    while let Some((id, hops)) = frontier.pop_front() {
        if hops >= max_hops {
            continue;
        }
        let Some(current) = nodes.get(&id) else {
            continue;
        };
        let adjacent = neighbours(store, current).await?;
        for next in adjacent {
            if !visited.insert(next.id) {
                continue;
            }
            came_from.insert(next.id, id);
            let next_id = next.id;
            nodes.insert(next_id, next);
            if next_id == target_id {
                return Ok(Some(reconstruct(&mut nodes, &came_from, source_id, target_id)));
            }
            frontier.push_back((next_id, hops + 1));
        }
    }

    debug!(source = %source_id, target = %target_id, max_hops, "No path within hop bound");
    Ok(None)
}

fn reconstruct(
    nodes: &mut HashMap<Uuid, HistoricalEvent>,
    came_from: &HashMap<Uuid, Uuid>,
    source_id: Uuid,
    target_id: Uuid,
) -> InfluencePath {
    let mut ids = vec![target_id];
    let mut cursor = target_id;
    while cursor != source_id {
        match came_from.get(&cursor) {
            Some(prev) => {
                ids.push(*prev);
                cursor = *prev;
            },
            None => break,
        }
    }
    ids.reverse();

    let events: Vec<HistoricalEvent> = ids.iter().filter_map(|id| nodes.remove(id)).collect();
    InfluencePath::from_events(&events)
}
