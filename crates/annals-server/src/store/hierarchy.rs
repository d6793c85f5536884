//! Tree assembly over a flat event list
//!
//! Works in two passes: index every event by id, then attach each event to
//! its parent's child list. The tree is materialized bottom-up from an
//! explicit pre-order, so deep hierarchies never recurse. Dropping a tree is
//! iterative as well.

use std::collections::{HashMap, HashSet};

use serde::Serialize;
use uuid::Uuid;

use crate::models::HistoricalEvent;

/// One node of an assembled timeline
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EventNode {
    #[serde(flatten)]
    pub event: HistoricalEvent,
    pub duration_minutes: f64,
    pub children: Vec<EventNode>,
}

impl EventNode {
    fn leaf(event: HistoricalEvent) -> Self {
        let duration_minutes = event.duration_minutes();
        Self {
            event,
            duration_minutes,
            children: Vec::new(),
        }
    }

    /// Total nodes in this subtree, including self
    pub fn node_count(&self) -> usize {
        let mut count = 0;
        let mut stack = vec![self];
        while let Some(node) = stack.pop() {
            count += 1;
            stack.extend(node.children.iter());
        }
        count
    }

    /// Depth of the deepest node below this one (0 for a leaf)
    pub fn max_depth(&self) -> usize {
        let mut deepest = 0;
        let mut stack = vec![(self, 0usize)];
        while let Some((node, depth)) = stack.pop() {
            deepest = deepest.max(depth);
            stack.extend(node.children.iter().map(|c| (c, depth + 1)));
        }
        deepest
    }
}

impl Drop for EventNode {
    fn drop(&mut self) {
        let mut stack = std::mem::take(&mut self.children);
        while let Some(mut node) = stack.pop() {
            stack.append(&mut node.children);
        }
    }
}

/// Assemble the tree rooted at `root_id` from a flat list.
///
/// Returns `None` if the root is not in the list. Events that do not descend
/// from the root are ignored; children are ordered by start time, then id.
pub fn build_hierarchy(events: Vec<HistoricalEvent>, root_id: Uuid) -> Option<EventNode> {
    // Pass 1: index by id
    let mut by_id: HashMap<Uuid, HistoricalEvent> =
        events.into_iter().map(|e| (e.id, e)).collect();
    if !by_id.contains_key(&root_id) {
        return None;
    }

    // Pass 2: attach to parents
    let mut children_of: HashMap<Uuid, Vec<Uuid>> = HashMap::new();
    for event in by_id.values() {
        if let Some(parent_id) = event.parent_id {
            if parent_id != event.id && by_id.contains_key(&parent_id) {
                children_of.entry(parent_id).or_default().push(event.id);
            }
        }
    }
    for ids in children_of.values_mut() {
        ids.sort_by_key(|id| (by_id[id].start_date, *id));
    }

    // Pre-order walk from the root; `seen` guards against malformed input
    let mut order = Vec::with_capacity(by_id.len());
    let mut seen = HashSet::new();
    let mut stack = vec![root_id];
    while let Some(id) = stack.pop() {
        if !seen.insert(id) {
            continue;
        }
        order.push(id);
        if let Some(kids) = children_of.get(&id) {
            stack.extend(kids.iter().rev().copied());
        }
    }

    // Build bottom-up: every child is finished before its parent
    let mut built: HashMap<Uuid, EventNode> = HashMap::with_capacity(order.len());
    for id in order.iter().rev() {
        let Some(event) = by_id.remove(id) else {
            continue;
        };
        let mut node = EventNode::leaf(event);
        if let Some(kids) = children_of.get(id) {
            node.children = kids.iter().filter_map(|kid| built.remove(kid)).collect();
        }
        built.insert(*id, node);
    }

    built.remove(&root_id)
}
