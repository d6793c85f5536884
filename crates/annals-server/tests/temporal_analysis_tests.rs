//! Analyzer scenarios over the in-memory store

use std::sync::Arc;

use chrono::{DateTime, TimeZone, Utc};
use uuid::Uuid;

use annals_server::analysis::{AnalysisConfig, AnalysisError, TemporalAnalyzer};
use annals_server::models::{EventPatch, HistoricalEvent, NewEvent, TimeRange};
use annals_server::store::{EventStore, MemoryEventStore};

fn at(hour: u32, minute: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 2, 1, hour, minute, 0).unwrap()
}

fn day() -> TimeRange {
    TimeRange::new(at(0, 0), at(23, 59)).unwrap()
}

struct Fixture {
    store: Arc<MemoryEventStore>,
    analyzer: TemporalAnalyzer,
}

impl Fixture {
    fn new() -> Self {
        Self::with_hops(AnalysisConfig::default().max_path_hops)
    }

    fn with_hops(max_path_hops: usize) -> Self {
        let store = Arc::new(MemoryEventStore::new());
        let config = AnalysisConfig {
            max_path_hops,
            ..AnalysisConfig::default()
        };
        let analyzer = TemporalAnalyzer::new(store.clone(), config);
        Self { store, analyzer }
    }

    async fn add(&self, name: &str, start: DateTime<Utc>, end: DateTime<Utc>, parent: Option<Uuid>) -> HistoricalEvent {
        let mut event = NewEvent::new(name, start, end);
        event.parent_id = parent;
        self.store.create(event).await.unwrap()
    }
}

#[tokio::test]
async fn test_timeline_of_parent_and_child() {
    let f = Fixture::new();
    let a = f.add("A", at(10, 0), at(11, 0), None).await;
    let b = f.add("B", at(10, 30), at(10, 45), Some(a.id)).await;

    let tree = f.analyzer.get_timeline(a.id).await.unwrap();
    assert_eq!(tree.event.id, a.id);
    assert_eq!(tree.duration_minutes, 60.0);
    assert_eq!(tree.children.len(), 1);
    assert_eq!(tree.children[0].event.id, b.id);
    assert!(tree.children[0].children.is_empty());
}

#[tokio::test]
async fn test_timeline_node_count_matches_subtree() {
    let f = Fixture::new();
    let root = f.add("Root", at(0, 0), at(12, 0), None).await;
    let mut parent = root.id;
    for i in 0..10 {
        let child = f.add(&format!("Level {}", i), at(1, i * 2), at(1, i * 2 + 1), Some(parent)).await;
        f.add(&format!("Leaf {}", i), at(2, i), at(2, i + 1), Some(child.id)).await;
        parent = child.id;
    }
    // Unrelated tree must not leak in
    f.add("Elsewhere", at(3, 0), at(4, 0), None).await;

    let tree = f.analyzer.get_timeline(root.id).await.unwrap();
    assert_eq!(tree.node_count(), 21);
    assert_eq!(tree.max_depth(), 11);
}

#[tokio::test]
async fn test_single_overlap_of_thirty_minutes() {
    let f = Fixture::new();
    let a = f.add("A", at(9, 0), at(10, 0), None).await;
    let b = f.add("B", at(9, 30), at(10, 30), None).await;

    let pairs = f.analyzer.find_overlaps(day()).await.unwrap();
    assert_eq!(pairs.len(), 1);
    assert_eq!(pairs[0].overlap_minutes, 30.0);
    assert_eq!((pairs[0].first.id, pairs[0].second.id), (a.id, b.id));
}

#[tokio::test]
async fn test_gap_of_sixty_minutes() {
    let f = Fixture::new();
    let a = f.add("A", at(9, 0), at(10, 0), None).await;
    let b = f.add("B", at(11, 0), at(12, 0), None).await;

    let gap = f.analyzer.find_temporal_gap(day()).await.unwrap().unwrap();
    assert_eq!(gap.preceding.id, a.id);
    assert_eq!(gap.succeeding.id, b.id);
    assert_eq!(gap.gap_start, at(10, 0));
    assert_eq!(gap.gap_end, at(11, 0));
    assert_eq!(gap.gap_minutes, 60.0);
}

#[tokio::test]
async fn test_gap_absent_for_single_event() {
    let f = Fixture::new();
    f.add("Solo", at(9, 0), at(10, 0), None).await;
    assert!(f.analyzer.find_temporal_gap(day()).await.unwrap().is_none());
}

#[tokio::test]
async fn test_overlaps_and_gaps_are_idempotent() {
    let f = Fixture::new();
    for (i, (start, end)) in [(8, 10), (9, 11), (9, 12), (13, 14), (16, 17), (16, 18)].iter().enumerate() {
        f.add(&format!("E{}", i), at(*start, 0), at(*end, 0), None).await;
    }

    let first_pairs = f.analyzer.find_overlaps(day()).await.unwrap();
    let first_gap = f.analyzer.find_temporal_gap(day()).await.unwrap();
    for _ in 0..3 {
        assert_eq!(f.analyzer.find_overlaps(day()).await.unwrap(), first_pairs);
        assert_eq!(f.analyzer.find_temporal_gap(day()).await.unwrap(), first_gap);
    }

    // Durations are non-increasing
    assert!(first_pairs
        .windows(2)
        .all(|w| w[0].overlap_minutes >= w[1].overlap_minutes));
    assert_eq!(first_pairs.len(), 4);
}

#[tokio::test]
async fn test_influence_path_down_a_chain() {
    let f = Fixture::new();
    let a = f.add("A", at(8, 0), at(12, 0), None).await;
    let b = f.add("B", at(9, 0), at(10, 0), Some(a.id)).await;
    let c = f.add("C", at(9, 15), at(9, 45), Some(b.id)).await;

    let path = f.analyzer.find_influence_path(a.id, c.id).await.unwrap().unwrap();
    let ids: Vec<Uuid> = path.events.iter().map(|e| e.id).collect();
    assert_eq!(ids, vec![a.id, b.id, c.id]);
    assert_eq!(path.hops, 2);
    assert_eq!(path.total_duration_minutes, 240.0 + 60.0 + 30.0);

    // Undirected: walking up works too
    let back = f.analyzer.find_influence_path(c.id, a.id).await.unwrap().unwrap();
    let ids: Vec<Uuid> = back.events.iter().map(|e| e.id).collect();
    assert_eq!(ids, vec![c.id, b.id, a.id]);
}

#[tokio::test]
async fn test_influence_path_respects_hop_bound() {
    let f = Fixture::with_hops(3);
    let mut ids = vec![f.add("N0", at(0, 0), at(1, 0), None).await.id];
    for i in 1..6 {
        let parent = ids[i - 1];
        ids.push(f.add(&format!("N{}", i), at(0, 0), at(1, 0), Some(parent)).await.id);
    }

    assert!(f.analyzer.find_influence_path(ids[0], ids[3]).await.unwrap().is_some());
    assert!(f.analyzer.find_influence_path(ids[0], ids[4]).await.unwrap().is_none());
}

#[tokio::test]
async fn test_influence_path_after_reparent() {
    let f = Fixture::new();
    let left = f.add("Left", at(0, 0), at(1, 0), None).await;
    let right = f.add("Right", at(2, 0), at(3, 0), None).await;
    assert!(f.analyzer.find_influence_path(left.id, right.id).await.unwrap().is_none());

    let patch = EventPatch {
        parent_id: Some(Some(left.id)),
        ..EventPatch::default()
    };
    f.store.update(right.id, patch).await.unwrap();

    let path = f.analyzer.find_influence_path(left.id, right.id).await.unwrap().unwrap();
    assert_eq!(path.hops, 1);
}

#[tokio::test]
async fn test_missing_events_are_not_found() {
    let f = Fixture::new();
    let a = f.add("A", at(0, 0), at(1, 0), None).await;

    assert!(matches!(
        f.analyzer.find_influence_path(Uuid::new_v4(), a.id).await,
        Err(AnalysisError::NotFound(_))
    ));
    assert!(matches!(
        f.analyzer.hierarchy_analysis(Uuid::new_v4()).await,
        Err(AnalysisError::NotFound(_))
    ));
}

#[tokio::test]
async fn test_statistics_and_hierarchy_analysis() {
    let f = Fixture::new();
    let root = f.add("Root", at(8, 0), at(12, 0), None).await;
    let left = f.add("Left", at(8, 30), at(9, 30), Some(root.id)).await;
    f.add("Right", at(10, 0), at(10, 30), Some(root.id)).await;
    f.add("Leaf", at(8, 45), at(9, 0), Some(left.id)).await;

    let stats = f.analyzer.get_statistics(day()).await.unwrap();
    assert_eq!(stats.total_events, 4);
    assert_eq!(stats.root_events, 1);
    assert_eq!(stats.child_events, 3);
    assert_eq!(stats.max_duration_minutes, Some(240.0));
    assert_eq!(stats.min_duration_minutes, Some(15.0));
    assert_eq!(stats.earliest_start, Some(at(8, 0)));
    assert_eq!(stats.latest_end, Some(at(12, 0)));

    let analysis = f.analyzer.hierarchy_analysis(root.id).await.unwrap();
    assert_eq!(analysis.total_nodes, 4);
    assert_eq!(analysis.max_depth, 2);
    assert_eq!(analysis.leaf_count, 2);
    assert_eq!(analysis.depth_distribution.get(&1), Some(&2));
    assert_eq!(analysis.longest_event.id, root.id);
}
