//! In-process store backend
//!
//! Enforces the same constraints as the PostgreSQL schema (unique ids, parent
//! existence, `end > start`, no cycles, all-or-nothing batches) and performs
//! hierarchy traversal client-side.

use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering as AtomicOrdering};

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::{check_batch_acyclic, EventStore, JobStore, StoreError, StoreResult};
use crate::models::{
    EventPatch, HistoricalEvent, IngestionJob, NewEvent, SearchPage, SearchQuery, SortField,
    SortOrder, TimeRange,
};
use crate::validation::ValidationError;

/// Event store kept entirely in memory
#[derive(Debug)]
pub struct MemoryEventStore {
    events: RwLock<HashMap<Uuid, HistoricalEvent>>,
    available: AtomicBool,
}

impl Default for MemoryEventStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryEventStore {
    pub fn new() -> Self {
        Self {
            events: RwLock::new(HashMap::new()),
            available: AtomicBool::new(true),
        }
    }

    /// Simulate losing (or regaining) the connection to the store
    pub fn set_available(&self, available: bool) {
        self.available.store(available, AtomicOrdering::SeqCst);
    }

    fn ensure_available(&self) -> StoreResult<()> {
        if self.available.load(AtomicOrdering::SeqCst) {
            Ok(())
        } else {
            Err(StoreError::Unavailable("in-memory store is offline".to_string()))
        }
    }
}

/// Ids of `root_id` and all its descendants, root first
fn collect_subtree(events: &HashMap<Uuid, HistoricalEvent>, root_id: Uuid) -> Vec<Uuid> {
    let mut children_of: HashMap<Uuid, Vec<Uuid>> = HashMap::new();
    for event in events.values() {
        if let Some(parent_id) = event.parent_id {
            children_of.entry(parent_id).or_default().push(event.id);
        }
    }

    let mut ids = Vec::new();
    let mut seen = HashSet::new();
    let mut stack = vec![root_id];
    while let Some(id) = stack.pop() {
        if !seen.insert(id) {
            continue;
        }
        ids.push(id);
        if let Some(kids) = children_of.get(&id) {
            stack.extend(kids.iter().copied());
        }
    }
    ids
}

/// Whether making `parent_id` the parent of `event_id` closes a loop
fn creates_cycle(events: &HashMap<Uuid, HistoricalEvent>, event_id: Uuid, parent_id: Uuid) -> bool {
    let mut current = Some(parent_id);
    let mut hops = 0;
    while let Some(id) = current {
        if id == event_id {
            return true;
        }
        hops += 1;
        if hops > events.len() {
            return true;
        }
        current = events.get(&id).and_then(|e| e.parent_id);
    }
    false
}

fn compare(a: &HistoricalEvent, b: &HistoricalEvent, field: SortField) -> Ordering {
    let primary = match field {
        SortField::Name => a.name.to_lowercase().cmp(&b.name.to_lowercase()),
        SortField::StartDate => a.start_date.cmp(&b.start_date),
        SortField::EndDate => a.end_date.cmp(&b.end_date),
        SortField::Duration => (a.end_date - a.start_date).cmp(&(b.end_date - b.start_date)),
        SortField::CreatedAt => a.created_at.cmp(&b.created_at),
    };
    primary.then_with(|| a.id.cmp(&b.id))
}

#[async_trait]
impl EventStore for MemoryEventStore {
    async fn create(&self, event: NewEvent) -> StoreResult<HistoricalEvent> {
        self.ensure_available()?;
        let event = event.into_event(Utc::now())?;

        let mut events = self.events.write().await;
        if events.contains_key(&event.id) {
            return Err(StoreError::duplicate_event(event.id));
        }
        if let Some(parent_id) = event.parent_id {
            if !events.contains_key(&parent_id) {
                return Err(StoreError::parent_not_found(parent_id));
            }
        }

        events.insert(event.id, event.clone());
        Ok(event)
    }

    async fn batch_create(&self, events: Vec<NewEvent>) -> StoreResult<Vec<HistoricalEvent>> {
        self.ensure_available()?;
        check_batch_acyclic(&events)?;

        let now = Utc::now();
        let prepared = events
            .into_iter()
            .map(|e| e.into_event(now))
            .collect::<Result<Vec<_>, _>>()?;

        let mut stored = self.events.write().await;
        let mut batch_ids = HashSet::with_capacity(prepared.len());
        for event in &prepared {
            if stored.contains_key(&event.id) || !batch_ids.insert(event.id) {
                return Err(StoreError::duplicate_event(event.id));
            }
        }
        for event in &prepared {
            if let Some(parent_id) = event.parent_id {
                if !stored.contains_key(&parent_id) && !batch_ids.contains(&parent_id) {
                    return Err(StoreError::parent_not_found(parent_id));
                }
            }
        }

        for event in &prepared {
            stored.insert(event.id, event.clone());
        }
        Ok(prepared)
    }

    async fn get(&self, id: Uuid) -> StoreResult<HistoricalEvent> {
        self.ensure_available()?;
        self.events
            .read()
            .await
            .get(&id)
            .cloned()
            .ok_or_else(|| StoreError::event_not_found(id))
    }

    async fn update(&self, id: Uuid, patch: EventPatch) -> StoreResult<HistoricalEvent> {
        self.ensure_available()?;
        let mut events = self.events.write().await;
        let current = events.get(&id).ok_or_else(|| StoreError::event_not_found(id))?;
        let updated = patch.apply(current, Utc::now())?;

        if patch.changes_parent(current) {
            if let Some(parent_id) = updated.parent_id {
                if !events.contains_key(&parent_id) {
                    return Err(StoreError::parent_not_found(parent_id));
                }
                if creates_cycle(&events, id, parent_id) {
                    return Err(ValidationError::Cycle {
                        event_id: id,
                        parent_id,
                    }
                    .into());
                }
            }
        }

        events.insert(id, updated.clone());
        Ok(updated)
    }

    async fn delete(&self, id: Uuid) -> StoreResult<u64> {
        self.ensure_available()?;
        let mut events = self.events.write().await;
        if !events.contains_key(&id) {
            return Err(StoreError::event_not_found(id));
        }
        let doomed = collect_subtree(&events, id);
        for doomed_id in &doomed {
            events.remove(doomed_id);
        }
        Ok(doomed.len() as u64)
    }

    async fn subtree(&self, root_id: Uuid) -> StoreResult<Vec<HistoricalEvent>> {
        self.ensure_available()?;
        let events = self.events.read().await;
        if !events.contains_key(&root_id) {
            return Err(StoreError::event_not_found(root_id));
        }
        Ok(collect_subtree(&events, root_id)
            .into_iter()
            .filter_map(|id| events.get(&id).cloned())
            .collect())
    }

    async fn children(&self, id: Uuid) -> StoreResult<Vec<HistoricalEvent>> {
        self.ensure_available()?;
        let events = self.events.read().await;
        let mut children: Vec<_> = events
            .values()
            .filter(|e| e.parent_id == Some(id))
            .cloned()
            .collect();
        children.sort_by(|a, b| compare(a, b, SortField::StartDate));
        Ok(children)
    }

    async fn in_range(&self, range: TimeRange) -> StoreResult<Vec<HistoricalEvent>> {
        self.ensure_available()?;
        range.validate()?;
        let events = self.events.read().await;
        let mut inside: Vec<_> = events.values().filter(|e| range.contains(e)).cloned().collect();
        inside.sort_by(|a, b| compare(a, b, SortField::StartDate));
        Ok(inside)
    }

    async fn search(&self, query: &SearchQuery) -> StoreResult<SearchPage> {
        self.ensure_available()?;
        let events = self.events.read().await;
        let mut matches: Vec<_> = events.values().filter(|e| query.matches(e)).collect();
        matches.sort_by(|a, b| {
            let ordering = compare(a, b, query.sort);
            match query.order {
                SortOrder::Asc => ordering,
                SortOrder::Desc => ordering.reverse(),
            }
        });

        let total_events = matches.len() as i64;
        let page = query.pagination;
        let events = matches
            .into_iter()
            .skip(page.offset() as usize)
            .take(page.limit as usize)
            .cloned()
            .collect();

        Ok(SearchPage {
            events,
            total_events,
            page: page.page,
            limit: page.limit,
        })
    }

    async fn count(&self) -> StoreResult<i64> {
        self.ensure_available()?;
        Ok(self.events.read().await.len() as i64)
    }

    async fn health_check(&self) -> StoreResult<()> {
        self.ensure_available()
    }
}

/// Job store kept entirely in memory
#[derive(Debug, Default)]
pub struct MemoryJobStore {
    jobs: RwLock<HashMap<Uuid, IngestionJob>>,
}

impl MemoryJobStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl JobStore for MemoryJobStore {
    async fn insert_job(&self, job: &IngestionJob) -> StoreResult<()> {
        let mut jobs = self.jobs.write().await;
        if jobs.contains_key(&job.id) {
            return Err(StoreError::Conflict(format!("Ingestion job '{}' already exists", job.id)));
        }
        jobs.insert(job.id, job.clone());
        Ok(())
    }

    async fn save_job(&self, job: &IngestionJob) -> StoreResult<()> {
        let mut jobs = self.jobs.write().await;
        match jobs.get_mut(&job.id) {
            Some(stored) => {
                *stored = job.clone();
                Ok(())
            },
            None => Err(StoreError::job_not_found(job.id)),
        }
    }

    async fn get_job(&self, id: Uuid) -> StoreResult<IngestionJob> {
        self.jobs
            .read()
            .await
            .get(&id)
            .cloned()
            .ok_or_else(|| StoreError::job_not_found(id))
    }

    async fn list_jobs(&self, limit: u32) -> StoreResult<Vec<IngestionJob>> {
        let jobs = self.jobs.read().await;
        let mut recent: Vec<_> = jobs.values().cloned().collect();
        recent.sort_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| a.id.cmp(&b.id)));
        recent.truncate(limit as usize);
        Ok(recent)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{JobStatus, Pagination};
    use chrono::{DateTime, TimeZone};

    fn at(hour: u32, minute: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 1, hour, minute, 0).unwrap()
    }

    fn new_event(name: &str, start: DateTime<Utc>, end: DateTime<Utc>) -> NewEvent {
        NewEvent::new(name, start, end).with_id(Uuid::new_v4())
    }

    #[tokio::test]
    async fn test_create_and_get() {
        let store = MemoryEventStore::new();
        let created = store.create(NewEvent::new("Coronation", at(9, 0), at(11, 0))).await.unwrap();
        let fetched = store.get(created.id).await.unwrap();
        assert_eq!(created, fetched);
        assert_eq!(store.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_create_rejects_unknown_parent() {
        let store = MemoryEventStore::new();
        let result = store
            .create(NewEvent::new("Orphan", at(9, 0), at(10, 0)).with_parent(Uuid::new_v4()))
            .await;
        assert!(matches!(result, Err(StoreError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_create_rejects_duplicate_id() {
        let store = MemoryEventStore::new();
        let event = new_event("Once", at(9, 0), at(10, 0));
        store.create(event.clone()).await.unwrap();
        assert!(matches!(store.create(event).await, Err(StoreError::Conflict(_))));
    }

    #[tokio::test]
    async fn test_create_rejects_inverted_interval() {
        let store = MemoryEventStore::new();
        let result = store.create(NewEvent::new("Backwards", at(10, 0), at(9, 0))).await;
        assert!(matches!(
            result,
            Err(StoreError::Validation(ValidationError::EndNotAfterStart { .. }))
        ));
        assert_eq!(store.count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_batch_is_all_or_nothing() {
        let store = MemoryEventStore::new();
        let existing = new_event("Existing", at(8, 0), at(9, 0));
        store.create(existing.clone()).await.unwrap();

        let mut batch: Vec<_> = (0..10)
            .map(|i| new_event(&format!("e{}", i), at(9, i), at(10, i)))
            .collect();
        batch[5] = existing;

        assert!(matches!(store.batch_create(batch).await, Err(StoreError::Conflict(_))));
        assert_eq!(store.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_batch_parent_within_batch() {
        let store = MemoryEventStore::new();
        let parent = new_event("War", at(8, 0), at(18, 0));
        let child = new_event("Battle", at(9, 0), at(10, 0)).with_parent(parent.id.unwrap());
        // Child listed first; its parent arrives in the same batch
        let stored = store.batch_create(vec![child, parent]).await.unwrap();
        assert_eq!(stored.len(), 2);
    }

    #[tokio::test]
    async fn test_update_rejects_cycle() {
        let store = MemoryEventStore::new();
        let a = store.create(new_event("A", at(8, 0), at(18, 0))).await.unwrap();
        let b = store
            .create(new_event("B", at(9, 0), at(12, 0)).with_parent(a.id))
            .await
            .unwrap();
        let c = store
            .create(new_event("C", at(10, 0), at(11, 0)).with_parent(b.id))
            .await
            .unwrap();

        let patch = EventPatch {
            parent_id: Some(Some(c.id)),
            ..Default::default()
        };
        let result = store.update(a.id, patch).await;
        assert!(matches!(
            result,
            Err(StoreError::Validation(ValidationError::Cycle { .. }))
        ));

        // Detaching is always allowed
        let patch = EventPatch {
            parent_id: Some(None),
            ..Default::default()
        };
        assert!(store.update(c.id, patch).await.unwrap().is_root());
    }

    #[tokio::test]
    async fn test_update_missing_event() {
        let store = MemoryEventStore::new();
        let result = store.update(Uuid::new_v4(), EventPatch::default()).await;
        assert!(matches!(result, Err(StoreError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_delete_cascades() {
        let store = MemoryEventStore::new();
        let a = store.create(new_event("A", at(8, 0), at(18, 0))).await.unwrap();
        let b = store
            .create(new_event("B", at(9, 0), at(12, 0)).with_parent(a.id))
            .await
            .unwrap();
        store
            .create(new_event("C", at(10, 0), at(11, 0)).with_parent(b.id))
            .await
            .unwrap();
        let other = store.create(new_event("Other", at(1, 0), at(2, 0))).await.unwrap();

        assert_eq!(store.delete(a.id).await.unwrap(), 3);
        assert_eq!(store.count().await.unwrap(), 1);
        assert!(store.get(other.id).await.is_ok());
        assert!(matches!(store.delete(a.id).await, Err(StoreError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_subtree_and_children() {
        let store = MemoryEventStore::new();
        let a = store.create(new_event("A", at(8, 0), at(18, 0))).await.unwrap();
        let b = store
            .create(new_event("B", at(9, 0), at(12, 0)).with_parent(a.id))
            .await
            .unwrap();
        store
            .create(new_event("C", at(10, 0), at(11, 0)).with_parent(b.id))
            .await
            .unwrap();

        let subtree = store.subtree(a.id).await.unwrap();
        assert_eq!(subtree.len(), 3);
        assert_eq!(subtree[0].id, a.id);

        let children = store.children(a.id).await.unwrap();
        assert_eq!(children.len(), 1);
        assert_eq!(children[0].id, b.id);

        assert!(matches!(store.subtree(Uuid::new_v4()).await, Err(StoreError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_search_filters_sorts_and_pages() {
        let store = MemoryEventStore::new();
        for (name, start, end) in [
            ("Siege of Orleans", at(9, 0), at(10, 0)),
            ("Relief of Orleans", at(11, 0), at(13, 0)),
            ("Coronation", at(14, 0), at(15, 0)),
        ] {
            store.create(NewEvent::new(name, start, end)).await.unwrap();
        }

        let query = SearchQuery {
            name: Some("ORLEANS".to_string()),
            sort: SortField::Duration,
            order: SortOrder::Desc,
            pagination: Pagination::new(Some(1), Some(1)),
            ..Default::default()
        };
        let page = store.search(&query).await.unwrap();
        assert_eq!(page.total_events, 2);
        assert_eq!(page.events.len(), 1);
        assert_eq!(page.events[0].name, "Relief of Orleans");

        let query = SearchQuery {
            start_after: Some(at(10, 30)),
            end_before: Some(at(13, 0)),
            ..Default::default()
        };
        let page = store.search(&query).await.unwrap();
        assert_eq!(page.total_events, 1);
        assert_eq!(page.events[0].name, "Relief of Orleans");
    }

    #[tokio::test]
    async fn test_in_range_requires_full_containment() {
        let store = MemoryEventStore::new();
        store.create(NewEvent::new("inside", at(9, 0), at(10, 0))).await.unwrap();
        store.create(NewEvent::new("straddle", at(11, 0), at(13, 0))).await.unwrap();

        let range = TimeRange::new(at(8, 0), at(12, 0)).unwrap();
        let events = store.in_range(range).await.unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].name, "inside");
    }

    #[tokio::test]
    async fn test_unavailable_store() {
        let store = MemoryEventStore::new();
        store.set_available(false);
        let err = store.create(NewEvent::new("x", at(9, 0), at(10, 0))).await.unwrap_err();
        assert!(err.is_unavailable());
        assert!(store.health_check().await.is_err());

        store.set_available(true);
        assert!(store.health_check().await.is_ok());
    }

    #[tokio::test]
    async fn test_job_store_round_trip() {
        let store = MemoryJobStore::new();
        let mut job = IngestionJob::new("/tmp/events.txt");
        store.insert_job(&job).await.unwrap();

        job.start().unwrap();
        store.save_job(&job).await.unwrap();

        let loaded = store.get_job(job.id).await.unwrap();
        assert_eq!(loaded.status, JobStatus::Processing);
        assert_eq!(store.list_jobs(10).await.unwrap().len(), 1);
        assert!(store.get_job(Uuid::new_v4()).await.is_err());
    }
}
