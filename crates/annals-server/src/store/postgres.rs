//! PostgreSQL store backend
//!
//! Constraint enforcement is left to the schema (see `migrations/`) and the
//! resulting driver errors are mapped through `From<sqlx::Error>`. Subtree and
//! ancestor lookups use recursive CTEs.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{types::Json, FromRow, PgPool, Postgres, QueryBuilder};
use tracing::{debug, info};
use uuid::Uuid;

use super::{check_batch_acyclic, EventStore, JobStore, StoreError, StoreResult};
use crate::models::{
    EventPatch, HistoricalEvent, IngestionJob, JobStatus, Metadata, NewEvent, SearchPage,
    SearchQuery, TimeRange,
};
use crate::validation::ValidationError;

const EVENT_COLUMNS: &str =
    "id, name, description, start_date, end_date, parent_id, metadata, created_at, updated_at";

const JOB_COLUMNS: &str = "id, status, file_path, total_lines, processed_lines, error_lines, \
                           errors, start_time, end_time, created_at";

#[derive(Debug, FromRow)]
struct EventRow {
    id: Uuid,
    name: String,
    description: Option<String>,
    start_date: DateTime<Utc>,
    end_date: DateTime<Utc>,
    parent_id: Option<Uuid>,
    metadata: Json<Metadata>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<EventRow> for HistoricalEvent {
    fn from(row: EventRow) -> Self {
        Self {
            id: row.id,
            name: row.name,
            description: row.description,
            start_date: row.start_date,
            end_date: row.end_date,
            parent_id: row.parent_id,
            metadata: row.metadata.0,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

/// Escape `%`, `_` and `\` so a user-supplied fragment matches literally in ILIKE
fn escape_like(fragment: &str) -> String {
    let mut escaped = String::with_capacity(fragment.len());
    for ch in fragment.chars() {
        if matches!(ch, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(ch);
    }
    escaped
}

fn push_search_filters(builder: &mut QueryBuilder<'_, Postgres>, query: &SearchQuery) {
    builder.push(" WHERE TRUE");
    if let Some(ref name) = query.name {
        builder
            .push(" AND name ILIKE ")
            .push_bind(format!("%{}%", escape_like(name)));
    }
    if let Some(after) = query.start_after {
        builder.push(" AND start_date >= ").push_bind(after);
    }
    if let Some(before) = query.end_before {
        builder.push(" AND end_date <= ").push_bind(before);
    }
}

/// Event store backed by the `historical_events` table
#[derive(Debug, Clone)]
pub struct PgEventStore {
    pool: PgPool,
}

impl PgEventStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl EventStore for PgEventStore {
    #[tracing::instrument(skip(self, event), fields(name = %event.name))]
    async fn create(&self, event: NewEvent) -> StoreResult<HistoricalEvent> {
        let event = event.into_event(Utc::now())?;

        let sql = format!(
            "INSERT INTO historical_events ({EVENT_COLUMNS}) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9) RETURNING {EVENT_COLUMNS}"
        );
        let row = sqlx::query_as::<_, EventRow>(&sql)
            .bind(event.id)
            .bind(&event.name)
            .bind(&event.description)
            .bind(event.start_date)
            .bind(event.end_date)
            .bind(event.parent_id)
            .bind(Json(&event.metadata))
            .bind(event.created_at)
            .bind(event.updated_at)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| match StoreError::from(e) {
                StoreError::Conflict(_) => StoreError::duplicate_event(event.id),
                StoreError::NotFound(_) => match event.parent_id {
                    Some(parent_id) => StoreError::parent_not_found(parent_id),
                    None => StoreError::event_not_found(event.id),
                },
                other => other,
            })?;

        debug!(event_id = %row.id, "Event created");
        Ok(row.into())
    }

    #[tracing::instrument(skip(self, events), fields(count = events.len()))]
    async fn batch_create(&self, events: Vec<NewEvent>) -> StoreResult<Vec<HistoricalEvent>> {
        if events.is_empty() {
            return Ok(Vec::new());
        }
        check_batch_acyclic(&events)?;

        let now = Utc::now();
        let prepared = events
            .into_iter()
            .map(|e| e.into_event(now))
            .collect::<Result<Vec<_>, _>>()?;

        let mut tx = self.pool.begin().await?;

        let mut query_builder =
            QueryBuilder::new(format!("INSERT INTO historical_events ({EVENT_COLUMNS}) "));
        query_builder.push_values(prepared.iter(), |mut b, event| {
            b.push_bind(event.id)
                .push_bind(&event.name)
                .push_bind(&event.description)
                .push_bind(event.start_date)
                .push_bind(event.end_date)
                .push_bind(event.parent_id)
                .push_bind(Json(&event.metadata))
                .push_bind(event.created_at)
                .push_bind(event.updated_at);
        });
        query_builder.push(format!(" RETURNING {EVENT_COLUMNS}"));

        let rows = query_builder
            .build_query_as::<EventRow>()
            .fetch_all(&mut *tx)
            .await?;

        tx.commit().await?;

        debug!(count = rows.len(), "Batch committed");
        Ok(rows.into_iter().map(HistoricalEvent::from).collect())
    }

    async fn get(&self, id: Uuid) -> StoreResult<HistoricalEvent> {
        let sql = format!("SELECT {EVENT_COLUMNS} FROM historical_events WHERE id = $1");
        sqlx::query_as::<_, EventRow>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .map(HistoricalEvent::from)
            .ok_or_else(|| StoreError::event_not_found(id))
    }

    #[tracing::instrument(skip(self, patch), fields(event_id = %id))]
    async fn update(&self, id: Uuid, patch: EventPatch) -> StoreResult<HistoricalEvent> {
        let mut tx = self.pool.begin().await?;

        let sql = format!("SELECT {EVENT_COLUMNS} FROM historical_events WHERE id = $1 FOR UPDATE");
        let current: HistoricalEvent = sqlx::query_as::<_, EventRow>(&sql)
            .bind(id)
            .fetch_optional(&mut *tx)
            .await?
            .map(HistoricalEvent::from)
            .ok_or_else(|| StoreError::event_not_found(id))?;

        let updated = patch.apply(&current, Utc::now())?;

        if patch.changes_parent(&current) {
            if let Some(parent_id) = updated.parent_id {
                let parent_exists: bool = sqlx::query_scalar(
                    "SELECT EXISTS(SELECT 1 FROM historical_events WHERE id = $1)",
                )
                .bind(parent_id)
                .fetch_one(&mut *tx)
                .await?;
                if !parent_exists {
                    return Err(StoreError::parent_not_found(parent_id));
                }

                // The new parent must not be a descendant of the event itself
                let would_cycle: bool = sqlx::query_scalar(
                    r#"
                    WITH RECURSIVE ancestors AS (
                        SELECT id, parent_id FROM historical_events WHERE id = $1
                        UNION
                        SELECT e.id, e.parent_id
                        FROM historical_events e
                        JOIN ancestors a ON e.id = a.parent_id
                    )
                    SELECT EXISTS(SELECT 1 FROM ancestors WHERE id = $2)
                    "#,
                )
                .bind(parent_id)
                .bind(id)
                .fetch_one(&mut *tx)
                .await?;
                if would_cycle {
                    return Err(ValidationError::Cycle {
                        event_id: id,
                        parent_id,
                    }
                    .into());
                }
            }
        }

        let sql = format!(
            "UPDATE historical_events \
             SET name = $2, description = $3, start_date = $4, end_date = $5, \
                 parent_id = $6, metadata = $7, updated_at = $8 \
             WHERE id = $1 RETURNING {EVENT_COLUMNS}"
        );
        let row = sqlx::query_as::<_, EventRow>(&sql)
            .bind(id)
            .bind(&updated.name)
            .bind(&updated.description)
            .bind(updated.start_date)
            .bind(updated.end_date)
            .bind(updated.parent_id)
            .bind(Json(&updated.metadata))
            .bind(updated.updated_at)
            .fetch_one(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(row.into())
    }

    #[tracing::instrument(skip(self), fields(event_id = %id))]
    async fn delete(&self, id: Uuid) -> StoreResult<u64> {
        let result = sqlx::query(
            r#"
            WITH RECURSIVE subtree AS (
                SELECT id FROM historical_events WHERE id = $1
                UNION
                SELECT e.id FROM historical_events e JOIN subtree s ON e.parent_id = s.id
            )
            DELETE FROM historical_events WHERE id IN (SELECT id FROM subtree)
            "#,
        )
        .bind(id)
        .execute(&self.pool)
        .await?;

        let removed = result.rows_affected();
        if removed == 0 {
            return Err(StoreError::event_not_found(id));
        }

        info!(removed, "Event subtree deleted");
        Ok(removed)
    }

    async fn subtree(&self, root_id: Uuid) -> StoreResult<Vec<HistoricalEvent>> {
        let sql = format!(
            r#"
            WITH RECURSIVE subtree AS (
                SELECT {EVENT_COLUMNS}, 0 AS depth FROM historical_events WHERE id = $1
                UNION ALL
                SELECT e.id, e.name, e.description, e.start_date, e.end_date, e.parent_id,
                       e.metadata, e.created_at, e.updated_at, s.depth + 1
                FROM historical_events e
                JOIN subtree s ON e.parent_id = s.id
            )
            SELECT {EVENT_COLUMNS} FROM subtree ORDER BY depth, start_date, id
            "#
        );
        let rows = sqlx::query_as::<_, EventRow>(&sql)
            .bind(root_id)
            .fetch_all(&self.pool)
            .await?;

        if rows.is_empty() {
            return Err(StoreError::event_not_found(root_id));
        }
        Ok(rows.into_iter().map(HistoricalEvent::from).collect())
    }

    async fn children(&self, id: Uuid) -> StoreResult<Vec<HistoricalEvent>> {
        let sql = format!(
            "SELECT {EVENT_COLUMNS} FROM historical_events WHERE parent_id = $1 \
             ORDER BY start_date, id"
        );
        let rows = sqlx::query_as::<_, EventRow>(&sql)
            .bind(id)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.into_iter().map(HistoricalEvent::from).collect())
    }

    async fn in_range(&self, range: TimeRange) -> StoreResult<Vec<HistoricalEvent>> {
        range.validate()?;
        let sql = format!(
            "SELECT {EVENT_COLUMNS} FROM historical_events \
             WHERE start_date >= $1 AND end_date <= $2 ORDER BY start_date, id"
        );
        let rows = sqlx::query_as::<_, EventRow>(&sql)
            .bind(range.start)
            .bind(range.end)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.into_iter().map(HistoricalEvent::from).collect())
    }

    #[tracing::instrument(skip(self, query), fields(sort = ?query.sort, page = query.pagination.page))]
    async fn search(&self, query: &SearchQuery) -> StoreResult<SearchPage> {
        let mut count_builder = QueryBuilder::new("SELECT COUNT(*) FROM historical_events");
        push_search_filters(&mut count_builder, query);
        let total_events: i64 = count_builder
            .build_query_scalar()
            .fetch_one(&self.pool)
            .await?;

        let order = query.order.sql_keyword();
        let mut page_builder =
            QueryBuilder::new(format!("SELECT {EVENT_COLUMNS} FROM historical_events"));
        push_search_filters(&mut page_builder, query);
        page_builder
            .push(format!(
                " ORDER BY {} {order}, id {order} LIMIT ",
                query.sort.sql_expression()
            ))
            .push_bind(query.pagination.limit as i64)
            .push(" OFFSET ")
            .push_bind(query.pagination.offset() as i64);

        let rows = page_builder
            .build_query_as::<EventRow>()
            .fetch_all(&self.pool)
            .await?;

        Ok(SearchPage {
            events: rows.into_iter().map(HistoricalEvent::from).collect(),
            total_events,
            page: query.pagination.page,
            limit: query.pagination.limit,
        })
    }

    async fn count(&self) -> StoreResult<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM historical_events")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    async fn health_check(&self) -> StoreResult<()> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map(|_| ())
            .map_err(StoreError::from)
    }
}

#[derive(Debug, FromRow)]
struct JobRow {
    id: Uuid,
    status: String,
    file_path: String,
    total_lines: i64,
    processed_lines: i64,
    error_lines: i64,
    errors: Json<Vec<String>>,
    start_time: Option<DateTime<Utc>>,
    end_time: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
}

impl TryFrom<JobRow> for IngestionJob {
    type Error = StoreError;

    fn try_from(row: JobRow) -> Result<Self, Self::Error> {
        let status: JobStatus = row.status.parse().map_err(StoreError::InvalidData)?;
        Ok(Self {
            id: row.id,
            status,
            file_path: row.file_path,
            total_lines: row.total_lines,
            processed_lines: row.processed_lines,
            error_lines: row.error_lines,
            errors: row.errors.0,
            start_time: row.start_time,
            end_time: row.end_time,
            created_at: row.created_at,
        })
    }
}

/// Job store backed by the `ingestion_jobs` table
#[derive(Debug, Clone)]
pub struct PgJobStore {
    pool: PgPool,
}

impl PgJobStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl JobStore for PgJobStore {
    async fn insert_job(&self, job: &IngestionJob) -> StoreResult<()> {
        let sql = format!(
            "INSERT INTO ingestion_jobs ({JOB_COLUMNS}) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)"
        );
        sqlx::query(&sql)
            .bind(job.id)
            .bind(job.status.as_str())
            .bind(&job.file_path)
            .bind(job.total_lines)
            .bind(job.processed_lines)
            .bind(job.error_lines)
            .bind(Json(&job.errors))
            .bind(job.start_time)
            .bind(job.end_time)
            .bind(job.created_at)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn save_job(&self, job: &IngestionJob) -> StoreResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE ingestion_jobs
            SET status = $2, total_lines = $3, processed_lines = $4, error_lines = $5,
                errors = $6, start_time = $7, end_time = $8
            WHERE id = $1
            "#,
        )
        .bind(job.id)
        .bind(job.status.as_str())
        .bind(job.total_lines)
        .bind(job.processed_lines)
        .bind(job.error_lines)
        .bind(Json(&job.errors))
        .bind(job.start_time)
        .bind(job.end_time)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::job_not_found(job.id));
        }
        Ok(())
    }

    async fn get_job(&self, id: Uuid) -> StoreResult<IngestionJob> {
        let sql = format!("SELECT {JOB_COLUMNS} FROM ingestion_jobs WHERE id = $1");
        sqlx::query_as::<_, JobRow>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| StoreError::job_not_found(id))?
            .try_into()
    }

    async fn list_jobs(&self, limit: u32) -> StoreResult<Vec<IngestionJob>> {
        let sql = format!(
            "SELECT {JOB_COLUMNS} FROM ingestion_jobs ORDER BY created_at DESC, id LIMIT $1"
        );
        sqlx::query_as::<_, JobRow>(&sql)
            .bind(limit as i64)
            .fetch_all(&self.pool)
            .await?
            .into_iter()
            .map(IngestionJob::try_from)
            .collect()
    }
}
