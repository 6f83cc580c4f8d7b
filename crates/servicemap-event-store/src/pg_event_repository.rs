//! `PostgreSQL` implementation of the `EventRepository` trait.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};
use uuid::Uuid;

use servicemap_core::error::DomainError;
use servicemap_core::event::EventMetadata;
use servicemap_core::repository::{EventRepository, NewEvent, StoredEvent};

use crate::schema::CREATE_EVENTS_TABLE;

const SELECT_COLUMNS: &str = "insertion_seq, event_id, aggregate_type, aggregate_id, \
     event_type, event_date, payload, source";

/// PostgreSQL-backed event repository.
#[derive(Debug, Clone)]
pub struct PgEventRepository {
    pool: PgPool,
}

impl PgEventRepository {
    /// Creates a new `PgEventRepository`.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Creates the `domain_events` table and its indexes if missing.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::Infrastructure` if the DDL fails.
    pub async fn ensure_schema(&self) -> Result<(), DomainError> {
        sqlx::raw_sql(CREATE_EVENTS_TABLE)
            .execute(&self.pool)
            .await
            .map_err(infrastructure)?;
        Ok(())
    }
}

fn infrastructure(err: sqlx::Error) -> DomainError {
    DomainError::Infrastructure(format!("event store error: {err}"))
}

fn row_to_stored_event(row: &PgRow) -> Result<StoredEvent, sqlx::Error> {
    let payload: Option<serde_json::Value> = row.try_get("payload")?;
    Ok(StoredEvent {
        metadata: EventMetadata {
            event_id: row.try_get::<Uuid, _>("event_id")?,
            aggregate_type: row.try_get("aggregate_type")?,
            aggregate_id: row.try_get("aggregate_id")?,
            event_date: row.try_get::<DateTime<Utc>, _>("event_date")?,
            insertion_seq: row.try_get("insertion_seq")?,
            source: row.try_get("source")?,
        },
        event_type: row.try_get("event_type")?,
        payload: payload.unwrap_or(serde_json::Value::Null),
    })
}

fn rows_to_stored_events(rows: &[PgRow]) -> Result<Vec<StoredEvent>, DomainError> {
    rows.iter()
        .map(row_to_stored_event)
        .collect::<Result<Vec<_>, _>>()
        .map_err(infrastructure)
}

#[async_trait]
impl EventRepository for PgEventRepository {
    async fn load_events(
        &self,
        aggregate_type: &str,
        cutoff: Option<DateTime<Utc>>,
    ) -> Result<Vec<StoredEvent>, DomainError> {
        let sql = format!(
            "SELECT {SELECT_COLUMNS} FROM domain_events \
             WHERE aggregate_type = $1 AND ($2::timestamptz IS NULL OR event_date <= $2) \
             ORDER BY event_date ASC, insertion_seq ASC"
        );
        let rows = sqlx::query(&sql)
            .bind(aggregate_type)
            .bind(cutoff)
            .fetch_all(&self.pool)
            .await
            .map_err(infrastructure)?;

        tracing::debug!(aggregate_type, count = rows.len(), "loaded events");
        rows_to_stored_events(&rows)
    }

    async fn load_aggregate_events(
        &self,
        aggregate_type: &str,
        aggregate_id: &str,
        cutoff: Option<DateTime<Utc>>,
    ) -> Result<Vec<StoredEvent>, DomainError> {
        let sql = format!(
            "SELECT {SELECT_COLUMNS} FROM domain_events \
             WHERE aggregate_type = $1 AND aggregate_id = $2 \
             AND ($3::timestamptz IS NULL OR event_date <= $3) \
             ORDER BY event_date ASC, insertion_seq ASC"
        );
        let rows = sqlx::query(&sql)
            .bind(aggregate_type)
            .bind(aggregate_id)
            .bind(cutoff)
            .fetch_all(&self.pool)
            .await
            .map_err(infrastructure)?;

        tracing::debug!(
            aggregate_type,
            aggregate_id,
            count = rows.len(),
            "loaded aggregate events"
        );
        rows_to_stored_events(&rows)
    }

    async fn append_event(&self, event: NewEvent) -> Result<StoredEvent, DomainError> {
        let payload = (!event.payload.is_null()).then_some(&event.payload);
        let insertion_seq: i64 = sqlx::query_scalar(
            "INSERT INTO domain_events \
             (event_id, aggregate_type, aggregate_id, event_type, event_date, payload, source) \
             VALUES ($1, $2, $3, $4, $5, $6, $7) \
             RETURNING insertion_seq",
        )
        .bind(event.event_id)
        .bind(&event.aggregate_type)
        .bind(&event.aggregate_id)
        .bind(&event.event_type)
        .bind(event.event_date)
        .bind(payload)
        .bind(&event.source)
        .fetch_one(&self.pool)
        .await
        .map_err(infrastructure)?;

        tracing::info!(
            event_id = %event.event_id,
            aggregate_id = %event.aggregate_id,
            event_type = %event.event_type,
            insertion_seq,
            "appended event"
        );
        Ok(event.into_stored(insertion_seq))
    }
}
