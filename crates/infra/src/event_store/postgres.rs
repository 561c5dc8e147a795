//! Postgres-backed event store.
//!
//! Append-only semantics are enforced at the database level: a unique
//! constraint on `(aggregate_id, sequence_number)` turns a concurrent append
//! into a visible concurrency error instead of silent interleaving, and no
//! UPDATE or DELETE is ever issued against the `events` table.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use sqlx::{PgPool, Row};
use tracing::instrument;
use uuid::Uuid;

use forgecrm_core::{AggregateId, ExpectedVersion, UserId};

use super::r#trait::{EventStore, EventStoreError, StoredEvent, UncommittedEvent};

/// Postgres-backed append-only event store.
///
/// The [`EventStore`] trait is synchronous (domain dispatch has no IO of its
/// own); the trait impl bridges onto the async pool via `block_in_place`,
/// which requires the multi-threaded tokio runtime.
#[derive(Debug, Clone)]
pub struct PostgresEventStore {
    pool: Arc<PgPool>,
}

const CREATE_EVENTS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS events (
    event_id        UUID PRIMARY KEY,
    actor           UUID NULL,
    aggregate_id    UUID NOT NULL,
    aggregate_type  TEXT NOT NULL,
    sequence_number BIGINT NOT NULL CHECK (sequence_number > 0),
    event_type      TEXT NOT NULL,
    event_version   INT NOT NULL,
    occurred_at     TIMESTAMPTZ NOT NULL,
    payload         JSONB NOT NULL,
    recorded_at     TIMESTAMPTZ NOT NULL DEFAULT now(),
    UNIQUE (aggregate_id, sequence_number)
)
"#;

impl PostgresEventStore {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool: Arc::new(pool),
        }
    }

    /// Create the events table if it does not exist yet.
    pub async fn ensure_schema(&self) -> Result<(), EventStoreError> {
        sqlx::query(CREATE_EVENTS_TABLE)
            .execute(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("ensure_schema", e))?;
        Ok(())
    }

    /// Load all events for an aggregate stream, in sequence order.
    #[instrument(skip(self), fields(aggregate_id = %aggregate_id.as_uuid()), err)]
    pub async fn load_stream_async(
        &self,
        aggregate_id: AggregateId,
    ) -> Result<Vec<StoredEvent>, EventStoreError> {
        let rows = sqlx::query(
            r#"
            SELECT event_id, actor, aggregate_id, aggregate_type, sequence_number,
                   event_type, event_version, occurred_at, payload
            FROM events
            WHERE aggregate_id = $1
            ORDER BY sequence_number ASC
            "#,
        )
        .bind(aggregate_id.as_uuid())
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("load_stream", e))?;

        rows.iter().map(row_to_stored).collect()
    }

    /// Load every event, ordered by business time (the replay path).
    #[instrument(skip(self), err)]
    pub async fn load_all_async(&self) -> Result<Vec<StoredEvent>, EventStoreError> {
        let rows = sqlx::query(
            r#"
            SELECT event_id, actor, aggregate_id, aggregate_type, sequence_number,
                   event_type, event_version, occurred_at, payload
            FROM events
            ORDER BY occurred_at ASC, aggregate_id ASC, sequence_number ASC
            "#,
        )
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("load_all", e))?;

        rows.iter().map(row_to_stored).collect()
    }

    /// Append events atomically with optimistic concurrency.
    #[instrument(
        skip(self, events),
        fields(aggregate_id = %aggregate_id.as_uuid(), event_count = events.len()),
        err
    )]
    pub async fn append_async(
        &self,
        aggregate_id: AggregateId,
        events: Vec<UncommittedEvent>,
        expected_version: ExpectedVersion,
    ) -> Result<Vec<StoredEvent>, EventStoreError> {
        if events.is_empty() {
            return Ok(vec![]);
        }

        let aggregate_type = events[0].aggregate_type.clone();
        for (idx, e) in events.iter().enumerate() {
            if e.aggregate_id != aggregate_id {
                return Err(EventStoreError::InvalidAppend(format!(
                    "batch contains multiple aggregate_ids (index {idx})"
                )));
            }
            if e.aggregate_type != aggregate_type {
                return Err(EventStoreError::AggregateTypeMismatch(format!(
                    "batch contains multiple aggregate_types (index {idx})"
                )));
            }
        }

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin", e))?;

        let current: i64 = sqlx::query(
            "SELECT COALESCE(MAX(sequence_number), 0) AS v FROM events WHERE aggregate_id = $1",
        )
        .bind(aggregate_id.as_uuid())
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error("version_check", e))?
        .get("v");

        if !expected_version.matches(current as u64) {
            return Err(EventStoreError::Concurrency(format!(
                "expected {expected_version:?}, found {current}"
            )));
        }

        let existing_type: Option<String> = sqlx::query(
            "SELECT aggregate_type FROM events WHERE aggregate_id = $1 LIMIT 1",
        )
        .bind(aggregate_id.as_uuid())
        .fetch_optional(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error("type_check", e))?
        .map(|row| row.get("aggregate_type"));

        if let Some(existing) = existing_type
            && existing != aggregate_type
        {
            return Err(EventStoreError::AggregateTypeMismatch(format!(
                "stream aggregate_type is '{existing}', attempted append with '{aggregate_type}'"
            )));
        }

        let mut next = current + 1;
        let mut committed = Vec::with_capacity(events.len());
        for e in events {
            sqlx::query(
                r#"
                INSERT INTO events (
                    event_id, actor, aggregate_id, aggregate_type, sequence_number,
                    event_type, event_version, occurred_at, payload
                )
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
                "#,
            )
            .bind(e.event_id)
            .bind(e.actor.map(|a| *a.as_uuid()))
            .bind(e.aggregate_id.as_uuid())
            .bind(&e.aggregate_type)
            .bind(next)
            .bind(&e.event_type)
            .bind(e.event_version as i32)
            .bind(e.occurred_at)
            .bind(&e.payload)
            .execute(&mut *tx)
            .await
            .map_err(|err| map_sqlx_error("insert", err))?;

            committed.push(StoredEvent {
                event_id: e.event_id,
                actor: e.actor,
                aggregate_id: e.aggregate_id,
                aggregate_type: e.aggregate_type,
                sequence_number: next as u64,
                event_type: e.event_type,
                event_version: e.event_version,
                occurred_at: e.occurred_at,
                payload: e.payload,
            });
            next += 1;
        }

        tx.commit().await.map_err(|e| map_sqlx_error("commit", e))?;
        Ok(committed)
    }
}

fn row_to_stored(row: &sqlx::postgres::PgRow) -> Result<StoredEvent, EventStoreError> {
    let bad = |field: &str| {
        EventStoreError::InvalidAppend(format!("failed to decode event row field '{field}'"))
    };

    let event_id: Uuid = row.try_get("event_id").map_err(|_| bad("event_id"))?;
    let actor: Option<Uuid> = row.try_get("actor").map_err(|_| bad("actor"))?;
    let aggregate_id: Uuid = row.try_get("aggregate_id").map_err(|_| bad("aggregate_id"))?;
    let aggregate_type: String = row
        .try_get("aggregate_type")
        .map_err(|_| bad("aggregate_type"))?;
    let sequence_number: i64 = row
        .try_get("sequence_number")
        .map_err(|_| bad("sequence_number"))?;
    let event_type: String = row.try_get("event_type").map_err(|_| bad("event_type"))?;
    let event_version: i32 = row
        .try_get("event_version")
        .map_err(|_| bad("event_version"))?;
    let occurred_at: DateTime<Utc> = row.try_get("occurred_at").map_err(|_| bad("occurred_at"))?;
    let payload: serde_json::Value = row.try_get("payload").map_err(|_| bad("payload"))?;

    Ok(StoredEvent {
        event_id,
        actor: actor.map(UserId::from_uuid),
        aggregate_id: AggregateId::from_uuid(aggregate_id),
        aggregate_type,
        sequence_number: sequence_number as u64,
        event_type,
        event_version: event_version as u32,
        occurred_at,
        payload,
    })
}

/// Map sqlx errors onto the store's error taxonomy.
///
/// A unique violation on `(aggregate_id, sequence_number)` means a concurrent
/// writer won the race between our version check and insert.
fn map_sqlx_error(op: &str, err: sqlx::Error) -> EventStoreError {
    if let sqlx::Error::Database(db) = &err
        && db.code().as_deref() == Some("23505")
    {
        return EventStoreError::Concurrency(format!("{op}: concurrent append detected"));
    }
    EventStoreError::InvalidAppend(format!("{op}: {err}"))
}

fn block_on<T>(fut: impl Future<Output = T>) -> T {
    tokio::task::block_in_place(|| {
        tokio::runtime::Handle::current().block_on(fut)
    })
}

impl EventStore for PostgresEventStore {
    fn append(
        &self,
        events: Vec<UncommittedEvent>,
        expected_version: ExpectedVersion,
    ) -> Result<Vec<StoredEvent>, EventStoreError> {
        let Some(first) = events.first() else {
            return Ok(vec![]);
        };
        let aggregate_id = first.aggregate_id;
        block_on(self.append_async(aggregate_id, events, expected_version))
    }

    fn load_stream(&self, aggregate_id: AggregateId) -> Result<Vec<StoredEvent>, EventStoreError> {
        block_on(self.load_stream_async(aggregate_id))
    }

    fn load_all(&self) -> Result<Vec<StoredEvent>, EventStoreError> {
        block_on(self.load_all_async())
    }
}
