//! Append-only per-actor event log.

use chrono::{DateTime, Utc};
use futures_util::TryStreamExt;
use sqlx::PgPool;
use uuid::Uuid;

use crate::codec::{JsonCodec, Payload};
use crate::error::StoreError;
use crate::schema::TableSet;
use crate::store::models::StoredEvent;

const OP_APPEND: &str = "append event";
const OP_READ: &str = "read events";
const OP_DELETE: &str = "delete events";

/// Append-only ordered log of domain events, partitioned by actor name.
///
/// Indices are caller-supplied: the log enforces `(actor, index)`
/// uniqueness and ascending-order reads, but not contiguity — the actor
/// runtime owns its own numbering.
pub struct EventLog<E> {
    pool: PgPool,
    insert_sql: String,
    read_sql: String,
    read_stored_sql: String,
    delete_sql: String,
    codec: JsonCodec<E>,
}

impl<E> std::fmt::Debug for EventLog<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventLog").finish_non_exhaustive()
    }
}

impl<E> Clone for EventLog<E> {
    fn clone(&self) -> Self {
        Self {
            pool: self.pool.clone(),
            insert_sql: self.insert_sql.clone(),
            read_sql: self.read_sql.clone(),
            read_stored_sql: self.read_stored_sql.clone(),
            delete_sql: self.delete_sql.clone(),
            codec: JsonCodec::new(),
        }
    }
}

impl<E: Payload> EventLog<E> {
    /// Creates an event log over the given pool and table set.
    #[must_use]
    pub fn new(pool: PgPool, tables: &TableSet) -> Self {
        let table = tables.events_qualified();
        Self {
            pool,
            insert_sql: format!(
                "INSERT INTO {table} (id, actor_name, event_index, event_data) \
                 VALUES ($1, $2, $3, $4)"
            ),
            read_sql: format!(
                "SELECT event_index, event_data FROM {table} \
                 WHERE actor_name = $1 AND event_index >= $2 \
                 ORDER BY event_index ASC"
            ),
            read_stored_sql: format!(
                "SELECT id, actor_name, event_index, event_data, created FROM {table} \
                 WHERE actor_name = $1 AND event_index >= $2 \
                 ORDER BY event_index ASC"
            ),
            delete_sql: format!(
                "DELETE FROM {table} WHERE actor_name = $1 AND event_index <= $2"
            ),
            codec: JsonCodec::new(),
        }
    }

    /// Appends one event at the given stream index.
    ///
    /// The insert runs in its own transaction: either the full row is
    /// durable when this returns `Ok`, or nothing was persisted. Returns
    /// the generated row id.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Encode`] if the payload cannot be serialized,
    /// [`StoreError::Duplicate`] if a row already exists at
    /// `(actor_name, index)`, or [`StoreError::Write`] on any other
    /// driver failure.
    pub async fn append(
        &self,
        actor_name: &str,
        index: i64,
        event: &E,
    ) -> Result<Uuid, StoreError> {
        let encoded = self
            .codec
            .encode(event)
            .map_err(|source| StoreError::Encode {
                actor: actor_name.to_owned(),
                index,
                source,
            })?;
        let id = Uuid::new_v4();

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|source| StoreError::from_write(OP_APPEND, actor_name, index, source))?;
        sqlx::query(&self.insert_sql)
            .bind(id)
            .bind(actor_name)
            .bind(index)
            .bind(&encoded)
            .execute(&mut *tx)
            .await
            .map_err(|source| StoreError::from_write(OP_APPEND, actor_name, index, source))?;
        tx.commit()
            .await
            .map_err(|source| StoreError::from_write(OP_APPEND, actor_name, index, source))?;

        tracing::debug!(actor_name, index, %id, "event appended");
        Ok(id)
    }

    /// Streams every event with `event_index >= index_start` for the actor,
    /// strictly ascending by index, calling `visit` once per event in that
    /// order. Returns the last index visited, or `None` if the range was
    /// empty.
    ///
    /// The underlying row stream is lazy and forward-only, bound to this
    /// one call; dropping the future cancels the scan and releases the
    /// pooled connection. Side effects of `visit` (e.g. replaying into an
    /// accumulator) are the caller's.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Read`] on a query or connectivity failure and
    /// [`StoreError::Decode`] if a stored row cannot be reconstructed.
    /// Either failure aborts the remainder of the scan — a bad row is
    /// never silently skipped, so the caller can distinguish "stream
    /// exhausted" from "scan aborted".
    pub async fn read_from<F>(
        &self,
        actor_name: &str,
        index_start: i64,
        mut visit: F,
    ) -> Result<Option<i64>, StoreError>
    where
        F: FnMut(E),
    {
        let mut rows = sqlx::query_as::<_, (i64, serde_json::Value)>(&self.read_sql)
            .bind(actor_name)
            .bind(index_start)
            .fetch(&self.pool);

        let mut last_index = None;
        while let Some((event_index, data)) =
            rows.try_next().await.map_err(|source| StoreError::Read {
                op: OP_READ,
                actor: actor_name.to_owned(),
                source,
            })?
        {
            let event = self.codec.decode(data).map_err(|source| StoreError::Decode {
                actor: actor_name.to_owned(),
                source,
            })?;
            visit(event);
            last_index = Some(event_index);
        }

        Ok(last_index)
    }

    /// Reads the actor's raw rows from `index_start` onward, ascending by
    /// index, without decoding the payloads.
    ///
    /// Exposes row metadata the typed read does not: generated ids,
    /// envelope bodies, and the server-assigned `created` timestamps.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Read`] on a query or connectivity failure.
    pub async fn read_stored(
        &self,
        actor_name: &str,
        index_start: i64,
    ) -> Result<Vec<StoredEvent>, StoreError> {
        let rows = sqlx::query_as::<_, (Uuid, String, i64, serde_json::Value, DateTime<Utc>)>(
            &self.read_stored_sql,
        )
        .bind(actor_name)
        .bind(index_start)
        .fetch_all(&self.pool)
        .await
        .map_err(|source| StoreError::Read {
            op: OP_READ,
            actor: actor_name.to_owned(),
            source,
        })?;

        Ok(rows
            .into_iter()
            .map(
                |(id, actor_name, event_index, event_data, created)| StoredEvent {
                    id,
                    actor_name,
                    event_index,
                    event_data,
                    created,
                },
            )
            .collect())
    }

    /// Deletes every event for the actor with `event_index <=` the bound.
    ///
    /// Rows of other actors are never touched. Returns the number of rows
    /// removed; removing nothing is a successful no-op.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Write`] on driver failure.
    pub async fn delete_up_to(
        &self,
        actor_name: &str,
        inclusive_index: i64,
    ) -> Result<u64, StoreError> {
        let mut tx = self.pool.begin().await.map_err(|source| {
            StoreError::from_write(OP_DELETE, actor_name, inclusive_index, source)
        })?;
        let result = sqlx::query(&self.delete_sql)
            .bind(actor_name)
            .bind(inclusive_index)
            .execute(&mut *tx)
            .await
            .map_err(|source| {
                StoreError::from_write(OP_DELETE, actor_name, inclusive_index, source)
            })?;
        tx.commit().await.map_err(|source| {
            StoreError::from_write(OP_DELETE, actor_name, inclusive_index, source)
        })?;

        let deleted = result.rows_affected();
        tracing::info!(actor_name, inclusive_index, deleted, "events deleted");
        Ok(deleted)
    }
}
