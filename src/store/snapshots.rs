//! Per-actor snapshot store.

use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use crate::codec::{JsonCodec, Payload};
use crate::error::StoreError;
use crate::schema::TableSet;
use crate::store::models::StoredSnapshot;

const OP_SAVE: &str = "save snapshot";
const OP_LOAD: &str = "load snapshot";
const OP_DELETE: &str = "delete snapshots";

/// Point-in-time captures of actor state, keyed in the same 64-bit index
/// space as the event log.
///
/// Multiple snapshots may coexist for one actor at different indices; only
/// the one with the maximum index is "latest". Nothing here prunes old
/// snapshots — retention is the runtime's call, via
/// [`SnapshotStore::delete_up_to`].
pub struct SnapshotStore<S> {
    pool: PgPool,
    insert_sql: String,
    latest_sql: String,
    latest_stored_sql: String,
    delete_sql: String,
    codec: JsonCodec<S>,
}

impl<S> std::fmt::Debug for SnapshotStore<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SnapshotStore").finish_non_exhaustive()
    }
}

impl<S> Clone for SnapshotStore<S> {
    fn clone(&self) -> Self {
        Self {
            pool: self.pool.clone(),
            insert_sql: self.insert_sql.clone(),
            latest_sql: self.latest_sql.clone(),
            latest_stored_sql: self.latest_stored_sql.clone(),
            delete_sql: self.delete_sql.clone(),
            codec: JsonCodec::new(),
        }
    }
}

impl<S: Payload> SnapshotStore<S> {
    /// Creates a snapshot store over the given pool and table set.
    #[must_use]
    pub fn new(pool: PgPool, tables: &TableSet) -> Self {
        let table = tables.snapshots_qualified();
        Self {
            pool,
            insert_sql: format!(
                "INSERT INTO {table} (id, actor_name, snapshot_index, snapshot_data) \
                 VALUES ($1, $2, $3, $4)"
            ),
            latest_sql: format!(
                "SELECT snapshot_index, snapshot_data FROM {table} \
                 WHERE actor_name = $1 ORDER BY snapshot_index DESC LIMIT 1"
            ),
            latest_stored_sql: format!(
                "SELECT id, actor_name, snapshot_index, snapshot_data, created FROM {table} \
                 WHERE actor_name = $1 ORDER BY snapshot_index DESC LIMIT 1"
            ),
            delete_sql: format!(
                "DELETE FROM {table} WHERE actor_name = $1 AND snapshot_index <= $2"
            ),
            codec: JsonCodec::new(),
        }
    }

    /// Saves one snapshot of actor state at the given stream index.
    ///
    /// Runs in its own transaction; durable before `Ok` returns. Returns
    /// the generated row id.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Encode`] if the state cannot be serialized,
    /// [`StoreError::Duplicate`] if a snapshot already exists at
    /// `(actor_name, index)`, or [`StoreError::Write`] on any other
    /// driver failure.
    pub async fn save(&self, actor_name: &str, index: i64, state: &S) -> Result<Uuid, StoreError> {
        let encoded = self
            .codec
            .encode(state)
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
            .map_err(|source| StoreError::from_write(OP_SAVE, actor_name, index, source))?;
        sqlx::query(&self.insert_sql)
            .bind(id)
            .bind(actor_name)
            .bind(index)
            .bind(&encoded)
            .execute(&mut *tx)
            .await
            .map_err(|source| StoreError::from_write(OP_SAVE, actor_name, index, source))?;
        tx.commit()
            .await
            .map_err(|source| StoreError::from_write(OP_SAVE, actor_name, index, source))?;

        tracing::debug!(actor_name, index, %id, "snapshot saved");
        Ok(id)
    }

    /// Loads the snapshot with the maximum index for the actor.
    ///
    /// `None` is the normal "no snapshot yet" outcome: the runtime falls
    /// back to replaying the event stream from the beginning.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Read`] on a query or connectivity failure and
    /// [`StoreError::Decode`] if the stored state cannot be reconstructed.
    pub async fn load_latest(&self, actor_name: &str) -> Result<Option<(S, i64)>, StoreError> {
        let row: Option<(i64, serde_json::Value)> = sqlx::query_as(&self.latest_sql)
            .bind(actor_name)
            .fetch_optional(&self.pool)
            .await
            .map_err(|source| StoreError::Read {
                op: OP_LOAD,
                actor: actor_name.to_owned(),
                source,
            })?;

        match row {
            Some((index, data)) => {
                let state = self.codec.decode(data).map_err(|source| StoreError::Decode {
                    actor: actor_name.to_owned(),
                    source,
                })?;
                Ok(Some((state, index)))
            }
            None => Ok(None),
        }
    }

    /// Loads the actor's latest snapshot as a raw row, without decoding
    /// the state.
    ///
    /// Exposes row metadata the typed load does not: the generated id,
    /// the envelope body, and the server-assigned `created` timestamp.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Read`] on a query or connectivity failure.
    pub async fn load_latest_stored(
        &self,
        actor_name: &str,
    ) -> Result<Option<StoredSnapshot>, StoreError> {
        let row: Option<(Uuid, String, i64, serde_json::Value, DateTime<Utc>)> =
            sqlx::query_as(&self.latest_stored_sql)
                .bind(actor_name)
                .fetch_optional(&self.pool)
                .await
                .map_err(|source| StoreError::Read {
                    op: OP_LOAD,
                    actor: actor_name.to_owned(),
                    source,
                })?;

        Ok(row.map(
            |(id, actor_name, snapshot_index, snapshot_data, created)| StoredSnapshot {
                id,
                actor_name,
                snapshot_index,
                snapshot_data,
                created,
            },
        ))
    }

    /// Deletes every snapshot for the actor with `snapshot_index <=` the
    /// bound.
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
        tracing::info!(actor_name, inclusive_index, deleted, "snapshots deleted");
        Ok(deleted)
    }
}
