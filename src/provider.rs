//! Persistence provider facade.
//!
//! [`PersistenceProvider`] is the single object an actor runtime depends
//! on. It wires the schema manager once at construction and exposes the
//! six storage operations over the event log and snapshot store. It is a
//! composition point, not a decision point: no cache, no write buffering,
//! no policy of its own — every persist is synchronously durable before
//! the call returns, and snapshot cadence is the runtime's business.

use std::time::Duration;

use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use uuid::Uuid;

use crate::codec::Payload;
use crate::config::StoreConfig;
use crate::error::StoreError;
use crate::schema::{SchemaManager, TableSet};
use crate::store::{EventLog, SnapshotStore};

/// Durable event-sourcing persistence for actor state.
///
/// Generic over the event payload type `E` and the snapshot payload type
/// `S`; both travel through the tagged-envelope codec, so replaying a
/// stream written under a different type fails loudly instead of
/// misreading rows.
pub struct PersistenceProvider<E, S> {
    events: EventLog<E>,
    snapshots: SnapshotStore<S>,
}

impl<E, S> std::fmt::Debug for PersistenceProvider<E, S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PersistenceProvider").finish_non_exhaustive()
    }
}

impl<E, S> Clone for PersistenceProvider<E, S> {
    fn clone(&self) -> Self {
        Self {
            events: self.events.clone(),
            snapshots: self.snapshots.clone(),
        }
    }
}

impl<E: Payload, S: Payload> PersistenceProvider<E, S> {
    /// Connects to the database and constructs the provider.
    ///
    /// Builds a connection pool from the config's pool-tuning fields, then
    /// provisions the tables when `auto_create_tables` is set, or verifies
    /// they already exist when it is not.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Config`] on an invalid configuration or an
    /// unreachable connection target, [`StoreError::SchemaMissing`] when
    /// auto-provisioning is disabled and a required table is absent, or
    /// [`StoreError::Provision`] if provisioning itself fails.
    pub async fn connect(config: &StoreConfig) -> Result<Self, StoreError> {
        config.validate()?;

        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .min_connections(config.min_connections)
            .acquire_timeout(Duration::from_secs(config.connect_timeout_secs))
            .connect(&config.database_url)
            .await
            .map_err(|e| StoreError::Config(format!("cannot connect to database: {e}")))?;

        Self::with_pool(pool, config).await
    }

    /// Constructs the provider over a caller-managed pool.
    ///
    /// Same provisioning behavior as [`PersistenceProvider::connect`]; the
    /// pool-tuning fields of the config are ignored.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Config`], [`StoreError::SchemaMissing`], or
    /// [`StoreError::Provision`] under the same conditions as
    /// [`PersistenceProvider::connect`].
    pub async fn with_pool(pool: PgPool, config: &StoreConfig) -> Result<Self, StoreError> {
        let tables = TableSet::from_config(config)?;
        let manager = SchemaManager::new(tables.clone());

        if config.auto_create_tables {
            manager.ensure(&pool).await?;
        } else {
            manager.verify(&pool).await?;
        }

        Ok(Self {
            events: EventLog::new(pool.clone(), &tables),
            snapshots: SnapshotStore::new(pool, &tables),
        })
    }

    /// Appends one event to the actor's stream at the given index.
    ///
    /// Returns the generated row id.
    ///
    /// # Errors
    ///
    /// See [`EventLog::append`].
    pub async fn persist_event(
        &self,
        actor_name: &str,
        index: i64,
        event: &E,
    ) -> Result<Uuid, StoreError> {
        self.events.append(actor_name, index, event).await
    }

    /// Saves one snapshot of the actor's state at the given index.
    ///
    /// Returns the generated row id.
    ///
    /// # Errors
    ///
    /// See [`SnapshotStore::save`].
    pub async fn persist_snapshot(
        &self,
        actor_name: &str,
        index: i64,
        state: &S,
    ) -> Result<Uuid, StoreError> {
        self.snapshots.save(actor_name, index, state).await
    }

    /// Streams the actor's events from `index_start` onward, ascending,
    /// into `visit`. Returns the last index visited.
    ///
    /// # Errors
    ///
    /// See [`EventLog::read_from`].
    pub async fn read_events<F>(
        &self,
        actor_name: &str,
        index_start: i64,
        visit: F,
    ) -> Result<Option<i64>, StoreError>
    where
        F: FnMut(E),
    {
        self.events.read_from(actor_name, index_start, visit).await
    }

    /// Loads the actor's latest snapshot, or `None` if it has none.
    ///
    /// # Errors
    ///
    /// See [`SnapshotStore::load_latest`].
    pub async fn load_latest_snapshot(
        &self,
        actor_name: &str,
    ) -> Result<Option<(S, i64)>, StoreError> {
        self.snapshots.load_latest(actor_name).await
    }

    /// Deletes the actor's events up to and including the given index.
    /// Returns the number of rows removed.
    ///
    /// # Errors
    ///
    /// See [`EventLog::delete_up_to`].
    pub async fn delete_events(
        &self,
        actor_name: &str,
        inclusive_index: i64,
    ) -> Result<u64, StoreError> {
        self.events.delete_up_to(actor_name, inclusive_index).await
    }

    /// Deletes the actor's snapshots up to and including the given index.
    /// Returns the number of rows removed.
    ///
    /// # Errors
    ///
    /// See [`SnapshotStore::delete_up_to`].
    pub async fn delete_snapshots(
        &self,
        actor_name: &str,
        inclusive_index: i64,
    ) -> Result<u64, StoreError> {
        self.snapshots
            .delete_up_to(actor_name, inclusive_index)
            .await
    }

    /// The underlying event log.
    #[must_use]
    pub const fn event_log(&self) -> &EventLog<E> {
        &self.events
    }

    /// The underlying snapshot store.
    #[must_use]
    pub const fn snapshot_store(&self) -> &SnapshotStore<S> {
        &self.snapshots
    }
}
