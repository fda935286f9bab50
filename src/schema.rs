//! Schema provisioning and verification.
//!
//! [`TableSet`] derives the qualified table and index names from a
//! validated [`StoreConfig`]; [`SchemaManager`] either provisions those
//! objects (`CREATE ... IF NOT EXISTS`, safe to re-run and safe under
//! concurrent first-time provisioning) or verifies that a pre-provisioned
//! schema actually contains them.
//!
//! Per table: `id UUID PRIMARY KEY`, `actor_name TEXT NOT NULL`, a
//! `BIGINT NOT NULL` stream index, a `JSONB NOT NULL` payload, and a
//! server-defaulted `TIMESTAMPTZ` creation time. Each table carries a
//! unique index on `(actor_name, <stream>_index ASC)`: it is both the
//! supporting index for ordered per-actor scans and the constraint that
//! makes duplicate `(actor, index)` appends fail.

use sqlx::PgPool;

use crate::config::StoreConfig;
use crate::error::StoreError;

/// Resolved table and index names for one store instance.
#[derive(Debug, Clone)]
pub struct TableSet {
    schema: String,
    events: String,
    snapshots: String,
}

impl TableSet {
    /// Derives table names from a configuration.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Config`] if the configuration fails
    /// [`StoreConfig::validate`].
    pub fn from_config(config: &StoreConfig) -> Result<Self, StoreError> {
        config.validate()?;
        let prefix = if config.table_prefix.is_empty() {
            String::new()
        } else {
            format!("{}_", config.table_prefix)
        };
        Ok(Self {
            schema: config.schema_name.clone(),
            events: format!("{prefix}events"),
            snapshots: format!("{prefix}snapshots"),
        })
    }

    /// Schema the tables live in.
    #[must_use]
    pub fn schema(&self) -> &str {
        &self.schema
    }

    /// Unqualified events table name.
    #[must_use]
    pub fn events(&self) -> &str {
        &self.events
    }

    /// Unqualified snapshots table name.
    #[must_use]
    pub fn snapshots(&self) -> &str {
        &self.snapshots
    }

    /// Schema-qualified events table name, for use in SQL text.
    #[must_use]
    pub fn events_qualified(&self) -> String {
        format!("{}.{}", self.schema, self.events)
    }

    /// Schema-qualified snapshots table name, for use in SQL text.
    #[must_use]
    pub fn snapshots_qualified(&self) -> String {
        format!("{}.{}", self.schema, self.snapshots)
    }
}

/// Provisions or verifies the two tables backing a store.
#[derive(Debug, Clone)]
pub struct SchemaManager {
    tables: TableSet,
}

impl SchemaManager {
    /// Creates a manager for the given table set.
    #[must_use]
    pub const fn new(tables: TableSet) -> Self {
        Self { tables }
    }

    /// Ensures the schema, both tables, and their unique indexes exist.
    ///
    /// Every statement is conditional-create, so re-running against an
    /// already-provisioned schema is a no-op and two processes racing on
    /// first-time provisioning both converge on the same objects.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Provision`] if any DDL statement fails.
    pub async fn ensure(&self, pool: &PgPool) -> Result<(), StoreError> {
        let schema = self.tables.schema();

        let create_schema = format!("CREATE SCHEMA IF NOT EXISTS {schema}");
        self.execute_ddl(pool, &create_schema).await?;

        let events = self.tables.events_qualified();
        let create_events = format!(
            "CREATE TABLE IF NOT EXISTS {events} (
                id UUID PRIMARY KEY,
                actor_name TEXT NOT NULL,
                event_index BIGINT NOT NULL,
                event_data JSONB NOT NULL,
                created TIMESTAMPTZ NOT NULL DEFAULT now()
            )"
        );
        self.execute_ddl(pool, &create_events).await?;

        let events_index = format!(
            "CREATE UNIQUE INDEX IF NOT EXISTS ix_{}_actor_event_index \
             ON {events} (actor_name ASC, event_index ASC)",
            self.tables.events()
        );
        self.execute_ddl(pool, &events_index).await?;

        let snapshots = self.tables.snapshots_qualified();
        let create_snapshots = format!(
            "CREATE TABLE IF NOT EXISTS {snapshots} (
                id UUID PRIMARY KEY,
                actor_name TEXT NOT NULL,
                snapshot_index BIGINT NOT NULL,
                snapshot_data JSONB NOT NULL,
                created TIMESTAMPTZ NOT NULL DEFAULT now()
            )"
        );
        self.execute_ddl(pool, &create_snapshots).await?;

        let snapshots_index = format!(
            "CREATE UNIQUE INDEX IF NOT EXISTS ix_{}_actor_snapshot_index \
             ON {snapshots} (actor_name ASC, snapshot_index ASC)",
            self.tables.snapshots()
        );
        self.execute_ddl(pool, &snapshots_index).await?;

        tracing::info!(
            schema,
            events = self.tables.events(),
            snapshots = self.tables.snapshots(),
            "storage tables provisioned"
        );
        Ok(())
    }

    /// Verifies that both tables already exist.
    ///
    /// Used when auto-provisioning is disabled: the caller promised the
    /// schema is in place, and a broken promise surfaces here instead of
    /// as an opaque query failure on first use.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::SchemaMissing`] naming the first absent
    /// table, or [`StoreError::Provision`] if the existence check itself
    /// fails.
    pub async fn verify(&self, pool: &PgPool) -> Result<(), StoreError> {
        for table in [self.tables.events(), self.tables.snapshots()] {
            let qualified = format!("{}.{}", self.tables.schema(), table);
            let found: Option<String> = sqlx::query_scalar("SELECT to_regclass($1)::text")
                .bind(&qualified)
                .fetch_one(pool)
                .await
                .map_err(|source| StoreError::Provision {
                    op: "verify schema",
                    source,
                })?;

            if found.is_none() {
                return Err(StoreError::SchemaMissing {
                    schema: self.tables.schema().to_owned(),
                    table: table.to_owned(),
                });
            }
        }
        Ok(())
    }

    async fn execute_ddl(&self, pool: &PgPool, sql: &str) -> Result<(), StoreError> {
        sqlx::query(sql)
            .execute(pool)
            .await
            .map_err(|source| StoreError::Provision {
                op: "provision schema",
                source,
            })?;
        Ok(())
    }
}
