//! Store error taxonomy.
//!
//! [`StoreError`] is the central error type for the crate. Every failure
//! surfaced by the backing store or the codec is wrapped with the operation,
//! actor name, and stream index it occurred under, then propagated to the
//! caller. This layer performs no retries and substitutes no fallback
//! values: a failed persist never reports success, and a failed scan is
//! distinguishable from an exhausted one.

use crate::codec::{DecodeError, EncodeError};

/// Central error type for all store operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Invalid or missing configuration (connection target, schema name,
    /// table prefix).
    #[error("invalid configuration: {0}")]
    Config(String),

    /// Auto-provisioning is disabled and a required table is absent.
    #[error("required table {schema}.{table} does not exist and auto_create_tables is disabled")]
    SchemaMissing {
        /// Schema the table was expected in.
        schema: String,
        /// Unqualified table name.
        table: String,
    },

    /// Schema provisioning or verification failed. Not tied to any actor
    /// or index — it happens once, at construction.
    #[error("{op} failed")]
    Provision {
        /// Operation name, e.g. `"provision schema"`.
        op: &'static str,
        /// Underlying driver failure.
        #[source]
        source: sqlx::Error,
    },

    /// A payload could not be serialized for storage.
    #[error("failed to encode payload for actor {actor} at index {index}")]
    Encode {
        /// Actor whose payload was being persisted.
        actor: String,
        /// Stream index of the failed persist.
        index: i64,
        /// Underlying codec failure.
        #[source]
        source: EncodeError,
    },

    /// A stored payload could not be reconstructed.
    #[error("failed to decode stored payload for actor {actor}")]
    Decode {
        /// Actor whose history was being read.
        actor: String,
        /// Underlying codec failure.
        #[source]
        source: DecodeError,
    },

    /// A row already exists for this `(actor, index)` pair. Exactly one of
    /// two racing writers observes this; the first-committed row is intact.
    #[error("a row already exists for actor {actor} at index {index}")]
    Duplicate {
        /// Actor the write was scoped to.
        actor: String,
        /// Stream index that collided.
        index: i64,
    },

    /// A write (insert or delete) failed at the backing store.
    #[error("{op} failed for actor {actor} at index {index}")]
    Write {
        /// Operation name, e.g. `"append event"`.
        op: &'static str,
        /// Actor the write was scoped to.
        actor: String,
        /// Stream index involved in the write.
        index: i64,
        /// Underlying driver failure.
        #[source]
        source: sqlx::Error,
    },

    /// A query or connectivity failure during a read. When this occurs
    /// mid-scan the scan is aborted; rows already visited stand, but the
    /// stream must not be treated as exhausted.
    #[error("{op} failed for actor {actor}")]
    Read {
        /// Operation name, e.g. `"read events"`.
        op: &'static str,
        /// Actor the read was scoped to.
        actor: String,
        /// Underlying driver failure.
        #[source]
        source: sqlx::Error,
    },
}

impl StoreError {
    /// Whether this error is a `(actor, index)` uniqueness collision.
    #[must_use]
    pub const fn is_duplicate(&self) -> bool {
        matches!(self, Self::Duplicate { .. })
    }

    /// Whether this error reports an unprovisioned schema.
    #[must_use]
    pub const fn is_schema_missing(&self) -> bool {
        matches!(self, Self::SchemaMissing { .. })
    }

    /// Classifies a driver error from a write statement, turning a
    /// unique-constraint violation into [`StoreError::Duplicate`].
    pub(crate) fn from_write(
        op: &'static str,
        actor: &str,
        index: i64,
        source: sqlx::Error,
    ) -> Self {
        if is_unique_violation(&source) {
            return Self::Duplicate {
                actor: actor.to_owned(),
                index,
            };
        }
        Self::Write {
            op,
            actor: actor.to_owned(),
            index,
            source,
        }
    }
}

/// PostgreSQL SQLSTATE for `unique_violation`.
const UNIQUE_VIOLATION: &str = "23505";

fn is_unique_violation(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Database(db) => db.code().as_deref() == Some(UNIQUE_VIOLATION),
        _ => false,
    }
}
