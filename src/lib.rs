//! # eventstore-pg
//!
//! Durable event-sourcing persistence for actor state, backed by
//! PostgreSQL.
//!
//! For each named actor — a unit of sequential, independently-replayable
//! state — the store keeps an append-only ordered log of domain events and
//! periodic compacting snapshots. An actor runtime rebuilds current state
//! by replaying events from the beginning, or by loading the latest
//! snapshot and replaying only the events after it.
//!
//! ## Architecture
//!
//! ```text
//! Actor runtime
//!     │
//!     ├── PersistenceProvider (provider/)
//!     │       │
//!     │       ├── EventLog        (store/events)
//!     │       ├── SnapshotStore   (store/snapshots)
//!     │       │       │
//!     │       │       └── JsonCodec (codec/) — tagged envelopes
//!     │       │
//!     │       └── SchemaManager (schema/) — provision or verify
//!     │
//!     └── PostgreSQL (sqlx::PgPool)
//! ```
//!
//! ## Example
//!
//! ```no_run
//! use eventstore_pg::{Payload, PersistenceProvider, StoreConfig};
//! use serde::{Deserialize, Serialize};
//!
//! #[derive(Debug, Serialize, Deserialize)]
//! #[serde(tag = "event", rename_all = "snake_case")]
//! enum CounterEvent {
//!     Incremented { by: i64 },
//!     Reset,
//! }
//!
//! impl Payload for CounterEvent {
//!     const KIND: &'static str = "counter_event";
//! }
//!
//! #[derive(Debug, Serialize, Deserialize)]
//! struct CounterState {
//!     value: i64,
//! }
//!
//! impl Payload for CounterState {
//!     const KIND: &'static str = "counter_state";
//! }
//!
//! # async fn run() -> Result<(), eventstore_pg::StoreError> {
//! let config = StoreConfig::from_env()?.with_auto_create_tables(true);
//! let provider: PersistenceProvider<CounterEvent, CounterState> =
//!     PersistenceProvider::connect(&config).await?;
//!
//! provider
//!     .persist_event("counter-1", 1, &CounterEvent::Incremented { by: 2 })
//!     .await?;
//!
//! let mut value = 0;
//! let start = match provider.load_latest_snapshot("counter-1").await? {
//!     Some((state, index)) => {
//!         value = state.value;
//!         index + 1
//!     }
//!     None => 0,
//! };
//! provider
//!     .read_events("counter-1", start, |event| match event {
//!         CounterEvent::Incremented { by } => value += by,
//!         CounterEvent::Reset => value = 0,
//!     })
//!     .await?;
//! # Ok(())
//! # }
//! ```
//!
//! Ordering guarantees are per-actor only; there is no global ordering
//! across different actors' streams, and no cross-actor transactions.

pub mod codec;
pub mod config;
pub mod error;
pub mod provider;
pub mod schema;
pub mod store;

pub use codec::{DecodeError, EncodeError, JsonCodec, Payload};
pub use config::StoreConfig;
pub use error::StoreError;
pub use provider::PersistenceProvider;
pub use schema::{SchemaManager, TableSet};
pub use store::{EventLog, SnapshotStore, StoredEvent, StoredSnapshot};
