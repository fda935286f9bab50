//! Per-actor event log and snapshot stores.
//!
//! Both stores share the same shape: rows keyed by `(actor_name, index)`
//! in a 64-bit stream-index space, payloads encoded through
//! [`crate::codec::JsonCodec`], and one pooled connection per call. Rows
//! are immutable once written; the only mutation is the retention-driven
//! `delete_up_to` on each store.

pub mod events;
pub mod models;
pub mod snapshots;

pub use events::EventLog;
pub use models::{StoredEvent, StoredSnapshot};
pub use snapshots::SnapshotStore;
