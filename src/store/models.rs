//! Raw row models for events and snapshots.
//!
//! Payloads here are still in stored envelope form (`{"kind", "data"}`);
//! the typed decode happens in the stores. These models are for callers
//! that need row metadata — ids, indices, and the server-assigned
//! `created` timestamps — e.g. retention tooling or stream inspection.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A stored event row from the events table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredEvent {
    /// Generated row id.
    pub id: Uuid,
    /// Actor stream the event belongs to.
    pub actor_name: String,
    /// Position within the actor's stream.
    pub event_index: i64,
    /// Payload in stored envelope form.
    pub event_data: serde_json::Value,
    /// Server-assigned creation timestamp.
    pub created: DateTime<Utc>,
}

/// A stored snapshot row from the snapshots table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredSnapshot {
    /// Generated row id.
    pub id: Uuid,
    /// Actor the state capture belongs to.
    pub actor_name: String,
    /// Stream index the capture was taken at.
    pub snapshot_index: i64,
    /// State in stored envelope form.
    pub snapshot_data: serde_json::Value,
    /// Server-assigned creation timestamp.
    pub created: DateTime<Utc>,
}
