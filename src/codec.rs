//! Payload serialization with an embedded type tag.
//!
//! Event and snapshot bodies are opaque to the store, but the stored form
//! must carry enough type identity that a later read reconstructs the same
//! runtime shape. Each payload is wrapped in an [`Envelope`]:
//!
//! ```json
//! { "kind": "counter_event", "data": { "event": "incremented", "by": 2 } }
//! ```
//!
//! The outer `kind` comes from [`Payload::KIND`] and is verified on decode,
//! so rows written under a different payload type fail loudly instead of
//! being misread. Per-variant identity inside `data` is the caller's
//! serde-tagged enum (`#[serde(tag = "...")]`), keeping the whole scheme
//! statically checkable — no runtime reflection, no registry.
//!
//! This module knows nothing of actors, indices, or storage; it is a pure
//! bidirectional transform.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::marker::PhantomData;

/// A value that can be persisted as an event or snapshot body.
///
/// Implementors are typically serde-tagged enums (for event streams) or
/// plain state structs (for snapshots). `KIND` is the stable discriminator
/// written into every stored row; changing it orphans existing rows.
///
/// ```
/// use serde::{Deserialize, Serialize};
/// use eventstore_pg::Payload;
///
/// #[derive(Debug, PartialEq, Serialize, Deserialize)]
/// #[serde(tag = "event", rename_all = "snake_case")]
/// enum CounterEvent {
///     Incremented { by: i64 },
///     Reset,
/// }
///
/// impl Payload for CounterEvent {
///     const KIND: &'static str = "counter_event";
/// }
/// ```
pub trait Payload: Serialize + DeserializeOwned + Send + Sync + 'static {
    /// Stable type tag embedded in the stored form.
    const KIND: &'static str;
}

/// The stored wire shape: type tag plus payload body.
#[derive(Debug, Serialize, Deserialize)]
struct Envelope {
    kind: String,
    data: serde_json::Value,
}

/// Encoding failure: the payload could not be serialized.
#[derive(Debug, thiserror::Error)]
#[error("payload of kind {kind} is not serializable")]
pub struct EncodeError {
    /// Type tag of the payload that failed to serialize.
    pub kind: &'static str,
    /// Underlying serde failure.
    #[source]
    pub source: serde_json::Error,
}

/// Decoding failure: a stored value could not be reconstructed.
#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    /// The stored value is not a well-formed envelope.
    #[error("stored value is not a well-formed envelope")]
    Malformed(#[source] serde_json::Error),

    /// The embedded type tag does not match the expected payload type.
    #[error("stored payload has kind {found}, expected {expected}")]
    KindMismatch {
        /// Tag the decoder expected.
        expected: &'static str,
        /// Tag found in the stored envelope.
        found: String,
    },

    /// The envelope is intact but its body does not deserialize as the
    /// expected payload type.
    #[error("envelope body does not deserialize as kind {kind}")]
    Payload {
        /// Tag of the expected payload type.
        kind: &'static str,
        /// Underlying serde failure.
        #[source]
        source: serde_json::Error,
    },
}

/// Bidirectional JSON codec for one payload type.
pub struct JsonCodec<P> {
    _marker: PhantomData<fn() -> P>,
}

impl<P> std::fmt::Debug for JsonCodec<P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JsonCodec").finish()
    }
}

impl<P> Default for JsonCodec<P> {
    fn default() -> Self {
        Self::new()
    }
}

impl<P> Clone for JsonCodec<P> {
    fn clone(&self) -> Self {
        Self::new()
    }
}

impl<P> JsonCodec<P> {
    /// Creates a codec for payload type `P`.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            _marker: PhantomData,
        }
    }
}

impl<P: Payload> JsonCodec<P> {
    /// Encodes a payload into its stored envelope form.
    ///
    /// # Errors
    ///
    /// Returns [`EncodeError`] if the payload cannot be serialized (e.g. a
    /// map with non-string keys, or a custom `Serialize` impl that fails).
    pub fn encode(&self, payload: &P) -> Result<serde_json::Value, EncodeError> {
        let data = serde_json::to_value(payload).map_err(|source| EncodeError {
            kind: P::KIND,
            source,
        })?;
        Ok(serde_json::json!({ "kind": P::KIND, "data": data }))
    }

    /// Decodes a stored envelope back into the payload type.
    ///
    /// # Errors
    ///
    /// Returns [`DecodeError`] when the stored value is not an envelope,
    /// carries a different type tag, or its body does not deserialize as
    /// `P`.
    pub fn decode(&self, stored: serde_json::Value) -> Result<P, DecodeError> {
        let envelope: Envelope = serde_json::from_value(stored).map_err(DecodeError::Malformed)?;
        if envelope.kind != P::KIND {
            return Err(DecodeError::KindMismatch {
                expected: P::KIND,
                found: envelope.kind,
            });
        }
        serde_json::from_value(envelope.data).map_err(|source| DecodeError::Payload {
            kind: P::KIND,
            source,
        })
    }
}
