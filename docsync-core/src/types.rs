//! Domain types shared by the loader, the coordinator and the remote client.
//!
//! Payloads are JSON objects regardless of the on-disk format of the watched
//! document; YAML documents are decoded straight into `serde_json::Value`.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

// ---------------------------------------------------------------------------
// Newtypes
// ---------------------------------------------------------------------------

/// Identifier of the remote record the watched document is synced to.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RecordId(pub String);

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<String> for RecordId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for RecordId {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

/// A parsed document: a mapping of string keys to arbitrary nested values.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Payload(pub Map<String, Value>);

impl Payload {
    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }

    pub fn into_value(self) -> Value {
        Value::Object(self.0)
    }
}

impl From<Map<String, Value>> for Payload {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}

impl TryFrom<Value> for Payload {
    type Error = Value;

    /// Only objects convert; any other value is handed back unchanged.
    fn try_from(value: Value) -> Result<Self, Self::Error> {
        match value {
            Value::Object(map) => Ok(Self(map)),
            other => Err(other),
        }
    }
}

// ---------------------------------------------------------------------------
// Version state
// ---------------------------------------------------------------------------

/// Local view of the remote record's versions for one run.
///
/// `local_version` is the version sent as `expected_version` on the next
/// write. It only moves forward, and only by one per applied write.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkspaceVersionState {
    pub local_version: u64,
    pub event_version: u64,
}

impl Default for WorkspaceVersionState {
    /// State used when the remote record does not exist yet.
    fn default() -> Self {
        Self {
            local_version: 1,
            event_version: 0,
        }
    }
}

impl WorkspaceVersionState {
    /// Record a confirmed write.
    pub fn apply(&mut self, event_version: u64) {
        self.local_version += 1;
        self.event_version = event_version;
    }
}

/// Version pair reported by the remote store for an existing record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteRecord {
    pub local_version: u64,
    pub event_version: u64,
}

impl From<RemoteRecord> for WorkspaceVersionState {
    fn from(record: RemoteRecord) -> Self {
        Self {
            local_version: record.local_version,
            event_version: record.event_version,
        }
    }
}

// ---------------------------------------------------------------------------
// Outcomes
// ---------------------------------------------------------------------------

/// Result of one versioned write against the remote store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SyncOutcome {
    /// The write was stored; the record now carries `event_version`.
    Applied { event_version: u64 },
    /// The payload is identical to the stored record; nothing was written.
    NoChange,
    /// `expected_version` did not match the record's stored version.
    Conflict,
    /// Transport or server failure.
    TransientFailure { cause: String },
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
