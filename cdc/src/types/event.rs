use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Ordered mapping of column name to value for a row image.
pub type RowImage = BTreeMap<String, serde_json::Value>;

/// The kind of change a captured event represents.
///
/// Closed set; connectors never produce anything outside of it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    /// A new row was added.
    Insert,
    /// An existing row was modified.
    Update,
    /// A row was removed.
    Delete,
    /// A row emitted while snapshotting existing data at pipeline start.
    Snapshot,
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            EventType::Insert => "insert",
            EventType::Update => "update",
            EventType::Delete => "delete",
            EventType::Snapshot => "snapshot",
        };
        f.write_str(name)
    }
}

/// A raw change record as produced by a source connector, before it is turned
/// into a [`CdcEvent`] by the pipeline worker.
#[derive(Debug, Clone, PartialEq)]
pub struct RawChange {
    /// Fully-qualified name of the source table.
    pub table: String,
    /// The kind of change.
    pub op: EventType,
    /// Row image before the change. Absent for inserts and snapshots.
    pub before: Option<RowImage>,
    /// Row image after the change. Absent for deletes.
    pub after: Option<RowImage>,
    /// Capture timestamp assigned by the connector, monotonic per stream.
    pub captured_at: DateTime<Utc>,
    /// Monotonically increasing per-source sequence number, used for
    /// ordering and downstream dedup.
    pub sequence: u64,
}

/// One captured change event.
///
/// Created by the pipeline worker from a [`RawChange`]; read-only thereafter.
/// The JSON form of this struct is the wire payload handed to broker
/// publishers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CdcEvent {
    /// Globally unique identifier, assigned at capture time.
    pub event_id: Uuid,
    /// Fully-qualified name of the source table.
    pub table: String,
    /// The kind of change.
    pub event_type: EventType,
    /// Row image before the change. Absent for inserts and snapshots.
    pub before: Option<RowImage>,
    /// Row image after the change. Absent for deletes.
    pub after: Option<RowImage>,
    /// Capture timestamp assigned by the connector.
    pub captured_at: DateTime<Utc>,
    /// Per-source sequence number.
    pub sequence: u64,
}

impl CdcEvent {
    /// Builds a [`CdcEvent`] from a raw connector change, assigning a fresh
    /// event id.
    pub fn from_raw(raw: RawChange) -> Self {
        Self {
            event_id: Uuid::new_v4(),
            table: raw.table,
            event_type: raw.op,
            before: raw.before,
            after: raw.after,
            captured_at: raw.captured_at,
            sequence: raw.sequence,
        }
    }
}

/// A [`CdcEvent`] that exhausted its publish retries, kept for operator
/// visibility until explicitly retried or cleared.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FailedEvent {
    /// The event that could not be delivered.
    pub event: CdcEvent,
    /// Human-readable description of the last publish error.
    pub last_error: String,
    /// Number of publish attempts made before giving up.
    pub attempt_count: u32,
    /// When the first publish attempt for this event failed.
    pub first_failed_at: DateTime<Utc>,
}
