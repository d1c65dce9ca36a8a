use chrono::Utc;
use serde_json::json;

use crate::types::{EventType, RawChange, RowImage};

/// Builds a row image from `(column, value)` pairs.
pub fn row(columns: &[(&str, serde_json::Value)]) -> RowImage {
    columns
        .iter()
        .map(|(name, value)| (name.to_string(), value.clone()))
        .collect()
}

/// Builds an insert change for `table` with a single-column row.
pub fn insert_change(table: &str, sequence: u64) -> RawChange {
    RawChange {
        table: table.to_string(),
        op: EventType::Insert,
        before: None,
        after: Some(row(&[("id", json!(sequence))])),
        captured_at: Utc::now(),
        sequence,
    }
}

/// Builds an update change for `table` carrying both row images.
pub fn update_change(table: &str, sequence: u64) -> RawChange {
    RawChange {
        table: table.to_string(),
        op: EventType::Update,
        before: Some(row(&[("id", json!(sequence)), ("version", json!(1))])),
        after: Some(row(&[("id", json!(sequence)), ("version", json!(2))])),
        captured_at: Utc::now(),
        sequence,
    }
}
