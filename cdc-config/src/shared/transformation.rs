use serde::{Deserialize, Serialize};

/// A single stage of the transformation chain.
///
/// Stages are applied strictly in configuration order. Each stage is a pure
/// function of the event and its own static configuration; stages never
/// perform I/O. The set is closed: new stage kinds are added here, not by
/// matching on free-form strings in the core.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TransformationConfig {
    /// Drops every insert event.
    ExcludeInserts,
    /// Drops every update event.
    ExcludeUpdates,
    /// Drops every delete event.
    ExcludeDeletes,
    /// Keeps only events from the listed tables.
    IncludeTables { tables: Vec<String> },
    /// Drops events from the listed tables.
    ExcludeTables { tables: Vec<String> },
    /// Removes the listed columns from the before and after images.
    ExcludeColumns { columns: Vec<String> },
}
