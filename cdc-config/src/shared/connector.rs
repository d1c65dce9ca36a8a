use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::shared::ValidationError;

/// Source backends a pipeline can capture changes from.
///
/// The set is closed by design: a new backend is added by extending this enum
/// and implementing the connector interface, never by branching on strings in
/// the core.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, Eq, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum ConnectorType {
    /// Polling capture over a changelog table in a Postgres database.
    Postgres,
    /// In-process connector fed programmatically, for tests and local runs.
    Memory,
}

/// Configuration for the source side of a pipeline.
///
/// Describes which backend to capture from, which tables to monitor and how
/// often to poll for new changes.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SourceConfig {
    /// Backend used to capture change events.
    pub connector: ConnectorType,
    /// Connection string for the source database.
    ///
    /// Ignored by the memory connector.
    #[serde(default)]
    pub connection_string: String,
    /// Fully-qualified names of the tables to monitor.
    pub tables: Vec<String>,
    /// Whether to emit a snapshot of existing data before streaming changes.
    #[serde(default)]
    pub snapshot_on_start: bool,
    /// Milliseconds between two consecutive polls of the source.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    /// Maximum number of raw changes fetched per poll.
    #[serde(default = "default_poll_batch_size")]
    pub poll_batch_size: i64,
    /// Name of the changelog table read by the Postgres connector.
    #[serde(default = "default_changelog_table")]
    pub changelog_table: String,
}

impl SourceConfig {
    /// Returns the poll interval as a [`Duration`].
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// Validates source configuration settings.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.connector == ConnectorType::Postgres && self.connection_string.is_empty() {
            return Err(ValidationError::EmptyConnectionString);
        }

        if self.tables.is_empty() {
            return Err(ValidationError::NoMonitoredTables);
        }

        if self.poll_interval_ms == 0 {
            return Err(ValidationError::PollIntervalZero);
        }

        if self.poll_batch_size <= 0 {
            return Err(ValidationError::PollBatchSizeZero);
        }

        Ok(())
    }
}

fn default_poll_interval_ms() -> u64 {
    1000
}

fn default_poll_batch_size() -> i64 {
    1000
}

fn default_changelog_table() -> String {
    "cdc_changelog".to_string()
}
