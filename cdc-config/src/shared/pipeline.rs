use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::shared::{
    BrokerConfig, ReconnectConfig, RetryConfig, SourceConfig, TransformationConfig,
    ValidationError,
};

/// Configuration for a CDC pipeline.
///
/// Supplied once when the pipeline is created and immutable for the
/// pipeline's lifetime; changing any of it requires removing and recreating
/// the pipeline.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Human-readable name of the pipeline, used in logs.
    pub name: String,
    /// Source connector configuration.
    pub source: SourceConfig,
    /// Broker publisher configuration.
    pub broker: BrokerConfig,
    /// Ordered transformation chain applied to every captured event.
    #[serde(default)]
    pub transformations: Vec<TransformationConfig>,
    /// Retry and dead-letter-queue behavior for publish failures.
    #[serde(default)]
    pub retry: RetryConfig,
    /// Reconnection behavior for transient source connection failures.
    #[serde(default)]
    pub reconnect: ReconnectConfig,
    /// Bounded grace period for a pipeline stop, in milliseconds. After this
    /// the worker is forcibly terminated.
    #[serde(default = "default_stop_timeout_ms")]
    pub stop_timeout_ms: u64,
}

impl PipelineConfig {
    /// Returns the stop grace period as a [`Duration`].
    pub fn stop_timeout(&self) -> Duration {
        Duration::from_millis(self.stop_timeout_ms)
    }

    /// Validates the whole pipeline configuration.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.name.is_empty() {
            return Err(ValidationError::EmptyPipelineName);
        }

        self.source.validate()?;
        self.broker.validate()?;
        self.retry.validate()?;
        self.reconnect.validate()?;

        if self.stop_timeout_ms == 0 {
            return Err(ValidationError::InvalidFieldValue {
                field: "stop_timeout_ms".to_string(),
                constraint: "must be greater than 0".to_string(),
            });
        }

        Ok(())
    }
}

fn default_stop_timeout_ms() -> u64 {
    10_000
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shared::{BrokerType, ConnectorType};

    fn valid_config() -> PipelineConfig {
        PipelineConfig {
            name: "orders".to_string(),
            source: SourceConfig {
                connector: ConnectorType::Memory,
                connection_string: String::new(),
                tables: vec!["public.orders".to_string()],
                snapshot_on_start: false,
                poll_interval_ms: 100,
                poll_batch_size: 100,
                changelog_table: "cdc_changelog".to_string(),
            },
            broker: BrokerConfig {
                broker: BrokerType::Memory,
                connection_string: String::new(),
                topic: "orders".to_string(),
            },
            transformations: vec![],
            retry: RetryConfig::default(),
            reconnect: ReconnectConfig::default(),
            stop_timeout_ms: 1000,
        }
    }

    #[test]
    fn accepts_valid_config() {
        assert!(valid_config().validate().is_ok());
    }

    #[test]
    fn rejects_missing_tables() {
        let mut config = valid_config();
        config.source.tables.clear();

        assert_eq!(config.validate(), Err(ValidationError::NoMonitoredTables));
    }

    #[test]
    fn rejects_empty_topic() {
        let mut config = valid_config();
        config.broker.topic.clear();

        assert_eq!(config.validate(), Err(ValidationError::EmptyTargetTopic));
    }

    #[test]
    fn rejects_postgres_source_without_connection_string() {
        let mut config = valid_config();
        config.source.connector = ConnectorType::Postgres;

        assert_eq!(
            config.validate(),
            Err(ValidationError::EmptyConnectionString)
        );
    }
}
