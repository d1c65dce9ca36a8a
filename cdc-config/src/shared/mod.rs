//! Shared configuration types for CDC pipelines.

mod broker;
mod connector;
mod pipeline;
mod retry;
mod transformation;

pub use broker::{BrokerConfig, BrokerType};
pub use connector::{ConnectorType, SourceConfig};
pub use pipeline::PipelineConfig;
pub use retry::{ReconnectConfig, RetryConfig};
pub use transformation::TransformationConfig;

use thiserror::Error;

/// Errors returned when validating configuration values.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("pipeline name must not be empty")]
    EmptyPipelineName,

    #[error("source connection string must not be empty")]
    EmptyConnectionString,

    #[error("at least one monitored table is required")]
    NoMonitoredTables,

    #[error("poll interval must be greater than 0")]
    PollIntervalZero,

    #[error("poll batch size must be greater than 0")]
    PollBatchSizeZero,

    #[error("broker connection string must not be empty")]
    EmptyBrokerConnectionString,

    #[error("target topic must not be empty")]
    EmptyTargetTopic,

    #[error("retry base delay must be greater than 0")]
    RetryBaseDelayZero,

    #[error("retry max delay must be greater or equal to the base delay")]
    RetryMaxDelayBelowBase,

    #[error("dlq_topic is required when the dead letter queue is enabled")]
    MissingDlqTopic,

    #[error("reconnect delays must be greater than 0")]
    ReconnectDelayZero,

    #[error("invalid value for field '{field}': {constraint}")]
    InvalidFieldValue { field: String, constraint: String },
}
