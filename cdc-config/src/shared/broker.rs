use serde::{Deserialize, Serialize};

use crate::shared::ValidationError;

/// Message broker backends a pipeline can publish to.
///
/// Closed set: new brokers are added by extending this enum and implementing
/// the publisher interface for it.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, Eq, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum BrokerType {
    /// In-process broker with inspectable topics, for tests and local runs.
    Memory,
    /// HTTP webhook broker: events are POSTed as JSON to a per-topic URL.
    Webhook,
}

/// Configuration for the broker side of a pipeline.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct BrokerConfig {
    /// Broker backend events are published to.
    pub broker: BrokerType,
    /// Base connection string or URL of the broker.
    ///
    /// Ignored by the memory broker.
    #[serde(default)]
    pub connection_string: String,
    /// Topic that kept events are published to.
    pub topic: String,
}

impl BrokerConfig {
    /// Validates broker configuration settings.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.broker == BrokerType::Webhook && self.connection_string.is_empty() {
            return Err(ValidationError::EmptyBrokerConnectionString);
        }

        if self.topic.is_empty() {
            return Err(ValidationError::EmptyTargetTopic);
        }

        Ok(())
    }
}
