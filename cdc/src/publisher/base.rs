use std::sync::Arc;

use async_trait::async_trait;
use cdc_config::shared::{BrokerConfig, BrokerType};

use crate::error::CdcResult;
use crate::publisher::memory::MemoryBroker;
use crate::publisher::webhook::WebhookPublisher;
use crate::types::CdcEvent;

/// A shared broker publisher.
///
/// Publishers are stateless with respect to individual pipelines and must be
/// callable while the pipeline is stopped (retrying buffered failed events
/// does not require a running worker).
pub type BoxedPublisher = Arc<dyn BrokerPublisher>;

/// Broker-assigned delivery acknowledgment.
///
/// Partition and offset are opaque to the pipeline; not every broker
/// provides them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishAck {
    /// Topic the event was written to.
    pub topic: String,
    /// Partition the event landed on, when the broker reports one.
    pub partition: Option<i32>,
    /// Offset within the partition, when the broker reports one.
    pub offset: Option<u64>,
}

/// Trait for publishing captured events to an external message broker.
///
/// Errors returned from [`BrokerPublisher::publish`] are classified by
/// [`crate::policy::classify_publish_error`] to decide retry eligibility.
/// The pipeline depends only on this interface, never on a concrete broker
/// client.
#[async_trait]
pub trait BrokerPublisher: Send + Sync {
    /// Returns the name of the broker backend, used in logs.
    fn name(&self) -> &'static str;

    /// Serializes and sends one event to `topic`.
    async fn publish(&self, topic: &str, event: &CdcEvent) -> CdcResult<PublishAck>;
}

/// Builds the publisher for the configured broker backend.
///
/// The backend is selected here, once, through a closed match on
/// [`BrokerType`].
pub fn build_publisher(config: &BrokerConfig) -> CdcResult<BoxedPublisher> {
    match config.broker {
        BrokerType::Memory => Ok(Arc::new(MemoryBroker::new())),
        BrokerType::Webhook => Ok(Arc::new(WebhookPublisher::new(
            config.connection_string.clone(),
        )?)),
    }
}
