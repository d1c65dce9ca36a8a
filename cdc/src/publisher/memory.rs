use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tracing::debug;

use crate::error::CdcResult;
use crate::publisher::base::{BrokerPublisher, PublishAck};
use crate::types::CdcEvent;

/// In-process broker for tests and local runs.
///
/// Published events are kept per topic and can be inspected through cloned
/// handles, which makes this the broker of choice for integration tests.
#[derive(Debug, Clone, Default)]
pub struct MemoryBroker {
    topics: Arc<Mutex<HashMap<String, Vec<CdcEvent>>>>,
}

impl MemoryBroker {
    /// Creates a new broker with no topics.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a copy of all events published to `topic`.
    pub fn events(&self, topic: &str) -> Vec<CdcEvent> {
        let topics = self.topics.lock().unwrap();
        topics.get(topic).cloned().unwrap_or_default()
    }

    /// Returns the names of all topics that received at least one event.
    pub fn topic_names(&self) -> Vec<String> {
        let topics = self.topics.lock().unwrap();
        topics.keys().cloned().collect()
    }

    /// Discards all published events.
    pub fn clear(&self) {
        let mut topics = self.topics.lock().unwrap();
        topics.clear();
    }
}

#[async_trait]
impl BrokerPublisher for MemoryBroker {
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn publish(&self, topic: &str, event: &CdcEvent) -> CdcResult<PublishAck> {
        let mut topics = self.topics.lock().unwrap();
        let entries = topics.entry(topic.to_string()).or_default();
        entries.push(event.clone());

        debug!(topic = %topic, event_id = %event.event_id, "published to memory broker");

        Ok(PublishAck {
            topic: topic.to_string(),
            partition: Some(0),
            offset: Some((entries.len() - 1) as u64),
        })
    }
}
