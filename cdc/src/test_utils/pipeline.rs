use std::sync::Arc;
use std::time::{Duration, Instant};

use cdc_config::shared::{
    BrokerConfig, BrokerType, ConnectorType, PipelineConfig, RetryConfig, SourceConfig,
};

use crate::connector::{BoxedConnector, ConnectorFactory, MemoryConnector};
use crate::pipeline::Pipeline;
use crate::publisher::{BoxedPublisher, BrokerPublisher};

/// A pipeline configuration wired to in-memory components, with short
/// intervals so tests settle quickly.
pub fn test_pipeline_config(name: &str, topic: &str) -> PipelineConfig {
    PipelineConfig {
        name: name.to_string(),
        source: SourceConfig {
            connector: ConnectorType::Memory,
            connection_string: "memory".to_string(),
            tables: vec!["orders".to_string(), "users".to_string()],
            snapshot_on_start: false,
            poll_interval_ms: 10,
            poll_batch_size: 100,
            changelog_table: "cdc_changelog".to_string(),
        },
        broker: BrokerConfig {
            broker: BrokerType::Memory,
            connection_string: "memory".to_string(),
            topic: topic.to_string(),
        },
        transformations: Vec::new(),
        retry: RetryConfig {
            base_delay_ms: 10,
            max_delay_ms: 100,
            ..RetryConfig::default()
        },
        reconnect: Default::default(),
        stop_timeout_ms: 2_000,
    }
}

/// Builds a pipeline around a shared [`MemoryConnector`] and the given
/// publisher.
///
/// The connector is cloned into every (re)start, so a test keeps feeding the
/// same queue across restarts.
pub fn memory_pipeline<P>(
    config: PipelineConfig,
    connector: MemoryConnector,
    publisher: Arc<P>,
) -> Pipeline
where
    P: BrokerPublisher + 'static,
{
    let factory: ConnectorFactory =
        Box::new(move || Ok(Box::new(connector.clone()) as BoxedConnector));
    let publisher: BoxedPublisher = publisher;
    Pipeline::with_components(config, factory, publisher)
}

/// Polls `predicate` every 10ms until it returns `true` or `timeout`
/// elapses. Panics on timeout; meant for asserting on eventually-visible
/// pipeline effects.
pub async fn wait_for<F>(timeout: Duration, mut predicate: F)
where
    F: FnMut() -> bool,
{
    let deadline = Instant::now() + timeout;
    loop {
        if predicate() {
            return;
        }
        if Instant::now() >= deadline {
            panic!("condition not met within {timeout:?}");
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}
