#![cfg(feature = "test-utils")]

use std::sync::Arc;
use std::time::{Duration, Instant};

use cdc::connector::{BoxedConnector, ConnectorFactory, MemoryConnector};
use cdc::error::ErrorKind;
use cdc::pipeline::{Pipeline, PipelineState};
use cdc::publisher::{BoxedPublisher, MemoryBroker};
use cdc::test_utils::{
    BlocklistBroker, FailingConnector, FlakyBroker, FlakyConnector, insert_change,
    memory_pipeline, row, test_pipeline_config, update_change, wait_for,
};
use cdc::types::EventType;
use cdc_config::shared::{ReconnectConfig, TransformationConfig};
use cdc_telemetry::tracing::init_test_tracing;
use serde_json::json;

const WAIT: Duration = Duration::from_secs(5);

#[tokio::test(flavor = "multi_thread")]
async fn pipeline_delivers_changes_in_capture_order() {
    init_test_tracing();

    let connector = MemoryConnector::new();
    let broker = Arc::new(MemoryBroker::new());
    let pipeline = memory_pipeline(
        test_pipeline_config("orders_cdc", "orders_events"),
        connector.clone(),
        broker.clone(),
    );

    pipeline.start().await.unwrap();

    connector.push(insert_change("orders", 1));
    connector.push(update_change("orders", 2));
    connector.push(insert_change("orders", 3));

    wait_for(WAIT, || broker.events("orders_events").len() == 3).await;

    let events = broker.events("orders_events");
    assert_eq!(
        events.iter().map(|event| event.sequence).collect::<Vec<_>>(),
        vec![1, 2, 3]
    );
    assert_eq!(events[0].event_type, EventType::Insert);
    assert_eq!(events[1].event_type, EventType::Update);

    let metrics = pipeline.metrics();
    assert_eq!(metrics.events_processed, 3);
    assert_eq!(metrics.events_failed, 0);
    assert_eq!(metrics.events_filtered, 0);

    pipeline.stop().await.unwrap();
    assert_eq!(pipeline.state(), PipelineState::Stopped);
}

#[tokio::test(flavor = "multi_thread")]
async fn filtered_events_are_counted_but_not_published() {
    init_test_tracing();

    let mut config = test_pipeline_config("filtered_cdc", "events");
    config.transformations = vec![TransformationConfig::ExcludeUpdates];

    let connector = MemoryConnector::new();
    let broker = Arc::new(MemoryBroker::new());
    let pipeline = memory_pipeline(config, connector.clone(), broker.clone());

    pipeline.start().await.unwrap();

    connector.push(insert_change("orders", 1));
    connector.push(update_change("orders", 2));
    connector.push(update_change("orders", 3));
    connector.push(insert_change("orders", 4));

    wait_for(WAIT, || {
        let metrics = pipeline.metrics();
        metrics.events_processed == 2 && metrics.events_filtered == 2
    })
    .await;

    let events = broker.events("events");
    assert_eq!(events.len(), 2);
    assert!(events.iter().all(|event| event.event_type == EventType::Insert));

    pipeline.stop().await.unwrap();
}

#[tokio::test(flavor = "multi_thread")]
async fn excluded_columns_are_removed_from_published_events() {
    init_test_tracing();

    let mut config = test_pipeline_config("redacting_cdc", "events");
    config.transformations = vec![TransformationConfig::ExcludeColumns {
        columns: vec!["ssn".to_string()],
    }];

    let connector = MemoryConnector::new();
    let broker = Arc::new(MemoryBroker::new());
    let pipeline = memory_pipeline(config, connector.clone(), broker.clone());

    pipeline.start().await.unwrap();

    connector.push_change(
        "users",
        EventType::Insert,
        None,
        Some(row(&[("id", json!(1)), ("ssn", json!("123-45-6789"))])),
    );

    wait_for(WAIT, || !broker.events("events").is_empty()).await;

    let events = broker.events("events");
    let after = events[0].after.as_ref().unwrap();
    assert!(after.contains_key("id"));
    assert!(!after.contains_key("ssn"));

    pipeline.stop().await.unwrap();
}

#[tokio::test(flavor = "multi_thread")]
async fn transient_publish_failures_are_retried_until_success() {
    init_test_tracing();

    let mut config = test_pipeline_config("retrying_cdc", "events");
    config.retry.max_retries = 3;
    config.retry.base_delay_ms = 100;
    config.retry.max_delay_ms = 30_000;

    // Two injected failures, three retries allowed: the event must land on
    // the third attempt.
    let broker = Arc::new(FlakyBroker::new(2));
    let connector = MemoryConnector::new();
    let pipeline = memory_pipeline(config, connector.clone(), broker.clone());

    pipeline.start().await.unwrap();
    let started = Instant::now();
    connector.push(insert_change("orders", 1));

    wait_for(WAIT, || broker.inner().events("events").len() == 1).await;

    // Two backoffs of 100 and 200ms sit between the three attempts.
    assert!(started.elapsed() >= Duration::from_millis(300));

    let metrics = pipeline.metrics();
    assert_eq!(metrics.events_processed, 1);
    assert_eq!(metrics.events_failed, 0);
    assert!(pipeline.failed_events().is_empty());

    pipeline.stop().await.unwrap();
}

#[tokio::test(flavor = "multi_thread")]
async fn exhausted_event_is_counted_and_buffered_exactly_once() {
    init_test_tracing();

    let mut config = test_pipeline_config("exhausting_cdc", "events");
    config.retry.max_retries = 2;
    config.retry.enable_dlq = true;
    config.retry.dlq_topic = Some("events_dlq".to_string());

    let broker = Arc::new(BlocklistBroker::new(&["orders"]));
    let connector = MemoryConnector::new();
    let pipeline = memory_pipeline(config, connector.clone(), broker.clone());

    pipeline.start().await.unwrap();
    connector.push(insert_change("orders", 1));

    wait_for(WAIT, || pipeline.metrics().events_failed == 1).await;

    let failed = pipeline.failed_events();
    assert_eq!(failed.len(), 1);
    // Initial attempt plus two retries.
    assert_eq!(failed[0].attempt_count, 3);
    assert_eq!(pipeline.metrics().events_failed, 1);
    assert_eq!(pipeline.metrics().events_processed, 0);

    pipeline.stop().await.unwrap();
    // Draining and stopping must not count the event again.
    assert_eq!(pipeline.metrics().events_failed, 1);
}

#[tokio::test(flavor = "multi_thread")]
async fn backoff_delays_are_applied_between_retries() {
    init_test_tracing();

    let mut config = test_pipeline_config("backoff_cdc", "events");
    config.retry.max_retries = 3;
    config.retry.base_delay_ms = 50;
    config.retry.max_delay_ms = 1_000;

    let broker = Arc::new(BlocklistBroker::new(&["orders"]));
    let connector = MemoryConnector::new();
    let pipeline = memory_pipeline(config, connector.clone(), broker.clone());

    pipeline.start().await.unwrap();
    let started = Instant::now();
    connector.push(insert_change("orders", 1));

    wait_for(WAIT, || pipeline.metrics().events_failed == 1).await;

    // Three backoffs of 50, 100 and 200ms must have elapsed.
    assert!(started.elapsed() >= Duration::from_millis(350));

    pipeline.stop().await.unwrap();
}

#[tokio::test(flavor = "multi_thread")]
async fn zero_retries_sends_straight_to_dead_letter_queue() {
    init_test_tracing();

    let mut config = test_pipeline_config("dlq_cdc", "events");
    config.retry.max_retries = 0;
    config.retry.enable_dlq = true;
    config.retry.dlq_topic = Some("events_dlq".to_string());

    // The single injected failure is spent on the main topic publish, so the
    // dead-letter publish right after goes through.
    let broker = Arc::new(FlakyBroker::new(1));
    let connector = MemoryConnector::new();
    let pipeline = memory_pipeline(config, connector.clone(), broker.clone());

    pipeline.start().await.unwrap();
    connector.push(insert_change("orders", 1));

    wait_for(WAIT, || pipeline.metrics().events_failed == 1).await;

    let failed = pipeline.failed_events();
    assert_eq!(failed.len(), 1);
    assert_eq!(failed[0].attempt_count, 1);
    assert_eq!(broker.inner().events("events_dlq").len(), 1);
    assert!(broker.inner().events("events").is_empty());

    pipeline.stop().await.unwrap();
}

#[tokio::test(flavor = "multi_thread")]
async fn disabled_dlq_drops_exhausted_events_after_counting() {
    init_test_tracing();

    let mut config = test_pipeline_config("dropping_cdc", "events");
    config.retry.max_retries = 0;
    config.retry.enable_dlq = false;

    let broker = Arc::new(BlocklistBroker::new(&["orders"]));
    let connector = MemoryConnector::new();
    let pipeline = memory_pipeline(config, connector.clone(), broker.clone());

    pipeline.start().await.unwrap();
    connector.push(insert_change("orders", 1));

    wait_for(WAIT, || pipeline.metrics().events_failed == 1).await;

    assert!(pipeline.failed_events().is_empty());

    pipeline.stop().await.unwrap();
}

#[tokio::test(flavor = "multi_thread")]
async fn retry_all_redelivers_what_it_can_and_keeps_the_rest() {
    init_test_tracing();

    let mut config = test_pipeline_config("retry_all_cdc", "events");
    config.retry.max_retries = 0;
    config.retry.enable_dlq = true;
    config.retry.dlq_topic = Some("events_dlq".to_string());

    let broker = Arc::new(BlocklistBroker::new(&["orders", "users", "items"]));
    let connector = MemoryConnector::new();
    let pipeline = memory_pipeline(config, connector.clone(), broker.clone());

    pipeline.start().await.unwrap();
    connector.push(insert_change("orders", 1));
    connector.push(insert_change("users", 2));
    connector.push(insert_change("items", 3));

    wait_for(WAIT, || pipeline.failed_events().len() == 3).await;
    pipeline.stop().await.unwrap();

    // The broker recovers for two of the three tables.
    broker.set_blocked(&["items"]);

    let all_delivered = pipeline.retry_all_failed().await;
    assert!(!all_delivered);

    let remaining = pipeline.failed_events();
    assert_eq!(remaining.len(), 1);
    assert_eq!(remaining[0].event.table, "items");
    // The failed retry pass recorded its fresh attempt budget.
    assert_eq!(remaining[0].attempt_count, 1);

    let metrics = pipeline.metrics();
    assert_eq!(metrics.events_processed, 2);
    // Exhaustions are not recounted by the retry pass.
    assert_eq!(metrics.events_failed, 3);
    assert_eq!(broker.inner().events("events").len(), 2);

    // A second pass after full recovery drains the buffer.
    broker.set_blocked(&[]);
    assert!(pipeline.retry_all_failed().await);
    assert!(pipeline.failed_events().is_empty());
    assert_eq!(pipeline.metrics().events_processed, 3);
}

#[tokio::test(flavor = "multi_thread")]
async fn clear_failed_events_discards_the_buffer() {
    init_test_tracing();

    let mut config = test_pipeline_config("clearing_cdc", "events");
    config.retry.max_retries = 0;
    config.retry.enable_dlq = true;
    config.retry.dlq_topic = Some("events_dlq".to_string());

    let broker = Arc::new(BlocklistBroker::new(&["orders"]));
    let connector = MemoryConnector::new();
    let pipeline = memory_pipeline(config, connector.clone(), broker.clone());

    pipeline.start().await.unwrap();
    connector.push(insert_change("orders", 1));
    connector.push(insert_change("orders", 2));

    wait_for(WAIT, || pipeline.failed_events().len() == 2).await;
    pipeline.stop().await.unwrap();

    assert_eq!(pipeline.clear_failed_events(), 2);
    assert!(pipeline.failed_events().is_empty());
    assert_eq!(pipeline.metrics().events_failed, 2);
}

#[tokio::test(flavor = "multi_thread")]
async fn snapshot_rows_are_published_before_polled_changes() {
    init_test_tracing();

    let mut config = test_pipeline_config("snapshot_cdc", "events");
    config.source.snapshot_on_start = true;

    let connector = MemoryConnector::new();
    connector.add_snapshot_row("orders", row(&[("id", json!(1))]));
    connector.add_snapshot_row("orders", row(&[("id", json!(2))]));
    connector.push(insert_change("orders", 10));

    let broker = Arc::new(MemoryBroker::new());
    let pipeline = memory_pipeline(config, connector.clone(), broker.clone());

    pipeline.start().await.unwrap();

    wait_for(WAIT, || broker.events("events").len() == 3).await;

    let events = broker.events("events");
    assert_eq!(events[0].event_type, EventType::Snapshot);
    assert_eq!(events[1].event_type, EventType::Snapshot);
    assert_eq!(events[2].event_type, EventType::Insert);

    pipeline.stop().await.unwrap();
}

#[tokio::test(flavor = "multi_thread")]
async fn stop_is_idempotent() {
    init_test_tracing();

    let connector = MemoryConnector::new();
    let broker = Arc::new(MemoryBroker::new());
    let pipeline = memory_pipeline(
        test_pipeline_config("idempotent_cdc", "events"),
        connector,
        broker,
    );

    // Stopping a never-started pipeline is a no-op.
    pipeline.stop().await.unwrap();
    assert_eq!(pipeline.state(), PipelineState::Stopped);

    pipeline.start().await.unwrap();
    pipeline.stop().await.unwrap();
    pipeline.stop().await.unwrap();
    assert_eq!(pipeline.state(), PipelineState::Stopped);
}

#[tokio::test(flavor = "multi_thread")]
async fn pipeline_restarts_after_stop() {
    init_test_tracing();

    let connector = MemoryConnector::new();
    let broker = Arc::new(MemoryBroker::new());
    let pipeline = memory_pipeline(
        test_pipeline_config("restarting_cdc", "events"),
        connector.clone(),
        broker.clone(),
    );

    pipeline.start().await.unwrap();
    connector.push(insert_change("orders", 1));

    wait_for(WAIT, || broker.events("events").len() == 1).await;

    pipeline.stop().await.unwrap();

    pipeline.start().await.unwrap();
    connector.push(insert_change("orders", 2));

    wait_for(WAIT, || broker.events("events").len() == 2).await;

    assert_eq!(pipeline.metrics().events_processed, 2);
    pipeline.stop().await.unwrap();
}

#[tokio::test(flavor = "multi_thread")]
async fn fatal_connect_error_fails_the_start_call() {
    init_test_tracing();

    let broker = Arc::new(MemoryBroker::new());
    let factory: ConnectorFactory = Box::new(|| {
        Ok(Box::new(FailingConnector::new(ErrorKind::SourceAuthenticationError))
            as BoxedConnector)
    });
    let publisher: BoxedPublisher = broker.clone();
    let pipeline = Pipeline::with_components(
        test_pipeline_config("fatal_open_cdc", "events"),
        factory,
        publisher,
    );

    let err = pipeline.start().await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::SourceAuthenticationError);
    assert_eq!(pipeline.state(), PipelineState::Failed);
    assert!(pipeline.last_error().is_some());
    assert!(broker.events("events").is_empty());
}

#[tokio::test(flavor = "multi_thread")]
async fn stop_during_backoff_parks_the_inflight_event() {
    init_test_tracing();

    let connector = MemoryConnector::new();
    let broker = Arc::new(BlocklistBroker::new(&["orders"]));
    let mut config = test_pipeline_config("interrupted_cdc", "events");
    config.retry.max_retries = 5;
    // Long enough that the stop below always lands inside the backoff.
    config.retry.base_delay_ms = 60_000;
    config.retry.max_delay_ms = 60_000;
    config.retry.enable_dlq = true;
    config.retry.dlq_topic = Some("events_dlq".to_string());
    let pipeline = memory_pipeline(config, connector.clone(), broker.clone());

    pipeline.start().await.unwrap();
    connector.push(insert_change("orders", 1));
    wait_for(WAIT, || connector.pending() == 0).await;

    pipeline.stop().await.unwrap();

    // The in-flight event already left the source, so the interrupted
    // delivery must park it in the failed buffer rather than drop it. It is
    // not exhausted, so it stays off the dead-letter topic.
    let failed = pipeline.failed_events();
    assert_eq!(failed.len(), 1);
    assert_eq!(failed[0].attempt_count, 1);
    assert_eq!(pipeline.metrics().events_failed, 1);
    assert!(broker.inner().events("events").is_empty());
    assert!(broker.inner().events("events_dlq").is_empty());

    // Once the blockage clears, an operator retry delivers it.
    broker.set_blocked(&[]);
    assert!(pipeline.retry_all_failed().await);
    assert_eq!(broker.inner().events("events").len(), 1);
    assert!(pipeline.failed_events().is_empty());
}

#[tokio::test(flavor = "multi_thread")]
async fn transient_connect_failures_are_retried_within_the_budget() {
    init_test_tracing();

    let connector = MemoryConnector::new();
    let flaky = FlakyConnector::new(connector.clone(), 2, 0);
    let broker = Arc::new(MemoryBroker::new());
    let mut config = test_pipeline_config("reconnecting_open_cdc", "events");
    config.reconnect = ReconnectConfig {
        initial_delay_ms: 10,
        max_delay_ms: 50,
        max_total_ms: 5_000,
    };

    let factory: ConnectorFactory =
        Box::new(move || Ok(Box::new(flaky.clone()) as BoxedConnector));
    let publisher: BoxedPublisher = broker.clone();
    let pipeline = Pipeline::with_components(config, factory, publisher);

    // Two injected open failures are absorbed by the reconnect loop before
    // start reports the pipeline running.
    pipeline.start().await.unwrap();
    assert_eq!(pipeline.state(), PipelineState::Running);

    connector.push(insert_change("orders", 1));
    wait_for(WAIT, || broker.events("events").len() == 1).await;

    pipeline.stop().await.unwrap();
}

#[tokio::test(flavor = "multi_thread")]
async fn transient_poll_failures_trigger_a_reconnect_and_resume() {
    init_test_tracing();

    let connector = MemoryConnector::new();
    let flaky = FlakyConnector::new(connector.clone(), 0, 1);
    let broker = Arc::new(MemoryBroker::new());
    let mut config = test_pipeline_config("reconnecting_poll_cdc", "events");
    config.reconnect = ReconnectConfig {
        initial_delay_ms: 10,
        max_delay_ms: 50,
        max_total_ms: 5_000,
    };

    let factory: ConnectorFactory =
        Box::new(move || Ok(Box::new(flaky.clone()) as BoxedConnector));
    let publisher: BoxedPublisher = broker.clone();
    let pipeline = Pipeline::with_components(config, factory, publisher);

    pipeline.start().await.unwrap();
    connector.push(insert_change("orders", 1));

    wait_for(WAIT, || broker.events("events").len() == 1).await;
    assert_eq!(pipeline.state(), PipelineState::Running);
    assert_eq!(pipeline.metrics().events_processed, 1);

    pipeline.stop().await.unwrap();
}

#[tokio::test(flavor = "multi_thread")]
async fn reconnect_budget_exhaustion_fails_the_start() {
    init_test_tracing();

    let connector = MemoryConnector::new();
    let flaky = FlakyConnector::new(connector, u32::MAX, 0);
    let broker = Arc::new(MemoryBroker::new());
    let mut config = test_pipeline_config("budget_cdc", "events");
    config.reconnect = ReconnectConfig {
        initial_delay_ms: 10,
        max_delay_ms: 20,
        max_total_ms: 100,
    };

    let factory: ConnectorFactory =
        Box::new(move || Ok(Box::new(flaky.clone()) as BoxedConnector));
    let publisher: BoxedPublisher = broker.clone();
    let pipeline = Pipeline::with_components(config, factory, publisher);

    let err = pipeline.start().await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::SourceConnectionFailed);
    assert_eq!(pipeline.state(), PipelineState::Failed);
    assert!(pipeline.last_error().is_some());
    assert!(broker.events("events").is_empty());
}

#[tokio::test(flavor = "multi_thread")]
async fn starting_a_running_pipeline_fails() {
    init_test_tracing();

    let connector = MemoryConnector::new();
    let broker = Arc::new(MemoryBroker::new());
    let pipeline = memory_pipeline(
        test_pipeline_config("double_start_cdc", "events"),
        connector,
        broker,
    );

    pipeline.start().await.unwrap();
    assert_eq!(pipeline.state(), PipelineState::Running);

    assert!(pipeline.start().await.is_err());
    assert_eq!(pipeline.state(), PipelineState::Running);

    pipeline.stop().await.unwrap();
}
