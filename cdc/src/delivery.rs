//! At-least-once event delivery to the broker.
//!
//! [`EventDelivery`] wraps a [`BrokerPublisher`] with the retry policy: a
//! bounded number of exponentially backed-off re-attempts for transient
//! failures, immediate exhaustion for permanent ones, and a dead-letter path
//! for events that could not be delivered at all.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use cdc_config::shared::RetryConfig;
use chrono::Utc;
use tracing::{debug, error, warn};

use crate::concurrency::{ShutdownRx, signaled};
use crate::error::CdcResult;
use crate::metrics::PipelineMetrics;
use crate::policy::{PublishClass, classify_publish_error};
use crate::publisher::BoxedPublisher;
use crate::types::{CdcEvent, FailedEvent};

/// Result of one delivery attempt cycle for a single event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryOutcome {
    /// The event was acknowledged by the broker.
    Published,
    /// All attempts were exhausted; the event went to the failure path.
    Failed,
    /// Shutdown was signaled while backing off; the event was parked in the
    /// failed buffer for a later operator retry.
    Interrupted,
}

/// Publishes events with retries, shared between the capture worker and the
/// operator-facing retry surface.
pub struct EventDelivery {
    publisher: BoxedPublisher,
    topic: String,
    retry: RetryConfig,
    metrics: Arc<PipelineMetrics>,
    failed: Mutex<Vec<FailedEvent>>,
}

impl EventDelivery {
    pub fn new(
        publisher: BoxedPublisher,
        topic: String,
        retry: RetryConfig,
        metrics: Arc<PipelineMetrics>,
    ) -> Self {
        Self {
            publisher,
            topic,
            retry,
            metrics,
            failed: Mutex::new(Vec::new()),
        }
    }

    /// Delivers one event, retrying transient publish failures up to
    /// `max_retries` times with exponential backoff.
    ///
    /// Backoff sleeps race against the shutdown signal so a stopping pipeline
    /// never waits out a full backoff schedule. An event whose backoff was cut
    /// short is moved to the failed buffer; it already left the source, so
    /// dropping it here would lose it for good.
    pub async fn deliver(
        &self,
        event: CdcEvent,
        shutdown: &mut ShutdownRx,
    ) -> CdcResult<DeliveryOutcome> {
        let mut attempt: u32 = 0;

        loop {
            match self.publisher.publish(&self.topic, &event).await {
                Ok(ack) => {
                    self.metrics.record_processed(capture_latency(&event));
                    debug!(
                        event_id = %event.event_id,
                        topic = %ack.topic,
                        attempt,
                        "event published"
                    );
                    return Ok(DeliveryOutcome::Published);
                }
                Err(err) => {
                    let transient = classify_publish_error(&err) == PublishClass::Transient;
                    if !transient || attempt >= self.retry.max_retries {
                        self.exhaust(event, err.to_string(), attempt + 1).await;
                        return Ok(DeliveryOutcome::Failed);
                    }

                    let delay = self.retry.delay_for_attempt(attempt);
                    warn!(
                        event_id = %event.event_id,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "transient publish failure, backing off"
                    );

                    tokio::select! {
                        _ = signaled(shutdown) => {
                            self.buffer_interrupted(event, attempt + 1);
                            return Ok(DeliveryOutcome::Interrupted);
                        }
                        _ = tokio::time::sleep(delay) => {}
                    }

                    attempt += 1;
                }
            }
        }
    }

    /// Parks an event whose backoff was interrupted by shutdown.
    ///
    /// The event still has attempt budget left, so it is buffered regardless
    /// of the dead-letter setting and never published to the DLQ topic.
    fn buffer_interrupted(&self, event: CdcEvent, attempt_count: u32) {
        warn!(
            event_id = %event.event_id,
            table = %event.table,
            attempts = attempt_count,
            "shutdown interrupted delivery, parking event in the failed buffer"
        );

        self.failed.lock().unwrap().push(FailedEvent {
            event,
            last_error: "delivery interrupted by shutdown".to_string(),
            attempt_count,
            first_failed_at: Utc::now(),
        });
        self.metrics.record_failed();
    }

    /// Moves an exhausted event onto the failure path.
    ///
    /// `events_failed` is incremented exactly once per event entering the
    /// failure path. With the dead-letter queue enabled the event is also
    /// published to the DLQ topic on a best-effort basis and buffered for
    /// later retry; without it the event is dropped after counting.
    async fn exhaust(&self, event: CdcEvent, last_error: String, attempt_count: u32) {
        error!(
            event_id = %event.event_id,
            table = %event.table,
            attempts = attempt_count,
            error = %last_error,
            "event delivery exhausted"
        );

        if self.retry.enable_dlq {
            if let Some(dlq_topic) = &self.retry.dlq_topic {
                if let Err(err) = self.publisher.publish(dlq_topic, &event).await {
                    warn!(
                        event_id = %event.event_id,
                        dlq_topic = %dlq_topic,
                        error = %err,
                        "failed to publish to dead-letter topic"
                    );
                }
            }

            let failed = FailedEvent {
                event,
                last_error,
                attempt_count,
                first_failed_at: Utc::now(),
            };
            self.failed.lock().unwrap().push(failed);
        }

        // Counted last so an observer seeing the counter also sees the
        // buffered event.
        self.metrics.record_failed();
    }

    /// Runs the publish schedule for one event without shutdown awareness:
    /// an operator-triggered retry is bounded by the backoff cap and does
    /// not belong to any worker. Returns the number of attempts made.
    async fn publish_with_retries(&self, event: &CdcEvent) -> (u32, CdcResult<()>) {
        let mut attempt: u32 = 0;

        loop {
            match self.publisher.publish(&self.topic, event).await {
                Ok(_) => return (attempt + 1, Ok(())),
                Err(err) => {
                    let transient = classify_publish_error(&err) == PublishClass::Transient;
                    if !transient || attempt >= self.retry.max_retries {
                        return (attempt + 1, Err(err));
                    }

                    tokio::time::sleep(self.retry.delay_for_attempt(attempt)).await;
                    attempt += 1;
                }
            }
        }
    }

    /// Re-attempts every buffered failed event in arrival order, each with a
    /// fresh attempt budget.
    ///
    /// Successes count toward `events_processed`; failures are put back with
    /// an updated error and attempt count, without touching `events_failed`
    /// again. Returns `true` when the buffer is empty afterwards.
    pub async fn retry_all_failed(&self) -> bool {
        let pending = std::mem::take(&mut *self.failed.lock().unwrap());
        if pending.is_empty() {
            return true;
        }

        let mut still_failed = Vec::new();
        for mut failed in pending {
            match self.publish_with_retries(&failed.event).await {
                (_, Ok(())) => {
                    self.metrics.record_processed(capture_latency(&failed.event));
                    debug!(event_id = %failed.event.event_id, "failed event redelivered");
                }
                (attempts, Err(err)) => {
                    failed.last_error = err.to_string();
                    failed.attempt_count = attempts;
                    still_failed.push(failed);
                }
            }
        }

        let all_delivered = still_failed.is_empty();
        if !all_delivered {
            let mut buffer = self.failed.lock().unwrap();
            // Exhaustions that raced the retry keep their position after the
            // re-queued ones.
            let raced = std::mem::take(&mut *buffer);
            still_failed.extend(raced);
            *buffer = still_failed;
        }

        all_delivered
    }

    /// Returns a copy of the buffered failed events.
    pub fn failed_events(&self) -> Vec<FailedEvent> {
        self.failed.lock().unwrap().clone()
    }

    /// Drops all buffered failed events, returning how many were discarded.
    pub fn clear_failed(&self) -> usize {
        let mut buffer = self.failed.lock().unwrap();
        let discarded = buffer.len();
        buffer.clear();
        discarded
    }
}

fn capture_latency(event: &CdcEvent) -> Duration {
    (Utc::now() - event.captured_at)
        .to_std()
        .unwrap_or_default()
}
