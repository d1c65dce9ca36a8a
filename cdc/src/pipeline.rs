//! A pipeline ties one source connector to one broker topic.
//!
//! The pipeline owns the capture worker's lifecycle and exposes the operator
//! surface: start, stop, status, metrics and the failed-event buffer. All
//! methods take `&self` so a pipeline can be shared behind an [`Arc`] by the
//! registry.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use cdc_config::shared::PipelineConfig;
use serde::Serialize;
use tokio::sync::Mutex as AsyncMutex;
use tokio::sync::oneshot;
use tracing::{info, warn};

use crate::concurrency::{ShutdownTx, create_shutdown_channel};
use crate::connector::{ConnectorFactory, build_connector_factory};
use crate::delivery::EventDelivery;
use crate::error::{CdcError, CdcResult, ErrorKind};
use crate::metrics::{MetricsSnapshot, PipelineMetrics};
use crate::publisher::{BoxedPublisher, build_publisher};
use crate::transform::TransformChain;
use crate::types::{FailedEvent, PipelineId};
use crate::workers::{CaptureWorker, CaptureWorkerHandle, Worker, WorkerHandle};
use crate::{bail, cdc_error};

static NEXT_PIPELINE_ID: AtomicU64 = AtomicU64::new(1);

fn next_pipeline_id() -> PipelineId {
    NEXT_PIPELINE_ID.fetch_add(1, Ordering::Relaxed)
}

/// Lifecycle state of a pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineState {
    /// Not running. The initial state, also reached after a clean stop.
    Stopped,
    /// Start was requested; the source connector is being opened.
    Starting,
    /// The capture worker is polling the source.
    Running,
    /// Stop was requested; the worker is draining its current batch.
    Stopping,
    /// The worker died on its own. The terminal error is kept in
    /// `last_error`. A failed pipeline can be started again.
    Failed,
}

impl fmt::Display for PipelineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PipelineState::Stopped => "stopped",
            PipelineState::Starting => "starting",
            PipelineState::Running => "running",
            PipelineState::Stopping => "stopping",
            PipelineState::Failed => "failed",
        };
        write!(f, "{name}")
    }
}

/// Shared status cell written by both the pipeline (lifecycle transitions)
/// and its capture worker (running / failed transitions).
#[derive(Debug)]
pub struct StatusCell {
    inner: Mutex<StatusInner>,
}

#[derive(Debug)]
struct StatusInner {
    state: PipelineState,
    last_error: Option<String>,
}

impl StatusCell {
    fn new() -> Self {
        Self {
            inner: Mutex::new(StatusInner {
                state: PipelineState::Stopped,
                last_error: None,
            }),
        }
    }

    pub fn set(&self, state: PipelineState) {
        self.inner.lock().unwrap().state = state;
    }

    pub fn set_failed(&self, error: &CdcError) {
        let mut inner = self.inner.lock().unwrap();
        inner.state = PipelineState::Failed;
        inner.last_error = Some(error.to_string());
    }

    pub fn state(&self) -> PipelineState {
        self.inner.lock().unwrap().state
    }

    pub fn last_error(&self) -> Option<String> {
        self.inner.lock().unwrap().last_error.clone()
    }

    fn clear_error(&self) {
        self.inner.lock().unwrap().last_error = None;
    }
}

/// Tracks the running worker between start and stop.
#[derive(Default)]
struct Lifecycle {
    shutdown_tx: Option<ShutdownTx>,
    worker: Option<CaptureWorkerHandle>,
}

/// A single change-data-capture pipeline.
pub struct Pipeline {
    id: PipelineId,
    config: PipelineConfig,
    connector_factory: ConnectorFactory,
    publisher: BoxedPublisher,
    metrics: Arc<PipelineMetrics>,
    delivery: Arc<EventDelivery>,
    status: Arc<StatusCell>,
    lifecycle: AsyncMutex<Lifecycle>,
}

impl Pipeline {
    /// Creates a pipeline from its configuration, building the connector and
    /// publisher the configuration names.
    pub fn new(config: PipelineConfig) -> CdcResult<Self> {
        config
            .validate()
            .map_err(|err| cdc_error!(ErrorKind::ConfigError, "invalid pipeline configuration", err))?;

        let connector_factory = build_connector_factory(&config.source);
        let publisher = build_publisher(&config.broker)?;

        Ok(Self::with_components(config, connector_factory, publisher))
    }

    /// Creates a pipeline with externally supplied components.
    ///
    /// The configuration is taken as-is; callers injecting their own
    /// connector factory and publisher are responsible for it being valid.
    pub fn with_components(
        config: PipelineConfig,
        connector_factory: ConnectorFactory,
        publisher: BoxedPublisher,
    ) -> Self {
        let metrics = Arc::new(PipelineMetrics::new());
        let delivery = Arc::new(EventDelivery::new(
            publisher.clone(),
            config.broker.topic.clone(),
            config.retry.clone(),
            metrics.clone(),
        ));

        Self {
            id: next_pipeline_id(),
            config,
            connector_factory,
            publisher,
            metrics,
            delivery,
            status: Arc::new(StatusCell::new()),
            lifecycle: AsyncMutex::new(Lifecycle::default()),
        }
    }

    pub fn id(&self) -> PipelineId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.config.name
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Current lifecycle state.
    pub fn state(&self) -> PipelineState {
        self.status.state()
    }

    /// Whether the pipeline's capture worker is consuming the source.
    pub fn is_running(&self) -> bool {
        self.status.state() == PipelineState::Running
    }

    /// The error that put the pipeline into [`PipelineState::Failed`], if
    /// any. Cleared on the next successful start.
    pub fn last_error(&self) -> Option<String> {
        self.status.last_error()
    }

    /// Snapshot of the pipeline's metrics.
    pub fn metrics(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }

    /// Starts the pipeline's capture worker and waits until it is consuming
    /// the source; a connector that cannot be opened fails the call and
    /// leaves the pipeline in [`PipelineState::Failed`].
    ///
    /// A fresh connector is built on every start, so a stopped or failed
    /// pipeline can be restarted. Starting a pipeline that is already
    /// starting or running is an error; the caller's view of the lifecycle
    /// is stale and should be refreshed.
    pub async fn start(&self) -> CdcResult<()> {
        let mut lifecycle = self.lifecycle.lock().await;

        match self.status.state() {
            PipelineState::Stopped | PipelineState::Failed => {}
            state => {
                bail!(
                    ErrorKind::InvalidState,
                    "pipeline cannot be started",
                    format!("pipeline {} is {state}", self.config.name)
                );
            }
        }

        // A previous run may have failed without an explicit stop; reap its
        // worker handle before starting a new one.
        if let Some(stale) = lifecycle.worker.take() {
            stale.abort();
        }
        lifecycle.shutdown_tx = None;

        self.status.clear_error();
        self.status.set(PipelineState::Starting);
        info!(pipeline = %self.config.name, id = self.id, "starting pipeline");

        let connector = match (self.connector_factory)() {
            Ok(connector) => connector,
            Err(err) => {
                self.status.set_failed(&err);
                return Err(err);
            }
        };

        let (shutdown_tx, shutdown_rx) = create_shutdown_channel();
        let (ready_tx, ready_rx) = oneshot::channel();
        let worker = CaptureWorker::new(
            self.config.name.clone(),
            self.config.source.clone(),
            self.config.reconnect.clone(),
            connector,
            TransformChain::new(self.config.transformations.clone()),
            self.delivery.clone(),
            self.metrics.clone(),
            self.status.clone(),
            shutdown_rx,
            ready_tx,
        );

        let handle = worker.start().await?;

        // Don't report success until the worker has opened the source and
        // begun consuming; a fatal open error fails the start itself.
        match ready_rx.await {
            Ok(Ok(())) => {
                lifecycle.shutdown_tx = Some(shutdown_tx);
                lifecycle.worker = Some(handle);
                Ok(())
            }
            Ok(Err(err)) => {
                let _ = handle.wait().await;
                Err(err)
            }
            Err(_) => {
                let err = match handle.wait().await {
                    Err(err) => err,
                    Ok(()) => cdc_error!(
                        ErrorKind::CaptureWorkerPanic,
                        "capture worker exited before reporting readiness"
                    ),
                };
                self.status.set_failed(&err);
                Err(err)
            }
        }
    }

    /// Stops the pipeline's capture worker and waits for it to drain.
    ///
    /// Idempotent: stopping a pipeline that is not running is a no-op. A
    /// worker that does not exit within the configured stop timeout is
    /// aborted.
    pub async fn stop(&self) -> CdcResult<()> {
        let mut lifecycle = self.lifecycle.lock().await;

        let Some(worker) = lifecycle.worker.take() else {
            return Ok(());
        };
        let shutdown_tx = lifecycle.shutdown_tx.take();

        match self.status.state() {
            PipelineState::Starting | PipelineState::Running => {
                self.status.set(PipelineState::Stopping);
            }
            // The worker already terminated on its own; just reap it.
            _ => {
                let _ = worker.wait().await;
                return Ok(());
            }
        }

        info!(pipeline = %self.config.name, id = self.id, "stopping pipeline");

        if let Some(shutdown_tx) = shutdown_tx {
            let _ = shutdown_tx.shutdown();
        }

        let timeout = self.config.stop_timeout();
        let abort = worker.abort_handle();
        match tokio::time::timeout(timeout, worker.wait()).await {
            Ok(Ok(())) => {}
            Ok(Err(err)) => {
                // The worker errored while we were stopping it. The stop
                // still wins: record the error but land in `Stopped`.
                warn!(
                    pipeline = %self.config.name,
                    error = %err,
                    "capture worker errored during stop"
                );
            }
            Err(_) => {
                abort.abort();
                warn!(
                    pipeline = %self.config.name,
                    timeout_ms = timeout.as_millis() as u64,
                    "capture worker did not stop in time, aborting"
                );
            }
        }

        self.status.set(PipelineState::Stopped);

        Ok(())
    }

    /// Re-attempts delivery of every buffered failed event.
    ///
    /// Usable in any lifecycle state; the publisher outlives the capture
    /// worker. Returns `true` when the buffer is empty afterwards.
    pub async fn retry_all_failed(&self) -> bool {
        self.delivery.retry_all_failed().await
    }

    /// Copy of the buffered failed events.
    pub fn failed_events(&self) -> Vec<FailedEvent> {
        self.delivery.failed_events()
    }

    /// Discards the buffered failed events, returning how many were dropped.
    pub fn clear_failed_events(&self) -> usize {
        self.delivery.clear_failed()
    }

    /// The broker publisher this pipeline delivers to.
    pub fn publisher(&self) -> &BoxedPublisher {
        &self.publisher
    }
}

impl fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pipeline")
            .field("id", &self.id)
            .field("name", &self.config.name)
            .field("state", &self.state())
            .finish()
    }
}
