use std::sync::Arc;
use std::time::Instant;

use cdc_config::shared::{ReconnectConfig, SourceConfig};
use rand::Rng;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{Instrument, debug, error, info, info_span, warn};

use crate::concurrency::{ShutdownRx, signaled};
use crate::connector::BoxedConnector;
use crate::delivery::{DeliveryOutcome, EventDelivery};
use crate::error::{CdcResult, ErrorKind};
use crate::metrics::PipelineMetrics;
use crate::pipeline::{PipelineState, StatusCell};
use crate::policy::{ConnectClass, classify_connect_error};
use crate::transform::{Decision, TransformChain};
use crate::types::{CdcEvent, RawChange};
use crate::workers::base::{Worker, WorkerHandle};
use crate::{bail, cdc_error};

/// Outcome of a connect attempt loop.
enum ConnectOutcome {
    Connected,
    Interrupted,
}

/// Whether the worker's main loop should keep running.
enum LoopDecision {
    Continue,
    Stop,
}

/// The worker that drives one pipeline: polls the source connector,
/// runs events through the transformation chain and hands survivors to the
/// delivery layer.
///
/// The worker owns its connector for the lifetime of one pipeline run; a
/// restarted pipeline gets a fresh worker with a fresh connector.
pub struct CaptureWorker {
    pipeline_name: String,
    source: SourceConfig,
    reconnect: ReconnectConfig,
    connector: BoxedConnector,
    transforms: TransformChain,
    delivery: Arc<EventDelivery>,
    metrics: Arc<PipelineMetrics>,
    status: Arc<StatusCell>,
    shutdown_rx: ShutdownRx,
    ready_tx: Option<oneshot::Sender<CdcResult<()>>>,
}

/// Handle onto a running [`CaptureWorker`].
#[derive(Debug)]
pub struct CaptureWorkerHandle {
    handle: JoinHandle<CdcResult<()>>,
}

impl CaptureWorkerHandle {
    /// Returns a handle that can abort the worker's task after `wait` has
    /// consumed this handle.
    pub fn abort_handle(&self) -> tokio::task::AbortHandle {
        self.handle.abort_handle()
    }
}

impl CaptureWorker {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        pipeline_name: String,
        source: SourceConfig,
        reconnect: ReconnectConfig,
        connector: BoxedConnector,
        transforms: TransformChain,
        delivery: Arc<EventDelivery>,
        metrics: Arc<PipelineMetrics>,
        status: Arc<StatusCell>,
        shutdown_rx: ShutdownRx,
        ready_tx: oneshot::Sender<CdcResult<()>>,
    ) -> Self {
        Self {
            pipeline_name,
            source,
            reconnect,
            connector,
            transforms,
            delivery,
            metrics,
            status,
            shutdown_rx,
            ready_tx: Some(ready_tx),
        }
    }

    async fn run(mut self) -> CdcResult<()> {
        // The readiness signal tells the pipeline's start call whether the
        // source was opened; after it, errors surface through the status
        // cell only.
        let ready_tx = self.ready_tx.take();

        match self.connect().await {
            Ok(ConnectOutcome::Connected) => {}
            Ok(ConnectOutcome::Interrupted) => {
                if let Some(tx) = ready_tx {
                    let _ = tx.send(Ok(()));
                }
                return Ok(());
            }
            Err(err) => {
                self.status.set_failed(&err);
                if let Some(tx) = ready_tx {
                    let _ = tx.send(Err(err.clone()));
                }
                return Err(err);
            }
        }

        self.status.set(PipelineState::Running);
        if let Some(tx) = ready_tx {
            let _ = tx.send(Ok(()));
        }
        info!("capture worker running");

        if self.source.snapshot_on_start {
            if let Err(err) = self.run_snapshot().await {
                self.status.set_failed(&err);
                let _ = self.connector.close().await;
                return Err(err);
            }
        }

        let result = self.poll_loop().await;

        if let Err(err) = self.connector.close().await {
            warn!(error = %err, "error closing source connector");
        }

        if let Err(err) = &result {
            self.status.set_failed(err);
        }

        result
    }

    /// Opens the source connector, retrying transient failures with
    /// exponential backoff and jitter until the reconnection budget runs out.
    async fn connect(&mut self) -> CdcResult<ConnectOutcome> {
        let started = Instant::now();
        let mut attempt: u32 = 0;

        loop {
            match self.connector.open().await {
                Ok(()) => {
                    if attempt > 0 {
                        info!(attempt, "source connection re-established");
                    }
                    return Ok(ConnectOutcome::Connected);
                }
                Err(err) => {
                    if classify_connect_error(&err) == ConnectClass::Fatal {
                        return Err(err);
                    }

                    if started.elapsed() >= self.reconnect.max_total() {
                        return Err(cdc_error!(
                            ErrorKind::SourceConnectionFailed,
                            "source reconnection budget exhausted",
                            format!("last error: {err}")
                        ));
                    }

                    let delay = self.backoff_delay(attempt);
                    warn!(
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "source connection failed, retrying"
                    );

                    tokio::select! {
                        _ = signaled(&mut self.shutdown_rx) => {
                            return Ok(ConnectOutcome::Interrupted);
                        }
                        _ = tokio::time::sleep(delay) => {}
                    }

                    attempt += 1;
                }
            }
        }
    }

    /// Exponential backoff with up to 30% jitter to avoid thundering herds
    /// against a recovering source.
    fn backoff_delay(&self, attempt: u32) -> std::time::Duration {
        let exp = attempt.min(31);
        let base_ms = self
            .reconnect
            .initial_delay_ms
            .saturating_mul(1u64 << exp)
            .min(self.reconnect.max_delay_ms) as f64;
        let jitter_factor = rand::thread_rng().r#gen::<f64>() * 0.3;
        std::time::Duration::from_millis((base_ms * (1.0 + jitter_factor)) as u64)
    }

    /// Reads the initial state of the monitored tables and ships every row as
    /// a snapshot event through the regular transform and delivery path.
    async fn run_snapshot(&mut self) -> CdcResult<()> {
        let rows = self.connector.snapshot().await?;
        info!(rows = rows.len(), "initial snapshot captured");

        // A `Stop` here means shutdown raced the snapshot; the poll loop will
        // observe the signal and exit right away.
        self.process_batch(rows).await?;

        Ok(())
    }

    async fn poll_loop(&mut self) -> CdcResult<()> {
        loop {
            let changes = tokio::select! {
                _ = signaled(&mut self.shutdown_rx) => break,
                polled = self.connector.poll() => match polled {
                    Ok(changes) => changes,
                    Err(err) => {
                        match classify_connect_error(&err) {
                            ConnectClass::Fatal => return Err(err),
                            ConnectClass::Transient => {
                                warn!(error = %err, "source poll failed, reconnecting");
                                let _ = self.connector.close().await;
                                match self.connect().await? {
                                    ConnectOutcome::Connected => continue,
                                    ConnectOutcome::Interrupted => break,
                                }
                            }
                        }
                    }
                },
            };

            if changes.is_empty() {
                tokio::select! {
                    _ = signaled(&mut self.shutdown_rx) => break,
                    _ = tokio::time::sleep(self.source.poll_interval()) => {}
                }
                continue;
            }

            if let LoopDecision::Stop = self.process_batch(changes).await? {
                break;
            }
        }

        debug!("capture worker stopping");

        Ok(())
    }

    /// Runs a batch of raw changes through the transformation chain and the
    /// delivery layer, in capture order.
    async fn process_batch(&mut self, changes: Vec<RawChange>) -> CdcResult<LoopDecision> {
        for raw in changes {
            let event = CdcEvent::from_raw(raw);

            let event = match self.transforms.apply(event) {
                Decision::Keep(event) | Decision::KeepModified(event) => event,
                Decision::Drop => {
                    self.metrics.record_filtered();
                    continue;
                }
            };

            match self.delivery.deliver(event, &mut self.shutdown_rx).await? {
                DeliveryOutcome::Published | DeliveryOutcome::Failed => {}
                DeliveryOutcome::Interrupted => return Ok(LoopDecision::Stop),
            }
        }

        Ok(LoopDecision::Continue)
    }
}

impl Worker<CaptureWorkerHandle> for CaptureWorker {
    async fn start(self) -> CdcResult<CaptureWorkerHandle> {
        let span = info_span!("capture_worker", pipeline = %self.pipeline_name);
        let handle = tokio::spawn(self.run().instrument(span));

        Ok(CaptureWorkerHandle { handle })
    }
}

impl WorkerHandle for CaptureWorkerHandle {
    fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    async fn wait(self) -> CdcResult<()> {
        match self.handle.await {
            Ok(result) => result,
            Err(err) if err.is_cancelled() => Ok(()),
            Err(err) => {
                error!(error = %err, "capture worker task panicked");
                bail!(
                    ErrorKind::CaptureWorkerPanic,
                    "capture worker task panicked",
                    err.to_string()
                );
            }
        }
    }

    fn abort(&self) {
        self.handle.abort();
    }
}
