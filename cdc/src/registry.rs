//! Registry of pipelines, keyed by their ids.
//!
//! The registry is the process-wide operator surface: it creates pipelines
//! from configuration, fans lifecycle commands out to them and aggregates
//! their statuses. Pipelines are held behind [`Arc`] so lookups never block
//! on a running lifecycle operation.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use cdc_config::shared::PipelineConfig;
use serde::Serialize;
use tracing::{error, info};

use crate::connector::ConnectorFactory;
use crate::error::CdcResult;
use crate::metrics::MetricsSnapshot;
use crate::publisher::BoxedPublisher;
use crate::pipeline::{Pipeline, PipelineState};
use crate::types::PipelineId;

/// One row of [`PipelineRegistry::list`].
#[derive(Debug, Clone, Serialize)]
pub struct PipelineSummary {
    pub id: PipelineId,
    pub name: String,
    pub state: PipelineState,
    pub last_error: Option<String>,
}

/// Metrics folded across every registered pipeline.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RegistryMetrics {
    /// Number of registered pipelines, in any state.
    pub total_pipelines: usize,
    /// Number of pipelines currently consuming their source.
    pub active_pipelines: usize,
    /// Events published across all pipelines.
    pub total_events: u64,
    /// Events on the failure path across all pipelines.
    pub total_failed: u64,
    /// Events dropped by transformation chains across all pipelines.
    pub total_filtered: u64,
    /// Sum of the per-pipeline processing rates, in events per second.
    pub aggregate_rate: f64,
}

/// Holds every pipeline of the process.
#[derive(Debug, Default)]
pub struct PipelineRegistry {
    // BTreeMap keeps `list` output in creation order, ids being monotonic.
    pipelines: Mutex<BTreeMap<PipelineId, Arc<Pipeline>>>,
}

impl PipelineRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a pipeline from its configuration and registers it, stopped.
    ///
    /// Returns the id the pipeline is addressed by from here on.
    pub fn create_pipeline(&self, config: PipelineConfig) -> CdcResult<PipelineId> {
        let pipeline = Pipeline::new(config)?;
        Ok(self.add_pipeline(pipeline))
    }

    /// Creates a pipeline with an injected connector factory and publisher
    /// and registers it, stopped.
    pub fn create_pipeline_with(
        &self,
        config: PipelineConfig,
        connector_factory: ConnectorFactory,
        publisher: BoxedPublisher,
    ) -> PipelineId {
        self.add_pipeline(Pipeline::with_components(config, connector_factory, publisher))
    }

    /// Registers an already-built pipeline. Used when components are
    /// injected rather than built from configuration.
    pub fn add_pipeline(&self, pipeline: Pipeline) -> PipelineId {
        let id = pipeline.id();
        info!(id, pipeline = %pipeline.name(), "pipeline registered");
        self.pipelines.lock().unwrap().insert(id, Arc::new(pipeline));
        id
    }

    /// Looks a pipeline up by id.
    pub fn get_pipeline(&self, id: PipelineId) -> Option<Arc<Pipeline>> {
        self.pipelines.lock().unwrap().get(&id).cloned()
    }

    /// Starts the pipeline with the given id.
    ///
    /// Returns `false` when the id is unknown or the start failed; a failed
    /// start leaves the pipeline in [`PipelineState::Failed`] with the error
    /// readable through its `last_error`.
    pub async fn start_pipeline(&self, id: PipelineId) -> bool {
        let Some(pipeline) = self.get_pipeline(id) else {
            return false;
        };

        match pipeline.start().await {
            Ok(()) => true,
            Err(err) => {
                error!(id, pipeline = %pipeline.name(), error = %err, "pipeline start failed");
                false
            }
        }
    }

    /// Stops the pipeline with the given id, waiting for its worker to
    /// drain. Returns `false` only when the id is unknown.
    pub async fn stop_pipeline(&self, id: PipelineId) -> bool {
        let Some(pipeline) = self.get_pipeline(id) else {
            return false;
        };

        match pipeline.stop().await {
            Ok(()) => true,
            Err(err) => {
                error!(id, pipeline = %pipeline.name(), error = %err, "pipeline stop failed");
                false
            }
        }
    }

    /// Removes the pipeline with the given id, stopping it first when it is
    /// running. Returns `false` when the id is unknown.
    pub async fn remove_pipeline(&self, id: PipelineId) -> bool {
        let Some(pipeline) = self.get_pipeline(id) else {
            return false;
        };

        if let Err(err) = pipeline.stop().await {
            error!(id, pipeline = %pipeline.name(), error = %err, "stop before removal failed");
        }

        self.pipelines.lock().unwrap().remove(&id);
        info!(id, pipeline = %pipeline.name(), "pipeline removed");

        true
    }

    /// Ids of every registered pipeline, in creation order.
    pub fn pipeline_ids(&self) -> Vec<PipelineId> {
        self.pipelines.lock().unwrap().keys().copied().collect()
    }

    /// Summaries of every registered pipeline, in creation order.
    pub fn list(&self) -> Vec<PipelineSummary> {
        self.pipelines
            .lock()
            .unwrap()
            .values()
            .map(|pipeline| PipelineSummary {
                id: pipeline.id(),
                name: pipeline.name().to_string(),
                state: pipeline.state(),
                last_error: pipeline.last_error(),
            })
            .collect()
    }

    /// Metrics snapshot for one pipeline, `None` when the id is unknown.
    pub fn pipeline_metrics(&self, id: PipelineId) -> Option<MetricsSnapshot> {
        self.get_pipeline(id).map(|pipeline| pipeline.metrics())
    }

    /// Folds the per-pipeline metrics into one process-wide summary.
    pub fn aggregate_metrics(&self) -> RegistryMetrics {
        let pipelines: Vec<_> = self.pipelines.lock().unwrap().values().cloned().collect();

        let mut metrics = RegistryMetrics {
            total_pipelines: pipelines.len(),
            active_pipelines: 0,
            total_events: 0,
            total_failed: 0,
            total_filtered: 0,
            aggregate_rate: 0.0,
        };

        for pipeline in pipelines {
            if pipeline.is_running() {
                metrics.active_pipelines += 1;
            }

            let snapshot = pipeline.metrics();
            metrics.total_events += snapshot.events_processed;
            metrics.total_failed += snapshot.events_failed;
            metrics.total_filtered += snapshot.events_filtered;
            metrics.aggregate_rate += snapshot.processing_rate;
        }

        metrics
    }

    /// Re-attempts delivery of the failed events of one pipeline.
    ///
    /// `None` when the id is unknown, otherwise whether the failed-event
    /// buffer is empty after the retries.
    pub async fn retry_failed_events(&self, id: PipelineId) -> Option<bool> {
        let pipeline = self.get_pipeline(id)?;
        Some(pipeline.retry_all_failed().await)
    }

    /// Discards the failed events of one pipeline. `None` when the id is
    /// unknown, otherwise how many events were dropped.
    pub fn clear_failed_events(&self, id: PipelineId) -> Option<usize> {
        self.get_pipeline(id)
            .map(|pipeline| pipeline.clear_failed_events())
    }

    /// Stops every registered pipeline. Used at process shutdown.
    pub async fn stop_all(&self) {
        let pipelines: Vec<_> = self.pipelines.lock().unwrap().values().cloned().collect();
        for pipeline in pipelines {
            if let Err(err) = pipeline.stop().await {
                error!(pipeline = %pipeline.name(), error = %err, "pipeline stop failed");
            }
        }
    }
}
