use async_trait::async_trait;
use cdc_config::shared::{ConnectorType, SourceConfig};

use crate::connector::memory::MemoryConnector;
use crate::connector::postgres::PostgresConnector;
use crate::error::CdcResult;
use crate::types::RawChange;

/// A source connector owned by a single pipeline worker.
pub type BoxedConnector = Box<dyn SourceConnector>;

/// Factory producing a fresh connector for each pipeline start.
///
/// Connectors are consumed by the worker and closed on its exit path, so a
/// restarted pipeline needs a new instance. Injecting a factory instead of a
/// concrete connector also lets tests supply scripted sources.
pub type ConnectorFactory = Box<dyn Fn() -> CdcResult<BoxedConnector> + Send + Sync>;

/// Trait for systems that capture raw change events from a source database.
///
/// A connector owns a long-lived session or log-reading cursor against the
/// source. It tracks the last acknowledged sequence internally, so a
/// [`SourceConnector::poll`] after a reconnect resumes from where the
/// previous session left off. Delivery downstream is at-least-once; the
/// tail of an interrupted poll may be redelivered.
///
/// Errors returned from any method are classified by
/// [`crate::policy::classify_connect_error`]: transient failures cause the
/// worker to reopen the connector with backoff, fatal failures stop the
/// pipeline.
#[async_trait]
pub trait SourceConnector: Send {
    /// Returns the name of the connector backend, used in logs.
    fn name(&self) -> &'static str;

    /// Opens the capture session against the source.
    async fn open(&mut self) -> CdcResult<()>;

    /// Returns the changes that occurred since the last acknowledged
    /// sequence, in sequence order.
    ///
    /// An empty vector means no new changes; the worker sleeps for the poll
    /// interval before asking again.
    async fn poll(&mut self) -> CdcResult<Vec<RawChange>>;

    /// Produces snapshot changes for the existing content of the monitored
    /// tables. Called once, before streaming, when `snapshot_on_start` is
    /// set. The default implementation produces nothing.
    async fn snapshot(&mut self) -> CdcResult<Vec<RawChange>> {
        Ok(Vec::new())
    }

    /// Closes the capture session, releasing the source-side resources.
    ///
    /// Called on every worker exit path, including error paths.
    async fn close(&mut self) -> CdcResult<()>;

    /// Returns the last sequence number acknowledged by this connector.
    fn last_sequence(&self) -> u64;
}

/// Builds a connector factory for the configured backend.
///
/// The backend is selected here, once, through a closed match on
/// [`ConnectorType`]; the rest of the engine only sees the
/// [`SourceConnector`] interface.
pub fn build_connector_factory(config: &SourceConfig) -> ConnectorFactory {
    let config = config.clone();
    match config.connector {
        ConnectorType::Postgres => Box::new(move || {
            Ok(Box::new(PostgresConnector::new(config.clone())) as BoxedConnector)
        }),
        ConnectorType::Memory => {
            // A fresh memory connector per start keeps restarted pipelines
            // from replaying changes fed to a previous run. Tests that need
            // control over the feed inject their own factory instead.
            Box::new(move || Ok(Box::new(MemoryConnector::new()) as BoxedConnector))
        }
    }
}
