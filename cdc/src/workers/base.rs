use std::future::Future;

use crate::error::CdcResult;

/// A worker that runs on its own task until completion or shutdown.
///
/// Starting a worker consumes it and yields a handle that can be awaited for
/// the worker's terminal result.
pub trait Worker<H>: Send
where
    H: WorkerHandle,
{
    /// Starts the worker, returning a handle to it.
    fn start(self) -> impl Future<Output = CdcResult<H>> + Send;
}

/// A handle onto a running worker.
pub trait WorkerHandle {
    /// Returns whether the worker's task has terminated.
    fn is_finished(&self) -> bool;

    /// Waits for the worker to finish and returns its terminal result.
    ///
    /// A worker that exits because shutdown was signaled finishes with
    /// `Ok(())`; an error is returned only when the worker died on its own.
    fn wait(self) -> impl Future<Output = CdcResult<()>> + Send;

    /// Aborts the worker's task without waiting for cooperative shutdown.
    fn abort(&self);
}
