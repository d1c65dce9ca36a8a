use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

use async_trait::async_trait;

use crate::cdc_error;
use crate::connector::{MemoryConnector, SourceConnector};
use crate::error::{CdcResult, ErrorKind};
use crate::types::RawChange;

/// A connector whose `open` always fails with the given error kind.
///
/// Used to exercise pipeline start failures without a real source.
#[derive(Debug, Clone)]
pub struct FailingConnector {
    kind: ErrorKind,
}

impl FailingConnector {
    pub fn new(kind: ErrorKind) -> Self {
        Self { kind }
    }
}

/// A connector whose first `open_failures` opens and `poll_failures` polls
/// fail transiently before it starts delegating to a shared
/// [`MemoryConnector`].
///
/// Clones share the failure counters and the inner queue, so the feeding
/// side keeps pushing through its own handle while the pipeline reconnects.
#[derive(Debug, Clone)]
pub struct FlakyConnector {
    inner: MemoryConnector,
    open_failures: Arc<AtomicU32>,
    poll_failures: Arc<AtomicU32>,
}

impl FlakyConnector {
    pub fn new(inner: MemoryConnector, open_failures: u32, poll_failures: u32) -> Self {
        Self {
            inner,
            open_failures: Arc::new(AtomicU32::new(open_failures)),
            poll_failures: Arc::new(AtomicU32::new(poll_failures)),
        }
    }
}

fn take_failure(counter: &AtomicU32) -> bool {
    let remaining = counter.load(Ordering::Relaxed);
    if remaining > 0 {
        counter.store(remaining.saturating_sub(1), Ordering::Relaxed);
        return true;
    }
    false
}

#[async_trait]
impl SourceConnector for FlakyConnector {
    fn name(&self) -> &'static str {
        "flaky"
    }

    async fn open(&mut self) -> CdcResult<()> {
        if take_failure(&self.open_failures) {
            return Err(cdc_error!(
                ErrorKind::SourceConnectionFailed,
                "injected transient open failure"
            ));
        }

        self.inner.open().await
    }

    async fn poll(&mut self) -> CdcResult<Vec<RawChange>> {
        if take_failure(&self.poll_failures) {
            return Err(cdc_error!(
                ErrorKind::SourceIoError,
                "injected transient poll failure"
            ));
        }

        self.inner.poll().await
    }

    async fn snapshot(&mut self) -> CdcResult<Vec<RawChange>> {
        self.inner.snapshot().await
    }

    async fn close(&mut self) -> CdcResult<()> {
        self.inner.close().await
    }

    fn last_sequence(&self) -> u64 {
        self.inner.last_sequence()
    }
}

#[async_trait]
impl SourceConnector for FailingConnector {
    fn name(&self) -> &'static str {
        "failing"
    }

    async fn open(&mut self) -> CdcResult<()> {
        Err(cdc_error!(self.kind, "failing connector refused to open"))
    }

    async fn poll(&mut self) -> CdcResult<Vec<RawChange>> {
        Err(cdc_error!(self.kind, "failing connector polled"))
    }

    async fn close(&mut self) -> CdcResult<()> {
        Ok(())
    }

    fn last_sequence(&self) -> u64 {
        0
    }
}
