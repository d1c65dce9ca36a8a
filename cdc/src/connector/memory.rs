use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::Utc;
use tracing::info;

use crate::connector::base::SourceConnector;
use crate::error::{CdcResult, ErrorKind};
use crate::types::{EventType, RawChange, RowImage};

#[derive(Debug, Default)]
struct Inner {
    queue: VecDeque<RawChange>,
    snapshot: Vec<RawChange>,
    open: bool,
    last_sequence: u64,
    next_sequence: u64,
}

/// In-process source connector for tests and local runs.
///
/// Changes pushed through a cloned handle are drained in order by the
/// pipeline worker that owns another clone. All handles share the same
/// queue, so the feeding side can keep pushing while the pipeline runs.
#[derive(Debug, Clone, Default)]
pub struct MemoryConnector {
    inner: Arc<Mutex<Inner>>,
}

impl MemoryConnector {
    /// Creates a new empty memory connector.
    pub fn new() -> Self {
        Self::default()
    }

    /// Enqueues a raw change for the pipeline to capture.
    pub fn push(&self, change: RawChange) {
        let mut inner = self.inner.lock().unwrap();
        inner.queue.push_back(change);
    }

    /// Enqueues a change built from its parts, assigning the next sequence
    /// number.
    pub fn push_change(
        &self,
        table: &str,
        op: EventType,
        before: Option<RowImage>,
        after: Option<RowImage>,
    ) -> u64 {
        let mut inner = self.inner.lock().unwrap();
        inner.next_sequence += 1;
        let sequence = inner.next_sequence;
        inner.queue.push_back(RawChange {
            table: table.to_string(),
            op,
            before,
            after,
            captured_at: Utc::now(),
            sequence,
        });
        sequence
    }

    /// Registers rows emitted as snapshot changes when a pipeline starts
    /// with `snapshot_on_start`.
    pub fn add_snapshot_row(&self, table: &str, row: RowImage) {
        let mut inner = self.inner.lock().unwrap();
        inner.next_sequence += 1;
        let sequence = inner.next_sequence;
        inner.snapshot.push(RawChange {
            table: table.to_string(),
            op: EventType::Snapshot,
            before: None,
            after: Some(row),
            captured_at: Utc::now(),
            sequence,
        });
    }

    /// Returns the number of changes still waiting to be polled.
    pub fn pending(&self) -> usize {
        self.inner.lock().unwrap().queue.len()
    }
}

#[async_trait]
impl SourceConnector for MemoryConnector {
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn open(&mut self) -> CdcResult<()> {
        let mut inner = self.inner.lock().unwrap();
        inner.open = true;

        info!("memory connector opened");

        Ok(())
    }

    async fn poll(&mut self) -> CdcResult<Vec<RawChange>> {
        let mut inner = self.inner.lock().unwrap();
        if !inner.open {
            crate::bail!(
                ErrorKind::InvalidState,
                "Memory connector polled before open"
            );
        }

        let changes: Vec<RawChange> = inner.queue.drain(..).collect();
        if let Some(last) = changes.last() {
            inner.last_sequence = last.sequence;
        }

        Ok(changes)
    }

    async fn snapshot(&mut self) -> CdcResult<Vec<RawChange>> {
        let mut inner = self.inner.lock().unwrap();
        let snapshot = std::mem::take(&mut inner.snapshot);
        if let Some(last) = snapshot.last() {
            inner.last_sequence = last.sequence;
        }

        Ok(snapshot)
    }

    async fn close(&mut self) -> CdcResult<()> {
        let mut inner = self.inner.lock().unwrap();
        inner.open = false;

        info!("memory connector closed");

        Ok(())
    }

    fn last_sequence(&self) -> u64 {
        self.inner.lock().unwrap().last_sequence
    }
}
