use std::collections::HashSet;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU32, Ordering};

use async_trait::async_trait;

use crate::cdc_error;
use crate::error::{CdcResult, ErrorKind};
use crate::publisher::{BrokerPublisher, MemoryBroker, PublishAck};
use crate::types::CdcEvent;

/// A broker whose first `failures` publishes fail transiently before it
/// starts delegating to an in-memory broker.
#[derive(Debug)]
pub struct FlakyBroker {
    inner: MemoryBroker,
    failures_remaining: AtomicU32,
}

impl FlakyBroker {
    pub fn new(failures: u32) -> Self {
        Self {
            inner: MemoryBroker::new(),
            failures_remaining: AtomicU32::new(failures),
        }
    }

    /// The in-memory broker events end up in once the failures are used up.
    pub fn inner(&self) -> &MemoryBroker {
        &self.inner
    }
}

#[async_trait]
impl BrokerPublisher for FlakyBroker {
    fn name(&self) -> &'static str {
        "flaky"
    }

    async fn publish(&self, topic: &str, event: &CdcEvent) -> CdcResult<PublishAck> {
        let remaining = self.failures_remaining.load(Ordering::Relaxed);
        if remaining > 0 {
            self.failures_remaining.store(remaining - 1, Ordering::Relaxed);
            return Err(cdc_error!(
                ErrorKind::BrokerUnreachable,
                "injected transient publish failure"
            ));
        }

        self.inner.publish(topic, event).await
    }
}

/// A broker that transiently rejects events from a configurable set of
/// tables and accepts everything else into an in-memory broker.
#[derive(Debug)]
pub struct BlocklistBroker {
    inner: MemoryBroker,
    blocked: Mutex<HashSet<String>>,
}

impl BlocklistBroker {
    pub fn new(blocked: &[&str]) -> Self {
        Self {
            inner: MemoryBroker::new(),
            blocked: Mutex::new(blocked.iter().map(|table| table.to_string()).collect()),
        }
    }

    /// Replaces the set of blocked tables.
    pub fn set_blocked(&self, blocked: &[&str]) {
        *self.blocked.lock().unwrap() = blocked.iter().map(|table| table.to_string()).collect();
    }

    pub fn inner(&self) -> &MemoryBroker {
        &self.inner
    }
}

#[async_trait]
impl BrokerPublisher for BlocklistBroker {
    fn name(&self) -> &'static str {
        "blocklist"
    }

    async fn publish(&self, topic: &str, event: &CdcEvent) -> CdcResult<PublishAck> {
        if self.blocked.lock().unwrap().contains(&event.table) {
            return Err(cdc_error!(
                ErrorKind::BrokerUnreachable,
                "injected publish failure for blocked table",
                event.table.clone()
            ));
        }

        self.inner.publish(topic, event).await
    }
}
