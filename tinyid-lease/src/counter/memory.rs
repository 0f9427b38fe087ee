use std::{
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
    time::Duration,
};

use tracing::trace;

use super::{CounterObservation, DistributedCounter, UNINITIALIZED};
use crate::Result;

/// In-process shared counter.
///
/// Clones share the same register, so several allocators built over clones
/// of one `MemoryCounter` contend exactly like processes sharing a store
/// node. An optional latency is slept before every operation to widen the
/// window between a read and the following compare-and-set.
#[derive(Debug, Clone, Default)]
pub struct MemoryCounter {
    value: Arc<AtomicU64>,
    latency: Option<Duration>,
}

impl MemoryCounter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start from an already-advanced counter value.
    pub fn starting_at(value: u64) -> Self {
        Self {
            value: Arc::new(AtomicU64::new(value)),
            latency: None,
        }
    }

    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency).filter(|d| !d.is_zero());
        self
    }

    /// Current register value.
    pub fn value(&self) -> u64 {
        self.value.load(Ordering::SeqCst)
    }

    async fn delay(&self) {
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
    }
}

impl DistributedCounter for MemoryCounter {
    const KIND: &'static str = "memory";

    async fn get(&self) -> Result<CounterObservation> {
        self.delay().await;
        let value = self.value.load(Ordering::SeqCst);
        Ok(CounterObservation::success(value, value))
    }

    async fn compare_and_set(&self, expected: u64, new: u64) -> Result<CounterObservation> {
        self.delay().await;
        match self
            .value
            .compare_exchange(expected, new, Ordering::SeqCst, Ordering::SeqCst)
        {
            Ok(prev) => Ok(CounterObservation::success(prev, new)),
            Err(actual) => {
                trace!(expected, actual, "compare_and_set mismatch");
                Ok(CounterObservation::failure(Some(actual), Some(actual)))
            }
        }
    }

    async fn initialize(&self, new: u64) -> Result<bool> {
        self.delay().await;
        Ok(self
            .value
            .compare_exchange(UNINITIALIZED, new, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok())
    }
}
