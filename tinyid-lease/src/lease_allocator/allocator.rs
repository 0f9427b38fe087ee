//! Core lease allocator functionality

use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

use metrics::{counter, histogram};
use tokio::{sync::Mutex, time::Instant};
use tracing::{debug, error, warn};

use crate::{
    counter::{DistributedCounter, UNINITIALIZED},
    metric_definitions::{
        ACTION, ACTION_GET_VALUE, ACTION_REFILL, ACTION_SET_VALUE, ID_STREAM_FAILURE,
        ID_STREAM_REFILL_DURATION, KIND,
    },
    retry::RetryExecutor,
    Error, Result,
};

use super::types::*;

/// Inner state for the LeaseAllocator
#[derive(Default)]
struct Inner {
    /// Range currently being served
    lease: Lease,

    /// Successful refills
    refills: u64,

    /// Identifiers handed out
    issued: u64,
}

/// Serves unique, increasing identifiers from ranges reserved on a shared
/// counter.
///
/// The allocator's lock is held for the whole of [`next_id`](Self::next_id),
/// including any refill against the store and its backoff delays, so no two
/// local callers can observe the same lease position. Ranges handed to
/// different allocators are kept disjoint by the counter's compare-and-set.
pub struct LeaseAllocator<C: DistributedCounter> {
    counter: Arc<C>,
    reservation_size: u64,
    retry: RetryExecutor,

    /// Set after the first successful refill and never cleared
    ready: AtomicBool,

    inner: Mutex<Inner>,
}

impl<C: DistributedCounter> LeaseAllocator<C> {
    /// Create an allocator over `counter`. No range is reserved until the
    /// first identifier is requested, or [`prime`](Self::prime) is called.
    pub fn new(counter: Arc<C>, config: AllocatorConfig) -> Result<Self> {
        config.validate()?;
        let retry = RetryExecutor::new(config.retry)?;
        Ok(Self {
            counter,
            reservation_size: config.reservation_size,
            retry,
            ready: AtomicBool::new(false),
            inner: Mutex::new(Inner::default()),
        })
    }

    /// Get the next identifier, reserving a new range first if the current
    /// one is used up.
    pub async fn next_id(&self) -> Result<u64> {
        let mut inner = self.inner.lock().await;
        loop {
            if let Some(id) = inner.lease.take() {
                inner.issued += 1;
                return Ok(id);
            }
            self.refill(&mut inner).await?;
        }
    }

    /// Reserve the first range now rather than on the first request.
    pub async fn prime(&self) -> Result<()> {
        let mut inner = self.inner.lock().await;
        if inner.lease.is_exhausted() {
            self.refill(&mut inner).await?;
        }
        Ok(())
    }

    /// Whether a range has ever been reserved successfully.
    pub fn is_ready(&self) -> bool {
        self.ready.load(Ordering::Acquire)
    }

    pub fn reservation_size(&self) -> u64 {
        self.reservation_size
    }

    pub async fn lease(&self) -> Lease {
        self.inner.lock().await.lease
    }

    pub async fn stats(&self) -> AllocatorStats {
        let inner = self.inner.lock().await;
        AllocatorStats {
            refills: inner.refills,
            issued: inner.issued,
            remaining: inner.lease.remaining(),
        }
    }

    #[tracing::instrument(skip_all, fields(kind = C::KIND))]
    async fn refill(&self, inner: &mut Inner) -> Result<()> {
        let started = Instant::now();
        let result = self.retry.execute(|attempt| self.reserve(attempt)).await;
        histogram!(ID_STREAM_REFILL_DURATION, KIND => C::KIND, ACTION => ACTION_REFILL)
            .record(started.elapsed().as_secs_f64());

        match result {
            Ok(lease) => {
                debug!(start = lease.start, end = lease.end, "reserved identifier range");
                inner.lease = lease;
                inner.refills += 1;
                self.ready.store(true, Ordering::Release);
                Ok(())
            }
            Err(err) => {
                self.record_failure(ACTION_REFILL);
                error!(%err, "unable to reserve identifier range");
                Err(err)
            }
        }
    }

    /// One reservation attempt: read the counter, then claim the next
    /// `reservation_size` values past it.
    async fn reserve(&self, attempt: u32) -> std::result::Result<Lease, backoff::Error<Error>> {
        let observation = match self.counter.get().await {
            Ok(observation) if observation.succeeded => observation,
            Ok(_) => {
                self.record_failure(ACTION_GET_VALUE);
                warn!(attempt, "counter read did not succeed");
                return Err(backoff::Error::transient(Error::ReadFailed));
            }
            Err(err) => {
                self.record_failure(ACTION_GET_VALUE);
                warn!(attempt, %err, "reading counter");
                return Err(classify(err));
            }
        };

        let current = observation.pre_value.unwrap_or(UNINITIALIZED);
        let target = current
            .checked_add(self.reservation_size)
            .filter(|target| *target < u64::MAX)
            .ok_or(backoff::Error::permanent(Error::Overflow {
                value: current,
                reservation: self.reservation_size,
            }))?;

        // The store's post-value is not trusted; the lease is derived from
        // what was read and what was written.
        let claimed = if current == UNINITIALIZED {
            self.counter.initialize(target).await
        } else {
            self.counter
                .compare_and_set(current, target)
                .await
                .map(|observation| observation.succeeded)
        };

        match claimed {
            Ok(true) => Ok(Lease::reserved(current, target)),
            Ok(false) => {
                self.record_failure(ACTION_SET_VALUE);
                debug!(attempt, current, target, "lost reservation race");
                Err(backoff::Error::transient(Error::LostRace { expected: current }))
            }
            Err(err) => {
                self.record_failure(ACTION_SET_VALUE);
                warn!(attempt, current, target, %err, "updating counter");
                Err(classify(err))
            }
        }
    }

    fn record_failure(&self, action: &'static str) {
        counter!(ID_STREAM_FAILURE, KIND => C::KIND, ACTION => action).increment(1);
    }
}

fn classify(err: Error) -> backoff::Error<Error> {
    if err.is_transient() {
        backoff::Error::transient(err)
    } else {
        backoff::Error::permanent(err)
    }
}
