//! Types for the lease allocator

use crate::{retry::RetryPolicy, Error, Result};

/// Identifiers claimed per refill when not configured otherwise.
pub const DEFAULT_RESERVATION_SIZE: u64 = 100;

/// Configuration for a lease allocator
#[derive(Debug, Clone, PartialEq)]
pub struct AllocatorConfig {
    /// Number of identifiers reserved from the shared counter per refill
    pub reservation_size: u64,

    /// Retry budget and backoff for each refill
    pub retry: RetryPolicy,
}

impl Default for AllocatorConfig {
    fn default() -> Self {
        Self {
            reservation_size: DEFAULT_RESERVATION_SIZE,
            retry: RetryPolicy::default(),
        }
    }
}

impl AllocatorConfig {
    pub fn new(reservation_size: u64) -> Self {
        Self {
            reservation_size,
            ..Default::default()
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.reservation_size == 0 {
            return Err(Error::InvalidConfig(
                "reservation size must be positive".to_owned(),
            ));
        }
        self.retry.validate()
    }
}

/// A locally held range of identifiers, `start` inclusive and `end`
/// exclusive.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Lease {
    pub(super) start: u64,
    pub(super) end: u64,
}

impl Lease {
    /// Lease granted by moving the shared counter from `current` to `target`:
    /// the identifiers `current + 1 ..= target`.
    pub(super) fn reserved(current: u64, target: u64) -> Lease {
        debug_assert!(target > current && target < u64::MAX);
        Lease {
            start: current + 1,
            end: target + 1,
        }
    }

    /// Next identifier this lease will hand out.
    pub fn start(&self) -> u64 {
        self.start
    }

    pub fn end(&self) -> u64 {
        self.end
    }

    pub fn remaining(&self) -> u64 {
        self.end.saturating_sub(self.start)
    }

    pub fn is_exhausted(&self) -> bool {
        self.start >= self.end
    }

    pub(super) fn take(&mut self) -> Option<u64> {
        if self.is_exhausted() {
            return None;
        }
        let id = self.start;
        self.start += 1;
        Some(id)
    }
}

/// Statistics about a lease allocator
#[derive(Debug, Clone, PartialEq)]
pub struct AllocatorStats {
    /// Successful refills since construction
    pub refills: u64,

    /// Identifiers handed out since construction
    pub issued: u64,

    /// Identifiers left in the current lease
    pub remaining: u64,
}
