//! Shared counter contract
//!
//! A [`DistributedCounter`] is a linearizable integer register living in a
//! coordination store, shared by every process that allocates identifiers
//! from it. The value 0 is the sentinel for a counter no process has claimed
//! a range from yet.

mod memory;

use std::future::Future;

use crate::Result;

pub use memory::MemoryCounter;

/// Counter value before any range has been reserved.
pub const UNINITIALIZED: u64 = 0;

/// Outcome of one read or compare-and-set against the shared counter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CounterObservation {
    pub succeeded: bool,
    pub pre_value: Option<u64>,
    pub post_value: Option<u64>,
}

impl CounterObservation {
    pub fn success(pre_value: u64, post_value: u64) -> Self {
        Self {
            succeeded: true,
            pre_value: Some(pre_value),
            post_value: Some(post_value),
        }
    }

    pub fn failure(pre_value: Option<u64>, post_value: Option<u64>) -> Self {
        Self {
            succeeded: false,
            pre_value,
            post_value,
        }
    }
}

pub trait DistributedCounter: Send + Sync {
    /// Backend kind, reported as the `kind` metrics label.
    const KIND: &'static str;

    /// Read the current value. An observation with `succeeded == false`
    /// means the read could not be linearized against the store.
    fn get(&self) -> impl Future<Output = Result<CounterObservation>> + Send;

    /// Set the value to `new` only if it currently equals `expected`.
    /// Reports failure without mutating the store otherwise.
    fn compare_and_set(
        &self,
        expected: u64,
        new: u64,
    ) -> impl Future<Output = Result<CounterObservation>> + Send;

    /// Set the value to `new` only if the counter is still at
    /// [`UNINITIALIZED`].
    fn initialize(&self, new: u64) -> impl Future<Output = Result<bool>> + Send;
}
