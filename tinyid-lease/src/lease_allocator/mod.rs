//! Lease Allocator
//!
//! Hands out identifiers from a locally held lease, a contiguous range
//! reserved from a [`DistributedCounter`](crate::counter::DistributedCounter)
//! shared with other processes. A lease is replaced the moment it runs out;
//! there is no background refresh.

mod allocator;
mod types;

#[cfg(test)]
mod tests;

pub use allocator::LeaseAllocator;
pub use types::{AllocatorConfig, AllocatorStats, Lease, DEFAULT_RESERVATION_SIZE};
