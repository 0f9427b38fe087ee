pub mod counter;
mod error;
pub mod health;
pub mod lease_allocator;
pub mod metric_definitions;
pub mod retry;
pub mod stream;

pub use counter::{CounterObservation, DistributedCounter, MemoryCounter};
pub use error::{is_lost_race, is_retries_exhausted, Error, Result};
pub use health::{Readiness, ReadinessProbe};
pub use lease_allocator::{AllocatorConfig, AllocatorStats, Lease, LeaseAllocator};
pub use retry::{RetryExecutor, RetryPolicy};
pub use stream::IdentifierStream;
