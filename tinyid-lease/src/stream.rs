use std::future::Future;

use crate::{counter::DistributedCounter, lease_allocator::LeaseAllocator, Result};

/// A source of unique identifiers.
///
/// Callers depend on this capability rather than on a particular backing
/// store, so another allocator can be substituted without touching them.
pub trait IdentifierStream: Send + Sync {
    type Id: Send;

    /// Produce the next identifier, or fail without producing one.
    fn next(&self) -> impl Future<Output = Result<Self::Id>> + Send;

    /// Whether the stream has ever been able to produce identifiers.
    fn ready(&self) -> bool;
}

impl<C: DistributedCounter> IdentifierStream for LeaseAllocator<C> {
    type Id = String;

    async fn next(&self) -> Result<String> {
        self.next_id().await.map(|id| id.to_string())
    }

    fn ready(&self) -> bool {
        self.is_ready()
    }
}
