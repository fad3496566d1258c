//! # Snapcache
//!
//! De-duplicated live snapshot subscriptions for Rust.
//!
//! Many independent consumers often want live updates for the same remote
//! document or query. Snapcache keeps exactly one remote subscription per
//! distinct reference, fans every push out to all interested consumers, and
//! closes the subscription a grace period after the last consumer leaves.
//!
//! ## Cache (core)
//!
//! - `SubscriptionCache<D>` - Registry of shared subscriptions keyed by reference
//! - `SubscriptionGuard<D>` - A consumer's attachment; dropping it detaches
//! - `Reference<D>` - The contract a remote client implements
//!
//! ## Binding (consumer-facing)
//!
//! - `Binding<D>` - Live reactive state for one reference at a time
//! - `FetchOnce<D>` - One-shot fetch with the same stabilization rules
//!
//! ## Support
//!
//! - `schedule::RateLimited` - Throttle / debounce primitive
//! - `signal` - Reactive state cell and stable-value memoization
//! - `memory::MemoryDatabase` - In-memory remote client
//! - `diagnostics::Report` - Debounced overview of the registry, logged with
//!   `tracing` once enabled through [`configure`]

pub mod binding;
pub mod cache;
pub mod config;
pub mod diagnostics;
pub mod error;
pub mod memory;
pub mod reference;
pub mod schedule;
pub mod signal;

// Re-export main types for convenience
pub use binding::{Binding, BindingOptions, BindingState, Data, FetchOnce};
pub use cache::{Delivery, SubscriptionCache, SubscriptionGuard};
pub use config::{configure, diagnostics_enabled, CacheConfig, DiagnosticsOptions};
pub use error::{BindingError, CacheError, RemoteError};
pub use reference::{refs_equal, Record, Reference, SharedRef, Snapshot};

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[tokio::test]
    async fn it_works() {
        // Basic smoke test
        let db = memory::MemoryDatabase::new();
        db.set("counters/main", 0);
        let cache = SubscriptionCache::new(CacheConfig::default()).unwrap();
        let mut binding = Binding::new(cache, BindingOptions::default());

        let counter: SharedRef<i32> = Arc::new(db.doc("counters/main"));
        binding.update(Some(counter));
        db.set("counters/main", 42);
        assert_eq!(binding.state().data, Some(Data::Record(42)));
    }
}
