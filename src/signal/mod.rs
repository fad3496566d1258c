//! Reactive state primitives for binding cache entries to consumers.
//!
//! - `Signal<T>` - Shared state cell that notifies watchers when changed
//! - `Stable<T>` - Value that is only replaced when an equality predicate
//!   reports a real difference

mod signal;
mod stable;

pub use signal::{Signal, WatchGuard};
pub use stable::Stable;
