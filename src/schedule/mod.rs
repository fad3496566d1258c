//! Time-based call coalescing.
//!
//! [`RateLimited`] wraps an action so bursts of calls collapse into a single
//! delayed execution, either as a trailing-edge throttle or a debounce.

mod rate_limit;

pub use rate_limit::{Mode, RateLimited};

use crate::error::CacheError;
use std::time::Duration;
use tokio::runtime::Handle;

/// The current runtime, provided its time driver is enabled.
pub(crate) fn timer_handle() -> Result<Handle, CacheError> {
    let handle = Handle::try_current().map_err(|_| CacheError::NoRuntime)?;
    require_timers(&handle)?;
    Ok(handle)
}

/// Fails unless `handle`'s runtime was built with `enable_time`.
///
/// Tokio reports a missing time driver only by panicking when a timer is
/// created, so the check creates one and catches that panic. Without it a
/// timer task would panic later and its teardown would silently never run.
pub(crate) fn require_timers(handle: &Handle) -> Result<(), CacheError> {
    let _enter = handle.enter();
    std::panic::catch_unwind(|| drop(tokio::time::sleep(Duration::ZERO)))
        .map_err(|_| CacheError::TimersDisabled)
}
