//! Cache configuration and the process-wide diagnostics switch.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

/// Default delay between the last listener detaching and the remote
/// subscription being cancelled.
pub const DEFAULT_TEARDOWN_GRACE: Duration = Duration::from_millis(2000);

/// Default debounce window for diagnostic reports.
pub const DEFAULT_REPORT_WAIT: Duration = Duration::from_millis(500);

static LOG_ENABLED: AtomicBool = AtomicBool::new(false);

/// Configuration for a [`SubscriptionCache`](crate::SubscriptionCache).
///
/// # Examples
///
/// ```
/// use snapcache::CacheConfig;
/// use std::time::Duration;
///
/// let config = CacheConfig::default().with_teardown_grace(Duration::from_secs(5));
/// assert_eq!(config.teardown_grace, Duration::from_secs(5));
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheConfig {
    /// How long an entry with no listeners is kept before its remote
    /// subscription is cancelled.
    pub teardown_grace: Duration,
    /// Debounce window for diagnostic reports.
    pub report_wait: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            teardown_grace: DEFAULT_TEARDOWN_GRACE,
            report_wait: DEFAULT_REPORT_WAIT,
        }
    }
}

impl CacheConfig {
    /// Set the teardown grace period.
    pub fn with_teardown_grace(mut self, grace: Duration) -> Self {
        self.teardown_grace = grace;
        self
    }

    /// Set the diagnostic report debounce window.
    pub fn with_report_wait(mut self, wait: Duration) -> Self {
        self.report_wait = wait;
        self
    }
}

/// Options accepted by [`configure`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DiagnosticsOptions {
    /// Turn diagnostic logging on or off. `None` leaves it unchanged.
    pub log: Option<bool>,
}

/// Apply process-wide diagnostics options.
///
/// ```
/// use snapcache::{configure, diagnostics_enabled, DiagnosticsOptions};
///
/// configure(DiagnosticsOptions { log: Some(true) });
/// assert!(diagnostics_enabled());
/// configure(DiagnosticsOptions { log: Some(false) });
/// ```
pub fn configure(options: DiagnosticsOptions) {
    if let Some(log) = options.log {
        LOG_ENABLED.store(log, Ordering::SeqCst);
    }
}

/// Whether diagnostic reports are currently logged.
pub fn diagnostics_enabled() -> bool {
    LOG_ENABLED.load(Ordering::SeqCst)
}
