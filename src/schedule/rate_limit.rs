use crate::error::CacheError;
use parking_lot::Mutex;
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;

type Action<A> = Box<dyn Fn(A) + Send + Sync>;

/// How repeated calls inside the wait window are treated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// The first call schedules the action; later calls only replace the
    /// arguments and never push the deadline back.
    Throttle,
    /// Every call cancels the pending timer and starts a fresh one.
    Debounce,
}

struct Pending<A> {
    args: Option<A>,
    timer: Option<JoinHandle<()>>,
    // Bumped whenever the pending timer is replaced, cancelled or flushed, so
    // a timer that already woke up can tell it lost the race.
    generation: u64,
}

struct Inner<A> {
    action: Action<A>,
    wait: Duration,
    mode: Mode,
    handle: Handle,
    pending: Mutex<Pending<A>>,
}

impl<A> Inner<A> {
    fn fire(&self, generation: u64) {
        let args = {
            let mut pending = self.pending.lock();
            if pending.generation != generation || pending.timer.is_none() {
                return;
            }
            pending.timer = None;
            pending.args.take()
        };

        if let Some(args) = args {
            (self.action)(args);
        }
    }
}

impl<A> Drop for Inner<A> {
    fn drop(&mut self) {
        if let Some(timer) = self.pending.get_mut().timer.take() {
            timer.abort();
        }
    }
}

/// A rate-limited wrapper around an action.
///
/// The action always runs with the arguments of the most recent call. Timers
/// run on the Tokio runtime captured at construction; cloning the wrapper
/// shares the same pending timer.
///
/// # Examples
///
/// ```
/// use snapcache::schedule::RateLimited;
/// use std::sync::atomic::{AtomicUsize, Ordering};
/// use std::sync::Arc;
/// use std::time::Duration;
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let last = Arc::new(AtomicUsize::new(0));
/// let seen = last.clone();
/// let limited = RateLimited::debounce(
///     move |n: usize| seen.store(n, Ordering::SeqCst),
///     Duration::from_millis(50),
/// )
/// .unwrap();
///
/// limited.call(1);
/// limited.call(2);
/// assert!(limited.flush());
/// assert_eq!(last.load(Ordering::SeqCst), 2);
/// # }
/// ```
pub struct RateLimited<A> {
    inner: Arc<Inner<A>>,
}

impl<A: Send + 'static> RateLimited<A> {
    /// Wrap `action` using the current Tokio runtime for timers.
    pub fn new<F>(action: F, wait: Duration, mode: Mode) -> Result<Self, CacheError>
    where
        F: Fn(A) + Send + Sync + 'static,
    {
        let handle = super::timer_handle()?;
        Ok(Self::unchecked(handle, action, wait, mode))
    }

    /// Wrap `action`, scheduling timers on `handle`.
    ///
    /// Fails with [`CacheError::TimersDisabled`] if the runtime behind
    /// `handle` has no time driver.
    pub fn with_handle<F>(
        handle: Handle,
        action: F,
        wait: Duration,
        mode: Mode,
    ) -> Result<Self, CacheError>
    where
        F: Fn(A) + Send + Sync + 'static,
    {
        super::require_timers(&handle)?;
        Ok(Self::unchecked(handle, action, wait, mode))
    }

    /// Like [`with_handle`](Self::with_handle) for a handle already known to
    /// have timers.
    pub(crate) fn unchecked<F>(handle: Handle, action: F, wait: Duration, mode: Mode) -> Self
    where
        F: Fn(A) + Send + Sync + 'static,
    {
        Self {
            inner: Arc::new(Inner {
                action: Box::new(action),
                wait,
                mode,
                handle,
                pending: Mutex::new(Pending {
                    args: None,
                    timer: None,
                    generation: 0,
                }),
            }),
        }
    }

    /// Trailing-edge throttle with a fixed wait before the first execution.
    pub fn throttle<F>(action: F, wait: Duration) -> Result<Self, CacheError>
    where
        F: Fn(A) + Send + Sync + 'static,
    {
        Self::new(action, wait, Mode::Throttle)
    }

    /// Debounce: only the last call of a burst runs, `wait` after that call.
    pub fn debounce<F>(action: F, wait: Duration) -> Result<Self, CacheError>
    where
        F: Fn(A) + Send + Sync + 'static,
    {
        Self::new(action, wait, Mode::Debounce)
    }

    /// Request a run of the action with `args`.
    pub fn call(&self, args: A) {
        let mut pending = self.inner.pending.lock();
        pending.args = Some(args);

        if self.inner.mode == Mode::Throttle && pending.timer.is_some() {
            return;
        }

        if let Some(timer) = pending.timer.take() {
            timer.abort();
        }
        pending.generation += 1;

        let generation = pending.generation;
        let wait = self.inner.wait;
        let inner: Weak<Inner<A>> = Arc::downgrade(&self.inner);
        pending.timer = Some(self.inner.handle.spawn(async move {
            tokio::time::sleep(wait).await;
            if let Some(inner) = inner.upgrade() {
                inner.fire(generation);
            }
        }));
    }

    /// Drop any pending run without executing it.
    pub fn cancel(&self) {
        let mut pending = self.inner.pending.lock();
        if let Some(timer) = pending.timer.take() {
            timer.abort();
        }
        pending.args = None;
        pending.generation += 1;
    }

    /// Run a pending action immediately. Returns `false` if nothing was pending.
    pub fn flush(&self) -> bool {
        let args = {
            let mut pending = self.inner.pending.lock();
            let Some(timer) = pending.timer.take() else {
                return false;
            };
            timer.abort();
            pending.generation += 1;
            pending.args.take()
        };

        match args {
            Some(args) => {
                (self.inner.action)(args);
                true
            }
            None => false,
        }
    }

    /// Whether a run is currently scheduled.
    pub fn is_pending(&self) -> bool {
        self.inner.pending.lock().timer.is_some()
    }

    /// The configured wait window.
    pub fn wait(&self) -> Duration {
        self.inner.wait
    }
}

impl<A> Clone for RateLimited<A> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}
