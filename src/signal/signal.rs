use parking_lot::{Mutex, RwLock};
use std::sync::{Arc, Weak};

type Watcher<T> = Arc<dyn Fn(&T) + Send + Sync>;

struct Watchers<T> {
    next_id: u64,
    list: Vec<(u64, Watcher<T>)>,
}

/// A reactive state cell that holds a value and notifies watchers when changed.
///
/// Clones share the same value and watcher list.
///
/// # Examples
///
/// ```
/// use snapcache::signal::Signal;
/// use std::sync::atomic::{AtomicUsize, Ordering};
/// use std::sync::Arc;
///
/// let count = Signal::new(0);
/// let seen = Arc::new(AtomicUsize::new(0));
/// let seen_clone = seen.clone();
///
/// let _guard = count.watch(move |value| seen_clone.store(*value, Ordering::SeqCst));
/// count.set(42);
/// assert_eq!(seen.load(Ordering::SeqCst), 42);
/// ```
pub struct Signal<T> {
    value: Arc<RwLock<T>>,
    watchers: Arc<Mutex<Watchers<T>>>,
}

impl<T: Clone + Send + Sync + 'static> Signal<T> {
    /// Create a new signal with the given initial value.
    pub fn new(initial: T) -> Self {
        Self {
            value: Arc::new(RwLock::new(initial)),
            watchers: Arc::new(Mutex::new(Watchers {
                next_id: 0,
                list: Vec::new(),
            })),
        }
    }

    /// Get the current value of the signal.
    pub fn get(&self) -> T {
        self.value.read().clone()
    }

    /// Set a new value for the signal.
    pub fn set(&self, new_value: T) {
        *self.value.write() = new_value;
        self.notify();
    }

    /// Update the value using a function.
    pub fn update(&self, f: impl FnOnce(&mut T)) {
        {
            let mut value = self.value.write();
            f(&mut value);
        }
        self.notify();
    }

    /// Read the value with a function without cloning.
    pub fn with<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        f(&self.value.read())
    }

    /// Watch this signal for changes.
    ///
    /// The callback runs immediately with the current value and again after
    /// every `set` or `update` until the guard is dropped.
    pub fn watch<F>(&self, callback: F) -> WatchGuard
    where
        F: Fn(&T) + Send + Sync + 'static,
    {
        let callback: Watcher<T> = Arc::new(callback);
        let id = {
            let mut watchers = self.watchers.lock();
            let id = watchers.next_id;
            watchers.next_id += 1;
            watchers.list.push((id, Arc::clone(&callback)));
            id
        };

        callback(&self.get());

        let watchers: Weak<Mutex<Watchers<T>>> = Arc::downgrade(&self.watchers);
        WatchGuard {
            remove: Some(Box::new(move || {
                if let Some(watchers) = watchers.upgrade() {
                    watchers.lock().list.retain(|(watcher, _)| *watcher != id);
                }
            })),
        }
    }

    /// Number of active watchers.
    pub fn watcher_count(&self) -> usize {
        self.watchers.lock().list.len()
    }

    // Watchers run on a snapshot of the value with no locks held, so they may
    // read or write the signal themselves.
    fn notify(&self) {
        let watchers: Vec<Watcher<T>> = self
            .watchers
            .lock()
            .list
            .iter()
            .map(|(_, watcher)| Arc::clone(watcher))
            .collect();
        if watchers.is_empty() {
            return;
        }

        let value = self.get();
        for watcher in watchers {
            watcher(&value);
        }
    }
}

impl<T> Clone for Signal<T> {
    fn clone(&self) -> Self {
        Self {
            value: Arc::clone(&self.value),
            watchers: Arc::clone(&self.watchers),
        }
    }
}

/// RAII guard for signal watchers.
#[must_use = "dropping the guard stops the watcher"]
pub struct WatchGuard {
    remove: Option<Box<dyn FnOnce() + Send>>,
}

impl Drop for WatchGuard {
    fn drop(&mut self) {
        if let Some(remove) = self.remove.take() {
            remove();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn get_set_update() {
        let signal = Signal::new(1);
        signal.set(2);
        assert_eq!(signal.get(), 2);
        signal.update(|n| *n += 10);
        assert_eq!(signal.with(|n| *n * 2), 24);
    }

    #[test]
    fn watch_runs_immediately_and_on_change() {
        let signal = Signal::new(0);
        let calls = Arc::new(AtomicUsize::new(0));
        let calls_clone = calls.clone();

        let guard = signal.watch(move |_| {
            calls_clone.fetch_add(1, Ordering::SeqCst);
        });
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        signal.set(5);
        assert_eq!(calls.load(Ordering::SeqCst), 2);

        drop(guard);
        signal.set(6);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(signal.watcher_count(), 0);
    }

    #[test]
    fn watcher_may_write_back() {
        let signal = Signal::new(0);
        let writer = signal.clone();
        let _guard = signal.watch(move |value| {
            if *value == 1 {
                writer.set(2);
            }
        });

        signal.set(1);
        assert_eq!(signal.get(), 2);
    }
}
