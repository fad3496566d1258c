//! Reference-keyed subscription cache.
//!
//! [`SubscriptionCache`] keeps at most one remote subscription open per
//! distinct [`Reference`](crate::Reference), no matter how many callers ask
//! for it. Every caller is a listener on the shared entry; the entry fans
//! remote pushes out to its listeners in attach order and replays the last
//! snapshot (or error) to listeners that attach later.
//!
//! When the last listener detaches the entry is kept for a grace period, so
//! a consumer that re-subscribes right away (a re-render, a route change)
//! reuses the open subscription instead of closing and reopening it.
//!
//! # Locking
//!
//! The registry sits behind a single mutex. Listener callbacks and remote
//! client calls always run after it is released, so callbacks may subscribe
//! or detach re-entrantly.
//!
//! Every remote outcome gets a per-entry version. Each listener remembers the
//! newest version it was handed and drops anything older, so a replay that
//! loses a race against a live push on another thread is skipped rather than
//! delivered out of order. Deliveries to one listener are serialized, and
//! [`SubscriptionGuard::detach`] waits for one running on another thread
//! before it returns. A callback must therefore not block on another thread
//! that is detaching a listener whose callback is waiting on this one.

mod entry;

pub use entry::{DataListener, Delivery, ErrorListener};

use crate::config::{diagnostics_enabled, CacheConfig};
use crate::diagnostics::{EntrySummary, Report};
use crate::error::{CacheError, RemoteError};
use crate::reference::{refs_equal, ErrorCallback, SharedRef, Snapshot, SnapshotCallback};
use crate::schedule::{require_timers, timer_handle, Mode, RateLimited};
use entry::{CacheEntry, EntryId, Last, Listener, ListenerId};
use parking_lot::Mutex;
use std::sync::{Arc, Weak};
use tokio::runtime::Handle;
use tracing::{debug, trace, warn};

struct Registry<D> {
    entries: Vec<CacheEntry<D>>,
    next_entry: u64,
    next_listener: u64,
}

impl<D: 'static> Registry<D> {
    fn find(&self, reference: &SharedRef<D>) -> Option<usize> {
        self.entries
            .iter()
            .position(|entry| refs_equal(Some(&*entry.reference), Some(&**reference)))
    }

    fn entry_mut(&mut self, id: EntryId) -> Option<&mut CacheEntry<D>> {
        self.entries.iter_mut().find(|entry| entry.id == id)
    }
}

enum Attach<D> {
    Hit(Last<D>, u64),
    Miss,
}

struct Shared<D> {
    config: CacheConfig,
    handle: Handle,
    registry: Mutex<Registry<D>>,
    reporter: RateLimited<()>,
}

impl<D: Send + Sync + 'static> Shared<D> {
    fn open(self: &Arc<Self>, entry_id: EntryId, reference: &SharedRef<D>) {
        let on_data: SnapshotCallback<D> = {
            let shared = Arc::downgrade(self);
            Arc::new(move |snapshot: Arc<Snapshot<D>>| {
                if let Some(shared) = shared.upgrade() {
                    shared.deliver_snapshot(entry_id, snapshot);
                }
            })
        };
        let on_error: ErrorCallback = {
            let shared = Arc::downgrade(self);
            Arc::new(move |error: RemoteError| {
                if let Some(shared) = shared.upgrade() {
                    shared.deliver_error(entry_id, error);
                }
            })
        };

        let unsubscribe = reference.subscribe(on_data, on_error);

        let orphaned = {
            let mut registry = self.registry.lock();
            match registry.entry_mut(entry_id) {
                Some(entry) => {
                    entry.unsubscribe = Some(unsubscribe);
                    None
                }
                // Torn down from inside one of its own callbacks.
                None => Some(unsubscribe),
            }
        };
        if let Some(unsubscribe) = orphaned {
            unsubscribe();
        }
    }

    fn deliver_snapshot(&self, entry_id: EntryId, snapshot: Arc<Snapshot<D>>) {
        let (version, listeners) = {
            let mut registry = self.registry.lock();
            let Some(entry) = registry.entry_mut(entry_id) else {
                return;
            };
            let version = entry.record(Last::Snapshot(Arc::clone(&snapshot)));
            (version, entry.listeners.clone())
        };

        let mut delivered = 0;
        for listener in &listeners {
            if listener.send_snapshot(version, Arc::clone(&snapshot), Delivery::Live) {
                delivered += 1;
            }
        }
        trace!(version, listeners = listeners.len(), delivered, "fanned out snapshot");
    }

    fn deliver_error(&self, entry_id: EntryId, error: RemoteError) {
        let (version, reference, listeners) = {
            let mut registry = self.registry.lock();
            let Some(entry) = registry.entry_mut(entry_id) else {
                return;
            };
            let version = entry.record(Last::Error(error.clone()));
            (version, entry.reference.clone(), entry.listeners.clone())
        };

        warn!(
            path = %reference.path(),
            %error,
            listeners = listeners.len(),
            "remote subscription failed"
        );
        for listener in &listeners {
            listener.send_error(version, error.clone());
        }
    }

    fn detach(self: &Arc<Self>, entry_id: EntryId, listener: ListenerId) {
        self.reporter.call(());

        let removed = {
            let mut registry = self.registry.lock();
            let Some(entry) = registry.entry_mut(entry_id) else {
                return;
            };
            let Some(index) = entry.listeners.iter().position(|l| l.id == listener) else {
                return;
            };
            let removed = entry.listeners.remove(index);
            if entry.listeners.is_empty() {
                self.schedule_teardown(entry);
            }
            entry.check_invariants();
            removed
        };
        // Outside the registry lock: a fan-out on another thread may hold the
        // gate while its callback touches the cache.
        removed.close();
    }

    fn schedule_teardown(self: &Arc<Self>, entry: &mut CacheEntry<D>) {
        entry.cancel_teardown();
        let generation = entry.teardown_generation;
        let entry_id = entry.id;
        let grace = self.config.teardown_grace;
        let shared: Weak<Self> = Arc::downgrade(self);

        debug!(
            path = %entry.reference.path(),
            ?grace,
            "last listener detached, scheduling teardown"
        );
        entry.teardown = Some(self.handle.spawn(async move {
            tokio::time::sleep(grace).await;
            if let Some(shared) = shared.upgrade() {
                shared.teardown(entry_id, generation);
            }
        }));
    }

    fn teardown(&self, entry_id: EntryId, generation: u64) {
        let removed = {
            let mut registry = self.registry.lock();
            let Some(index) = registry.entries.iter().position(|entry| entry.id == entry_id) else {
                return;
            };
            let entry = &registry.entries[index];
            if entry.teardown_generation != generation || !entry.listeners.is_empty() {
                return;
            }
            let mut removed = registry.entries.remove(index);
            // This task is the timer; nothing left to abort.
            removed.teardown = None;
            removed
        };

        debug!(path = %removed.reference.path(), "tearing down subscription");
        // Dropping the entry closes the remote subscription.
        drop(removed);
        self.reporter.call(());
    }

    fn report(&self) -> Report {
        let entries: Vec<(SharedRef<D>, Vec<Option<String>>)> = {
            let registry = self.registry.lock();
            registry
                .entries
                .iter()
                .map(|entry| {
                    let callers = entry.listeners.iter().map(|l| l.label.clone()).collect();
                    (entry.reference.clone(), callers)
                })
                .collect()
        };

        Report::capture(entries.into_iter().map(|(reference, callers)| EntrySummary {
            label: reference.path(),
            callers,
        }))
    }

    fn emit_report(&self) {
        if diagnostics_enabled() {
            self.report().emit();
        }
    }
}

/// A de-duplicating cache of live subscriptions.
///
/// Cloning is cheap and every clone shares the same registry. Timers run on
/// the Tokio runtime the cache was created in; dropping the last clone
/// closes every remaining remote subscription.
///
/// # Examples
///
/// ```
/// use snapcache::memory::MemoryDatabase;
/// use snapcache::{CacheConfig, SharedRef, SubscriptionCache};
/// use std::sync::Arc;
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let db = MemoryDatabase::new();
/// db.set("users/alice", 1);
/// let cache = SubscriptionCache::new(CacheConfig::default()).unwrap();
///
/// let first: SharedRef<i32> = Arc::new(db.doc("users/alice"));
/// let second: SharedRef<i32> = Arc::new(db.doc("users/alice"));
/// let _a = cache.subscribe(first, |_, _| {}, |_| {}, Some("Profile"));
/// let _b = cache.subscribe(second, |_, _| {}, |_| {}, Some("Avatar"));
///
/// assert_eq!(cache.len(), 1);
/// assert_eq!(db.subscribe_calls(), 1);
/// # }
/// ```
pub struct SubscriptionCache<D> {
    shared: Arc<Shared<D>>,
}

impl<D: Send + Sync + 'static> SubscriptionCache<D> {
    /// Create an empty cache using the current Tokio runtime for timers.
    ///
    /// The runtime must have its time driver enabled, otherwise teardown
    /// timers could never fire.
    pub fn new(config: CacheConfig) -> Result<Self, CacheError> {
        let handle = timer_handle()?;
        Ok(Self::build(handle, config))
    }

    /// Create an empty cache scheduling timers on `handle`.
    pub fn with_handle(handle: Handle, config: CacheConfig) -> Result<Self, CacheError> {
        require_timers(&handle)?;
        Ok(Self::build(handle, config))
    }

    fn build(handle: Handle, config: CacheConfig) -> Self {
        let shared = Arc::new_cyclic(|weak: &Weak<Shared<D>>| {
            let weak = weak.clone();
            let reporter = RateLimited::unchecked(
                handle.clone(),
                move |()| {
                    if let Some(shared) = weak.upgrade() {
                        shared.emit_report();
                    }
                },
                config.report_wait,
                Mode::Debounce,
            );
            Shared {
                config,
                handle,
                registry: Mutex::new(Registry {
                    entries: Vec::new(),
                    next_entry: 0,
                    next_listener: 0,
                }),
                reporter,
            }
        });

        Self { shared }
    }

    /// Attach a listener to `reference`, opening a remote subscription only if
    /// no equal reference is already cached.
    ///
    /// If the entry already holds a snapshot it is replayed to `on_data`
    /// (with [`Delivery::Replay`]) before this call returns; a cached error is
    /// replayed to `on_error` the same way. `label` names the caller in
    /// diagnostic reports.
    pub fn subscribe<F, E>(
        &self,
        reference: SharedRef<D>,
        on_data: F,
        on_error: E,
        label: Option<&str>,
    ) -> SubscriptionGuard<D>
    where
        F: Fn(Arc<Snapshot<D>>, Delivery) + Send + Sync + 'static,
        E: Fn(RemoteError) + Send + Sync + 'static,
    {
        self.attach(reference, Arc::new(on_data), Arc::new(on_error), label)
    }

    /// [`subscribe`](Self::subscribe) with pre-shared callbacks.
    pub fn attach(
        &self,
        reference: SharedRef<D>,
        on_data: DataListener<D>,
        on_error: ErrorListener,
        label: Option<&str>,
    ) -> SubscriptionGuard<D> {
        let (entry_id, listener, attach) = {
            let mut registry = self.shared.registry.lock();
            let listener = Listener::new(
                ListenerId(registry.next_listener),
                on_data,
                on_error,
                label.map(str::to_string),
            );
            registry.next_listener += 1;

            match registry.find(&reference) {
                Some(index) => {
                    let entry = &mut registry.entries[index];
                    entry.cancel_teardown();
                    entry.listeners.push(listener.clone());
                    entry.check_invariants();
                    debug!(
                        path = %reference.path(),
                        listeners = entry.listeners.len(),
                        "cache hit"
                    );
                    (entry.id, listener, Attach::Hit(entry.last.clone(), entry.version))
                }
                None => {
                    let entry_id = EntryId(registry.next_entry);
                    registry.next_entry += 1;
                    registry
                        .entries
                        .push(CacheEntry::new(entry_id, reference.clone(), listener.clone()));
                    debug!(path = %reference.path(), "cache miss, opening subscription");
                    (entry_id, listener, Attach::Miss)
                }
            }
        };

        // A push racing in from another thread may already have reached the
        // listener; the gate drops the replay if so.
        match attach {
            Attach::Hit(Last::Error(error), version) => {
                listener.send_error(version, error);
            }
            Attach::Hit(Last::Snapshot(snapshot), version) => {
                listener.send_snapshot(version, snapshot, Delivery::Replay);
            }
            Attach::Hit(Last::Empty, _) => {}
            Attach::Miss => self.shared.open(entry_id, &reference),
        }

        self.shared.reporter.call(());

        SubscriptionGuard {
            shared: Arc::downgrade(&self.shared),
            entry: entry_id,
            listener: listener.id,
            detached: false,
        }
    }

    /// Number of cached entries, including those awaiting teardown.
    pub fn len(&self) -> usize {
        self.shared.registry.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether an entry for `reference` exists.
    pub fn contains(&self, reference: &SharedRef<D>) -> bool {
        self.shared.registry.lock().find(reference).is_some()
    }

    /// Listeners attached to the entry for `reference`, if cached.
    pub fn listener_count(&self, reference: &SharedRef<D>) -> Option<usize> {
        let registry = self.shared.registry.lock();
        registry
            .find(reference)
            .map(|index| registry.entries[index].listeners.len())
    }

    /// Whether the entry for `reference` is waiting out its grace period.
    pub fn is_pending_teardown(&self, reference: &SharedRef<D>) -> bool {
        let registry = self.shared.registry.lock();
        registry
            .find(reference)
            .is_some_and(|index| registry.entries[index].teardown.is_some())
    }

    /// Build a diagnostic report of the current registry without logging it.
    pub fn report(&self) -> Report {
        self.shared.report()
    }

    /// Emit any pending debounced report now.
    pub fn flush_report(&self) -> bool {
        self.shared.reporter.flush()
    }

    pub fn config(&self) -> &CacheConfig {
        &self.shared.config
    }
}

impl<D> Clone for SubscriptionCache<D> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

/// Handle for one listener attached through [`SubscriptionCache::subscribe`].
///
/// Dropping the guard detaches the listener.
#[must_use = "dropping the guard detaches the listener immediately"]
pub struct SubscriptionGuard<D: Send + Sync + 'static> {
    shared: Weak<Shared<D>>,
    entry: EntryId,
    listener: ListenerId,
    detached: bool,
}

impl<D: Send + Sync + 'static> SubscriptionGuard<D> {
    /// Remove this listener from its entry.
    ///
    /// The listener receives nothing after this returns. If it was the last
    /// one, the entry's teardown timer starts. Calling it again is a no-op.
    pub fn detach(&mut self) {
        if std::mem::replace(&mut self.detached, true) {
            return;
        }
        if let Some(shared) = self.shared.upgrade() {
            shared.detach(self.entry, self.listener);
        }
    }

    pub fn is_detached(&self) -> bool {
        self.detached
    }
}

impl<D: Send + Sync + 'static> Drop for SubscriptionGuard<D> {
    fn drop(&mut self) {
        self.detach();
    }
}
