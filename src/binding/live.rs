use super::state::{unwrap_snapshot, BindingState};
use super::{propagate, BindingOptions};
use crate::cache::{Delivery, SubscriptionCache, SubscriptionGuard};
use crate::error::RemoteError;
use crate::reference::{shared_refs_equal, SharedRef, Snapshot};
use crate::signal::{Signal, Stable, WatchGuard};
use std::sync::Arc;

/// A live view of one reference's data, backed by a [`SubscriptionCache`].
///
/// # Examples
///
/// ```
/// use snapcache::binding::{Binding, BindingOptions, Data};
/// use snapcache::memory::MemoryDatabase;
/// use snapcache::{CacheConfig, SharedRef, SubscriptionCache};
/// use std::sync::Arc;
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let db = MemoryDatabase::new();
/// db.set("users/alice", 30);
/// let cache = SubscriptionCache::new(CacheConfig::default()).unwrap();
///
/// let mut binding = Binding::new(cache, BindingOptions::default().with_label("Profile"));
/// let alice: SharedRef<u32> = Arc::new(db.doc("users/alice"));
/// binding.update(Some(alice));
///
/// let state = binding.state();
/// assert!(state.ready);
/// assert_eq!(state.data, Some(Data::Record(30)));
/// # }
/// ```
pub struct Binding<D: Clone + Send + Sync + 'static> {
    cache: SubscriptionCache<D>,
    options: BindingOptions,
    stable: Stable<Option<SharedRef<D>>>,
    requested: Option<SharedRef<D>>,
    state: Signal<BindingState<D>>,
    guard: Option<SubscriptionGuard<D>>,
}

impl<D: Clone + Send + Sync + 'static> Binding<D> {
    /// Create an unbound binding.
    pub fn new(cache: SubscriptionCache<D>, options: BindingOptions) -> Self {
        Self {
            cache,
            options,
            stable: Stable::new(None, |a: &Option<SharedRef<D>>, b: &Option<SharedRef<D>>| {
                shared_refs_equal(a.as_ref(), b.as_ref())
            }),
            requested: None,
            state: Signal::new(BindingState::pending(None)),
            guard: None,
        }
    }

    /// Bind to `reference`, or unbind with `None`.
    ///
    /// Returns `true` if the reference changed and the subscription was
    /// replaced. An equal reference keeps the existing subscription.
    pub fn update(&mut self, reference: Option<SharedRef<D>>) -> bool {
        self.requested = reference.clone();
        if !self.stable.update(reference) {
            return false;
        }
        self.resubscribe();
        true
    }

    fn resubscribe(&mut self) {
        if let Some(mut guard) = self.guard.take() {
            guard.detach();
        }

        let reference = self.stable.get().clone();
        self.state.set(BindingState::pending(reference.clone()));

        let Some(reference) = reference else {
            return;
        };

        let on_data = {
            let state = self.state.clone();
            let reference = reference.clone();
            move |snapshot: Arc<Snapshot<D>>, delivery: Delivery| {
                state.set(BindingState::loaded(
                    reference.clone(),
                    unwrap_snapshot(&snapshot),
                    Some(delivery),
                ));
            }
        };
        let on_error = {
            let state = self.state.clone();
            let reference = reference.clone();
            let sink = self.options.error_sink.clone();
            move |error: RemoteError| {
                state.set(BindingState::failed(reference.clone(), error.clone()));
                propagate(sink.as_ref(), &reference, error);
            }
        };

        self.guard = Some(self.cache.subscribe(
            reference,
            on_data,
            on_error,
            self.options.label.as_deref(),
        ));
    }

    /// Current state for the most recently requested reference.
    ///
    /// If the held state belongs to a superseded reference, a fresh
    /// not-ready state for the requested one is returned instead.
    pub fn state(&self) -> BindingState<D> {
        let state = self.state.get();
        if !shared_refs_equal(self.requested.as_ref(), state.reference.as_ref()) {
            return BindingState::pending(self.requested.clone());
        }
        state
    }

    /// Watch state changes. Runs immediately with the current state.
    pub fn watch<F>(&self, callback: F) -> WatchGuard
    where
        F: Fn(&BindingState<D>) + Send + Sync + 'static,
    {
        self.state.watch(callback)
    }

    /// The stabilized reference currently bound.
    pub fn reference(&self) -> Option<SharedRef<D>> {
        self.stable.get().clone()
    }

    pub fn is_enabled(&self) -> bool {
        self.stable.get().is_some()
    }
}

impl<D: Clone + Send + Sync + 'static> Drop for Binding<D> {
    fn drop(&mut self) {
        if let Some(mut guard) = self.guard.take() {
            guard.detach();
            self.state.set(BindingState::detached(self.stable.get().clone()));
        }
    }
}
