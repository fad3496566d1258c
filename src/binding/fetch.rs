use super::state::{unwrap_snapshot, BindingState};
use super::{propagate, BindingOptions};
use crate::error::CacheError;
use crate::reference::{shared_refs_equal, SharedRef};
use crate::signal::{Signal, Stable, WatchGuard};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;

/// One-shot variant of [`Binding`](super::Binding).
///
/// Each distinct reference is fetched exactly once through
/// [`Reference::fetch_once`](crate::Reference::fetch_once). Nothing is
/// cached and no subscription is opened. A result that arrives after the
/// reference changed is discarded.
pub struct FetchOnce<D: Clone + Send + Sync + 'static> {
    handle: Handle,
    options: BindingOptions,
    stable: Stable<Option<SharedRef<D>>>,
    requested: Option<SharedRef<D>>,
    state: Signal<BindingState<D>>,
    generation: Arc<AtomicU64>,
    task: Option<JoinHandle<()>>,
}

impl<D: Clone + Send + Sync + 'static> FetchOnce<D> {
    /// Create an unbound fetcher using the current Tokio runtime.
    pub fn new(options: BindingOptions) -> Result<Self, CacheError> {
        let handle = Handle::try_current().map_err(|_| CacheError::NoRuntime)?;
        Ok(Self::with_handle(handle, options))
    }

    pub fn with_handle(handle: Handle, options: BindingOptions) -> Self {
        Self {
            handle,
            options,
            stable: Stable::new(None, |a: &Option<SharedRef<D>>, b: &Option<SharedRef<D>>| {
                shared_refs_equal(a.as_ref(), b.as_ref())
            }),
            requested: None,
            state: Signal::new(BindingState::pending(None)),
            generation: Arc::new(AtomicU64::new(0)),
            task: None,
        }
    }

    /// Fetch `reference` if it differs from the last one. Returns `true` if a
    /// new fetch was started or the binding was cleared.
    pub fn update(&mut self, reference: Option<SharedRef<D>>) -> bool {
        self.requested = reference.clone();
        if !self.stable.update(reference) {
            return false;
        }

        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        if let Some(task) = self.task.take() {
            task.abort();
        }

        let reference = self.stable.get().clone();
        self.state.set(BindingState::pending(reference.clone()));
        let Some(reference) = reference else {
            return true;
        };

        let state = self.state.clone();
        let current = Arc::clone(&self.generation);
        let sink = self.options.error_sink.clone();
        self.task = Some(self.handle.spawn(async move {
            let result = reference.fetch_once().await;
            if current.load(Ordering::SeqCst) != generation {
                return;
            }
            match result {
                Ok(snapshot) => state.set(BindingState::loaded(
                    reference,
                    unwrap_snapshot(&snapshot),
                    None,
                )),
                Err(error) => {
                    state.set(BindingState::failed(reference.clone(), error.clone()));
                    propagate(sink.as_ref(), &reference, error);
                }
            }
        }));
        true
    }

    /// Current state for the most recently requested reference.
    pub fn state(&self) -> BindingState<D> {
        let state = self.state.get();
        if !shared_refs_equal(self.requested.as_ref(), state.reference.as_ref()) {
            return BindingState::pending(self.requested.clone());
        }
        state
    }

    pub fn watch<F>(&self, callback: F) -> WatchGuard
    where
        F: Fn(&BindingState<D>) + Send + Sync + 'static,
    {
        self.state.watch(callback)
    }
}

impl<D: Clone + Send + Sync + 'static> Drop for FetchOnce<D> {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}
