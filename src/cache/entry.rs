use crate::error::RemoteError;
use crate::reference::{SharedRef, Snapshot, Unsubscribe};
use parking_lot::{ReentrantMutex, ReentrantMutexGuard};
use std::cell::Cell;
use std::sync::Arc;
use tokio::task::JoinHandle;

/// Callback receiving snapshots for one listener.
pub type DataListener<D> = Arc<dyn Fn(Arc<Snapshot<D>>, Delivery) + Send + Sync>;

/// Callback receiving remote errors for one listener.
pub type ErrorListener = Arc<dyn Fn(RemoteError) + Send + Sync>;

/// How a snapshot reached a listener.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    /// Pushed by the remote client.
    Live,
    /// Replayed synchronously from the cache while attaching.
    Replay,
}

impl Delivery {
    pub fn is_replay(self) -> bool {
        self == Self::Replay
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) struct EntryId(pub(crate) u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) struct ListenerId(pub(crate) u64);

/// Per-listener delivery state.
///
/// Held for the duration of every callback, so deliveries to one listener
/// never overlap across threads and `close` waits for an in-flight one.
/// Reentrant because callbacks may detach or resubscribe on the same thread.
struct Gate {
    open: Cell<bool>,
    // Version of the newest outcome handed to this listener.
    seen: Cell<u64>,
}

/// One consumer's interest in an entry.
pub(crate) struct Listener<D> {
    pub(crate) id: ListenerId,
    pub(crate) on_data: DataListener<D>,
    pub(crate) on_error: ErrorListener,
    pub(crate) label: Option<String>,
    gate: Arc<ReentrantMutex<Gate>>,
}

impl<D> Listener<D> {
    pub(crate) fn new(
        id: ListenerId,
        on_data: DataListener<D>,
        on_error: ErrorListener,
        label: Option<String>,
    ) -> Self {
        Self {
            id,
            on_data,
            on_error,
            label,
            gate: Arc::new(ReentrantMutex::new(Gate {
                open: Cell::new(true),
                seen: Cell::new(0),
            })),
        }
    }

    fn admit(&self, version: u64) -> Option<ReentrantMutexGuard<'_, Gate>> {
        let gate = self.gate.lock();
        if !gate.open.get() || gate.seen.get() >= version {
            return None;
        }
        gate.seen.set(version);
        Some(gate)
    }

    /// Hand `snapshot` to the listener unless it is closed or already saw a
    /// newer outcome.
    pub(crate) fn send_snapshot(
        &self,
        version: u64,
        snapshot: Arc<Snapshot<D>>,
        delivery: Delivery,
    ) -> bool {
        match self.admit(version) {
            Some(_gate) => {
                (self.on_data)(snapshot, delivery);
                true
            }
            None => false,
        }
    }

    pub(crate) fn send_error(&self, version: u64, error: RemoteError) -> bool {
        match self.admit(version) {
            Some(_gate) => {
                (self.on_error)(error);
                true
            }
            None => false,
        }
    }

    /// Stop all further deliveries, waiting for one running on another thread.
    pub(crate) fn close(&self) {
        self.gate.lock().open.set(false);
    }
}

impl<D> Clone for Listener<D> {
    fn clone(&self) -> Self {
        Self {
            id: self.id,
            on_data: Arc::clone(&self.on_data),
            on_error: Arc::clone(&self.on_error),
            label: self.label.clone(),
            gate: Arc::clone(&self.gate),
        }
    }
}

/// Most recent outcome of the remote subscription.
pub(crate) enum Last<D> {
    Empty,
    Snapshot(Arc<Snapshot<D>>),
    Error(RemoteError),
}

impl<D> Clone for Last<D> {
    fn clone(&self) -> Self {
        match self {
            Self::Empty => Self::Empty,
            Self::Snapshot(snapshot) => Self::Snapshot(Arc::clone(snapshot)),
            Self::Error(error) => Self::Error(error.clone()),
        }
    }
}

pub(crate) struct CacheEntry<D> {
    pub(crate) id: EntryId,
    pub(crate) reference: SharedRef<D>,
    pub(crate) listeners: Vec<Listener<D>>,
    pub(crate) last: Last<D>,
    // Bumped for every remote outcome; orders replays against live pushes.
    pub(crate) version: u64,
    pub(crate) unsubscribe: Option<Unsubscribe>,
    pub(crate) teardown: Option<JoinHandle<()>>,
    // Identifies the current teardown timer; a timer carrying an older value
    // was cancelled and must not tear the entry down.
    pub(crate) teardown_generation: u64,
}

impl<D> CacheEntry<D> {
    pub(crate) fn new(id: EntryId, reference: SharedRef<D>, first: Listener<D>) -> Self {
        Self {
            id,
            reference,
            listeners: vec![first],
            last: Last::Empty,
            version: 0,
            unsubscribe: None,
            teardown: None,
            teardown_generation: 0,
        }
    }

    pub(crate) fn cancel_teardown(&mut self) {
        if let Some(timer) = self.teardown.take() {
            timer.abort();
        }
        self.teardown_generation += 1;
    }

    pub(crate) fn record(&mut self, last: Last<D>) -> u64 {
        self.last = last;
        self.version += 1;
        self.version
    }

    pub(crate) fn check_invariants(&self) {
        debug_assert_eq!(
            self.teardown.is_some(),
            self.listeners.is_empty(),
            "invalid state: teardown timer must be pending exactly when no listeners remain"
        );
    }
}

impl<D> Drop for CacheEntry<D> {
    fn drop(&mut self) {
        if let Some(timer) = self.teardown.take() {
            timer.abort();
        }
        if let Some(unsubscribe) = self.unsubscribe.take() {
            unsubscribe();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reference::Record;
    use parking_lot::Mutex;

    fn listener(seen: &Arc<Mutex<Vec<(u32, Delivery)>>>) -> Listener<u32> {
        let seen = seen.clone();
        Listener::new(
            ListenerId(0),
            Arc::new(move |snapshot: Arc<Snapshot<u32>>, delivery: Delivery| {
                if let Snapshot::Document(record) = &*snapshot {
                    seen.lock().push((record.data, delivery));
                }
            }),
            Arc::new(|_: RemoteError| {}),
            None,
        )
    }

    fn snapshot(value: u32) -> Arc<Snapshot<u32>> {
        Arc::new(Snapshot::Document(Record::new("a", value)))
    }

    #[test]
    fn stale_replay_is_dropped() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let listener = listener(&seen);

        assert!(listener.send_snapshot(2, snapshot(20), Delivery::Live));
        assert!(!listener.send_snapshot(1, snapshot(10), Delivery::Replay));
        assert!(!listener.send_snapshot(2, snapshot(20), Delivery::Live));
        assert!(!listener.send_error(1, RemoteError::new("unavailable", "late")));
        assert!(listener.send_snapshot(3, snapshot(30), Delivery::Live));

        assert_eq!(*seen.lock(), vec![(20, Delivery::Live), (30, Delivery::Live)]);
    }

    #[test]
    fn closed_listener_receives_nothing() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let listener = listener(&seen);
        let copy = listener.clone();

        listener.close();
        assert!(!copy.send_snapshot(1, snapshot(10), Delivery::Replay));
        assert!(seen.lock().is_empty());
    }

    #[test]
    fn callback_may_close_its_own_listener() {
        let slot: Arc<Mutex<Option<Listener<u32>>>> = Arc::new(Mutex::new(None));
        let calls = Arc::new(Mutex::new(0));

        let slot_clone = slot.clone();
        let calls_clone = calls.clone();
        let listener = Listener::new(
            ListenerId(0),
            Arc::new(move |_: Arc<Snapshot<u32>>, _: Delivery| {
                *calls_clone.lock() += 1;
                let me = slot_clone.lock().clone();
                if let Some(me) = me {
                    me.close();
                }
            }),
            Arc::new(|_: RemoteError| {}),
            None,
        );
        *slot.lock() = Some(listener.clone());

        assert!(listener.send_snapshot(1, snapshot(10), Delivery::Live));
        assert!(!listener.send_snapshot(2, snapshot(20), Delivery::Live));
        assert_eq!(*calls.lock(), 1);
        slot.lock().take();
    }
}
