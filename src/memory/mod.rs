//! In-memory remote client.
//!
//! [`MemoryDatabase`] stores records by slash-separated path and pushes
//! snapshots to open subscriptions whenever a record changes. It implements
//! the same [`Reference`](crate::Reference) contract a network client would,
//! which makes it the backing store for tests, benchmarks and demos.
//!
//! Pushes happen synchronously inside the mutating call, including the
//! initial snapshot delivered from [`subscribe`](crate::Reference::subscribe).
//!
//! ```
//! use snapcache::memory::MemoryDatabase;
//! use snapcache::Reference;
//!
//! let db = MemoryDatabase::new();
//! db.set("users/alice", 1);
//! let alice = db.doc("users/alice");
//! assert_eq!(alice.id(), Some("alice"));
//! ```

mod refs;

pub use refs::{CollectionRef, DocumentRef};

use crate::error::RemoteError;
use crate::reference::{ErrorCallback, Record, Snapshot, SnapshotCallback};
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Target {
    Document(String),
    Collection(String),
}

impl Target {
    fn path(&self) -> &str {
        match self {
            Self::Document(path) | Self::Collection(path) => path,
        }
    }

    fn is_affected_by(&self, changed: &str) -> bool {
        match self {
            Self::Document(path) => path == changed,
            Self::Collection(path) => parent_of(changed) == Some(path.as_str()),
        }
    }
}

struct Watcher<D> {
    id: u64,
    target: Target,
    on_data: SnapshotCallback<D>,
    on_error: ErrorCallback,
}

enum Push<D> {
    Data(SnapshotCallback<D>, Arc<Snapshot<D>>),
    Error(ErrorCallback, RemoteError),
}

impl<D> Push<D> {
    fn deliver(self) {
        match self {
            Self::Data(callback, snapshot) => callback(snapshot),
            Self::Error(callback, error) => callback(error),
        }
    }
}

struct State<D> {
    records: BTreeMap<String, D>,
    failures: HashMap<String, RemoteError>,
    watchers: Vec<Watcher<D>>,
    next_watcher: u64,
    subscribe_calls: usize,
}

impl<D: Clone> State<D> {
    fn read(&self, target: &Target) -> Result<Snapshot<D>, RemoteError> {
        if let Some(error) = self.failures.get(target.path()) {
            return Err(error.clone());
        }

        match target {
            Target::Document(path) => match self.records.get(path) {
                Some(data) => {
                    let record = Record::new(last_segment(path), data.clone());
                    Ok(Snapshot::Document(record))
                }
                None => Err(RemoteError::new("not-found", format!("no document at {path}"))),
            },
            Target::Collection(path) => Ok(Snapshot::Collection(
                self.records
                    .iter()
                    .filter(|(child, _)| parent_of(child) == Some(path.as_str()))
                    .map(|(child, data)| Record::new(last_segment(child), data.clone()))
                    .collect(),
            )),
        }
    }

    fn push_for(&self, watcher: &Watcher<D>) -> Push<D> {
        match self.read(&watcher.target) {
            Ok(snapshot) => Push::Data(watcher.on_data.clone(), Arc::new(snapshot)),
            Err(error) => Push::Error(watcher.on_error.clone(), error),
        }
    }

    fn pushes_for_change(&self, changed: &str) -> Vec<Push<D>> {
        self.watchers
            .iter()
            .filter(|watcher| watcher.target.is_affected_by(changed))
            .map(|watcher| self.push_for(watcher))
            .collect()
    }
}

/// A shared, in-memory record store with push subscriptions.
pub struct MemoryDatabase<D> {
    state: Arc<Mutex<State<D>>>,
}

impl<D: Clone + Send + Sync + 'static> MemoryDatabase<D> {
    /// Create an empty database.
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(State {
                records: BTreeMap::new(),
                failures: HashMap::new(),
                watchers: Vec::new(),
                next_watcher: 0,
                subscribe_calls: 0,
            })),
        }
    }

    /// Reference to the document at `path`.
    pub fn doc(&self, path: impl Into<String>) -> DocumentRef<D> {
        DocumentRef::new(self.clone(), path.into())
    }

    /// Reference to the collection at `path`.
    pub fn collection(&self, path: impl Into<String>) -> CollectionRef<D> {
        CollectionRef::new(self.clone(), path.into())
    }

    /// Write a document and push the change to affected subscriptions.
    pub fn set(&self, path: impl Into<String>, data: D) {
        let path = path.into();
        let pushes = {
            let mut state = self.state.lock();
            state.records.insert(path.clone(), data);
            state.pushes_for_change(&path)
        };
        pushes.into_iter().for_each(Push::deliver);
    }

    /// Remove a document and push the change to affected subscriptions.
    pub fn delete(&self, path: &str) {
        let pushes = {
            let mut state = self.state.lock();
            if state.records.remove(path).is_none() {
                return;
            }
            state.pushes_for_change(path)
        };
        pushes.into_iter().for_each(Push::deliver);
    }

    /// Make every read of `path` fail with `error` and push it to open
    /// subscriptions on that path.
    pub fn fail(&self, path: impl Into<String>, error: RemoteError) {
        let path = path.into();
        let pushes = {
            let mut state = self.state.lock();
            state.failures.insert(path.clone(), error.clone());
            state
                .watchers
                .iter()
                .filter(|watcher| watcher.target.path() == path)
                .map(|watcher| Push::<D>::Error(watcher.on_error.clone(), error.clone()))
                .collect::<Vec<_>>()
        };
        pushes.into_iter().for_each(Push::deliver);
    }

    /// Stop failing reads of `path`. Open subscriptions are not notified
    /// until the next write.
    pub fn clear_failure(&self, path: &str) {
        self.state.lock().failures.remove(path);
    }

    /// Number of open subscriptions targeting `path`.
    pub fn open_listeners(&self, path: &str) -> usize {
        self.state
            .lock()
            .watchers
            .iter()
            .filter(|watcher| watcher.target.path() == path)
            .count()
    }

    /// Total number of subscriptions ever opened.
    pub fn subscribe_calls(&self) -> usize {
        self.state.lock().subscribe_calls
    }

    pub(crate) fn same_store(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.state, &other.state)
    }

    pub(crate) fn read(&self, target: &Target) -> Result<Snapshot<D>, RemoteError> {
        self.state.lock().read(target)
    }

    pub(crate) fn watch(
        &self,
        target: Target,
        on_data: SnapshotCallback<D>,
        on_error: ErrorCallback,
    ) -> Box<dyn FnOnce() + Send> {
        let (id, initial) = {
            let mut state = self.state.lock();
            state.subscribe_calls += 1;
            let id = state.next_watcher;
            state.next_watcher += 1;
            let watcher = Watcher {
                id,
                target,
                on_data,
                on_error,
            };
            let initial = match &watcher.target {
                Target::Document(path)
                    if !state.records.contains_key(path) && !state.failures.contains_key(path) =>
                {
                    None
                }
                _ => Some(state.push_for(&watcher)),
            };
            state.watchers.push(watcher);
            (id, initial)
        };

        if let Some(push) = initial {
            push.deliver();
        }

        let state = Arc::downgrade(&self.state);
        Box::new(move || {
            if let Some(state) = state.upgrade() {
                state.lock().watchers.retain(|watcher| watcher.id != id);
            }
        })
    }
}

impl<D: Clone + Send + Sync + 'static> Default for MemoryDatabase<D> {
    fn default() -> Self {
        Self::new()
    }
}

impl<D> Clone for MemoryDatabase<D> {
    fn clone(&self) -> Self {
        Self {
            state: Arc::clone(&self.state),
        }
    }
}

fn parent_of(path: &str) -> Option<&str> {
    path.rsplit_once('/').map(|(parent, _)| parent)
}

fn last_segment(path: &str) -> &str {
    path.rsplit_once('/').map_or(path, |(_, id)| id)
}
