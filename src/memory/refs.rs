use super::{MemoryDatabase, Target};
use crate::error::RemoteError;
use crate::reference::{ErrorCallback, Reference, Snapshot, SnapshotCallback, Unsubscribe};
use async_trait::async_trait;
use std::any::Any;

/// Reference to a single document in a [`MemoryDatabase`].
pub struct DocumentRef<D> {
    db: MemoryDatabase<D>,
    path: String,
}

impl<D> DocumentRef<D> {
    pub(crate) fn new(db: MemoryDatabase<D>, path: String) -> Self {
        Self { db, path }
    }
}

impl<D> Clone for DocumentRef<D> {
    fn clone(&self) -> Self {
        Self {
            db: self.db.clone(),
            path: self.path.clone(),
        }
    }
}

#[async_trait]
impl<D: Clone + Send + Sync + 'static> Reference<D> for DocumentRef<D> {
    fn id(&self) -> Option<&str> {
        Some(self.path.rsplit_once('/').map_or(self.path.as_str(), |(_, id)| id))
    }

    fn path(&self) -> String {
        self.path.clone()
    }

    fn is_equal(&self, other: &dyn Reference<D>) -> bool {
        other
            .as_any()
            .downcast_ref::<Self>()
            .is_some_and(|other| other.path == self.path && other.db.same_store(&self.db))
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn subscribe(&self, on_data: SnapshotCallback<D>, on_error: ErrorCallback) -> Unsubscribe {
        self.db
            .watch(Target::Document(self.path.clone()), on_data, on_error)
    }

    async fn fetch_once(&self) -> Result<Snapshot<D>, RemoteError> {
        tokio::task::yield_now().await;
        self.db.read(&Target::Document(self.path.clone()))
    }
}

/// Reference to every direct child document of a path in a [`MemoryDatabase`].
pub struct CollectionRef<D> {
    db: MemoryDatabase<D>,
    path: String,
}

impl<D> CollectionRef<D> {
    pub(crate) fn new(db: MemoryDatabase<D>, path: String) -> Self {
        Self { db, path }
    }
}

impl<D> Clone for CollectionRef<D> {
    fn clone(&self) -> Self {
        Self {
            db: self.db.clone(),
            path: self.path.clone(),
        }
    }
}

#[async_trait]
impl<D: Clone + Send + Sync + 'static> Reference<D> for CollectionRef<D> {
    fn id(&self) -> Option<&str> {
        Some(self.path.rsplit_once('/').map_or(self.path.as_str(), |(_, id)| id))
    }

    fn path(&self) -> String {
        self.path.clone()
    }

    fn is_equal(&self, other: &dyn Reference<D>) -> bool {
        other
            .as_any()
            .downcast_ref::<Self>()
            .is_some_and(|other| other.path == self.path && other.db.same_store(&self.db))
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn subscribe(&self, on_data: SnapshotCallback<D>, on_error: ErrorCallback) -> Unsubscribe {
        self.db
            .watch(Target::Collection(self.path.clone()), on_data, on_error)
    }

    async fn fetch_once(&self) -> Result<Snapshot<D>, RemoteError> {
        tokio::task::yield_now().await;
        self.db.read(&Target::Collection(self.path.clone()))
    }
}
