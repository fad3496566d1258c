//! Remote references and the snapshots they deliver.
//!
//! A [`Reference`] is an opaque handle to a remote document or query. The
//! cache never looks inside one; it only needs to tell whether two handles
//! point at the same resource and to open a subscription on it.

mod snapshot;

pub use snapshot::{Record, Snapshot};

use crate::error::RemoteError;
use async_trait::async_trait;
use std::any::Any;
use std::sync::Arc;

/// Callback receiving every snapshot pushed by a remote subscription.
pub type SnapshotCallback<D> = Arc<dyn Fn(Arc<Snapshot<D>>) + Send + Sync>;

/// Callback receiving errors pushed by a remote subscription.
pub type ErrorCallback = Arc<dyn Fn(RemoteError) + Send + Sync>;

/// Capability that closes a remote subscription.
pub type Unsubscribe = Box<dyn FnOnce() + Send>;

/// Shared, type-erased reference.
pub type SharedRef<D> = Arc<dyn Reference<D>>;

/// A handle to a remote document or query producing data of type `D`.
///
/// Implementations decide what "the same resource" means through
/// [`is_equal`](Reference::is_equal). Callers should compare through
/// [`refs_equal`], which also checks that both handles are of the same
/// concrete kind.
#[async_trait]
pub trait Reference<D>: Send + Sync + 'static {
    /// Identifier of the addressed record, if the reference addresses one.
    fn id(&self) -> Option<&str>;

    /// Human-readable path or query description.
    fn path(&self) -> String;

    /// Structural equality with another reference of the same kind.
    fn is_equal(&self, other: &dyn Reference<D>) -> bool;

    /// Upcast used for kind discrimination and downcasting in `is_equal`.
    fn as_any(&self) -> &dyn Any;

    /// Open a push subscription. The remote client may call `on_data` and
    /// `on_error` any number of times until the returned capability is run.
    fn subscribe(&self, on_data: SnapshotCallback<D>, on_error: ErrorCallback) -> Unsubscribe;

    /// Fetch the current contents once.
    async fn fetch_once(&self) -> Result<Snapshot<D>, RemoteError>;
}

/// Whether two references are of the same concrete kind.
pub fn same_kind<D: 'static>(a: &dyn Reference<D>, b: &dyn Reference<D>) -> bool {
    a.as_any().type_id() == b.as_any().type_id()
}

/// Compare two optional references.
///
/// Two absent references are equal, an absent and a present one are not,
/// and two present references are equal when they share a kind and the
/// reference itself reports equality.
pub fn refs_equal<D: 'static>(
    a: Option<&dyn Reference<D>>,
    b: Option<&dyn Reference<D>>,
) -> bool {
    match (a, b) {
        (None, None) => true,
        (Some(a), Some(b)) => same_kind(a, b) && a.is_equal(b),
        _ => false,
    }
}

/// [`refs_equal`] over shared handles.
pub fn shared_refs_equal<D: 'static>(
    a: Option<&SharedRef<D>>,
    b: Option<&SharedRef<D>>,
) -> bool {
    refs_equal(a.map(|r| &**r), b.map(|r| &**r))
}
