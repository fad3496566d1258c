use crate::cache::Delivery;
use crate::error::RemoteError;
use crate::reference::{SharedRef, Snapshot};
use std::collections::BTreeMap;
use std::fmt;

/// Payload exposed to a bound consumer.
#[derive(Debug, Clone, PartialEq)]
pub enum Data<D> {
    /// Contents of a single record.
    Record(D),
    /// Records of a collection keyed by record id.
    Collection(BTreeMap<String, D>),
}

impl<D> Data<D> {
    pub fn as_record(&self) -> Option<&D> {
        match self {
            Self::Record(data) => Some(data),
            Self::Collection(_) => None,
        }
    }

    pub fn as_collection(&self) -> Option<&BTreeMap<String, D>> {
        match self {
            Self::Record(_) => None,
            Self::Collection(records) => Some(records),
        }
    }
}

/// Turn a snapshot into consumer data, keying collection records by id.
pub fn unwrap_snapshot<D: Clone>(snapshot: &Snapshot<D>) -> Data<D> {
    match snapshot {
        Snapshot::Document(record) => Data::Record(record.data.clone()),
        Snapshot::Collection(records) => Data::Collection(
            records
                .iter()
                .map(|record| (record.id.clone(), record.data.clone()))
                .collect(),
        ),
    }
}

/// What a binding currently knows about its reference.
pub struct BindingState<D> {
    /// Latest data, absent until the first snapshot and after an error.
    pub data: Option<Data<D>>,
    /// Latest remote error, absent while data is flowing.
    pub error: Option<RemoteError>,
    /// Whether either data or an error has arrived for `reference`.
    pub ready: bool,
    /// The reference this state belongs to.
    pub reference: Option<SharedRef<D>>,
    /// Id of the addressed record, when known.
    pub id: Option<String>,
    /// How the current data arrived; `None` for one-shot fetches and before
    /// any data.
    pub delivery: Option<Delivery>,
    /// Whether a reference is bound at all.
    pub enabled: bool,
}

impl<D: 'static> BindingState<D> {
    /// Not-ready state for a freshly bound (or absent) reference.
    pub fn pending(reference: Option<SharedRef<D>>) -> Self {
        let id = reference.as_ref().and_then(|r| r.id().map(str::to_string));
        Self {
            data: None,
            error: None,
            ready: false,
            enabled: reference.is_some(),
            reference,
            id,
            delivery: None,
        }
    }

    /// Not-ready state left behind after the consumer detached.
    pub fn detached(reference: Option<SharedRef<D>>) -> Self {
        Self {
            id: None,
            ..Self::pending(reference)
        }
    }

    pub fn loaded(reference: SharedRef<D>, data: Data<D>, delivery: Option<Delivery>) -> Self {
        Self {
            data: Some(data),
            ready: true,
            delivery,
            ..Self::pending(Some(reference))
        }
    }

    pub fn failed(reference: SharedRef<D>, error: RemoteError) -> Self {
        Self {
            error: Some(error),
            ready: true,
            ..Self::pending(Some(reference))
        }
    }

    /// Whether the current data was replayed from the cache rather than
    /// pushed by the remote client.
    pub fn is_immediate(&self) -> bool {
        self.delivery.is_some_and(Delivery::is_replay)
    }
}

impl<D: Clone> Clone for BindingState<D> {
    fn clone(&self) -> Self {
        Self {
            data: self.data.clone(),
            error: self.error.clone(),
            ready: self.ready,
            reference: self.reference.clone(),
            id: self.id.clone(),
            delivery: self.delivery,
            enabled: self.enabled,
        }
    }
}

impl<D: fmt::Debug + 'static> fmt::Debug for BindingState<D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BindingState")
            .field("data", &self.data)
            .field("error", &self.error)
            .field("ready", &self.ready)
            .field("reference", &self.reference.as_ref().map(|r| r.path()))
            .field("id", &self.id)
            .field("delivery", &self.delivery)
            .field("enabled", &self.enabled)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryDatabase;
    use crate::reference::Record;
    use std::sync::Arc;

    #[test]
    fn collection_snapshot_keyed_by_id() {
        let snapshot = Snapshot::Collection(vec![Record::new("b", 2), Record::new("a", 1)]);
        let data = unwrap_snapshot(&snapshot);
        let records = data.as_collection().unwrap();
        assert_eq!(records.get("a"), Some(&1));
        assert_eq!(records.get("b"), Some(&2));
        assert!(data.as_record().is_none());
    }

    #[test]
    fn document_snapshot_unwraps_to_record() {
        let data = unwrap_snapshot(&Snapshot::Document(Record::new("a", 7)));
        assert_eq!(data, Data::Record(7));
    }

    #[test]
    fn absent_reference_state() {
        let state = BindingState::<u32>::pending(None);
        assert!(!state.ready);
        assert!(!state.enabled);
        assert!(state.id.is_none());
        assert!(state.data.is_none() && state.error.is_none());
    }

    #[test]
    fn detached_state_drops_id() {
        let db: MemoryDatabase<u32> = MemoryDatabase::new();
        let alice: SharedRef<u32> = Arc::new(db.doc("users/alice"));

        assert_eq!(BindingState::pending(Some(alice.clone())).id.as_deref(), Some("alice"));
        let detached = BindingState::detached(Some(alice));
        assert!(detached.id.is_none());
        assert!(detached.enabled);
        assert!(!detached.ready);
    }
}
