/// One record of a snapshot: its identifier and payload.
#[derive(Debug, Clone, PartialEq)]
pub struct Record<D> {
    pub id: String,
    pub data: D,
}

impl<D> Record<D> {
    pub fn new(id: impl Into<String>, data: D) -> Self {
        Self {
            id: id.into(),
            data,
        }
    }
}

/// Contents delivered by a remote reference.
#[derive(Debug, Clone, PartialEq)]
pub enum Snapshot<D> {
    /// A single record.
    Document(Record<D>),
    /// The records matched by a collection or query, in remote order.
    Collection(Vec<Record<D>>),
}

impl<D> Snapshot<D> {
    /// Whether this snapshot holds multiple records.
    pub fn is_collection(&self) -> bool {
        matches!(self, Self::Collection(_))
    }

    /// Iterate over the records in this snapshot.
    pub fn records(&self) -> impl Iterator<Item = &Record<D>> {
        let records: &[Record<D>] = match self {
            Self::Document(record) => std::slice::from_ref(record),
            Self::Collection(records) => records,
        };
        records.iter()
    }

    /// Number of records in this snapshot.
    pub fn len(&self) -> usize {
        match self {
            Self::Document(_) => 1,
            Self::Collection(records) => records.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
