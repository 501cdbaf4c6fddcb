//! Source groups: a record type plus the attachment field treated as a source
//!
//! Groups do no event handling of their own. Construction registers the group
//! with a [`SignalRouter`], which watches lifecycle events for every group and
//! notifies on its behalf.

use crate::error::{Error, Result};
use crate::record::{Record, RecordStore, RecordType, SourceFile};
use crate::router::SignalRouter;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

static NEXT_GROUP_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique group identity. Two groups watching the same field have
/// different ids.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct GroupId(u64);

impl fmt::Display for GroupId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug)]
pub struct SourceGroup {
    id: GroupId,
    record_type: RecordType,
    field_name: String,
}

impl SourceGroup {
    /// Create a group and register it with `router`
    pub fn new(
        router: &SignalRouter,
        record_type: impl Into<RecordType>,
        field_name: impl Into<String>,
    ) -> Arc<Self> {
        let group = Arc::new(Self::detached(record_type.into(), field_name));
        router.register(group.clone());
        group
    }

    pub(crate) fn detached(record_type: RecordType, field_name: impl Into<String>) -> Self {
        Self {
            id: GroupId(NEXT_GROUP_ID.fetch_add(1, Ordering::Relaxed)),
            record_type,
            field_name: field_name.into(),
        }
    }

    pub fn id(&self) -> GroupId {
        self.id
    }

    pub fn record_type(&self) -> &RecordType {
        &self.record_type
    }

    pub fn field_name(&self) -> &str {
        &self.field_name
    }

    pub(crate) fn watches(&self, record_type: &RecordType, field_name: &str) -> bool {
        &self.record_type == record_type && self.field_name == field_name
    }

    /// Current source of every existing record of this group's type.
    ///
    /// The store is queried when this is called; fields are read as the
    /// iterator advances. Call again to start over.
    pub fn sources(&self, store: &dyn RecordStore) -> Result<Sources> {
        let records = store.records(&self.record_type).map_err(Error::Store)?;
        Ok(Sources {
            records: records.into_iter(),
            field_name: self.field_name.clone(),
        })
    }
}

impl fmt::Display for SourceGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{} {}", self.record_type, self.field_name, self.id)
    }
}

/// One entry yielded by [`SourceGroup::sources`]
#[derive(Debug, Clone)]
pub struct SourceEntry {
    pub source: Option<SourceFile>,
    pub instance: Arc<dyn Record>,
}

pub struct Sources {
    records: std::vec::IntoIter<Arc<dyn Record>>,
    field_name: String,
}

impl Iterator for Sources {
    type Item = SourceEntry;

    fn next(&mut self) -> Option<Self::Item> {
        let instance = self.records.next()?;
        Some(SourceEntry {
            source: instance.source(&self.field_name),
            instance,
        })
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.records.size_hint()
    }
}

impl ExactSizeIterator for Sources {}
