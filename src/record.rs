//! Records, their attachment fields, and the store that enumerates them
//!
//! The router never owns records. Hosts implement [`Record`] for their own
//! types and hand instances over as `Arc<dyn Record>`; the allocation behind
//! that `Arc` is what the router treats as the instance identity.

use parking_lot::RwLock;
use std::borrow::Cow;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Name of a record type. Matching is by exact name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RecordType(Cow<'static, str>);

impl RecordType {
    pub const fn new_static(name: &'static str) -> Self {
        Self(Cow::Borrowed(name))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&'static str> for RecordType {
    fn from(name: &'static str) -> Self {
        Self(Cow::Borrowed(name))
    }
}

impl From<String> for RecordType {
    fn from(name: String) -> Self {
        Self(Cow::Owned(name))
    }
}

impl fmt::Display for RecordType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Content of an attachment field
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SourceFile {
    /// Stored name, relative to the storage root (e.g. `avatars/a.png`)
    pub name: String,
    /// Location on disk the name resolves to
    pub path: PathBuf,
}

impl SourceFile {
    pub fn new(name: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            path: path.into(),
        }
    }

    /// A source whose stored name is also its path
    pub fn from_path(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref();
        Self {
            name: path.to_string_lossy().replace('\\', "/"),
            path: path.to_path_buf(),
        }
    }
}

/// A record instance carrying one or more attachment fields
pub trait Record: Send + Sync {
    fn record_type(&self) -> RecordType;

    /// Current content of `field`, or `None` when nothing is attached
    fn source(&self, field: &str) -> Option<SourceFile>;
}

impl fmt::Debug for dyn Record {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Record")
            .field("type", &self.record_type())
            .field("at", &(self as *const dyn Record as *const ()))
            .finish()
    }
}

/// Enumerates all current records of a type
pub trait RecordStore: Send + Sync {
    fn records(&self, record_type: &RecordType) -> anyhow::Result<Vec<Arc<dyn Record>>>;
}

/// In-process record store
#[derive(Default)]
pub struct MemoryStore {
    records: RwLock<Vec<Arc<dyn Record>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, record: Arc<dyn Record>) {
        self.records.write().push(record);
    }

    /// Remove a record by instance identity, returning whether it was present
    pub fn remove(&self, record: &Arc<dyn Record>) -> bool {
        let mut records = self.records.write();
        let before = records.len();
        records.retain(|r| !Arc::ptr_eq(r, record));
        records.len() != before
    }

    pub fn len(&self) -> usize {
        self.records.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.read().is_empty()
    }
}

impl RecordStore for MemoryStore {
    fn records(&self, record_type: &RecordType) -> anyhow::Result<Vec<Arc<dyn Record>>> {
        Ok(self
            .records
            .read()
            .iter()
            .filter(|r| &r.record_type() == record_type)
            .cloned()
            .collect())
    }
}


#[cfg(test)]
mod tests {
    use super::testing::TestRecord;
    use super::*;

    #[test]
    fn test_record_type_equality_ignores_storage() {
        assert_eq!(RecordType::from("User"), RecordType::from("User".to_string()));
        assert_ne!(RecordType::from("User"), RecordType::from("Profile"));
    }

    #[test]
    fn test_source_file_from_path_normalizes_separators() {
        let source = SourceFile::from_path("avatars\\a.png");
        assert_eq!(source.name, "avatars/a.png");
    }

    #[test]
    fn test_memory_store_filters_by_type() {
        let store = MemoryStore::new();
        store.insert(TestRecord::new("User").with("avatar", "a.png").into_dyn());
        store.insert(TestRecord::new("User").with("avatar", "b.png").into_dyn());
        store.insert(TestRecord::new("Post").with("cover", "c.png").into_dyn());

        let users = store.records(&RecordType::from("User")).unwrap();
        assert_eq!(users.len(), 2);
        assert_eq!(store.len(), 3);
    }

    #[test]
    fn test_memory_store_remove_by_identity() {
        let store = MemoryStore::new();
        let a = TestRecord::new("User").with("avatar", "a.png").into_dyn();
        let twin = TestRecord::new("User").with("avatar", "a.png").into_dyn();
        store.insert(a.clone());

        assert!(!store.remove(&twin));
        assert!(store.remove(&a));
        assert!(store.is_empty());
    }
}
