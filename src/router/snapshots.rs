//! Per-instance fingerprint snapshots
//!
//! Keyed by the address of the record's `Arc` allocation. Each entry holds a
//! `Weak` to its owner, which keeps the allocation (and so the key) from being
//! reused while the entry exists without keeping the record itself alive.

use crate::fingerprint::Fingerprint;
use crate::record::Record;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::{Arc, Weak};

/// Field name to fingerprint, as of the most recent observation
pub type Snapshot = HashMap<String, Fingerprint>;

const MIN_PRUNE_AT: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct InstanceKey(usize);

impl InstanceKey {
    fn of(record: &Arc<dyn Record>) -> Self {
        Self(Arc::as_ptr(record) as *const () as usize)
    }
}

struct Entry {
    owner: Weak<dyn Record>,
    snapshot: Snapshot,
}

struct Table {
    entries: HashMap<InstanceKey, Entry>,
    prune_at: usize,
}

pub(crate) struct Snapshots {
    table: Mutex<Table>,
}

impl Default for Snapshots {
    fn default() -> Self {
        Self {
            table: Mutex::new(Table {
                entries: HashMap::new(),
                prune_at: MIN_PRUNE_AT,
            }),
        }
    }
}

impl Snapshots {
    pub(crate) fn get(&self, record: &Arc<dyn Record>) -> Option<Snapshot> {
        self.table
            .lock()
            .entries
            .get(&InstanceKey::of(record))
            .map(|entry| entry.snapshot.clone())
    }

    /// Replace the instance's snapshot in full
    pub(crate) fn replace(&self, record: &Arc<dyn Record>, snapshot: Snapshot) {
        let mut table = self.table.lock();
        table.entries.insert(
            InstanceKey::of(record),
            Entry {
                owner: Arc::downgrade(record),
                snapshot,
            },
        );

        if table.entries.len() >= table.prune_at {
            table.entries.retain(|_, entry| entry.owner.strong_count() > 0);
            table.prune_at = (table.entries.len() * 2).max(MIN_PRUNE_AT);
        }
    }

    /// Number of snapshots whose record is still alive
    pub(crate) fn live(&self) -> usize {
        self.table
            .lock()
            .entries
            .values()
            .filter(|entry| entry.owner.strong_count() > 0)
            .count()
    }

    /// Drop snapshots of records that no longer exist
    pub(crate) fn prune(&self) -> usize {
        let mut table = self.table.lock();
        let before = table.entries.len();
        table.entries.retain(|_, entry| entry.owner.strong_count() > 0);
        before - table.entries.len()
    }
}
