//! Record lifecycle hooks
//!
//! [`LifecycleBus`] is an in-process lifecycle source: a record store calls
//! [`LifecycleBus::send`] after materializing, saving, or deleting an
//! instance, and every connected receiver sees the event in connection order.

use crate::error::{Error, Result};
use crate::record::{Record, RecordType};
use parking_lot::RwLock;
use std::sync::Arc;
use tracing::debug;

/// Lifecycle event for one record instance
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleEvent {
    /// Instance was constructed or loaded from storage
    Initialized,
    /// Instance was persisted
    Saved {
        /// First save of a new record
        created: bool,
        /// Stored state replayed without a semantic save (fixture loading)
        raw: bool,
    },
    /// Instance was removed from storage
    Deleted,
}

/// Consumer of lifecycle events
pub trait LifecycleReceiver: Send + Sync {
    fn receive(
        &self,
        record_type: &RecordType,
        record: &Arc<dyn Record>,
        event: &LifecycleEvent,
    ) -> anyhow::Result<()>;
}

struct Connection {
    uid: String,
    receiver: Arc<dyn LifecycleReceiver>,
}

#[derive(Default)]
pub struct LifecycleBus {
    connections: RwLock<Vec<Connection>>,
}

impl LifecycleBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Connect `receiver` under `uid`.
    ///
    /// Returns false, keeping the existing subscription, when `uid` is already
    /// connected.
    pub fn connect(&self, uid: &str, receiver: Arc<dyn LifecycleReceiver>) -> bool {
        let mut connections = self.connections.write();
        if connections.iter().any(|c| c.uid == uid) {
            debug!(uid, "lifecycle receiver already connected");
            return false;
        }
        connections.push(Connection {
            uid: uid.to_string(),
            receiver,
        });
        true
    }

    pub fn disconnect(&self, uid: &str) -> bool {
        let mut connections = self.connections.write();
        let before = connections.len();
        connections.retain(|c| c.uid != uid);
        connections.len() != before
    }

    pub fn is_connected(&self, uid: &str) -> bool {
        self.connections.read().iter().any(|c| c.uid == uid)
    }

    pub fn receiver_count(&self) -> usize {
        self.connections.read().len()
    }

    /// Deliver `event` to every receiver.
    ///
    /// Stops at the first receiver error and returns it to the caller.
    pub fn send(&self, record: &Arc<dyn Record>, event: LifecycleEvent) -> Result<()> {
        let receivers: Vec<(String, Arc<dyn LifecycleReceiver>)> = self
            .connections
            .read()
            .iter()
            .map(|c| (c.uid.clone(), c.receiver.clone()))
            .collect();

        let record_type = record.record_type();
        for (uid, receiver) in receivers {
            receiver
                .receive(&record_type, record, &event)
                .map_err(|source| Error::Receiver { uid, source })?;
        }
        Ok(())
    }

    pub fn initialized(&self, record: &Arc<dyn Record>) -> Result<()> {
        self.send(record, LifecycleEvent::Initialized)
    }

    pub fn saved(&self, record: &Arc<dyn Record>, created: bool) -> Result<()> {
        self.send(record, LifecycleEvent::Saved { created, raw: false })
    }

    /// Save replayed from stored state, e.g. while loading fixtures
    pub fn saved_raw(&self, record: &Arc<dyn Record>, created: bool) -> Result<()> {
        self.send(record, LifecycleEvent::Saved { created, raw: true })
    }

    pub fn deleted(&self, record: &Arc<dyn Record>) -> Result<()> {
        self.send(record, LifecycleEvent::Deleted)
    }
}
