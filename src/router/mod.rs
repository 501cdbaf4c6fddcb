//! Routes record lifecycle events to source groups
//!
//! The router keeps a fingerprint snapshot per record instance, diffs it on
//! every save, and emits one notification per matching [`SourceGroup`] for
//! each created, changed, or deleted source.

mod snapshots;

pub use snapshots::Snapshot;

use crate::config::RouterConfig;
use crate::error::Result;
use crate::fingerprint::Fingerprinter;
use crate::lifecycle::{LifecycleBus, LifecycleEvent, LifecycleReceiver};
use crate::record::{Record, RecordType, SourceFile};
use crate::signals::{DispatchReport, SignalHub, SourceEvent, SourceEventKind, SourceInfo};
use crate::source_group::SourceGroup;
use chrono::Utc;
use parking_lot::RwLock;
use snapshots::Snapshots;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, info};

/// Point-in-time counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RouterStats {
    pub groups: usize,
    pub tracked_instances: usize,
    pub events_dispatched: u64,
    pub subscriber_failures: u64,
}

pub struct SignalRouter {
    config: RouterConfig,
    groups: RwLock<Vec<Arc<SourceGroup>>>,
    snapshots: Snapshots,
    fingerprinter: Box<dyn Fingerprinter>,
    hub: Arc<SignalHub>,
    events_dispatched: AtomicU64,
    subscriber_failures: AtomicU64,
}

impl Default for SignalRouter {
    fn default() -> Self {
        Self::new(RouterConfig::default())
    }
}

impl SignalRouter {
    pub fn new(config: RouterConfig) -> Self {
        let fingerprinter = config.fingerprint.fingerprinter();
        Self::with_fingerprinter(config, fingerprinter)
    }

    pub fn with_fingerprinter(config: RouterConfig, fingerprinter: Box<dyn Fingerprinter>) -> Self {
        Self {
            hub: Arc::new(SignalHub::new()),
            config,
            groups: RwLock::new(Vec::new()),
            snapshots: Snapshots::default(),
            fingerprinter,
            events_dispatched: AtomicU64::new(0),
            subscriber_failures: AtomicU64::new(0),
        }
    }

    /// Share a notification hub with other routers or listeners
    pub fn with_hub(mut self, hub: Arc<SignalHub>) -> Self {
        self.hub = hub;
        self
    }

    pub fn hub(&self) -> &Arc<SignalHub> {
        &self.hub
    }

    pub fn config(&self) -> &RouterConfig {
        &self.config
    }

    /// Subscribe to `bus` under the configured dispatch uid.
    ///
    /// Returns false if that uid is already connected; calling this again never
    /// creates a second subscription.
    pub fn connect(self: &Arc<Self>, bus: &LifecycleBus) -> bool {
        let connected = bus.connect(&self.config.dispatch_uid, self.clone());
        if connected {
            info!(uid = %self.config.dispatch_uid, "source router connected to lifecycle hooks");
        }
        connected
    }

    /// Append a group. Duplicates are kept; each gets its own notifications.
    pub fn register(&self, group: Arc<SourceGroup>) {
        debug!(group = %group, "registering source group");
        self.groups.write().push(group);
    }

    /// Registered groups in registration order
    pub fn groups(&self) -> Vec<Arc<SourceGroup>> {
        self.groups.read().clone()
    }

    pub fn is_tracked(&self, record_type: &RecordType) -> bool {
        self.groups
            .read()
            .iter()
            .any(|g| g.record_type() == record_type)
    }

    /// Current content of every source field on the record's exact type, in
    /// registration order with duplicate fields collapsed
    pub fn relevant_fields(&self, record: &Arc<dyn Record>) -> Vec<(String, Option<SourceFile>)> {
        let record_type = record.record_type();
        let mut names: Vec<String> = Vec::new();
        for group in self.groups.read().iter() {
            if group.record_type() == &record_type
                && !names.iter().any(|n| n == group.field_name())
            {
                names.push(group.field_name().to_string());
            }
        }

        names
            .into_iter()
            .map(|name| {
                let source = record.source(&name);
                (name, source)
            })
            .collect()
    }

    /// Fingerprint the record's source fields and store the result as its
    /// snapshot, replacing any previous one
    pub fn snapshot(&self, record: &Arc<dyn Record>) -> Result<Snapshot> {
        let fields = self.relevant_fields(record);
        self.snapshot_fields(record, &fields)
    }

    /// Snapshot taken at the most recent observation, if any
    pub fn snapshot_of(&self, record: &Arc<dyn Record>) -> Option<Snapshot> {
        self.snapshots.get(record)
    }

    fn snapshot_fields(
        &self,
        record: &Arc<dyn Record>,
        fields: &[(String, Option<SourceFile>)],
    ) -> Result<Snapshot> {
        let mut snapshot = Snapshot::with_capacity(fields.len());
        for (name, source) in fields {
            snapshot.insert(name.clone(), self.fingerprinter.fingerprint(source.as_ref())?);
        }
        self.snapshots.replace(record, snapshot.clone());
        Ok(snapshot)
    }

    /// Run `handler` only for record types with at least one group
    fn tracked<T, F>(&self, record_type: &RecordType, handler: F) -> Result<T>
    where
        T: Default,
        F: FnOnce() -> Result<T>,
    {
        if self.is_tracked(record_type) {
            handler()
        } else {
            Ok(T::default())
        }
    }

    /// Record the baseline for a freshly constructed or loaded instance
    pub fn on_initialized(&self, record: &Arc<dyn Record>) -> Result<()> {
        self.initialized(&record.record_type(), record)
    }

    pub fn on_saved(
        &self,
        record: &Arc<dyn Record>,
        created: bool,
        raw: bool,
    ) -> Result<DispatchReport> {
        self.saved(&record.record_type(), record, created, raw)
    }

    pub fn on_deleted(&self, record: &Arc<dyn Record>) -> Result<DispatchReport> {
        self.deleted(&record.record_type(), record)
    }

    fn initialized(&self, record_type: &RecordType, record: &Arc<dyn Record>) -> Result<()> {
        self.tracked(record_type, || self.snapshot(record).map(|_| ()))
    }

    fn saved(
        &self,
        record_type: &RecordType,
        record: &Arc<dyn Record>,
        created: bool,
        raw: bool,
    ) -> Result<DispatchReport> {
        self.tracked(record_type, || {
            if raw {
                return Ok(DispatchReport::default());
            }

            let old = self.snapshots.get(record).unwrap_or_default();
            let fields = self.relevant_fields(record);
            let new = self.snapshot_fields(record, &fields)?;

            let mut report = DispatchReport::default();
            for (field_name, source) in fields {
                let kind = if created {
                    SourceEventKind::Created
                } else {
                    match old.get(&field_name) {
                        Some(before) if Some(before) == new.get(&field_name) => continue,
                        Some(_) => SourceEventKind::Changed,
                        None => {
                            debug!(
                                record_type = %record_type,
                                field = %field_name,
                                "no baseline fingerprint, treating source as changed"
                            );
                            SourceEventKind::Changed
                        }
                    }
                };
                report.merge(self.dispatch(kind, source, record_type, record, &field_name));
            }
            Ok(report)
        })
    }

    /// The snapshot is left in place; it goes away with the record itself
    fn deleted(
        &self,
        record_type: &RecordType,
        record: &Arc<dyn Record>,
    ) -> Result<DispatchReport> {
        self.tracked(record_type, || {
            let mut report = DispatchReport::default();
            for (field_name, source) in self.relevant_fields(record) {
                report.merge(self.dispatch(
                    SourceEventKind::Deleted,
                    source,
                    record_type,
                    record,
                    &field_name,
                ));
            }
            Ok(report)
        })
    }

    /// Emit one notification per group watching `record_type.field_name`, in
    /// registration order
    pub fn dispatch(
        &self,
        kind: SourceEventKind,
        source: Option<SourceFile>,
        record_type: &RecordType,
        record: &Arc<dyn Record>,
        field_name: &str,
    ) -> DispatchReport {
        let targets: Vec<Arc<SourceGroup>> = self
            .groups
            .read()
            .iter()
            .filter(|g| g.watches(record_type, field_name))
            .cloned()
            .collect();

        let mut report = DispatchReport::default();
        for group in targets {
            debug!(kind = %kind, group = %group, "dispatching source event");
            let event = SourceEvent {
                kind,
                source: source.clone(),
                info: SourceInfo {
                    group,
                    instance: record.clone(),
                    field_name: field_name.to_string(),
                },
                emitted_at: Utc::now(),
            };
            report.merge(self.hub.send(&event));
            self.events_dispatched.fetch_add(1, Ordering::Relaxed);
        }

        self.subscriber_failures
            .fetch_add(report.failed as u64, Ordering::Relaxed);
        report
    }

    pub fn stats(&self) -> RouterStats {
        RouterStats {
            groups: self.groups.read().len(),
            tracked_instances: self.snapshots.live(),
            events_dispatched: self.events_dispatched.load(Ordering::Relaxed),
            subscriber_failures: self.subscriber_failures.load(Ordering::Relaxed),
        }
    }

    /// Forget snapshots of records that have been dropped
    pub fn prune(&self) -> usize {
        self.snapshots.prune()
    }
}

impl LifecycleReceiver for SignalRouter {
    fn receive(
        &self,
        record_type: &RecordType,
        record: &Arc<dyn Record>,
        event: &LifecycleEvent,
    ) -> anyhow::Result<()> {
        match *event {
            LifecycleEvent::Initialized => self.initialized(record_type, record)?,
            LifecycleEvent::Saved { created, raw } => {
                self.saved(record_type, record, created, raw)?;
            }
            LifecycleEvent::Deleted => {
                self.deleted(record_type, record)?;
            }
        }
        Ok(())
    }
}
