//! Source notifications emitted to cache-invalidation listeners

use crate::record::{Record, SourceFile};
use crate::source_group::SourceGroup;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::warn;

/// What happened to a source
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SourceEventKind {
    Created,
    Changed,
    Deleted,
}

impl fmt::Display for SourceEventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            SourceEventKind::Created => "created",
            SourceEventKind::Changed => "changed",
            SourceEventKind::Deleted => "deleted",
        })
    }
}

/// Where a notification came from
#[derive(Debug, Clone)]
pub struct SourceInfo {
    /// The group this notification is bound to
    pub group: Arc<SourceGroup>,
    pub instance: Arc<dyn Record>,
    pub field_name: String,
}

/// One notification, bound to a single source group
#[derive(Debug, Clone)]
pub struct SourceEvent {
    pub kind: SourceEventKind,
    /// Field content at the time of the event
    pub source: Option<SourceFile>,
    pub info: SourceInfo,
    pub emitted_at: DateTime<Utc>,
}

/// Which event kinds a subscriber wants
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KindFilter {
    Only(SourceEventKind),
    All,
}

impl KindFilter {
    fn accepts(self, kind: SourceEventKind) -> bool {
        match self {
            KindFilter::Only(k) => k == kind,
            KindFilter::All => true,
        }
    }
}

impl From<SourceEventKind> for KindFilter {
    fn from(kind: SourceEventKind) -> Self {
        KindFilter::Only(kind)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

type Callback = Arc<dyn Fn(&SourceEvent) -> anyhow::Result<()> + Send + Sync>;

struct Subscription {
    id: SubscriptionId,
    filter: KindFilter,
    callback: Callback,
}

/// Outcome of delivering one event
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchReport {
    pub delivered: usize,
    pub failed: usize,
}

impl DispatchReport {
    pub fn merge(&mut self, other: DispatchReport) {
        self.delivered += other.delivered;
        self.failed += other.failed;
    }
}

/// Fan-out channel for source notifications
pub struct SignalHub {
    subscriptions: RwLock<Vec<Subscription>>,
    next_id: AtomicU64,
}

impl Default for SignalHub {
    fn default() -> Self {
        Self::new()
    }
}

impl SignalHub {
    pub fn new() -> Self {
        Self {
            subscriptions: RwLock::new(Vec::new()),
            next_id: AtomicU64::new(1),
        }
    }

    pub fn subscribe<F>(&self, filter: impl Into<KindFilter>, callback: F) -> SubscriptionId
    where
        F: Fn(&SourceEvent) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.subscriptions.write().push(Subscription {
            id,
            filter: filter.into(),
            callback: Arc::new(callback),
        });
        id
    }

    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut subscriptions = self.subscriptions.write();
        let before = subscriptions.len();
        subscriptions.retain(|s| s.id != id);
        subscriptions.len() != before
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscriptions.read().len()
    }

    /// Deliver `event` to every interested subscriber.
    ///
    /// A subscriber that errors or panics is logged and counted; the rest
    /// still run.
    pub fn send(&self, event: &SourceEvent) -> DispatchReport {
        let callbacks: Vec<Callback> = self
            .subscriptions
            .read()
            .iter()
            .filter(|s| s.filter.accepts(event.kind))
            .map(|s| s.callback.clone())
            .collect();

        let mut report = DispatchReport::default();
        for callback in callbacks {
            let outcome = panic::catch_unwind(AssertUnwindSafe(|| callback(event)))
                .unwrap_or_else(|payload| {
                    Err(anyhow::anyhow!(
                        "subscriber panicked: {}",
                        panic_message(&*payload)
                    ))
                });

            match outcome {
                Ok(()) => report.delivered += 1,
                Err(e) => {
                    report.failed += 1;
                    warn!(
                        kind = %event.kind,
                        group = %event.info.group,
                        field = %event.info.field_name,
                        "source subscriber failed: {e:#}"
                    );
                }
            }
        }
        report
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::testing::TestRecord;
    use crate::record::RecordType;
    use parking_lot::Mutex;

    fn event(kind: SourceEventKind) -> SourceEvent {
        SourceEvent {
            kind,
            source: Some(SourceFile::new("a.png", "a.png")),
            info: SourceInfo {
                group: Arc::new(SourceGroup::detached(RecordType::from("User"), "avatar")),
                instance: TestRecord::new("User").with("avatar", "a.png").into_dyn(),
                field_name: "avatar".to_string(),
            },
            emitted_at: Utc::now(),
        }
    }

    #[test]
    fn test_filter_by_kind() {
        let hub = SignalHub::default();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        hub.subscribe(SourceEventKind::Deleted, move |e| {
            sink.lock().push(e.kind);
            Ok(())
        });

        hub.send(&event(SourceEventKind::Created));
        hub.send(&event(SourceEventKind::Deleted));

        assert_eq!(*seen.lock(), vec![SourceEventKind::Deleted]);
    }

    #[test]
    fn test_failing_subscriber_is_isolated() {
        let hub = SignalHub::default();
        let count = Arc::new(Mutex::new(0));
        hub.subscribe(KindFilter::All, |_| anyhow::bail!("cache backend down"));
        hub.subscribe(KindFilter::All, |_| panic!("subscriber bug"));
        let sink = count.clone();
        hub.subscribe(KindFilter::All, move |_| {
            *sink.lock() += 1;
            Ok(())
        });

        let report = hub.send(&event(SourceEventKind::Changed));

        assert_eq!(report, DispatchReport { delivered: 1, failed: 2 });
        assert_eq!(*count.lock(), 1);
    }

    #[test]
    fn test_unsubscribe() {
        let hub = SignalHub::default();
        let id = hub.subscribe(KindFilter::All, |_| Ok(()));

        assert!(hub.unsubscribe(id));
        assert!(!hub.unsubscribe(id));
        assert_eq!(hub.send(&event(SourceEventKind::Created)), DispatchReport::default());
    }

    #[test]
    fn test_reentrant_subscribe_during_send() {
        let hub = Arc::new(SignalHub::default());
        let inner = hub.clone();
        hub.subscribe(KindFilter::All, move |_| {
            inner.subscribe(KindFilter::All, |_| Ok(()));
            Ok(())
        });

        let report = hub.send(&event(SourceEventKind::Created));

        assert_eq!(report.delivered, 1);
        assert_eq!(hub.subscriber_count(), 2);
    }
}
