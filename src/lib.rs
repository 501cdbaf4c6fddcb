//! Source change signals
//!
//! Tracks file attachments ("sources") on data records and tells cache
//! listeners when a source is created, changed, or deleted, so artifacts
//! derived from it can be invalidated or regenerated.
//!
//! ```no_run
//! use source_signals::{KindFilter, LifecycleBus, SignalRouter, SourceGroup};
//! use std::sync::Arc;
//!
//! let bus = LifecycleBus::new();
//! let router = Arc::new(SignalRouter::default());
//! router.connect(&bus);
//!
//! let avatars = SourceGroup::new(&router, "User", "avatar");
//! router.hub().subscribe(KindFilter::All, |event| {
//!     println!("{} {:?}", event.kind, event.source);
//!     Ok(())
//! });
//! # let _ = avatars;
//! ```

pub mod config;
pub mod error;
pub mod fingerprint;
pub mod lifecycle;
pub mod record;
pub mod router;
pub mod signals;
pub mod source_group;

pub use config::RouterConfig;
pub use error::{Error, Result};
pub use fingerprint::{Fingerprint, FingerprintMode, Fingerprinter};
pub use lifecycle::{LifecycleBus, LifecycleEvent, LifecycleReceiver};
pub use record::{MemoryStore, Record, RecordStore, RecordType, SourceFile};
pub use router::{RouterStats, SignalRouter, Snapshot};
pub use signals::{DispatchReport, KindFilter, SignalHub, SourceEvent, SourceEventKind, SourceInfo};
pub use source_group::{GroupId, SourceEntry, SourceGroup, Sources};
