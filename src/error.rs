//! Error types for the signal router and its collaborators

use std::path::PathBuf;
use thiserror::Error;

/// Errors surfaced to the caller of a lifecycle hook or a backfill
#[derive(Debug, Error)]
pub enum Error {
    /// A source file could not be read while computing its fingerprint
    #[error("failed to fingerprint {}: {source}", path.display())]
    Fingerprint {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The record store failed to enumerate records
    #[error("record store error: {0:#}")]
    Store(#[source] anyhow::Error),

    /// A lifecycle receiver rejected an event
    #[error("lifecycle receiver `{uid}` failed: {source:#}")]
    Receiver {
        uid: String,
        #[source]
        source: anyhow::Error,
    },

    /// Configuration could not be read or parsed
    #[error("invalid configuration: {0:#}")]
    Config(#[source] anyhow::Error),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

impl Error {
    pub(crate) fn fingerprint(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Fingerprint {
            path: path.into(),
            source,
        }
    }
}
