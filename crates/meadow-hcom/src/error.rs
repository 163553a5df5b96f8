//! Error types for device connections.

use std::io;
use std::path::PathBuf;
use std::time::Duration;

use hcom_protocol::ProtocolError;
use thiserror::Error;

/// Errors returned by device operations.
#[derive(Debug, Error)]
pub enum HcomError {
    /// The device did not answer in time.
    #[error("timed out after {waited:?} waiting for {waiting_for}")]
    Timeout {
        /// How long the caller waited.
        waited: Duration,
        /// What the caller was waiting for.
        waiting_for: &'static str,
    },

    /// The caller cancelled the operation.
    #[error("operation cancelled")]
    Cancelled,

    /// No transport is open to a device.
    #[error("not attached to a device")]
    NotAttached,

    /// Reading or writing the transport failed.
    #[error("transport error: {0}")]
    Transport(#[from] io::Error),

    /// A packet could not be built or parsed.
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// The device rejected a request.
    #[error("device rejected request: {0}")]
    Rejected(String),

    /// The device refused or aborted a file transfer.
    #[error("file transfer failed: {0}")]
    FileTransfer(String),

    /// File transfer traffic arrived while no transfer was active.
    #[error("{what} received for unknown file")]
    UnknownFile {
        /// Which part of the transfer arrived.
        what: &'static str,
    },

    /// A local file could not be read or written.
    #[error("local file {path}: {source}")]
    LocalFile {
        /// The local path.
        path: PathBuf,
        /// The underlying error.
        #[source]
        source: io::Error,
    },

    /// The route has no HCOM transport behind it.
    #[error("route '{0}' has no HCOM transport")]
    UnsupportedRoute(String),
}

impl HcomError {
    /// Whether the device was absent or unresponsive rather than failing.
    pub fn is_timeout(&self) -> bool {
        matches!(self, HcomError::Timeout { .. })
    }

    pub(crate) fn local_file(path: impl Into<PathBuf>, source: io::Error) -> Self {
        HcomError::LocalFile {
            path: path.into(),
            source,
        }
    }
}

/// Result type alias for device operations.
pub type HcomResult<T> = Result<T, HcomError>;
