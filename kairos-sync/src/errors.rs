//! Error types for the sender core

use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum SyncError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Any transport-level failure, or a bounded retry that ran dry. Aborts
    /// the cycle; baseline and schema cursor stay untouched.
    #[error("connection to receiver failed: {0}")]
    Connection(String),

    /// The receiver refused the identity handshake.
    #[error("receiver rejected the sync task: {0}")]
    Rejected(String),

    /// The receiver's echoed digest did not match the sender's. Retried
    /// within the per-file bound before it surfaces as `Connection`.
    #[error("digest mismatch for {path}: sent {sent}, receiver echoed {echoed}")]
    DigestMismatch {
        path: PathBuf,
        sent: String,
        echoed: String,
    },

    #[error("cannot snapshot {path}: {source}")]
    Snapshot {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("another sender already holds the lock at {0}")]
    AlreadyRunning(PathBuf),

    #[error("invalid configuration: {0}")]
    Config(String),
}

impl From<kairos_proto::ProtoError> for SyncError {
    fn from(err: kairos_proto::ProtoError) -> Self {
        SyncError::Connection(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, SyncError>;
