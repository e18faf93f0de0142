//! Wire protocol for the kairos replication sender.
//!
//! The receiver speaks a length-framed binary protocol over TCP: every
//! request and reply is a 4-byte big-endian length followed by the payload.
//! A request payload starts with a one-byte opcode; the reply is always a
//! [`ResultStatus`]. One connection spans one sync cycle.

pub mod client;
pub mod errors;
pub mod frame;

pub use client::SyncClient;
pub use errors::{ProtoError, Result};
pub use frame::{read_frame, write_frame, Request, ResultStatus, MAX_FRAME_LEN};

/// Schema-log lines accumulated before a batch is flushed as one `syncData`.
pub const BATCH_LINE: usize = 1000;

/// Chunk size for streaming a data file. Must match the receiver's staging
/// buffer.
pub const DATA_CHUNK_SIZE: usize = 4 * 1024 * 1024;

/// Attempts per file (or per schema shipment) before the cycle is aborted.
pub const MAX_SYNC_FILE_TRY: usize = 5;

/// Digest algorithm both sides compute over the shipped byte stream.
pub const DIGEST_NAME: &str = "MD5";

/// Filename of the append-only schema log, fixed by the metadata module.
pub const SCHEMA_LOG_NAME: &str = "schema.log";

/// Suffix of the sidecar index file that accompanies every sealed data file.
pub const RESOURCE_SUFFIX: &str = ".resource";
