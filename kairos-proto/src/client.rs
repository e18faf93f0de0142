//! Async TCP client for the sync protocol
//!
//! One [`SyncClient`] wraps one connection and spans one sync cycle. Every
//! method is a single request/reply exchange; transport failures surface as
//! [`ProtoError`] and abort the cycle upstream.

use std::time::Duration;

use tokio::net::TcpStream;
use tracing::{debug, trace};

use crate::errors::{ProtoError, Result};
use crate::frame::{read_frame, write_frame, Request, ResultStatus};

#[derive(Debug)]
pub struct SyncClient {
    stream: TcpStream,
    peer: String,
}

impl SyncClient {
    /// Connect to the receiver, bounded by `timeout`.
    pub async fn connect(addr: &str, timeout: Duration) -> Result<Self> {
        let stream = tokio::time::timeout(timeout, TcpStream::connect(addr))
            .await
            .map_err(|_| ProtoError::ConnectTimeout {
                addr: addr.to_string(),
                seconds: timeout.as_secs(),
            })??;
        stream.set_nodelay(true)?;
        debug!("connected to receiver at {}", addr);
        Ok(SyncClient {
            stream,
            peer: addr.to_string(),
        })
    }

    pub fn peer(&self) -> &str {
        &self.peer
    }

    async fn call(&mut self, request: &Request) -> Result<ResultStatus> {
        trace!(opcode = request.opcode(), "sending request");
        write_frame(&mut self.stream, &request.encode()).await?;
        let reply = read_frame(&mut self.stream).await?;
        ResultStatus::decode(&reply)
    }

    /// Identity handshake. The receiver may reject the sender; the caller
    /// inspects `success` and `error_msg`.
    pub async fn check(&mut self, host: &str, identity: &str) -> Result<ResultStatus> {
        self.call(&Request::Check {
            host: host.to_string(),
            identity: identity.to_string(),
        })
        .await
    }

    pub async fn start_sync(&mut self) -> Result<()> {
        self.call(&Request::StartSync).await.map(|_| ())
    }

    /// Per-group preamble.
    pub async fn init(&mut self, group: &str) -> Result<ResultStatus> {
        self.call(&Request::Init {
            group: group.to_string(),
        })
        .await
    }

    /// Announce the file whose bytes follow in `sync_data` chunks.
    pub async fn init_sync_data(&mut self, filename: &str) -> Result<()> {
        self.call(&Request::InitSyncData {
            filename: filename.to_string(),
        })
        .await
        .map(|_| ())
    }

    /// Append one chunk to the announced file.
    pub async fn sync_data(&mut self, chunk: &[u8]) -> Result<ResultStatus> {
        self.call(&Request::SyncData {
            chunk: chunk.to_vec(),
        })
        .await
    }

    /// Digest gate: passes iff the reply is successful and `msg` echoes the
    /// digest the sender computed.
    pub async fn check_data_md5(&mut self, digest: &str) -> Result<ResultStatus> {
        self.call(&Request::CheckDataMd5 {
            digest: digest.to_string(),
        })
        .await
    }

    pub async fn sync_deleted_file_name(&mut self, filename: &str) -> Result<ResultStatus> {
        self.call(&Request::SyncDeletedFileName {
            filename: filename.to_string(),
        })
        .await
    }

    pub async fn end_sync(&mut self) -> Result<()> {
        self.call(&Request::EndSync).await.map(|_| ())
    }
}
