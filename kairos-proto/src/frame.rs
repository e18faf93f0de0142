//! Frame layout and message encoding
//!
//! A frame is `u32` (big-endian) payload length + payload. Request payloads
//! are a one-byte opcode followed by the operation's fields; strings and
//! chunks are `u32` length + bytes. Replies carry a [`ResultStatus`].

use bytes::{Buf, BufMut};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::errors::{ProtoError, Result};

/// Upper bound on a single frame payload. `syncData` chunks stay well below
/// this; anything larger is a protocol violation.
pub const MAX_FRAME_LEN: usize = 16 * 1024 * 1024;

const OP_CHECK: u8 = 0x01;
const OP_START_SYNC: u8 = 0x02;
const OP_INIT: u8 = 0x03;
const OP_INIT_SYNC_DATA: u8 = 0x04;
const OP_SYNC_DATA: u8 = 0x05;
const OP_CHECK_DATA_MD5: u8 = 0x06;
const OP_SYNC_DELETED_FILE_NAME: u8 = 0x07;
const OP_END_SYNC: u8 = 0x08;

/// One sender-to-receiver operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Request {
    /// Identity handshake; the receiver may reject the sender.
    Check { host: String, identity: String },
    /// Marks the beginning of a sync cycle.
    StartSync,
    /// Per-group preamble.
    Init { group: String },
    /// Announces the file whose bytes follow in `SyncData` chunks.
    InitSyncData { filename: String },
    /// One chunk of the announced file.
    SyncData { chunk: Vec<u8> },
    /// Digest gate: the receiver echoes its own digest of the staged bytes.
    CheckDataMd5 { digest: String },
    /// Notifies the receiver that a file vanished on the sender.
    SyncDeletedFileName { filename: String },
    /// Marks the end of a sync cycle.
    EndSync,
}

impl Request {
    pub fn opcode(&self) -> u8 {
        match self {
            Request::Check { .. } => OP_CHECK,
            Request::StartSync => OP_START_SYNC,
            Request::Init { .. } => OP_INIT,
            Request::InitSyncData { .. } => OP_INIT_SYNC_DATA,
            Request::SyncData { .. } => OP_SYNC_DATA,
            Request::CheckDataMd5 { .. } => OP_CHECK_DATA_MD5,
            Request::SyncDeletedFileName { .. } => OP_SYNC_DELETED_FILE_NAME,
            Request::EndSync => OP_END_SYNC,
        }
    }

    /// Encode into a frame payload (opcode + fields).
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(64);
        buf.put_u8(self.opcode());
        match self {
            Request::Check { host, identity } => {
                put_str(&mut buf, host);
                put_str(&mut buf, identity);
            }
            Request::Init { group } => put_str(&mut buf, group),
            Request::InitSyncData { filename } => put_str(&mut buf, filename),
            Request::SyncData { chunk } => put_blob(&mut buf, chunk),
            Request::CheckDataMd5 { digest } => put_str(&mut buf, digest),
            Request::SyncDeletedFileName { filename } => put_str(&mut buf, filename),
            Request::StartSync | Request::EndSync => {}
        }
        buf
    }

    /// Decode a frame payload. The receiver side of the handshake.
    pub fn decode(payload: &[u8]) -> Result<Request> {
        let mut cur = payload;
        if cur.remaining() < 1 {
            return Err(ProtoError::Malformed("empty request payload".to_string()));
        }
        let opcode = cur.get_u8();
        let request = match opcode {
            OP_CHECK => Request::Check {
                host: get_str(&mut cur)?,
                identity: get_str(&mut cur)?,
            },
            OP_START_SYNC => Request::StartSync,
            OP_INIT => Request::Init {
                group: get_str(&mut cur)?,
            },
            OP_INIT_SYNC_DATA => Request::InitSyncData {
                filename: get_str(&mut cur)?,
            },
            OP_SYNC_DATA => Request::SyncData {
                chunk: get_blob(&mut cur)?,
            },
            OP_CHECK_DATA_MD5 => Request::CheckDataMd5 {
                digest: get_str(&mut cur)?,
            },
            OP_SYNC_DELETED_FILE_NAME => Request::SyncDeletedFileName {
                filename: get_str(&mut cur)?,
            },
            OP_END_SYNC => Request::EndSync,
            other => return Err(ProtoError::UnknownOpcode(other)),
        };
        if cur.has_remaining() {
            return Err(ProtoError::Malformed(format!(
                "{} trailing bytes after request",
                cur.remaining()
            )));
        }
        Ok(request)
    }
}

/// Reply to every operation.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ResultStatus {
    pub success: bool,
    pub error_msg: String,
    pub msg: String,
}

impl ResultStatus {
    pub fn ok() -> Self {
        ResultStatus {
            success: true,
            ..Default::default()
        }
    }

    pub fn error(error_msg: impl Into<String>) -> Self {
        ResultStatus {
            success: false,
            error_msg: error_msg.into(),
            msg: String::new(),
        }
    }

    /// Success reply whose `msg` echoes a receiver-computed value (the
    /// digest handshake).
    pub fn echo(msg: impl Into<String>) -> Self {
        ResultStatus {
            success: true,
            error_msg: String::new(),
            msg: msg.into(),
        }
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(16 + self.error_msg.len() + self.msg.len());
        buf.put_u8(self.success as u8);
        put_str(&mut buf, &self.error_msg);
        put_str(&mut buf, &self.msg);
        buf
    }

    pub fn decode(payload: &[u8]) -> Result<ResultStatus> {
        let mut cur = payload;
        if cur.remaining() < 1 {
            return Err(ProtoError::Malformed("empty reply payload".to_string()));
        }
        let success = cur.get_u8() != 0;
        let error_msg = get_str(&mut cur)?;
        let msg = get_str(&mut cur)?;
        if cur.has_remaining() {
            return Err(ProtoError::Malformed(format!(
                "{} trailing bytes after reply",
                cur.remaining()
            )));
        }
        Ok(ResultStatus {
            success,
            error_msg,
            msg,
        })
    }
}

/// Write one frame: length prefix, then payload.
pub async fn write_frame<W>(writer: &mut W, payload: &[u8]) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    if payload.len() > MAX_FRAME_LEN {
        return Err(ProtoError::FrameTooLarge {
            len: payload.len(),
            max: MAX_FRAME_LEN,
        });
    }
    writer.write_u32(payload.len() as u32).await?;
    writer.write_all(payload).await?;
    writer.flush().await?;
    Ok(())
}

/// Read one frame payload, rejecting oversized lengths before allocating.
pub async fn read_frame<R>(reader: &mut R) -> Result<Vec<u8>>
where
    R: AsyncRead + Unpin,
{
    let len = reader.read_u32().await? as usize;
    if len > MAX_FRAME_LEN {
        return Err(ProtoError::FrameTooLarge {
            len,
            max: MAX_FRAME_LEN,
        });
    }
    let mut payload = vec![0u8; len];
    reader.read_exact(&mut payload).await?;
    Ok(payload)
}

fn put_blob(buf: &mut Vec<u8>, bytes: &[u8]) {
    buf.put_u32(bytes.len() as u32);
    buf.put_slice(bytes);
}

fn put_str(buf: &mut Vec<u8>, s: &str) {
    put_blob(buf, s.as_bytes());
}

fn get_blob(cur: &mut &[u8]) -> Result<Vec<u8>> {
    if cur.remaining() < 4 {
        return Err(ProtoError::Malformed("truncated field length".to_string()));
    }
    let len = cur.get_u32() as usize;
    if cur.remaining() < len {
        return Err(ProtoError::Malformed(format!(
            "field of {} bytes but only {} remain",
            len,
            cur.remaining()
        )));
    }
    let mut bytes = vec![0u8; len];
    cur.copy_to_slice(&mut bytes);
    Ok(bytes)
}

fn get_str(cur: &mut &[u8]) -> Result<String> {
    String::from_utf8(get_blob(cur)?)
        .map_err(|e| ProtoError::Malformed(format!("invalid utf-8 in field: {}", e)))
}
