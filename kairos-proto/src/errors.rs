//! Error types for the wire protocol

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ProtoError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("connecting to {addr} timed out after {seconds}s")]
    ConnectTimeout { addr: String, seconds: u64 },

    #[error("frame of {len} bytes exceeds the {max} byte limit")]
    FrameTooLarge { len: usize, max: usize },

    #[error("malformed frame: {0}")]
    Malformed(String),

    #[error("unknown opcode {0:#04x}")]
    UnknownOpcode(u8),
}

pub type Result<T> = std::result::Result<T, ProtoError>;
