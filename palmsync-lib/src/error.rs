use thiserror::Error;

use crate::dlp::DlpStatus;

/// Errors that can occur anywhere in the sync stack.
///
/// The variants map one-to-one onto the protocol layers: `Framing` for
/// malformed datagrams (bad signature, checksum or CRC), `Protocol` for
/// ordering or flag violations inside PADP or DLP, `Transport` for stream
/// I/O failures and retry exhaustion, and `Remote` for a DLP response whose
/// status is not OK. `Encoding` and `Validation` cover text conversion and
/// caller-supplied values that are out of range.
#[derive(Error, Debug)]
pub enum SyncError {
    #[error("framing error: {reason}")]
    Framing {
        reason: String,
        /// The bytes that failed to frame, when available.
        bytes: Vec<u8>,
    },

    #[error("protocol error: {0}")]
    Protocol(String),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("device returned {status:?} for {command}")]
    Remote { command: &'static str, status: DlpStatus },

    #[error("encoding error: {0}")]
    Encoding(String),

    #[error("validation error: {0}")]
    Validation(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl SyncError {
    pub fn framing(reason: impl Into<String>, bytes: &[u8]) -> Self {
        SyncError::Framing { reason: reason.into(), bytes: bytes.to_vec() }
    }

    /// Whether this error is the device answering NOT_FOUND, which the sync
    /// orchestrator treats as "database absent" rather than a failure.
    pub fn is_not_found(&self) -> bool {
        matches!(self, SyncError::Remote { status: DlpStatus::NotFound, .. })
    }
}

pub type Result<T> = std::result::Result<T, SyncError>;
