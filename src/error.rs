use std::{fmt, io, str::Utf8Error};

use thiserror::Error;

pub type Result<T> = std::result::Result<T, SourceQueryError>;

/// Why a logical payload could not be decoded into its typed result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecodeReason {
    /// The response type byte is not the one the decoder expects.
    UnexpectedResponseType(u8),
    /// The payload ended before a field could be read.
    TruncatedPayload,
    /// A null-terminated string was not valid UTF-8.
    InvalidStringEncoding,
    /// GoldSource player list repeated a non-zero slot index.
    DuplicatePlayerIndex(u8),
}

impl fmt::Display for DecodeReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DecodeReason::UnexpectedResponseType(t) => {
                write!(f, "unexpected response type {t:#04x}")
            }
            DecodeReason::TruncatedPayload => f.write_str("truncated payload"),
            DecodeReason::InvalidStringEncoding => f.write_str("invalid string encoding"),
            DecodeReason::DuplicatePlayerIndex(i) => write!(f, "duplicate player index {i}"),
        }
    }
}

#[derive(Debug, Error)]
pub enum SourceQueryError {
    #[error("failed to bind local socket: {0}")]
    FailedPortBind(#[source] io::Error),
    #[error("host unreachable: {0}")]
    UnreachableHost(#[source] io::Error),
    #[error("failed to send packet: {0}")]
    SendError(#[source] io::Error),
    #[error("failed to receive packet: {0}")]
    ReceiveError(#[source] io::Error),

    #[error("timed out waiting for a response")]
    Timeout,

    #[error("malformed packet: unknown header {0:#010x}")]
    UnknownPacketHeader(i32),
    #[error("malformed packet: {0}")]
    MalformedPacket(String),
    #[error("checksum mismatch: expected {expected:#010x}, got {actual:#010x}")]
    ChecksumMismatch { expected: u32, actual: u32 },
    #[error("failed to decompress payload: {0}")]
    DecompressionError(#[source] io::Error),

    #[error("protocol error: {0}")]
    ProtocolError(String),

    #[error("decode error: {0}")]
    DecodeError(DecodeReason),
}

impl SourceQueryError {
    /// Only a timed out exchange is worth repeating; everything else would
    /// fail the same way again.
    pub fn is_retryable(&self) -> bool {
        matches!(self, SourceQueryError::Timeout)
    }

    /// Socket level failures, as opposed to protocol or payload failures.
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            SourceQueryError::FailedPortBind(_)
                | SourceQueryError::UnreachableHost(_)
                | SourceQueryError::SendError(_)
                | SourceQueryError::ReceiveError(_)
        )
    }

    pub(crate) fn truncated() -> Self {
        SourceQueryError::DecodeError(DecodeReason::TruncatedPayload)
    }
}

impl From<tokio::time::error::Elapsed> for SourceQueryError {
    fn from(_: tokio::time::error::Elapsed) -> Self {
        SourceQueryError::Timeout
    }
}

impl From<Utf8Error> for SourceQueryError {
    fn from(_: Utf8Error) -> Self {
        SourceQueryError::DecodeError(DecodeReason::InvalidStringEncoding)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_timeouts_are_retryable() {
        assert!(SourceQueryError::Timeout.is_retryable());
        assert!(!SourceQueryError::truncated().is_retryable());
        assert!(!SourceQueryError::ProtocolError("again".into()).is_retryable());
        let refused = io::Error::from(io::ErrorKind::ConnectionRefused);
        assert!(!SourceQueryError::ReceiveError(refused).is_retryable());
    }

    #[test]
    fn decode_reasons_read_naturally() {
        assert_eq!(
            SourceQueryError::truncated().to_string(),
            "decode error: truncated payload"
        );
        let bad = std::str::from_utf8(&[0xC3, 0x28]).unwrap_err();
        assert_eq!(
            SourceQueryError::from(bad).to_string(),
            "decode error: invalid string encoding"
        );
        assert_eq!(
            SourceQueryError::UnknownPacketHeader(-3).to_string(),
            "malformed packet: unknown header 0xfffffffd"
        );
    }
}
