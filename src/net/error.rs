//! Error types surfaced by the connection layer.

use std::fmt;

/// Outcome of a single `submit`ed request.
///
/// Exactly one of these reaches the caller's completion slot per request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientError {
    /// The submission queue was at capacity; the request was never sent.
    QueueFull,
    /// The endpoint closed before the request could complete.
    EndpointClosed,
    /// No response arrived within the configured timeout.
    RequestTimeout,
    /// The decrypted payload did not carry the magic tail.
    BadEnvelope,
}

impl fmt::Display for ClientError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::QueueFull => write!(f, "submission queue full"),
            Self::EndpointClosed => write!(f, "endpoint closed"),
            Self::RequestTimeout => write!(f, "request timed out"),
            Self::BadEnvelope => write!(f, "envelope failed integrity check"),
        }
    }
}

impl std::error::Error for ClientError {}

/// Errors raised while decoding a frame off the wire.
#[derive(Debug)]
pub enum FrameError {
    /// Body length exceeded the configured maximum.
    TooLarge { len: u64, max: u64 },
    /// The stream ended (or reported "closed") while reading a header.
    /// This is the normal shutdown signal, not a failure.
    Eof,
    /// Any other I/O failure while reading or writing a frame.
    Io(std::io::Error),
}

impl fmt::Display for FrameError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TooLarge { len, max } => {
                write!(f, "frame body {len} bytes exceeds max {max} bytes")
            }
            Self::Eof => write!(f, "connection closed"),
            Self::Io(e) => write!(f, "frame io error: {e}"),
        }
    }
}

impl std::error::Error for FrameError {}

impl From<std::io::Error> for FrameError {
    fn from(e: std::io::Error) -> Self {
        match e.kind() {
            std::io::ErrorKind::UnexpectedEof => Self::Eof,
            _ => Self::Io(e),
        }
    }
}

/// Errors raised by [crate::net::codec::wrap] and [crate::net::codec::unwrap].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CodecError {
    /// Key length was not 16, 24, or 32 bytes.
    InvalidKeyLength(usize),
    /// Base64 decoding failed.
    BadBase64,
    /// Ciphertext length was not a multiple of the block size, or padding was malformed.
    BadPadding,
    /// Decrypted payload did not end in the magic sentinel.
    BadEnvelope,
}

impl fmt::Display for CodecError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidKeyLength(n) => write!(f, "key length {n} is not 16, 24, or 32 bytes"),
            Self::BadBase64 => write!(f, "ciphertext is not valid base64"),
            Self::BadPadding => write!(f, "ciphertext has invalid PKCS#7 padding"),
            Self::BadEnvelope => write!(f, "envelope magic tail mismatch"),
        }
    }
}

impl std::error::Error for CodecError {}
