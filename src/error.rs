//! # Error Types
//!
//! Error handling for the strap protocol.
//!
//! Errors are grouped by the operation that produces them:
//! - **Frame errors**: a single inbound delivery failed to decode. These are logged and
//!   the delivery is dropped; they never tear down the connection.
//! - **Handshake errors**: connection bring-up failed. Terminal for the connection.
//! - **Download errors**: a historical download was aborted. Terminal for that download;
//!   the byte sink is always released first.
//!
//! [`ProtocolError`] wraps all of them so callers can use a single `Result` type.
//!
//! ## Example Usage
//! ```rust
//! use whoop_protocol::error::{FrameError, ProtocolError};
//! use whoop_protocol::core::packet::Packet;
//!
//! match Packet::decode(&[0xAA, 0x00]) {
//!     Err(FrameError::ShortFrame(len)) => assert_eq!(len, 2),
//!     other => panic!("unexpected: {other:?}"),
//! }
//!
//! let err: ProtocolError = FrameError::BadSof(0x55).into();
//! assert!(err.to_string().contains("start-of-frame"));
//! ```

use std::io;
use thiserror::Error;

/// Error message constants to reduce allocations in error paths.
pub mod constants {
    /// Transport errors
    pub const ERR_TRANSPORT_CLOSED: &str = "Transport closed";
    pub const ERR_WRITE_TIMEOUT: &str = "Transport write timed out";

    /// Byte sink errors
    pub const ERR_SINK_NOT_OPEN: &str = "Byte sink is not open";
    pub const ERR_SINK_OPEN_FAILED: &str = "Could not open byte sink";

    /// Handshake errors
    pub const ERR_SHORT_SERIAL: &str = "Serial number shorter than 16 bytes";
}

/// Reasons a byte sequence could not be decoded into a packet.
///
/// Checks run in declaration order; the first failing check wins.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FrameError {
    #[error("Frame too short: {0} bytes (minimum 8)")]
    ShortFrame(usize),

    #[error("Invalid start-of-frame byte: 0x{0:02X}")]
    BadSof(u8),

    #[error("Header CRC8 mismatch: expected 0x{expected:02X}, calculated 0x{calculated:02X}")]
    HeaderCrcMismatch { expected: u8, calculated: u8 },

    #[error("Frame length {length} out of range for {available} available bytes")]
    LengthOutOfRange { length: usize, available: usize },

    #[error("Body CRC32 mismatch: expected 0x{expected:08X}, calculated 0x{calculated:08X}")]
    BodyCrcMismatch { expected: u32, calculated: u32 },

    #[error("Payload too large to frame: {0} bytes")]
    PayloadTooLarge(usize),
}

/// Failures while authenticating a new connection.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum HandshakeError {
    #[error("Device did not report a serial number")]
    MissingSerial,

    #[error("Serial number cannot be used as a session key: {0}")]
    UnsupportedSerial(&'static str),

    #[error("Challenge payload too short: {0} bytes (expected 16)")]
    ShortChallenge(usize),

    #[error("Timed out waiting for session challenge")]
    ChallengeTimeout,

    #[error("Link lost during handshake")]
    LinkLost,

    #[error("Transport failure during handshake: {0}")]
    Transport(String),

    #[error("CMAC computation failed: {0}")]
    Crypto(String),
}

/// Failures while paging historical data off the strap.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DownloadError {
    #[error("A historical download is already in progress")]
    AlreadyActive,

    #[error("Byte sink unavailable: {0}")]
    SinkUnavailable(String),

    #[error("Metadata boundary payload too short: {0} bytes (expected 14)")]
    MalformedBoundary(usize),

    #[error("Timed out waiting for history boundary")]
    BoundaryTimeout,

    #[error("Link lost during download")]
    LinkLost,

    #[error("Transport failure during download: {0}")]
    Transport(String),
}

// ProtocolError is the primary error type for all protocol operations
#[derive(Error, Debug)]
pub enum ProtocolError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("Frame error: {0}")]
    Frame(#[from] FrameError),

    #[error("Handshake failed: {0}")]
    Handshake(#[from] HandshakeError),

    #[error("History download failed: {0}")]
    Download(#[from] DownloadError),

    #[error("Transport error: {0}")]
    TransportError(String),

    #[error("Not connected")]
    NotConnected,

    #[error("Timeout occurred")]
    Timeout,

    #[error("Configuration error: {0}")]
    ConfigError(String),
}

/// Type alias for Results using ProtocolError
pub type Result<T> = std::result::Result<T, ProtocolError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frame_error_messages_carry_values() {
        let err = FrameError::HeaderCrcMismatch {
            expected: 0xA8,
            calculated: 0x07,
        };
        assert_eq!(
            err.to_string(),
            "Header CRC8 mismatch: expected 0xA8, calculated 0x07"
        );
    }

    #[test]
    fn nested_errors_convert_into_protocol_error() {
        let err: ProtocolError = DownloadError::BoundaryTimeout.into();
        assert!(matches!(
            err,
            ProtocolError::Download(DownloadError::BoundaryTimeout)
        ));
        assert_eq!(
            err.to_string(),
            "History download failed: Timed out waiting for history boundary"
        );
    }
}
