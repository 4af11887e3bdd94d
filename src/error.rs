//! # Error Types
//!
//! Error handling for the WebSocket wrapper.
//!
//! ## Error Categories
//! - **I/O Errors**: socket and file system failures in the host adapter
//! - **Protocol Violations**: reserved bits, unknown opcodes, oversized frames,
//!   unsupported versions, failed upgrade negotiation, undecodable payloads
//! - **Structural Errors**: malformed request lines or header blocks, oversized
//!   handshakes. These close the connection without sending anything.
//! - **Configuration Errors**: invalid or unreadable configuration
//!
//! Incomplete input is never an error: decoders report "need more data" through
//! [`crate::core::codec::DecodeResult::NeedMoreData`] instead.
//!
//! ## Example Usage
//! ```rust
//! use websocket_wrapper::error::{ProtocolError, Result};
//!
//! fn require_version(version: &str) -> Result<u8> {
//!     version
//!         .parse::<u8>()
//!         .map_err(|_| ProtocolError::UnsupportedVersion(version.to_string()))
//! }
//!
//! assert!(require_version("13").is_ok());
//! assert!(require_version("draft").is_err());
//! ```

use std::io;
use thiserror::Error;

/// Error message constants to reduce allocations in error paths.
pub mod constants {
    /// Handshake errors
    pub const ERR_MALFORMED_REQUEST_LINE: &str = "Request line must have exactly three tokens";
    pub const ERR_NON_UTF8_HANDSHAKE: &str = "Handshake contains non UTF-8 bytes";
    pub const ERR_MISSING_UPGRADE: &str = "Missing 'Upgrade: websocket' header";
    pub const ERR_MISSING_CONNECTION_UPGRADE: &str = "Connection header lacks the 'upgrade' token";
    pub const ERR_MISSING_KEY: &str = "Missing Sec-WebSocket-Key header";
    pub const ERR_UNKNOWN_DIALECT: &str = "No WebSocket dialect could be identified";
    pub const ERR_KEY_WITHOUT_SPACES: &str = "Hybi-00 key contains no spaces";
    pub const ERR_KEY_WITHOUT_DIGITS: &str = "Hybi-00 key contains no digits";
    pub const ERR_KEY_OUT_OF_RANGE: &str = "Hybi-00 key quotient does not fit in 32 bits";

    /// Framing errors
    pub const ERR_RESERVED_BITS: &str = "Reserved bits set in frame header";
    pub const ERR_NO_FRAME_GRAMMAR: &str = "No frame grammar for an unknown dialect";

    /// Connection errors
    pub const ERR_CONNECTION_CLOSED: &str = "Connection closed";
    pub const ERR_SERVER_SHUTDOWN: &str = "Server shutting down";
    pub const ERR_NO_REASON: &str = "No reason given";
}

/// ProtocolError is the primary error type for all wrapper operations
#[derive(Error, Debug)]
pub enum ProtocolError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("Malformed request: {0}")]
    MalformedRequest(&'static str),

    #[error("Handshake exceeds {0} bytes")]
    OversizedHandshake(usize),

    #[error("Handshake rejected: {0}")]
    HandshakeRejected(&'static str),

    #[error("Unsupported WebSocket version: {0}")]
    UnsupportedVersion(String),

    #[error("No supported protocol offered: {0}")]
    UnsupportedCodec(String),

    #[error("{}: 0x{0:02x}", constants::ERR_RESERVED_BITS)]
    ReservedBits(u8),

    #[error("Unknown opcode: 0x{0:x}")]
    UnknownOpcode(u8),

    #[error("Frame too large: {size} bytes (max: {max})")]
    OversizedFrame { size: u64, max: usize },

    #[error("Payload decode failed: {0}")]
    PayloadDecode(String),

    #[error("{}", constants::ERR_NO_FRAME_GRAMMAR)]
    UnknownFlavor,

    #[error("{}", constants::ERR_CONNECTION_CLOSED)]
    ConnectionClosed,

    #[error("Configuration error: {0}")]
    ConfigError(String),
}

impl ProtocolError {
    /// Whether this error is a protocol violation that deserves a best-effort
    /// Close frame, as opposed to a structural failure that closes silently.
    pub fn is_violation(&self) -> bool {
        matches!(
            self,
            ProtocolError::ReservedBits(_)
                | ProtocolError::UnknownOpcode(_)
                | ProtocolError::OversizedFrame { .. }
                | ProtocolError::PayloadDecode(_)
                | ProtocolError::UnsupportedVersion(_)
                | ProtocolError::UnsupportedCodec(_)
                | ProtocolError::HandshakeRejected(_)
        )
    }

    /// RFC 6455 status code to report when closing because of this error.
    pub fn close_code(&self) -> u16 {
        match self {
            ProtocolError::OversizedFrame { .. } => 1009,
            ProtocolError::PayloadDecode(_) => 1007,
            _ => 1002,
        }
    }
}

/// Type alias for Results using ProtocolError
pub type Result<T> = std::result::Result<T, ProtocolError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_violation_classification() {
        assert!(ProtocolError::ReservedBits(0x70).is_violation());
        assert!(ProtocolError::UnknownOpcode(0x3).is_violation());
        assert!(ProtocolError::UnsupportedVersion("6".into()).is_violation());
        assert!(!ProtocolError::MalformedRequest(constants::ERR_MALFORMED_REQUEST_LINE)
            .is_violation());
        assert!(!ProtocolError::OversizedHandshake(16).is_violation());
    }

    #[test]
    fn test_close_codes() {
        assert_eq!(
            ProtocolError::OversizedFrame { size: 10, max: 5 }.close_code(),
            1009
        );
        assert_eq!(ProtocolError::PayloadDecode("x".into()).close_code(), 1007);
        assert_eq!(ProtocolError::ReservedBits(0x40).close_code(), 1002);
    }

    #[test]
    fn test_display_formats_opcode_in_hex() {
        assert_eq!(
            ProtocolError::UnknownOpcode(0xb).to_string(),
            "Unknown opcode: 0xb"
        );
    }

    #[test]
    fn test_display_uses_message_constants() {
        assert_eq!(
            ProtocolError::ReservedBits(0x40).to_string(),
            "Reserved bits set in frame header: 0x40"
        );
        assert_eq!(
            ProtocolError::UnknownFlavor.to_string(),
            constants::ERR_NO_FRAME_GRAMMAR
        );
        assert_eq!(
            ProtocolError::ConnectionClosed.to_string(),
            constants::ERR_CONNECTION_CLOSED
        );
    }
}
