//! # Error Types
//!
//! Error handling for the Levin wire protocol and the P2P node built on it.
//!
//! This module defines every error variant that can occur, from malformed
//! portable-storage bytes up to protocol violations by a remote peer.
//!
//! ## Error Categories
//! - **Codec Errors**: bad storage signature, truncated buffers, unknown type tags
//! - **Framing Errors**: wrong packet signature, oversized payload claims
//! - **Protocol Errors**: self-connection, stale version, handshake replay,
//!   messages from an unvalidated peer
//! - **I/O Errors**: socket failures
//! - **Configuration Errors**: unreadable or invalid configuration
//!
//! Codec and framing errors are returned to the caller. Protocol errors are
//! caught at the dispatch boundary and only ever close the offending peer.
//!
//! ## Example Usage
//! ```rust
//! use levin_p2p::core::storage::{self, Section};
//! use levin_p2p::error::ProtocolError;
//!
//! let bytes = storage::encode(&Section::new(), true).expect("empty section encodes");
//! match storage::decode(&bytes[..4], true) {
//!     Err(ProtocolError::Bounds { .. }) => {}
//!     other => panic!("expected a bounds error, got {other:?}"),
//! }
//! ```

use std::io;
use thiserror::Error;

/// Error message constants to reduce allocations in error paths.
pub mod constants {
    /// Storage format errors
    pub const ERR_STORAGE_SIGNATURE: &str = "Portable storage signature mismatch";
    pub const ERR_STORAGE_VERSION: &str = "Unsupported portable storage version";
    pub const ERR_RESERVED_TAG: &str = "Reserved type tag";
    pub const ERR_NAME_TOO_LONG: &str = "Entry name exceeds 255 bytes";
    pub const ERR_DUPLICATE_NAME: &str = "Entry name repeated in section";
    pub const ERR_VARINT_RANGE: &str = "Value exceeds varint range";
    pub const ERR_NESTING_TOO_DEEP: &str = "Section nesting too deep";
    pub const ERR_INVALID_BOOL: &str = "Boolean byte must be 0 or 1";
    pub const ERR_INVALID_UTF8: &str = "String is not valid UTF-8";
    pub const ERR_MIXED_ARRAY: &str = "Array elements do not match declared type";
    pub const ERR_BYTE_ARRAY: &str = "Byte arrays must be stored as blobs";

    /// Protocol violations
    pub const ERR_SELF_CONNECTION: &str = "Peer announced our own node id";
    pub const ERR_NETWORK_MISMATCH: &str = "Peer belongs to a different network";
    pub const ERR_STALE_VERSION: &str = "Peer protocol version below minimum";
    pub const ERR_HANDSHAKE_REPLAY: &str = "Peer repeated handshake after validation";
    pub const ERR_NOT_VALIDATED: &str = "Command received from unvalidated peer";

    /// Connection errors
    pub const ERR_CONNECT_TIMEOUT: &str = "Timed out dialing peer";
    pub const ERR_SERVER_NOT_RUNNING: &str = "Server is not running";
    pub const ERR_SERVER_RUNNING: &str = "Server is already running";

    /// Misc
    pub const ERR_SYSTEM_TIME: &str = "System time error: time went backwards";
    pub const ERR_RANDOM_SOURCE: &str = "Secure random source unavailable";
}

// ProtocolError is the primary error type for all protocol operations
#[derive(Error, Debug)]
pub enum ProtocolError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("Format error: {0}")]
    Format(String),

    #[error("Buffer too short: needed {needed} bytes, {remaining} remaining")]
    Bounds { needed: usize, remaining: usize },

    #[error("Unknown type tag: {0}")]
    UnknownType(u8),

    #[error("Invalid packet signature: {0:#018x}")]
    InvalidSignature(u64),

    #[error("Packet too large: {size} bytes (max {max})")]
    OversizedPacket { size: u64, max: u64 },

    #[error("Protocol violation: {0}")]
    ProtocolViolation(String),

    #[error("Connection closed")]
    ConnectionClosed,

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Custom error: {0}")]
    Custom(String),
}

impl ProtocolError {
    pub(crate) fn format(msg: impl Into<String>) -> Self {
        ProtocolError::Format(msg.into())
    }

    pub(crate) fn violation(msg: impl Into<String>) -> Self {
        ProtocolError::ProtocolViolation(msg.into())
    }

    /// Whether this error was raised because the remote peer broke protocol rules
    pub fn is_violation(&self) -> bool {
        matches!(self, ProtocolError::ProtocolViolation(_))
    }
}

/// Type alias for Results using ProtocolError
pub type Result<T> = std::result::Result<T, ProtocolError>;
