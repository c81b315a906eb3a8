//! # Error Types
//!
//! Error handling for the protocol core.
//!
//! This module defines every error variant that can occur while serving a
//! connection, from socket failures up to login and chat validation failures.
//!
//! ## Error Categories
//! - **Framing**: truncated frames, oversized length prefixes, malformed varints
//! - **Compression**: declared and actual uncompressed sizes disagree
//! - **Protocol state**: a packet arrives (or is sent) outside the phase it belongs to
//! - **Authentication**: verify-token mismatch, identity service rejection or timeout
//! - **Chat validation**: acknowledgment offsets that do not match the tracked chain
//! - **Unhandled packet**: a valid packet nobody handles (recoverable)
//! - **Transport**: socket-level I/O failures
//!
//! Every category except [`ProtocolError::UnhandledPacket`] is fatal to the
//! connection it occurred on. [`ProtocolError::disconnect_reason`] maps an error to
//! the text the peer is shown on its way out.
//!
//! ## Example Usage
//! ```rust
//! use machine_protocol::error::{ProtocolError, Result};
//! use tracing::{error, info};
//!
//! fn check_length(len: usize, max: usize) -> Result<usize> {
//!     if len > max {
//!         return Err(ProtocolError::FrameTooLarge(len));
//!     }
//!     Ok(len)
//! }
//!
//! match check_length(4096, 1024) {
//!     Ok(len) => info!(len, "Frame accepted"),
//!     Err(e) => error!(error = %e, fatal = e.is_fatal(), "Frame rejected"),
//! }
//! ```

use crate::core::text::TextComponent;
use crate::protocol::state::ConnectionState;
use std::fmt;
use std::io;
use thiserror::Error;

/// Static error messages and the stable disconnect reason keys shown to clients.
pub mod constants {
    /// Dispatcher-related error messages
    pub const ERR_DISPATCHER_WRITE_LOCK: &str = "Failed to acquire write lock on dispatcher";
    pub const ERR_DISPATCHER_READ_LOCK: &str = "Failed to acquire read lock on dispatcher";

    /// Wire decoding errors
    pub const ERR_UNEXPECTED_END: &str = "Unexpected end of packet";
    pub const ERR_TRAILING_BYTES: &str = "Packet was larger than expected";
    pub const ERR_INVALID_UTF8: &str = "String is not valid UTF-8";
    pub const ERR_NEGATIVE_LENGTH: &str = "Negative length prefix";
    pub const ERR_INVALID_IDENTIFIER: &str = "Invalid namespaced identifier";
    pub const ERR_INVALID_ENUM: &str = "Enum ordinal out of range";
    pub const ERR_BELOW_THRESHOLD: &str = "Compressed packet is below the compression threshold";

    /// Connection errors
    pub const ERR_CONNECTION_CLOSED: &str = "Connection closed";
    pub const ERR_CONNECTION_TIMEOUT: &str = "Connection timed out (no activity)";
    pub const ERR_TIMEOUT: &str = "Operation timed out";
    pub const ERR_TICK_UNAVAILABLE: &str = "Tick context is no longer running";

    /// Login errors
    pub const ERR_VERIFY_TOKEN_MISMATCH: &str = "Verify token mismatch";
    pub const ERR_SECRET_LENGTH: &str = "Shared secret must be 16 bytes";
    pub const ERR_UNEXPECTED_KEY: &str = "Encryption response received without a pending request";
    pub const ERR_INVALID_USERNAME: &str = "Invalid username";
    pub const ERR_SESSION_NOT_FOUND: &str = "Identity service did not confirm the session";
    pub const ERR_SESSION_UNREACHABLE: &str = "Identity service unreachable";

    /// Chat chain errors
    pub const ERR_OFFSET_REGRESSED: &str = "Acknowledgment offset moved backwards";
    pub const ERR_OFFSET_AHEAD: &str = "Acknowledgment offset exceeds tracked messages";
    pub const ERR_ACK_OUT_OF_WINDOW: &str = "Acknowledged message is not tracked";
    pub const ERR_MISSING_PROFILE_KEY: &str = "Signed message without a valid profile key";
    pub const ERR_CHAT_OUT_OF_ORDER: &str = "Chat message timestamp moved backwards";

    /// Disconnect reason keys (client-side translation keys)
    pub const REASON_INVALID_SESSION: &str = "disconnect.loginFailedInfo.invalidSession";
    pub const REASON_CHAT_VALIDATION_FAILED: &str = "multiplayer.disconnect.chat_validation_failed";
    pub const REASON_OUTDATED_CLIENT: &str = "multiplayer.disconnect.outdated_client";
    pub const REASON_OUTDATED_SERVER: &str = "multiplayer.disconnect.outdated_server";
    pub const REASON_TRANSFERS_DISABLED: &str = "multiplayer.disconnect.transfers_disabled";
    pub const REASON_INVALID_PACKET: &str = "multiplayer.disconnect.invalid_packet";
    pub const REASON_UNEXPECTED_QUERY: &str = "multiplayer.disconnect.unexpected_query_response";
    pub const REASON_TIMEOUT: &str = "disconnect.timeout";
    pub const REASON_SERVER_FULL: &str = "multiplayer.disconnect.server_full";
    pub const REASON_SERVER_SHUTDOWN: &str = "multiplayer.disconnect.server_shutdown";
    pub const REASON_GENERIC: &str = "disconnect.genericReason";
}

/// Which side of the connection an error is attributed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaultOrigin {
    /// The peer sent something the server refuses.
    Client,
    /// Server-side collaborator code failed while applying a packet.
    Server,
}

impl fmt::Display for FaultOrigin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FaultOrigin::Client => f.write_str("client"),
            FaultOrigin::Server => f.write_str("server"),
        }
    }
}

// ProtocolError is the primary error type for all protocol operations
#[derive(Error, Debug)]
pub enum ProtocolError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("Transport error: {0}")]
    TransportError(String),

    #[error("Connection closed")]
    ConnectionClosed,

    #[error("Truncated frame")]
    TruncatedFrame,

    #[error("Frame too large: {0} bytes")]
    FrameTooLarge(usize),

    #[error("VarInt is too long")]
    VarIntTooLong,

    #[error("Malformed packet: {0}")]
    MalformedPacket(String),

    #[error("String too long: {len} (max {max})")]
    StringTooLong { len: usize, max: usize },

    #[error("Compression mismatch: declared {declared} bytes, inflated {actual}")]
    CompressionMismatch { declared: usize, actual: usize },

    #[error("Compression failed")]
    CompressionFailure,

    #[error("Decompression failed")]
    DecompressionFailure,

    #[error("Packet {packet} is not valid in state {state}")]
    ProtocolState {
        state: ConnectionState,
        packet: &'static str,
    },

    #[error("Unknown packet id {id:#04x} in state {state}")]
    UnknownPacket { state: ConnectionState, id: i32 },

    #[error("Authentication failed: {0}")]
    AuthenticationFailure(String),

    #[error("Invalid key material: {0}")]
    KeyMaterial(String),

    #[error("Chat validation failed: {0}")]
    ChatValidationFailure(String),

    #[error("Login plugin response {0} does not answer any request")]
    UnexpectedQueryResponse(i32),

    #[error("Unhandled packet: {0}")]
    UnhandledPacket(&'static str),

    #[error("Timeout occurred")]
    Timeout,

    #[error("Connection timed out (no activity)")]
    ConnectionTimeout,

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("{origin} fault on {peer}: {source}")]
    Connection {
        peer: String,
        origin: FaultOrigin,
        #[source]
        source: Box<ProtocolError>,
    },

    #[error("Custom error: {0}")]
    Custom(String),
}

impl ProtocolError {
    /// Wrap an error with the identity of the connection it happened on.
    pub fn on_connection(self, peer: impl Into<String>, origin: FaultOrigin) -> Self {
        ProtocolError::Connection {
            peer: peer.into(),
            origin,
            source: Box::new(self),
        }
    }

    /// Who an error was attributed to, once wrapped with [`Self::on_connection`].
    pub fn fault_origin(&self) -> Option<FaultOrigin> {
        match self {
            ProtocolError::Connection { origin, .. } => Some(*origin),
            _ => None,
        }
    }

    /// Everything but an unhandled packet ends the connection.
    pub fn is_fatal(&self) -> bool {
        match self {
            ProtocolError::UnhandledPacket(_) => false,
            ProtocolError::Connection { source, .. } => source.is_fatal(),
            _ => true,
        }
    }

    /// Whether the socket itself is gone, in which case no disconnect packet is attempted.
    pub fn is_transport(&self) -> bool {
        match self {
            ProtocolError::Io(_)
            | ProtocolError::TransportError(_)
            | ProtocolError::ConnectionClosed => true,
            ProtocolError::Connection { source, .. } => source.is_transport(),
            _ => false,
        }
    }

    /// The reason shown to the peer when this error disconnects it.
    ///
    /// Framing, compression and state errors get a generic reason since they
    /// only happen with non-conforming clients. Authentication and chat
    /// validation failures use stable keys a legitimate client can react to.
    pub fn disconnect_reason(&self) -> TextComponent {
        match self {
            ProtocolError::AuthenticationFailure(_) => {
                TextComponent::translate(constants::REASON_INVALID_SESSION)
            }
            ProtocolError::ChatValidationFailure(_) => {
                TextComponent::translate(constants::REASON_CHAT_VALIDATION_FAILED)
            }
            ProtocolError::UnexpectedQueryResponse(_) => {
                TextComponent::translate(constants::REASON_UNEXPECTED_QUERY)
            }
            ProtocolError::Timeout | ProtocolError::ConnectionTimeout => {
                TextComponent::translate(constants::REASON_TIMEOUT)
            }
            ProtocolError::TruncatedFrame
            | ProtocolError::FrameTooLarge(_)
            | ProtocolError::VarIntTooLong
            | ProtocolError::MalformedPacket(_)
            | ProtocolError::StringTooLong { .. }
            | ProtocolError::CompressionMismatch { .. }
            | ProtocolError::DecompressionFailure
            | ProtocolError::ProtocolState { .. }
            | ProtocolError::UnknownPacket { .. } => {
                TextComponent::translate(constants::REASON_INVALID_PACKET)
            }
            ProtocolError::Connection { source, .. } => source.disconnect_reason(),
            _ => TextComponent::translate(constants::REASON_GENERIC),
        }
    }
}

/// Type alias for Results using ProtocolError
pub type Result<T> = std::result::Result<T, ProtocolError>;
