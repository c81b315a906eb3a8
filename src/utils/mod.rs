//! # Utility Modules
//!
//! Supporting utilities for cryptography, compression, liveness, correlation,
//! logging, and timing.
//!
//! This module provides reusable utilities used throughout the protocol implementation.
//!
//! ## Components
//! - **Crypto**: AES-128/CFB8 stream cipher and the login session hash
//! - **Compression**: zlib with size limits and the threshold rule
//! - **Keepalive**: randomized liveness pings with a response window
//! - **Acknowledgment**: the signed chat acknowledgment chain
//! - **Correlator**: fan-in of concurrent requests onto one peer round trip
//! - **Logging**: Structured logging configuration
//! - **Timeout**: Async timeout wrappers and timing constants
//! - **Metrics**: Thread-safe observability counters
//!
//! ## Security
//! - Decompression bomb protection (declared sizes are checked before inflating)
//! - Memory zeroing for key material (zeroize crate)

pub mod acknowledgment;
pub mod compression;
pub mod correlator;
pub mod crypto;
pub mod keepalive;
pub mod logging;
pub mod metrics;
pub mod timeout;

pub use acknowledgment::{LastSeenBits, MessageAcknowledgmentState};
pub use correlator::PendingCorrelation;
pub use keepalive::{KeepAlivePoll, KeepAliveResponse, KeepAliveTracker};
