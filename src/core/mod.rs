//! # Core Protocol Components
//!
//! Wire primitives, the frame transform pipeline, and the legacy ping codec.
//!
//! This module provides the foundation for the protocol: how integers, strings
//! and identifiers are laid out, and how packet bodies become frames on the
//! socket.
//!
//! ## Components
//! - **VarInt**: 7-bit variable-length integers used for every length and id
//! - **Wire**: `Encode`/`Decode` for fixed-width numbers, strings, arrays, UUIDs
//! - **Text**: chat components as JSON (login) or network NBT (later phases)
//! - **Codec**: Tokio codecs for framing, zlib compression and the CFB8 cipher
//! - **Legacy**: the pre-framing `0xFE` server list ping
//!
//! ## Wire Format
//! ```text
//! uncompressed:  [Length(varint)] [PacketId(varint)] [Body]
//! compressed:    [Length(varint)] [DataLength(varint), 0 if raw] [zlib(PacketId + Body)]
//! encrypted:     every byte above, AES-128/CFB8, in stream order
//! ```
//!
//! ## Security
//! - Maximum frame size: 2 097 151 bytes (3-byte length prefix)
//! - Length validation before allocation
//! - Inflated size must equal the declared size exactly

pub mod codec;
pub mod legacy;
pub mod text;
pub mod varint;
pub mod wire;
