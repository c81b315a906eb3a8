//! Message acknowledgment chain.
//!
//! Every signed chat message the server relays to a client is tracked here.
//! The client periodically reports an offset (how many tracked messages it
//! has moved past) and a bitset saying which of the next messages it has seen.
//!
//! Offsets are absolute and never move backwards. An offset may only advance
//! over messages that were actually tracked, and a bitset may only refer to
//! tracked messages inside the window. Anything else is a chat validation
//! failure and ends the connection.

use crate::core::wire::{ensure, Decode, Encode};
use crate::error::{constants, ProtocolError, Result};
use crate::protocol::packets::MessageSignature;
use bytes::{Buf, BufMut, Bytes, BytesMut};
use std::collections::VecDeque;

/// Number of recent messages a client acknowledges per update.
pub const ACK_WINDOW: usize = 20;

/// Untracked backlog after which the client is considered to be ignoring acknowledgments.
pub const MAX_PENDING: usize = 4096;

const BITSET_BYTES: usize = ACK_WINDOW.div_ceil(8);
const WINDOW_MASK: u32 = (1 << ACK_WINDOW) - 1;

/// The fixed 20-bit "last seen" bitset carried by chat packets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct LastSeenBits(u32);

impl LastSeenBits {
    pub fn from_bits(bits: u32) -> Result<Self> {
        if bits & !WINDOW_MASK != 0 {
            return Err(ProtocolError::MalformedPacket(format!(
                "Acknowledgment bits {bits:#x} exceed the {ACK_WINDOW}-bit window"
            )));
        }
        Ok(Self(bits))
    }

    pub fn bits(self) -> u32 {
        self.0
    }

    pub fn is_set(self, index: usize) -> bool {
        index < ACK_WINDOW && self.0 & (1 << index) != 0
    }

    pub fn count(self) -> usize {
        self.0.count_ones() as usize
    }

    pub fn iter(self) -> impl Iterator<Item = usize> {
        (0..ACK_WINDOW).filter(move |&i| self.is_set(i))
    }
}

// Little-endian bit order: bit 0 is the lowest bit of the first byte.
impl Encode for LastSeenBits {
    fn encode(&self, buf: &mut BytesMut) -> Result<()> {
        buf.put_slice(&self.0.to_le_bytes()[..BITSET_BYTES]);
        Ok(())
    }
}

impl Decode for LastSeenBits {
    fn decode(buf: &mut Bytes) -> Result<Self> {
        ensure(buf, BITSET_BYTES)?;
        let mut raw = [0u8; 4];
        buf.copy_to_slice(&mut raw[..BITSET_BYTES]);
        LastSeenBits::from_bits(u32::from_le_bytes(raw))
    }
}

/// Monotonic offset plus the messages still awaiting acknowledgment.
#[derive(Debug, Default)]
pub struct MessageAcknowledgmentState {
    offset: u64,
    pending: VecDeque<MessageSignature>,
}

impl MessageAcknowledgmentState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn offset(&self) -> u64 {
        self.offset
    }

    pub fn pending(&self) -> usize {
        self.pending.len()
    }

    /// Record a signed message relayed to this client.
    pub fn track(&mut self, signature: MessageSignature) -> Result<()> {
        if self.pending.len() >= MAX_PENDING {
            return Err(ProtocolError::ChatValidationFailure(format!(
                "{} messages left unacknowledged",
                self.pending.len()
            )));
        }
        self.pending.push_back(signature);
        Ok(())
    }

    /// Move the offset to `offset`, dropping the messages it passes over.
    ///
    /// Returns how many messages were retired.
    pub fn apply_offset(&mut self, offset: i32) -> Result<usize> {
        let offset = u64::try_from(offset).map_err(|_| {
            ProtocolError::ChatValidationFailure(constants::ERR_OFFSET_REGRESSED.into())
        })?;
        if offset < self.offset {
            return Err(ProtocolError::ChatValidationFailure(format!(
                "{} ({} < {})",
                constants::ERR_OFFSET_REGRESSED,
                offset,
                self.offset
            )));
        }
        let advance = offset - self.offset;
        if advance > self.pending.len() as u64 {
            return Err(ProtocolError::ChatValidationFailure(format!(
                "{} ({} > {})",
                constants::ERR_OFFSET_AHEAD,
                advance,
                self.pending.len()
            )));
        }
        let advance = advance as usize;
        self.pending.drain(..advance);
        self.offset = offset;
        Ok(advance)
    }

    /// Apply a chat packet's offset and bitset.
    ///
    /// Returns the signatures the client vouches for, oldest first.
    pub fn apply_update(
        &mut self,
        offset: i32,
        acknowledged: LastSeenBits,
    ) -> Result<Vec<MessageSignature>> {
        self.apply_offset(offset)?;
        acknowledged
            .iter()
            .map(|index| {
                self.pending.get(index).copied().ok_or_else(|| {
                    ProtocolError::ChatValidationFailure(format!(
                        "{} (bit {index})",
                        constants::ERR_ACK_OUT_OF_WINDOW
                    ))
                })
            })
            .collect()
    }

    pub fn clear(&mut self) {
        self.pending.clear();
    }
}
