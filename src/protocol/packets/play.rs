use crate::core::varint::{read_varint, write_varint};
use crate::core::wire::{
    ensure, read_byte_array, read_option, read_string, write_byte_array, write_option,
    write_string, Decode, Encode,
};
use crate::error::Result;
use crate::utils::acknowledgment::LastSeenBits;
use bytes::{Buf, BufMut, Bytes, BytesMut};
use std::fmt;
use uuid::Uuid;

const MAX_CHAT_LEN: usize = 256;
const MAX_PUBLIC_KEY_LEN: usize = 512;
const MAX_KEY_SIGNATURE_LEN: usize = 4096;

/// Length of an RSA-2048 message signature.
pub const SIGNATURE_LEN: usize = 256;

#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct MessageSignature(pub [u8; SIGNATURE_LEN]);

impl fmt::Debug for MessageSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "MessageSignature({:02x}{:02x}{:02x}{:02x}..)",
            self.0[0], self.0[1], self.0[2], self.0[3]
        )
    }
}

impl Encode for MessageSignature {
    fn encode(&self, buf: &mut BytesMut) -> Result<()> {
        buf.put_slice(&self.0);
        Ok(())
    }
}

impl Decode for MessageSignature {
    fn decode(buf: &mut Bytes) -> Result<Self> {
        ensure(buf, SIGNATURE_LEN)?;
        let mut signature = [0u8; SIGNATURE_LEN];
        buf.copy_to_slice(&mut signature);
        Ok(MessageSignature(signature))
    }
}

/// A player chat message with its place in the acknowledgment chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatMessage {
    pub message: String,
    pub timestamp: i64,
    pub salt: i64,
    pub signature: Option<MessageSignature>,
    pub offset: i32,
    pub acknowledged: LastSeenBits,
}

impl Encode for ChatMessage {
    fn encode(&self, buf: &mut BytesMut) -> Result<()> {
        write_string(buf, &self.message, MAX_CHAT_LEN)?;
        self.timestamp.encode(buf)?;
        self.salt.encode(buf)?;
        write_option(buf, &self.signature, |b, s| s.encode(b))?;
        write_varint(buf, self.offset);
        self.acknowledged.encode(buf)
    }
}

impl Decode for ChatMessage {
    fn decode(buf: &mut Bytes) -> Result<Self> {
        Ok(Self {
            message: read_string(buf, MAX_CHAT_LEN)?,
            timestamp: i64::decode(buf)?,
            salt: i64::decode(buf)?,
            signature: read_option(buf, MessageSignature::decode)?,
            offset: read_varint(buf)?,
            acknowledged: LastSeenBits::decode(buf)?,
        })
    }
}

/// Sent when the client has seen messages but has nothing to say.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MessageAcknowledgment {
    pub offset: i32,
}

impl Encode for MessageAcknowledgment {
    fn encode(&self, buf: &mut BytesMut) -> Result<()> {
        write_varint(buf, self.offset);
        Ok(())
    }
}

impl Decode for MessageAcknowledgment {
    fn decode(buf: &mut Bytes) -> Result<Self> {
        Ok(Self {
            offset: read_varint(buf)?,
        })
    }
}

/// The chat signing key the client will use, with its expiry in epoch milliseconds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlayerSession {
    pub session_id: Uuid,
    pub expires_at: i64,
    pub public_key: Bytes,
    pub key_signature: Bytes,
}

impl Encode for PlayerSession {
    fn encode(&self, buf: &mut BytesMut) -> Result<()> {
        self.session_id.encode(buf)?;
        self.expires_at.encode(buf)?;
        write_byte_array(buf, &self.public_key)?;
        write_byte_array(buf, &self.key_signature)
    }
}

impl Decode for PlayerSession {
    fn decode(buf: &mut Bytes) -> Result<Self> {
        Ok(Self {
            session_id: Uuid::decode(buf)?,
            expires_at: i64::decode(buf)?,
            public_key: read_byte_array(buf, MAX_PUBLIC_KEY_LEN)?,
            key_signature: read_byte_array(buf, MAX_KEY_SIGNATURE_LEN)?,
        })
    }
}

/// Client agrees to leave play for configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ConfigurationAcknowledged;

impl Encode for ConfigurationAcknowledged {
    fn encode(&self, _buf: &mut BytesMut) -> Result<()> {
        Ok(())
    }
}

impl Decode for ConfigurationAcknowledged {
    fn decode(_buf: &mut Bytes) -> Result<Self> {
        Ok(ConfigurationAcknowledged)
    }
}

/// Server asks a playing client to return to configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StartConfiguration;

impl Encode for StartConfiguration {
    fn encode(&self, _buf: &mut BytesMut) -> Result<()> {
        Ok(())
    }
}

impl Decode for StartConfiguration {
    fn decode(_buf: &mut Bytes) -> Result<Self> {
        Ok(StartConfiguration)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_chat_message_layout() {
        let message = ChatMessage {
            message: "hello".into(),
            timestamp: 1_700_000_000_000,
            salt: -7,
            signature: Some(MessageSignature([0xAB; SIGNATURE_LEN])),
            offset: 3,
            acknowledged: LastSeenBits::from_bits(0b101).unwrap(),
        };

        let mut buf = BytesMut::new();
        message.encode(&mut buf).unwrap();
        // string(1+5) + i64 + i64 + option(1+256) + varint(1) + 3 bitset bytes
        assert_eq!(buf.len(), 6 + 8 + 8 + 257 + 1 + 3);

        let mut bytes = buf.freeze();
        assert_eq!(ChatMessage::decode(&mut bytes).unwrap(), message);
        assert!(bytes.is_empty());
    }

    #[test]
    fn test_truncated_signature_is_malformed() {
        let mut buf = BytesMut::new();
        buf.put_u8(1);
        buf.put_slice(&[0u8; 100]);
        let mut bytes = buf.freeze();
        assert!(read_option(&mut bytes, MessageSignature::decode).is_err());
    }

    #[test]
    fn test_player_session_rejects_oversized_key() {
        let mut buf = BytesMut::new();
        Uuid::nil().encode(&mut buf).unwrap();
        0i64.encode(&mut buf).unwrap();
        write_byte_array(&mut buf, &[0u8; MAX_PUBLIC_KEY_LEN + 1]).unwrap();
        let mut bytes = buf.freeze();
        assert!(PlayerSession::decode(&mut bytes).is_err());
    }
}
