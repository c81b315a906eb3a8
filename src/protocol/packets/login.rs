use crate::core::text::TextComponent;
use crate::core::varint::{read_varint, write_varint};
use crate::core::wire::{
    read_byte_array, read_option, read_remaining, read_string, write_byte_array, write_option,
    write_string, Decode, Encode, Identifier,
};
use crate::error::Result;
use crate::protocol::profile::{VerifiedIdentity, MAX_USERNAME_LEN};
use bytes::{BufMut, Bytes, BytesMut};
use uuid::Uuid;

const MAX_SERVER_ID_LEN: usize = 20;
const MAX_KEY_BYTES: usize = 1024;
const MAX_ENCRYPTED_BYTES: usize = 512;
const MAX_REASON_LEN: usize = 262_144;
const MAX_LOGIN_PAYLOAD: usize = 1_048_576;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Hello {
    pub name: String,
    pub profile_id: Uuid,
}

impl Encode for Hello {
    fn encode(&self, buf: &mut BytesMut) -> Result<()> {
        write_string(buf, &self.name, MAX_USERNAME_LEN)?;
        self.profile_id.encode(buf)
    }
}

impl Decode for Hello {
    fn decode(buf: &mut Bytes) -> Result<Self> {
        Ok(Self {
            name: read_string(buf, MAX_USERNAME_LEN)?,
            profile_id: Uuid::decode(buf)?,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncryptionRequest {
    pub server_id: String,
    pub public_key: Bytes,
    pub verify_token: Bytes,
    pub should_authenticate: bool,
}

impl Encode for EncryptionRequest {
    fn encode(&self, buf: &mut BytesMut) -> Result<()> {
        write_string(buf, &self.server_id, MAX_SERVER_ID_LEN)?;
        write_byte_array(buf, &self.public_key)?;
        write_byte_array(buf, &self.verify_token)?;
        self.should_authenticate.encode(buf)
    }
}

impl Decode for EncryptionRequest {
    fn decode(buf: &mut Bytes) -> Result<Self> {
        Ok(Self {
            server_id: read_string(buf, MAX_SERVER_ID_LEN)?,
            public_key: read_byte_array(buf, MAX_KEY_BYTES)?,
            verify_token: read_byte_array(buf, MAX_ENCRYPTED_BYTES)?,
            should_authenticate: bool::decode(buf)?,
        })
    }
}

/// Shared secret and verify token, both encrypted with the server's public key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncryptionResponse {
    pub shared_secret: Bytes,
    pub verify_token: Bytes,
}

impl Encode for EncryptionResponse {
    fn encode(&self, buf: &mut BytesMut) -> Result<()> {
        write_byte_array(buf, &self.shared_secret)?;
        write_byte_array(buf, &self.verify_token)
    }
}

impl Decode for EncryptionResponse {
    fn decode(buf: &mut Bytes) -> Result<Self> {
        Ok(Self {
            shared_secret: read_byte_array(buf, MAX_ENCRYPTED_BYTES)?,
            verify_token: read_byte_array(buf, MAX_ENCRYPTED_BYTES)?,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoginSuccess {
    pub profile: VerifiedIdentity,
    pub strict_error_handling: bool,
}

impl Encode for LoginSuccess {
    fn encode(&self, buf: &mut BytesMut) -> Result<()> {
        self.profile.encode(buf)?;
        self.strict_error_handling.encode(buf)
    }
}

impl Decode for LoginSuccess {
    fn decode(buf: &mut Bytes) -> Result<Self> {
        Ok(Self {
            profile: VerifiedIdentity::decode(buf)?,
            strict_error_handling: bool::decode(buf)?,
        })
    }
}

/// Announces the threshold; every frame after this one carries a compression header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SetCompression {
    pub threshold: i32,
}

impl Encode for SetCompression {
    fn encode(&self, buf: &mut BytesMut) -> Result<()> {
        write_varint(buf, self.threshold);
        Ok(())
    }
}

impl Decode for SetCompression {
    fn decode(buf: &mut Bytes) -> Result<Self> {
        Ok(Self {
            threshold: read_varint(buf)?,
        })
    }
}

/// Login-phase disconnect; the reason travels as JSON.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoginDisconnect {
    pub reason: TextComponent,
}

impl Encode for LoginDisconnect {
    fn encode(&self, buf: &mut BytesMut) -> Result<()> {
        write_string(buf, &self.reason.to_json(), MAX_REASON_LEN)
    }
}

impl Decode for LoginDisconnect {
    fn decode(buf: &mut Bytes) -> Result<Self> {
        let json = read_string(buf, MAX_REASON_LEN)?;
        Ok(Self {
            reason: TextComponent::from_json(&json)?,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoginPluginRequest {
    pub message_id: i32,
    pub channel: Identifier,
    pub data: Bytes,
}

impl Encode for LoginPluginRequest {
    fn encode(&self, buf: &mut BytesMut) -> Result<()> {
        write_varint(buf, self.message_id);
        self.channel.encode(buf)?;
        buf.put_slice(&self.data);
        Ok(())
    }
}

impl Decode for LoginPluginRequest {
    fn decode(buf: &mut Bytes) -> Result<Self> {
        Ok(Self {
            message_id: read_varint(buf)?,
            channel: Identifier::decode(buf)?,
            data: read_remaining(buf, MAX_LOGIN_PAYLOAD)?,
        })
    }
}

/// `data` is absent when the client did not understand the request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoginPluginResponse {
    pub message_id: i32,
    pub data: Option<Bytes>,
}

impl Encode for LoginPluginResponse {
    fn encode(&self, buf: &mut BytesMut) -> Result<()> {
        write_varint(buf, self.message_id);
        write_option(buf, &self.data, |b, data| {
            b.put_slice(data);
            Ok(())
        })
    }
}

impl Decode for LoginPluginResponse {
    fn decode(buf: &mut Bytes) -> Result<Self> {
        Ok(Self {
            message_id: read_varint(buf)?,
            data: read_option(buf, |b| read_remaining(b, MAX_LOGIN_PAYLOAD))?,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LoginAcknowledged;

impl Encode for LoginAcknowledged {
    fn encode(&self, _buf: &mut BytesMut) -> Result<()> {
        Ok(())
    }
}

impl Decode for LoginAcknowledged {
    fn decode(_buf: &mut Bytes) -> Result<Self> {
        Ok(LoginAcknowledged)
    }
}
