//! Player identity as confirmed at the end of login.

use crate::core::wire::{
    read_array, read_option, read_string, write_array, write_option, write_string, Decode, Encode,
};
use crate::error::Result;
use bytes::{Bytes, BytesMut};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub const MAX_USERNAME_LEN: usize = 16;
const MAX_PROPERTY_NAME_LEN: usize = 64;
const MAX_PROPERTY_VALUE_LEN: usize = 32_767;
const MAX_SIGNATURE_LEN: usize = 1024;

/// A signed profile property, such as the `textures` blob.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProfileProperty {
    pub name: String,
    pub value: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signature: Option<String>,
}

impl Encode for ProfileProperty {
    fn encode(&self, buf: &mut BytesMut) -> Result<()> {
        write_string(buf, &self.name, MAX_PROPERTY_NAME_LEN)?;
        write_string(buf, &self.value, MAX_PROPERTY_VALUE_LEN)?;
        write_option(buf, &self.signature, |b, s| {
            write_string(b, s, MAX_SIGNATURE_LEN)
        })
    }
}

impl Decode for ProfileProperty {
    fn decode(buf: &mut Bytes) -> Result<Self> {
        Ok(Self {
            name: read_string(buf, MAX_PROPERTY_NAME_LEN)?,
            value: read_string(buf, MAX_PROPERTY_VALUE_LEN)?,
            signature: read_option(buf, |b| read_string(b, MAX_SIGNATURE_LEN))?,
        })
    }
}

/// Who a connection belongs to, once login has settled it.
///
/// Either confirmed by the identity service or, in offline mode, derived from
/// the username alone. Never changes after it is produced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerifiedIdentity {
    pub id: Uuid,
    pub name: String,
    #[serde(default)]
    pub properties: Vec<ProfileProperty>,
}

impl VerifiedIdentity {
    pub fn new(id: Uuid, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            properties: Vec::new(),
        }
    }

    /// The signed skin/cape payload, if the identity service returned one.
    pub fn textures(&self) -> Option<&ProfileProperty> {
        self.properties.iter().find(|p| p.name == "textures")
    }
}

impl Encode for VerifiedIdentity {
    fn encode(&self, buf: &mut BytesMut) -> Result<()> {
        self.id.encode(buf)?;
        write_string(buf, &self.name, MAX_USERNAME_LEN)?;
        write_array(buf, &self.properties, |b, p| p.encode(b))
    }
}

impl Decode for VerifiedIdentity {
    fn decode(buf: &mut Bytes) -> Result<Self> {
        Ok(Self {
            id: Uuid::decode(buf)?,
            name: read_string(buf, MAX_USERNAME_LEN)?,
            properties: read_array(buf, ProfileProperty::decode)?,
        })
    }
}
