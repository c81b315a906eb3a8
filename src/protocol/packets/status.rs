use crate::core::text::TextComponent;
use crate::core::wire::{Decode, Encode};
use crate::error::{ProtocolError, Result};
use bytes::{Bytes, BytesMut};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StatusRequest;

impl Encode for StatusRequest {
    fn encode(&self, _buf: &mut BytesMut) -> Result<()> {
        Ok(())
    }
}

impl Decode for StatusRequest {
    fn decode(_buf: &mut Bytes) -> Result<Self> {
        Ok(StatusRequest)
    }
}

/// The server list entry, as a JSON document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusResponse {
    pub json: String,
}

impl StatusResponse {
    pub fn from_status(status: &ServerStatus) -> Result<Self> {
        serde_json::to_string(status)
            .map(|json| Self { json })
            .map_err(|e| ProtocolError::Custom(format!("Failed to serialize status: {e}")))
    }

    pub fn status(&self) -> Result<ServerStatus> {
        serde_json::from_str(&self.json)
            .map_err(|e| ProtocolError::MalformedPacket(format!("Invalid status JSON: {e}")))
    }
}

impl Encode for StatusResponse {
    fn encode(&self, buf: &mut BytesMut) -> Result<()> {
        self.json.encode(buf)
    }
}

impl Decode for StatusResponse {
    fn decode(buf: &mut Bytes) -> Result<Self> {
        Ok(Self {
            json: String::decode(buf)?,
        })
    }
}

/// Sent in Status and Play; the server echoes the payload back.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PingRequest {
    pub payload: i64,
}

impl Encode for PingRequest {
    fn encode(&self, buf: &mut BytesMut) -> Result<()> {
        self.payload.encode(buf)
    }
}

impl Decode for PingRequest {
    fn decode(buf: &mut Bytes) -> Result<Self> {
        Ok(Self {
            payload: i64::decode(buf)?,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PongResponse {
    pub payload: i64,
}

impl Encode for PongResponse {
    fn encode(&self, buf: &mut BytesMut) -> Result<()> {
        self.payload.encode(buf)
    }
}

impl Decode for PongResponse {
    fn decode(buf: &mut Bytes) -> Result<Self> {
        Ok(Self {
            payload: i64::decode(buf)?,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusVersion {
    pub name: String,
    pub protocol: i32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayerSample {
    pub name: String,
    pub id: Uuid,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusPlayers {
    pub max: usize,
    pub online: usize,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub sample: Vec<PlayerSample>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerStatus {
    pub version: StatusVersion,
    pub players: StatusPlayers,
    pub description: TextComponent,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub favicon: Option<String>,
    #[serde(rename = "enforcesSecureChat", default)]
    pub enforces_secure_chat: bool,
}
