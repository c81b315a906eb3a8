use crate::core::varint::{read_varint, write_varint};
use crate::core::wire::{read_enum, read_string, write_string, Decode, Encode};
use crate::error::Result;
use crate::protocol::state::Intent;
use bytes::{Bytes, BytesMut};

const MAX_HOST_LEN: usize = 255;

/// The first packet of every modern connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientIntention {
    pub protocol_version: i32,
    pub host: String,
    pub port: u16,
    pub intent: Intent,
}

impl Encode for ClientIntention {
    fn encode(&self, buf: &mut BytesMut) -> Result<()> {
        write_varint(buf, self.protocol_version);
        write_string(buf, &self.host, MAX_HOST_LEN)?;
        self.port.encode(buf)?;
        write_varint(buf, self.intent.id());
        Ok(())
    }
}

impl Decode for ClientIntention {
    fn decode(buf: &mut Bytes) -> Result<Self> {
        Ok(Self {
            protocol_version: read_varint(buf)?,
            host: read_string(buf, MAX_HOST_LEN)?,
            port: u16::decode(buf)?,
            intent: read_enum(buf, Intent::from_id)?,
        })
    }
}
