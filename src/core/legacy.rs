//! Pre-netty server list ping.
//!
//! Clients older than the length-framed protocol open with a `0xFE` byte.
//! They get a single kick packet (`0xFF`, a big-endian u16 character count,
//! then UTF-16BE text) describing the server, and the socket is closed.
//! Detection happens on the very first byte, before any framing is set up.

use bytes::{BufMut, Bytes, BytesMut};

/// First byte of every legacy ping.
pub const LEGACY_PING_MARKER: u8 = 0xFE;

/// Packet id of the legacy kick response.
pub const LEGACY_KICK_ID: u8 = 0xFF;

const PING_PAYLOAD: u8 = 0x01;
const PLUGIN_MESSAGE: u8 = 0xFA;

/// Which generation of legacy client is asking.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LegacyPingVersion {
    /// Beta 1.8 through 1.3: a bare `FE`.
    Beta,
    /// 1.4 and 1.5: `FE 01`.
    V1_4,
    /// 1.6: `FE 01 FA` followed by an `MC|PingHost` plugin message.
    V1_6,
}

impl LegacyPingVersion {
    /// Classify the bytes received so far. `None` if this is not a legacy ping.
    pub fn detect(initial: &[u8]) -> Option<Self> {
        match initial {
            [LEGACY_PING_MARKER] => Some(Self::Beta),
            [LEGACY_PING_MARKER, PING_PAYLOAD] => Some(Self::V1_4),
            [LEGACY_PING_MARKER, PING_PAYLOAD, PLUGIN_MESSAGE, ..] => Some(Self::V1_6),
            [LEGACY_PING_MARKER, PING_PAYLOAD, ..] => Some(Self::V1_4),
            [LEGACY_PING_MARKER, ..] => Some(Self::Beta),
            _ => None,
        }
    }
}

/// What a legacy client is shown in its server list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LegacyStatus {
    pub protocol: i32,
    pub version: String,
    pub motd: String,
    pub online: usize,
    pub max: usize,
}

impl LegacyStatus {
    fn response_text(&self, version: LegacyPingVersion) -> String {
        match version {
            LegacyPingVersion::Beta => {
                let motd: String = self.motd.chars().filter(|c| *c != '§').collect();
                format!("{motd}§{}§{}", self.online, self.max)
            }
            LegacyPingVersion::V1_4 | LegacyPingVersion::V1_6 => format!(
                "§1\0{}\0{}\0{}\0{}\0{}",
                self.protocol, self.version, self.motd, self.online, self.max
            ),
        }
    }

    /// Encode the kick packet answering a ping of the given version.
    pub fn encode_kick(&self, version: LegacyPingVersion) -> Bytes {
        let units: Vec<u16> = self.response_text(version).encode_utf16().collect();
        let count = units.len().min(u16::MAX as usize);
        let mut buf = BytesMut::with_capacity(3 + count * 2);
        buf.put_u8(LEGACY_KICK_ID);
        buf.put_u16(count as u16);
        for unit in &units[..count] {
            buf.put_u16(*unit);
        }
        buf.freeze()
    }
}
