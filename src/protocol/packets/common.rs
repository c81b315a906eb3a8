//! Packets shared by the configuration and play phases (some also by login).

use crate::core::text::TextComponent;
use crate::core::varint::{read_varint, write_varint};
use crate::core::wire::{
    read_byte_array, read_enum, read_option, read_remaining, read_string, write_byte_array,
    write_option, write_string, Decode, Encode, Identifier, MAX_STRING_LEN,
};
use crate::error::Result;
use bytes::{BufMut, Bytes, BytesMut};
use uuid::Uuid;

/// Largest cookie payload a client will store.
pub const MAX_COOKIE_LEN: usize = 5120;
const MAX_PLUGIN_PAYLOAD: usize = 1_048_576;
const MAX_LOCALE_LEN: usize = 16;
const MAX_PACK_HASH_LEN: usize = 40;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CookieRequest {
    pub key: Identifier,
}

impl Encode for CookieRequest {
    fn encode(&self, buf: &mut BytesMut) -> Result<()> {
        self.key.encode(buf)
    }
}

impl Decode for CookieRequest {
    fn decode(buf: &mut Bytes) -> Result<Self> {
        Ok(Self {
            key: Identifier::decode(buf)?,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CookieResponse {
    pub key: Identifier,
    pub payload: Option<Bytes>,
}

impl CookieResponse {
    /// The stored value; an empty payload counts as no cookie.
    pub fn value(&self) -> Option<Bytes> {
        self.payload.clone().filter(|payload| !payload.is_empty())
    }
}

impl Encode for CookieResponse {
    fn encode(&self, buf: &mut BytesMut) -> Result<()> {
        self.key.encode(buf)?;
        write_option(buf, &self.payload, |b, p| write_byte_array(b, p))
    }
}

impl Decode for CookieResponse {
    fn decode(buf: &mut Bytes) -> Result<Self> {
        Ok(Self {
            key: Identifier::decode(buf)?,
            payload: read_option(buf, |b| read_byte_array(b, MAX_COOKIE_LEN))?,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreCookie {
    pub key: Identifier,
    pub payload: Bytes,
}

impl Encode for StoreCookie {
    fn encode(&self, buf: &mut BytesMut) -> Result<()> {
        self.key.encode(buf)?;
        write_byte_array(buf, &self.payload)
    }
}

impl Decode for StoreCookie {
    fn decode(buf: &mut Bytes) -> Result<Self> {
        Ok(Self {
            key: Identifier::decode(buf)?,
            payload: read_byte_array(buf, MAX_COOKIE_LEN)?,
        })
    }
}

/// Ask the client to reconnect to another server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transfer {
    pub host: String,
    pub port: i32,
}

impl Encode for Transfer {
    fn encode(&self, buf: &mut BytesMut) -> Result<()> {
        write_string(buf, &self.host, MAX_STRING_LEN)?;
        write_varint(buf, self.port);
        Ok(())
    }
}

impl Decode for Transfer {
    fn decode(buf: &mut Bytes) -> Result<Self> {
        Ok(Self {
            host: read_string(buf, MAX_STRING_LEN)?,
            port: read_varint(buf)?,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeepAlive {
    pub id: i64,
}

impl Encode for KeepAlive {
    fn encode(&self, buf: &mut BytesMut) -> Result<()> {
        self.id.encode(buf)
    }
}

impl Decode for KeepAlive {
    fn decode(buf: &mut Bytes) -> Result<Self> {
        Ok(Self {
            id: i64::decode(buf)?,
        })
    }
}

/// A custom payload on a named channel; the data runs to the end of the packet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PluginMessage {
    pub channel: Identifier,
    pub data: Bytes,
}

impl Encode for PluginMessage {
    fn encode(&self, buf: &mut BytesMut) -> Result<()> {
        self.channel.encode(buf)?;
        buf.put_slice(&self.data);
        Ok(())
    }
}

impl Decode for PluginMessage {
    fn decode(buf: &mut Bytes) -> Result<Self> {
        Ok(Self {
            channel: Identifier::decode(buf)?,
            data: read_remaining(buf, MAX_PLUGIN_PAYLOAD)?,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChatVisibility {
    Full,
    System,
    Hidden,
}

impl ChatVisibility {
    fn from_id(id: i32) -> Option<Self> {
        match id {
            0 => Some(Self::Full),
            1 => Some(Self::System),
            2 => Some(Self::Hidden),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MainHand {
    Left,
    Right,
}

impl MainHand {
    fn from_id(id: i32) -> Option<Self> {
        match id {
            0 => Some(Self::Left),
            1 => Some(Self::Right),
            _ => None,
        }
    }
}

/// Client settings, sent on entering configuration and whenever they change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientInformation {
    pub locale: String,
    pub view_distance: i8,
    pub chat_visibility: ChatVisibility,
    pub chat_colors: bool,
    pub displayed_skin_parts: u8,
    pub main_hand: MainHand,
    pub text_filtering: bool,
    pub allows_listing: bool,
}

impl Default for ClientInformation {
    fn default() -> Self {
        Self {
            locale: "en_us".into(),
            view_distance: 2,
            chat_visibility: ChatVisibility::Full,
            chat_colors: true,
            displayed_skin_parts: 0,
            main_hand: MainHand::Right,
            text_filtering: false,
            allows_listing: false,
        }
    }
}

impl Encode for ClientInformation {
    fn encode(&self, buf: &mut BytesMut) -> Result<()> {
        write_string(buf, &self.locale, MAX_LOCALE_LEN)?;
        self.view_distance.encode(buf)?;
        write_varint(buf, self.chat_visibility as i32);
        self.chat_colors.encode(buf)?;
        self.displayed_skin_parts.encode(buf)?;
        write_varint(buf, self.main_hand as i32);
        self.text_filtering.encode(buf)?;
        self.allows_listing.encode(buf)
    }
}

impl Decode for ClientInformation {
    fn decode(buf: &mut Bytes) -> Result<Self> {
        Ok(Self {
            locale: read_string(buf, MAX_LOCALE_LEN)?,
            view_distance: i8::decode(buf)?,
            chat_visibility: read_enum(buf, ChatVisibility::from_id)?,
            chat_colors: bool::decode(buf)?,
            displayed_skin_parts: u8::decode(buf)?,
            main_hand: read_enum(buf, MainHand::from_id)?,
            text_filtering: bool::decode(buf)?,
            allows_listing: bool::decode(buf)?,
        })
    }
}

/// Configuration/play disconnect; the reason travels as network NBT.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Disconnect {
    pub reason: TextComponent,
}

impl Encode for Disconnect {
    fn encode(&self, buf: &mut BytesMut) -> Result<()> {
        self.reason.write_nbt(buf)
    }
}

impl Decode for Disconnect {
    fn decode(buf: &mut Bytes) -> Result<Self> {
        Ok(Self {
            reason: TextComponent::read_nbt(buf)?,
        })
    }
}

macro_rules! empty_packet {
    ($($(#[$meta:meta])* $name:ident;)*) => {
        $(
            $(#[$meta])*
            #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
            pub struct $name;

            impl Encode for $name {
                fn encode(&self, _buf: &mut BytesMut) -> Result<()> {
                    Ok(())
                }
            }

            impl Decode for $name {
                fn decode(_buf: &mut Bytes) -> Result<Self> {
                    Ok($name)
                }
            }
        )*
    };
}

empty_packet! {
    /// Server is done configuring; the client answers with [`FinishConfigurationAck`].
    FinishConfiguration;
    FinishConfigurationAck;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddResourcePack {
    pub id: Uuid,
    pub url: String,
    pub hash: String,
    pub forced: bool,
    pub prompt: Option<TextComponent>,
}

impl Encode for AddResourcePack {
    fn encode(&self, buf: &mut BytesMut) -> Result<()> {
        self.id.encode(buf)?;
        write_string(buf, &self.url, MAX_STRING_LEN)?;
        write_string(buf, &self.hash, MAX_PACK_HASH_LEN)?;
        self.forced.encode(buf)?;
        write_option(buf, &self.prompt, |b, p| p.write_nbt(b))
    }
}

impl Decode for AddResourcePack {
    fn decode(buf: &mut Bytes) -> Result<Self> {
        Ok(Self {
            id: Uuid::decode(buf)?,
            url: read_string(buf, MAX_STRING_LEN)?,
            hash: read_string(buf, MAX_PACK_HASH_LEN)?,
            forced: bool::decode(buf)?,
            prompt: read_option(buf, TextComponent::read_nbt)?,
        })
    }
}

/// Remove one pack, or every pack when `id` is absent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoveResourcePack {
    pub id: Option<Uuid>,
}

impl Encode for RemoveResourcePack {
    fn encode(&self, buf: &mut BytesMut) -> Result<()> {
        write_option(buf, &self.id, |b, id| id.encode(b))
    }
}

impl Decode for RemoveResourcePack {
    fn decode(buf: &mut Bytes) -> Result<Self> {
        Ok(Self {
            id: read_option(buf, Uuid::decode)?,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourcePackStatus {
    SuccessfullyLoaded,
    Declined,
    FailedDownload,
    Accepted,
    Downloaded,
    InvalidUrl,
    FailedReload,
    Discarded,
}

impl ResourcePackStatus {
    fn from_id(id: i32) -> Option<Self> {
        use ResourcePackStatus::*;
        [
            SuccessfullyLoaded,
            Declined,
            FailedDownload,
            Accepted,
            Downloaded,
            InvalidUrl,
            FailedReload,
            Discarded,
        ]
        .get(usize::try_from(id).ok()?)
        .copied()
    }

    /// Whether this is the last status the client reports for a pack.
    pub fn is_terminal(self) -> bool {
        !matches!(
            self,
            ResourcePackStatus::Accepted | ResourcePackStatus::Downloaded
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResourcePackResponse {
    pub id: Uuid,
    pub status: ResourcePackStatus,
}

impl Encode for ResourcePackResponse {
    fn encode(&self, buf: &mut BytesMut) -> Result<()> {
        self.id.encode(buf)?;
        write_varint(buf, self.status as i32);
        Ok(())
    }
}

impl Decode for ResourcePackResponse {
    fn decode(buf: &mut Bytes) -> Result<Self> {
        Ok(Self {
            id: Uuid::decode(buf)?,
            status: read_enum(buf, ResourcePackStatus::from_id)?,
        })
    }
}
