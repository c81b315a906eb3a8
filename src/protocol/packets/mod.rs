//! Packet shapes for every phase, and the two direction enums that carry them.
//!
//! Each packet is a plain struct implementing [`Encode`] and [`Decode`] for its
//! body (the id is written by the catalogue). Packets that exist in more than
//! one phase, such as keepalives or cookie requests, are a single struct that
//! the catalogue registers under a different id per phase.

pub mod common;
pub mod handshake;
pub mod login;
pub mod play;
pub mod status;

pub use common::*;
pub use handshake::*;
pub use login::*;
pub use play::*;
pub use status::*;

use crate::core::wire::{Decode, Encode};
use crate::error::Result;
use bytes::{BufMut, Bytes, BytesMut};

/// A packet id the catalogue does not model, passed through untouched.
///
/// Only the configuration and play phases carry these; they are the gameplay
/// and registry traffic owned by higher layers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawPacket {
    pub id: i32,
    pub body: Bytes,
}

impl Encode for RawPacket {
    fn encode(&self, buf: &mut BytesMut) -> Result<()> {
        buf.put_slice(&self.body);
        Ok(())
    }
}

/// Common surface of the two direction enums, used by the catalogue.
pub trait CataloguedPacket: Sized {
    /// Stable name used for catalogue and dispatcher lookups.
    fn name(&self) -> &'static str;
    fn encode_body(&self, buf: &mut BytesMut) -> Result<()>;
    fn from_raw(raw: RawPacket) -> Self;
    fn as_raw(&self) -> Option<&RawPacket>;
}

/// Decode a body as `T` and wrap it in the direction enum `P`.
pub fn decode_as<T, P>(buf: &mut Bytes) -> Result<P>
where
    T: Decode + Into<P>,
{
    T::decode(buf).map(Into::into)
}

macro_rules! packet_enum {
    (
        $(#[$meta:meta])*
        pub enum $name:ident {
            $($variant:ident($ty:ty) => $label:literal,)*
        }
    ) => {
        $(#[$meta])*
        pub enum $name {
            $($variant($ty),)*
            Raw(RawPacket),
        }

        impl CataloguedPacket for $name {
            fn name(&self) -> &'static str {
                match self {
                    $($name::$variant(_) => $label,)*
                    $name::Raw(_) => RAW_PACKET,
                }
            }

            fn encode_body(&self, buf: &mut BytesMut) -> Result<()> {
                match self {
                    $($name::$variant(packet) => packet.encode(buf),)*
                    $name::Raw(packet) => packet.encode(buf),
                }
            }

            fn from_raw(raw: RawPacket) -> Self {
                $name::Raw(raw)
            }

            fn as_raw(&self) -> Option<&RawPacket> {
                match self {
                    $name::Raw(raw) => Some(raw),
                    _ => None,
                }
            }
        }

        $(
            impl From<$ty> for $name {
                fn from(packet: $ty) -> Self {
                    $name::$variant(packet)
                }
            }
        )*
    };
}

/// Name shared by all pass-through packets.
pub const RAW_PACKET: &str = "raw";

packet_enum! {
    /// Everything a client may send.
    #[derive(Debug, Clone, PartialEq)]
    pub enum ServerboundPacket {
        Intention(ClientIntention) => "intention",
        StatusRequest(StatusRequest) => "status_request",
        PingRequest(PingRequest) => "ping_request",
        Hello(Hello) => "hello",
        EncryptionResponse(EncryptionResponse) => "encryption_response",
        LoginPluginResponse(LoginPluginResponse) => "login_plugin_response",
        LoginAcknowledged(LoginAcknowledged) => "login_acknowledged",
        CookieResponse(CookieResponse) => "cookie_response",
        ClientInformation(ClientInformation) => "client_information",
        PluginMessage(PluginMessage) => "plugin_message",
        FinishConfigurationAck(FinishConfigurationAck) => "finish_configuration_ack",
        KeepAlive(KeepAlive) => "keep_alive",
        ResourcePackResponse(ResourcePackResponse) => "resource_pack_response",
        ChatMessage(ChatMessage) => "chat_message",
        MessageAcknowledgment(MessageAcknowledgment) => "message_acknowledgment",
        PlayerSession(PlayerSession) => "player_session",
        ConfigurationAcknowledged(ConfigurationAcknowledged) => "configuration_acknowledged",
    }
}

impl ServerboundPacket {
    /// Packets after which the inbound pipeline may change (state, compression
    /// or cipher). The reader pauses after each until the tick context has
    /// handled it, so the next frame is decoded under the right settings.
    pub fn switches_pipeline(&self) -> bool {
        matches!(
            self,
            ServerboundPacket::Intention(_)
                | ServerboundPacket::Hello(_)
                | ServerboundPacket::EncryptionResponse(_)
                | ServerboundPacket::LoginAcknowledged(_)
                | ServerboundPacket::FinishConfigurationAck(_)
                | ServerboundPacket::ConfigurationAcknowledged(_)
        )
    }
}

packet_enum! {
    /// Everything the server may send.
    #[derive(Debug, Clone, PartialEq)]
    pub enum ClientboundPacket {
        StatusResponse(StatusResponse) => "status_response",
        PongResponse(PongResponse) => "pong_response",
        LoginDisconnect(LoginDisconnect) => "login_disconnect",
        EncryptionRequest(EncryptionRequest) => "encryption_request",
        LoginSuccess(LoginSuccess) => "login_success",
        SetCompression(SetCompression) => "set_compression",
        LoginPluginRequest(LoginPluginRequest) => "login_plugin_request",
        CookieRequest(CookieRequest) => "cookie_request",
        PluginMessage(PluginMessage) => "plugin_message",
        Disconnect(Disconnect) => "disconnect",
        FinishConfiguration(FinishConfiguration) => "finish_configuration",
        KeepAlive(KeepAlive) => "keep_alive",
        AddResourcePack(AddResourcePack) => "add_resource_pack",
        RemoveResourcePack(RemoveResourcePack) => "remove_resource_pack",
        StoreCookie(StoreCookie) => "store_cookie",
        Transfer(Transfer) => "transfer",
        StartConfiguration(StartConfiguration) => "start_configuration",
    }
}

impl ClientboundPacket {
    /// The disconnect packet for a phase, if that phase has one.
    pub fn disconnect_for(
        state: crate::protocol::state::ConnectionState,
        reason: crate::core::text::TextComponent,
    ) -> Option<Self> {
        use crate::protocol::state::ConnectionState;
        match state {
            ConnectionState::Login => Some(LoginDisconnect { reason }.into()),
            ConnectionState::Configuration | ConnectionState::Play => {
                Some(Disconnect { reason }.into())
            }
            _ => None,
        }
    }
}
