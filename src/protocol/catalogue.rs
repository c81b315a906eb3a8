//! The packet catalogue: `(state, direction, id)` to packet shape.
//!
//! Tables are populated explicitly by [`PacketCatalogue::standard`] at startup
//! and never change afterwards, so one catalogue is shared by every connection
//! behind an `Arc`.
//!
//! Decoding an id the catalogue does not know is fatal during handshake,
//! status and login. In configuration and play the body is passed through as a
//! [`RawPacket`] for higher layers, since those phases carry gameplay traffic
//! this crate does not model.

use crate::core::varint::{read_varint, write_varint};
use crate::error::{constants, ProtocolError, Result};
use crate::protocol::packets::*;
use crate::protocol::state::{ConnectionState, PacketFlow};
use bytes::{Buf, Bytes, BytesMut};
use std::collections::HashMap;
use tracing::trace;

type DecodeFn<P> = fn(&mut Bytes) -> Result<P>;

/// One registered packet.
#[derive(Debug)]
pub struct PacketDescriptor<P> {
    pub id: i32,
    pub name: &'static str,
    pub flow: PacketFlow,
    pub state: ConnectionState,
    decode: DecodeFn<P>,
}

impl<P> PacketDescriptor<P> {
    pub fn decode(&self, body: &mut Bytes) -> Result<P> {
        (self.decode)(body)
    }
}

#[derive(Debug)]
struct StateTable<P> {
    by_id: HashMap<i32, PacketDescriptor<P>>,
    by_name: HashMap<&'static str, i32>,
}

impl<P> Default for StateTable<P> {
    fn default() -> Self {
        Self {
            by_id: HashMap::new(),
            by_name: HashMap::new(),
        }
    }
}

#[derive(Debug)]
struct DirectionTables<P> {
    flow: PacketFlow,
    states: HashMap<ConnectionState, StateTable<P>>,
}

impl<P: CataloguedPacket> DirectionTables<P> {
    fn new(flow: PacketFlow) -> Self {
        Self {
            flow,
            states: HashMap::new(),
        }
    }

    fn register(
        &mut self,
        state: ConnectionState,
        id: i32,
        name: &'static str,
        decode: DecodeFn<P>,
    ) -> Result<()> {
        let table = self.states.entry(state).or_default();
        if table.by_id.contains_key(&id) || table.by_name.contains_key(name) {
            return Err(ProtocolError::ConfigError(format!(
                "Duplicate {:?} packet {name} ({id:#04x}) in state {state}",
                self.flow
            )));
        }
        table.by_name.insert(name, id);
        table.by_id.insert(
            id,
            PacketDescriptor {
                id,
                name,
                flow: self.flow,
                state,
                decode,
            },
        );
        Ok(())
    }

    fn decode(&self, state: ConnectionState, mut frame: Bytes) -> Result<P> {
        let id = read_varint(&mut frame)?;
        let descriptor = self
            .states
            .get(&state)
            .and_then(|table| table.by_id.get(&id));

        let Some(descriptor) = descriptor else {
            return if passes_raw(state) {
                trace!(%state, id, "Passing through unmodelled packet");
                Ok(P::from_raw(RawPacket { id, body: frame }))
            } else {
                Err(ProtocolError::UnknownPacket { state, id })
            };
        };

        let packet = descriptor.decode(&mut frame)?;
        if frame.has_remaining() {
            return Err(ProtocolError::MalformedPacket(format!(
                "{} ({}: {} extra bytes)",
                constants::ERR_TRAILING_BYTES,
                descriptor.name,
                frame.remaining()
            )));
        }
        Ok(packet)
    }

    fn encode(&self, state: ConnectionState, packet: &P) -> Result<Bytes> {
        let id = match packet.as_raw() {
            Some(raw) if passes_raw(state) => raw.id,
            _ => self.id_of(state, packet.name()).ok_or(ProtocolError::ProtocolState {
                state,
                packet: packet.name(),
            })?,
        };
        let mut buf = BytesMut::new();
        write_varint(&mut buf, id);
        packet.encode_body(&mut buf)?;
        Ok(buf.freeze())
    }

    fn id_of(&self, state: ConnectionState, name: &str) -> Option<i32> {
        self.states
            .get(&state)
            .and_then(|table| table.by_name.get(name).copied())
    }

    fn states_for(&self, name: &str) -> Vec<ConnectionState> {
        let mut states: Vec<_> = self
            .states
            .iter()
            .filter(|(_, table)| table.by_name.contains_key(name))
            .map(|(state, _)| *state)
            .collect();
        states.sort();
        states
    }

    fn descriptors(&self, state: ConnectionState) -> impl Iterator<Item = &PacketDescriptor<P>> {
        self.states
            .get(&state)
            .into_iter()
            .flat_map(|table| table.by_id.values())
    }
}

fn passes_raw(state: ConnectionState) -> bool {
    matches!(state, ConnectionState::Configuration | ConnectionState::Play)
}

/// Immutable registry of every packet the server understands.
#[derive(Debug)]
pub struct PacketCatalogue {
    serverbound: DirectionTables<ServerboundPacket>,
    clientbound: DirectionTables<ClientboundPacket>,
}

macro_rules! register {
    ($tables:expr, $state:expr, { $($id:literal => $ty:ident as $name:literal,)* }) => {
        $( $tables.register($state, $id, $name, decode_as::<$ty, _>)?; )*
    };
}

impl PacketCatalogue {
    /// The catalogue for the compiled protocol version.
    pub fn standard() -> Result<Self> {
        use ConnectionState::*;

        let mut sb = DirectionTables::new(PacketFlow::Serverbound);
        let mut cb = DirectionTables::new(PacketFlow::Clientbound);

        register!(sb, Handshake, {
            0x00 => ClientIntention as "intention",
        });

        register!(sb, Status, {
            0x00 => StatusRequest as "status_request",
            0x01 => PingRequest as "ping_request",
        });
        register!(cb, Status, {
            0x00 => StatusResponse as "status_response",
            0x01 => PongResponse as "pong_response",
        });

        register!(sb, Login, {
            0x00 => Hello as "hello",
            0x01 => EncryptionResponse as "encryption_response",
            0x02 => LoginPluginResponse as "login_plugin_response",
            0x03 => LoginAcknowledged as "login_acknowledged",
            0x04 => CookieResponse as "cookie_response",
        });
        register!(cb, Login, {
            0x00 => LoginDisconnect as "login_disconnect",
            0x01 => EncryptionRequest as "encryption_request",
            0x02 => LoginSuccess as "login_success",
            0x03 => SetCompression as "set_compression",
            0x04 => LoginPluginRequest as "login_plugin_request",
            0x05 => CookieRequest as "cookie_request",
        });

        register!(sb, Configuration, {
            0x00 => ClientInformation as "client_information",
            0x01 => CookieResponse as "cookie_response",
            0x02 => PluginMessage as "plugin_message",
            0x03 => FinishConfigurationAck as "finish_configuration_ack",
            0x04 => KeepAlive as "keep_alive",
            0x06 => ResourcePackResponse as "resource_pack_response",
        });
        register!(cb, Configuration, {
            0x00 => CookieRequest as "cookie_request",
            0x01 => PluginMessage as "plugin_message",
            0x02 => Disconnect as "disconnect",
            0x03 => FinishConfiguration as "finish_configuration",
            0x04 => KeepAlive as "keep_alive",
            0x08 => RemoveResourcePack as "remove_resource_pack",
            0x09 => AddResourcePack as "add_resource_pack",
            0x0A => StoreCookie as "store_cookie",
            0x0B => Transfer as "transfer",
        });

        register!(sb, Play, {
            0x03 => MessageAcknowledgment as "message_acknowledgment",
            0x06 => ChatMessage as "chat_message",
            0x07 => PlayerSession as "player_session",
            0x0A => ClientInformation as "client_information",
            0x0C => ConfigurationAcknowledged as "configuration_acknowledged",
            0x11 => CookieResponse as "cookie_response",
            0x12 => PluginMessage as "plugin_message",
            0x18 => KeepAlive as "keep_alive",
            0x21 => PingRequest as "ping_request",
            0x2B => ResourcePackResponse as "resource_pack_response",
        });
        register!(cb, Play, {
            0x16 => CookieRequest as "cookie_request",
            0x19 => PluginMessage as "plugin_message",
            0x1D => Disconnect as "disconnect",
            0x26 => KeepAlive as "keep_alive",
            0x36 => PongResponse as "pong_response",
            0x45 => RemoveResourcePack as "remove_resource_pack",
            0x46 => AddResourcePack as "add_resource_pack",
            0x69 => StartConfiguration as "start_configuration",
            0x6B => StoreCookie as "store_cookie",
            0x73 => Transfer as "transfer",
        });

        Ok(Self {
            serverbound: sb,
            clientbound: cb,
        })
    }

    /// Decode `[id][body]` sent by a client.
    pub fn decode_serverbound(&self, state: ConnectionState, frame: Bytes) -> Result<ServerboundPacket> {
        self.serverbound.decode(state, frame)
    }

    pub fn decode_clientbound(&self, state: ConnectionState, frame: Bytes) -> Result<ClientboundPacket> {
        self.clientbound.decode(state, frame)
    }

    /// Encode `[id][body]` for a packet the server sends.
    ///
    /// Fails with a state error when the packet has no id in `state`.
    pub fn encode_clientbound(&self, state: ConnectionState, packet: &ClientboundPacket) -> Result<Bytes> {
        self.clientbound.encode(state, packet)
    }

    pub fn encode_serverbound(&self, state: ConnectionState, packet: &ServerboundPacket) -> Result<Bytes> {
        self.serverbound.encode(state, packet)
    }

    /// Whether a packet with this name may travel in `flow` during `state`.
    pub fn is_valid(&self, state: ConnectionState, flow: PacketFlow, name: &str) -> bool {
        if name == RAW_PACKET {
            return passes_raw(state);
        }
        match flow {
            PacketFlow::Serverbound => self.serverbound.id_of(state, name).is_some(),
            PacketFlow::Clientbound => self.clientbound.id_of(state, name).is_some(),
        }
    }

    /// Every state a named packet is registered in, in phase order.
    pub fn states_for(&self, flow: PacketFlow, name: &str) -> Vec<ConnectionState> {
        match flow {
            PacketFlow::Serverbound => self.serverbound.states_for(name),
            PacketFlow::Clientbound => self.clientbound.states_for(name),
        }
    }

    pub fn serverbound_descriptors(
        &self,
        state: ConnectionState,
    ) -> impl Iterator<Item = &PacketDescriptor<ServerboundPacket>> {
        self.serverbound.descriptors(state)
    }

    pub fn clientbound_descriptors(
        &self,
        state: ConnectionState,
    ) -> impl Iterator<Item = &PacketDescriptor<ClientboundPacket>> {
        self.clientbound.descriptors(state)
    }
}
