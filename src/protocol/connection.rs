//! One peer's session, as seen from the tick context.
//!
//! The socket itself belongs to the connection's I/O task. The tick context
//! owns everything else: the phase, the active listener, login fields, the
//! keepalive and acknowledgment trackers and the pending correlations. It
//! steers the I/O task through two queues: [`Outbound`] for the writer and
//! [`InboundControl`] for the reader. Each queue is consumed in order, so a
//! switch queued after a packet takes effect at exactly that frame boundary.

use crate::core::codec::CompressionSettings;
use crate::core::text::TextComponent;
use crate::core::wire::Identifier;
use crate::error::{FaultOrigin, ProtocolError, Result};
use crate::protocol::dispatcher::PacketContext;
use crate::protocol::listener::{Disposition, PhaseListener};
use crate::protocol::packets::{
    AddResourcePack, CataloguedPacket, ClientInformation, ClientboundPacket, CookieRequest,
    KeepAlive, MessageSignature, PlayerSession, PluginMessage, ResourcePackStatus,
    ServerboundPacket,
};
use crate::protocol::profile::VerifiedIdentity;
use crate::protocol::state::{ConnectionState, PacketFlow};
use crate::server::context::ServerContext;
use crate::utils::acknowledgment::MessageAcknowledgmentState;
use crate::utils::correlator::PendingCorrelation;
use crate::utils::crypto::{CipherSession, StreamDecryptor, StreamEncryptor};
use crate::utils::keepalive::{KeepAlivePoll, KeepAliveResponse, KeepAliveTracker};
use bytes::Bytes;
use std::collections::HashSet;
use std::mem;
use std::net::SocketAddr;
use std::time::{SystemTime, UNIX_EPOCH};
use tokio::sync::{mpsc, oneshot};
use tokio::time::Instant;
use tracing::{debug, info, instrument, trace};
use uuid::Uuid;

pub type ConnectionId = u64;

const BRAND_CHANNEL: &str = "brand";

/// Work for a connection's writer task, applied in queue order.
pub enum Outbound {
    Packet(ClientboundPacket),
    SetState(ConnectionState),
    EnableCompression(CompressionSettings),
    EnableEncryption(StreamEncryptor),
    Close,
}

impl std::fmt::Debug for Outbound {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Outbound::Packet(packet) => write!(f, "Packet({})", packet.name()),
            Outbound::SetState(state) => write!(f, "SetState({state})"),
            Outbound::EnableCompression(settings) => write!(f, "EnableCompression({settings:?})"),
            Outbound::EnableEncryption(_) => f.write_str("EnableEncryption"),
            Outbound::Close => f.write_str("Close"),
        }
    }
}

/// Pipeline changes for a connection's reader task.
pub enum InboundControl {
    SetState(ConnectionState),
    EnableCompression(usize),
    EnableDecryption(StreamDecryptor),
    /// The last pipeline-switching packet has been handled; keep reading.
    Resume,
    Close,
}

impl std::fmt::Debug for InboundControl {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            InboundControl::SetState(state) => write!(f, "SetState({state})"),
            InboundControl::EnableCompression(threshold) => {
                write!(f, "EnableCompression({threshold})")
            }
            InboundControl::EnableDecryption(_) => f.write_str("EnableDecryption"),
            InboundControl::Resume => f.write_str("Resume"),
            InboundControl::Close => f.write_str("Close"),
        }
    }
}

/// Something a collaborator asks of one connection.
#[derive(Debug)]
pub enum ConnectionCommand {
    Send(ClientboundPacket),
    /// Relay a signed chat message and track it for acknowledgment.
    SendSigned {
        packet: ClientboundPacket,
        signature: MessageSignature,
    },
    /// Move between play and configuration. The switch completes when the
    /// client acknowledges it.
    Transition(ConnectionState),
    RequestCookie {
        key: Identifier,
        reply: oneshot::Sender<Option<Bytes>>,
    },
    RequestResourcePack {
        pack: AddResourcePack,
        reply: oneshot::Sender<ResourcePackStatus>,
    },
    Disconnect(TextComponent),
}

/// The client's chat signing key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatSession {
    pub session_id: Uuid,
    pub expires_at: i64,
    pub public_key: Bytes,
}

impl ChatSession {
    pub fn is_expired(&self, now_millis: i64) -> bool {
        self.expires_at <= now_millis
    }
}

impl From<&PlayerSession> for ChatSession {
    fn from(session: &PlayerSession) -> Self {
        Self {
            session_id: session.session_id,
            expires_at: session.expires_at,
            public_key: session.public_key.clone(),
        }
    }
}

/// Milliseconds since the Unix epoch, the clock chat keys expire against.
pub fn current_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_millis() as i64)
        .unwrap_or_default()
}

/// Per-connection state shared by every phase listener.
#[derive(Debug)]
pub struct ConnectionCore {
    id: ConnectionId,
    peer: SocketAddr,
    state: ConnectionState,
    outbound: mpsc::UnboundedSender<Outbound>,
    control: mpsc::UnboundedSender<InboundControl>,
    compression: Option<CompressionSettings>,
    encrypted: bool,
    protocol_version: i32,
    server_address: Option<(String, u16)>,
    transferred: bool,
    username: Option<String>,
    identity: Option<VerifiedIdentity>,
    client_information: Option<ClientInformation>,
    brand: Option<String>,
    chat_session: Option<ChatSession>,
    last_chat_timestamp: i64,
    keepalive: Option<KeepAliveTracker>,
    acknowledgments: MessageAcknowledgmentState,
    cookies: PendingCorrelation<Identifier, Option<Bytes>>,
    resource_packs: PendingCorrelation<Uuid, ResourcePackStatus>,
    plugin_queries: HashSet<i32>,
    holds_slot: bool,
    player_since: Option<Instant>,
}

impl ConnectionCore {
    pub fn new(
        id: ConnectionId,
        peer: SocketAddr,
        outbound: mpsc::UnboundedSender<Outbound>,
        control: mpsc::UnboundedSender<InboundControl>,
    ) -> Self {
        Self {
            id,
            peer,
            state: ConnectionState::Handshake,
            outbound,
            control,
            compression: None,
            encrypted: false,
            protocol_version: 0,
            server_address: None,
            transferred: false,
            username: None,
            identity: None,
            client_information: None,
            brand: None,
            chat_session: None,
            last_chat_timestamp: i64::MIN,
            keepalive: None,
            acknowledgments: MessageAcknowledgmentState::new(),
            cookies: PendingCorrelation::new(),
            resource_packs: PendingCorrelation::new(),
            plugin_queries: HashSet::new(),
            holds_slot: false,
            player_since: None,
        }
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    pub fn peer(&self) -> SocketAddr {
        self.peer
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn compression(&self) -> Option<CompressionSettings> {
        self.compression
    }

    pub fn is_encrypted(&self) -> bool {
        self.encrypted
    }

    pub fn protocol_version(&self) -> i32 {
        self.protocol_version
    }

    /// Host and port the client says it dialled.
    pub fn server_address(&self) -> Option<(&str, u16)> {
        self.server_address
            .as_ref()
            .map(|(host, port)| (host.as_str(), *port))
    }

    /// Whether the client arrived through a transfer from another server.
    pub fn is_transfer(&self) -> bool {
        self.transferred
    }

    /// The name claimed in Hello. Untrusted until [`Self::identity`] is set.
    pub fn username(&self) -> Option<&str> {
        self.username.as_deref()
    }

    pub fn identity(&self) -> Option<&VerifiedIdentity> {
        self.identity.as_ref()
    }

    pub fn client_information(&self) -> Option<&ClientInformation> {
        self.client_information.as_ref()
    }

    pub fn brand(&self) -> Option<&str> {
        self.brand.as_deref()
    }

    pub fn chat_session(&self) -> Option<&ChatSession> {
        self.chat_session.as_ref()
    }

    pub fn acknowledgments(&self) -> &MessageAcknowledgmentState {
        &self.acknowledgments
    }

    pub fn keepalive(&self) -> Option<&KeepAliveTracker> {
        self.keepalive.as_ref()
    }

    pub fn is_player(&self) -> bool {
        self.player_since.is_some()
    }

    /// Whether this connection counts towards `max_players`.
    pub fn holds_slot(&self) -> bool {
        self.holds_slot
    }

    pub(crate) fn claim_slot(&mut self, ctx: &ServerContext) -> bool {
        if !self.holds_slot {
            self.holds_slot = ctx.try_claim_slot();
        }
        self.holds_slot
    }

    pub fn player_since(&self) -> Option<Instant> {
        self.player_since
    }

    pub fn pending_cookies(&self) -> usize {
        self.cookies.len()
    }

    pub fn pending_resource_packs(&self) -> usize {
        self.resource_packs.len()
    }

    /// `name (address)` once a name is known, for logs and error context.
    pub fn describe(&self) -> String {
        match self.username() {
            Some(name) => format!("{name} ({})", self.peer),
            None => self.peer.to_string(),
        }
    }

    pub fn packet_context(&self) -> PacketContext<'_> {
        PacketContext {
            connection: self.id,
            peer: self.peer,
            state: self.state,
            username: self.username(),
            identity: self.identity(),
            client_information: self.client_information(),
            transferred: self.transferred,
            is_player: self.is_player(),
        }
    }

    pub(crate) fn record_handshake(&mut self, protocol_version: i32, host: &str, port: u16, transfer: bool) {
        self.protocol_version = protocol_version;
        self.server_address = Some((host.to_string(), port));
        self.transferred = transfer;
    }

    pub(crate) fn set_username(&mut self, username: &str) {
        self.username = Some(username.to_string());
    }

    pub(crate) fn set_identity(&mut self, identity: VerifiedIdentity) {
        self.username = Some(identity.name.clone());
        self.identity = Some(identity);
    }

    pub(crate) fn set_client_information(&mut self, information: ClientInformation) {
        self.client_information = Some(information);
    }

    pub(crate) fn set_chat_session(&mut self, session: ChatSession) {
        self.chat_session = Some(session);
    }

    /// Record the client brand if this is a `minecraft:brand` message.
    pub(crate) fn observe_plugin_message(&mut self, message: &PluginMessage) -> bool {
        if message.channel.namespace() != Identifier::DEFAULT_NAMESPACE
            || message.channel.path() != BRAND_CHANNEL
        {
            return false;
        }
        let mut data = message.data.clone();
        match crate::core::wire::read_string(&mut data, crate::core::wire::MAX_STRING_LEN) {
            Ok(brand) => {
                debug!(connection = %self.describe(), brand = %brand, "Client brand");
                self.brand = Some(brand);
                true
            }
            Err(e) => {
                debug!(error = %e, "Ignoring malformed brand");
                false
            }
        }
    }

    /// Signed chat timestamps must not go backwards.
    pub(crate) fn check_chat_order(&mut self, timestamp: i64) -> bool {
        if timestamp < self.last_chat_timestamp {
            return false;
        }
        self.last_chat_timestamp = timestamp;
        true
    }

    pub(crate) fn acknowledgments_mut(&mut self) -> &mut MessageAcknowledgmentState {
        &mut self.acknowledgments
    }

    /// Whether a login plugin response answers a query this server sent.
    pub(crate) fn take_plugin_query(&mut self, message_id: i32) -> bool {
        self.plugin_queries.remove(&message_id)
    }

    /// Queue a packet for the writer.
    ///
    /// Packets not registered for the current phase are refused. Packets
    /// queued after the connection is terminal are dropped.
    pub fn send(&mut self, ctx: &ServerContext, packet: ClientboundPacket) -> Result<()> {
        if self.state.is_terminal() {
            trace!(packet = packet.name(), "Dropping packet for closed connection");
            return Ok(());
        }
        if !ctx
            .catalogue
            .is_valid(self.state, PacketFlow::Clientbound, packet.name())
        {
            return Err(ProtocolError::ProtocolState {
                state: self.state,
                packet: packet.name(),
            });
        }
        if let ClientboundPacket::LoginPluginRequest(request) = &packet {
            self.plugin_queries.insert(request.message_id);
        }
        self.queue(Outbound::Packet(packet))
    }

    fn queue(&self, item: Outbound) -> Result<()> {
        self.outbound
            .send(item)
            .map_err(|_| ProtocolError::ConnectionClosed)
    }

    fn steer(&self, item: InboundControl) -> Result<()> {
        self.control
            .send(item)
            .map_err(|_| ProtocolError::ConnectionClosed)
    }

    /// Move to `next`, switching both pipeline halves at this boundary.
    #[instrument(skip(self, ctx, now), fields(connection = self.id))]
    pub fn transition(&mut self, ctx: &ServerContext, next: ConnectionState, now: Instant) -> Result<()> {
        if !self.state.can_transition_to(next) {
            return Err(ProtocolError::ProtocolState {
                state: self.state,
                packet: "transition",
            });
        }
        debug!(from = %self.state, to = %next, "State transition");
        self.state = next;
        self.queue(Outbound::SetState(next))?;
        self.steer(InboundControl::SetState(next))?;

        if next.has_keepalive() {
            let server = &ctx.config.server;
            self.keepalive.get_or_insert_with(|| {
                KeepAliveTracker::new(server.keepalive_interval, server.keepalive_timeout, now)
            });
        } else {
            self.keepalive = None;
        }
        Ok(())
    }

    pub fn enable_compression(&mut self, settings: CompressionSettings) -> Result<()> {
        self.compression = Some(settings);
        self.queue(Outbound::EnableCompression(settings))?;
        self.steer(InboundControl::EnableCompression(settings.threshold))
    }

    /// Install the cipher on both halves. Every frame after this one is encrypted.
    pub fn enable_encryption(&mut self, ctx: &ServerContext, session: CipherSession) -> Result<()> {
        let (encryptor, decryptor) = session.split();
        self.queue(Outbound::EnableEncryption(encryptor))?;
        self.steer(InboundControl::EnableDecryption(decryptor))?;
        self.encrypted = true;
        ctx.metrics().encryption_established();
        Ok(())
    }

    pub fn resume_reading(&self) -> Result<()> {
        self.steer(InboundControl::Resume)
    }

    /// Tear down without telling the peer. Cancels every pending correlation.
    pub fn close(&mut self) {
        if self.state.is_terminal() {
            return;
        }
        let _ = self.outbound.send(Outbound::Close);
        let _ = self.control.send(InboundControl::Close);
        self.state = ConnectionState::Disconnected;
        self.keepalive = None;
        self.acknowledgments.clear();
        let cancelled = self.cookies.cancel_all() + self.resource_packs.cancel_all();
        if cancelled > 0 {
            debug!(connection = self.id, cancelled, "Cancelled pending requests");
        }
    }

    /// Send the phase's disconnect packet, if it has one, then close.
    pub fn disconnect(&mut self, reason: TextComponent) {
        if self.state.is_terminal() {
            return;
        }
        info!(connection = %self.describe(), state = %self.state, reason = %reason, "Disconnecting");
        if let Some(packet) = ClientboundPacket::disconnect_for(self.state, reason) {
            let _ = self.queue(Outbound::Packet(packet));
        }
        self.close();
    }

    /// Cross-cutting bookkeeping every packet passes through before the
    /// phase listener. Returns whether the packet was consumed here.
    fn observe(&mut self, packet: &ServerboundPacket, now: Instant) -> bool {
        match packet {
            ServerboundPacket::KeepAlive(KeepAlive { id }) => {
                if let Some(tracker) = self.keepalive.as_mut() {
                    match tracker.on_response(*id, now) {
                        KeepAliveResponse::Accepted(latency) => {
                            trace!(connection = self.id, latency_ms = latency.as_millis() as u64, "Keepalive answered");
                        }
                        KeepAliveResponse::Stale => {
                            debug!(connection = self.id, payload = id, "Ignoring stale keepalive");
                        }
                    }
                }
                true
            }
            ServerboundPacket::CookieResponse(response) => {
                let delivered = self.cookies.on_response(&response.key, response.value());
                trace!(key = %response.key, delivered, "Cookie response");
                true
            }
            ServerboundPacket::ResourcePackResponse(response) => {
                if response.status.is_terminal() {
                    let delivered = self.resource_packs.on_response(&response.id, response.status);
                    trace!(pack = %response.id, status = ?response.status, delivered, "Resource pack settled");
                }
                true
            }
            _ => false,
        }
    }
}

/// A connection's core state plus the listener for its current phase.
#[derive(Debug)]
pub struct Connection {
    core: ConnectionCore,
    listener: PhaseListener,
}

impl Connection {
    pub fn new(
        id: ConnectionId,
        peer: SocketAddr,
        outbound: mpsc::UnboundedSender<Outbound>,
        control: mpsc::UnboundedSender<InboundControl>,
    ) -> Self {
        Self {
            core: ConnectionCore::new(id, peer, outbound, control),
            listener: PhaseListener::for_state(ConnectionState::Handshake),
        }
    }

    pub fn core(&self) -> &ConnectionCore {
        &self.core
    }

    pub fn state(&self) -> ConnectionState {
        self.core.state()
    }

    pub fn listener(&self) -> &PhaseListener {
        &self.listener
    }

    /// Handle one inbound packet, in arrival order.
    ///
    /// The packet is checked against the phase first, then offered to the
    /// translators' `validate`, then observed by keepalive and correlation
    /// bookkeeping, then handled by the phase listener, and finally applied
    /// by the translators.
    #[instrument(skip_all, fields(connection = self.core.id, packet = packet.name()))]
    pub fn handle_packet(&mut self, ctx: &ServerContext, packet: ServerboundPacket, now: Instant) -> Result<()> {
        let state = self.core.state();
        if state.is_terminal() {
            return Ok(());
        }
        if !ctx
            .catalogue
            .is_valid(state, PacketFlow::Serverbound, packet.name())
        {
            return Err(ProtocolError::ProtocolState {
                state,
                packet: packet.name(),
            });
        }

        let result = self.process(ctx, &packet, now);
        if result.is_ok() && packet.switches_pipeline() && !self.core.state().is_terminal() {
            self.core.resume_reading()?;
        }
        result
    }

    fn process(&mut self, ctx: &ServerContext, packet: &ServerboundPacket, now: Instant) -> Result<()> {
        let accepted = ctx
            .dispatcher
            .validate(&self.core.packet_context(), packet)
            .map_err(|e| e.on_connection(self.core.describe(), FaultOrigin::Server))?;
        if !accepted {
            debug!(packet = packet.name(), "Packet vetoed");
            return Ok(());
        }

        let observed = self.core.observe(packet, now);
        let previous = self.core.state();
        let disposition = self.listener.handle(&mut self.core, ctx, packet, now)?;
        self.sync_listener(ctx, now)?;
        if disposition == Disposition::Dropped {
            return Ok(());
        }

        let mut view = self.core.packet_context();
        view.state = previous;
        let applied = ctx
            .dispatcher
            .apply(&view, packet)
            .map_err(|e| e.on_connection(self.core.describe(), FaultOrigin::Server))?;

        if !observed && disposition == Disposition::Unhandled && !applied {
            debug!("{}", ProtocolError::UnhandledPacket(packet.name()));
        }
        Ok(())
    }

    /// Swap in the listener for the phase the core is now in.
    fn sync_listener(&mut self, ctx: &ServerContext, now: Instant) -> Result<()> {
        let current = self.core.state();
        if self.listener.state() == current {
            return Ok(());
        }
        self.listener = PhaseListener::for_state(current);
        match (&mut self.listener, current) {
            (PhaseListener::Configuration(listener), _) => {
                if ctx.config.server.auto_finish_configuration {
                    listener.finish(&mut self.core, ctx)?;
                }
            }
            (PhaseListener::Play(_), _) if self.core.player_since.is_none() => {
                self.core.player_since = Some(now);
                ctx.metrics().player_joined();
                info!(connection = %self.core.describe(), "Player joined");
            }
            _ => {}
        }
        Ok(())
    }

    /// Deliver the result of an identity lookup started during login.
    pub fn on_identity_resolved(
        &mut self,
        ctx: &ServerContext,
        result: Result<Option<VerifiedIdentity>>,
        now: Instant,
    ) -> Result<()> {
        match &mut self.listener {
            PhaseListener::Login(listener) => {
                listener.on_identity_resolved(&mut self.core, ctx, result)?;
                self.sync_listener(ctx, now)
            }
            _ => {
                debug!(connection = self.core.id, "Discarding identity for connection no longer logging in");
                Ok(())
            }
        }
    }

    /// Carry out a collaborator's request.
    pub fn on_command(&mut self, ctx: &ServerContext, command: ConnectionCommand) -> Result<()> {
        let state = self.core.state();
        match command {
            ConnectionCommand::Send(packet) => self.core.send(ctx, packet),
            ConnectionCommand::SendSigned { packet, signature } => {
                self.core.send(ctx, packet)?;
                self.core.acknowledgments.track(signature)
            }
            ConnectionCommand::Transition(target) => match (&mut self.listener, target) {
                (PhaseListener::Play(listener), ConnectionState::Configuration) => {
                    listener.start_configuration(&mut self.core, ctx)
                }
                (PhaseListener::Configuration(listener), ConnectionState::Play) => {
                    listener.finish(&mut self.core, ctx)
                }
                _ => Err(ProtocolError::ProtocolState {
                    state,
                    packet: "transition",
                }),
            },
            ConnectionCommand::RequestCookie { key, reply } => {
                if !matches!(
                    state,
                    ConnectionState::Login | ConnectionState::Configuration | ConnectionState::Play
                ) {
                    return Err(ProtocolError::ProtocolState {
                        state,
                        packet: "cookie_request",
                    });
                }
                if self.core.cookies.attach(key.clone(), reply) {
                    self.core.send(ctx, CookieRequest { key }.into())?;
                }
                Ok(())
            }
            ConnectionCommand::RequestResourcePack { pack, reply } => {
                if !matches!(state, ConnectionState::Configuration | ConnectionState::Play) {
                    return Err(ProtocolError::ProtocolState {
                        state,
                        packet: "add_resource_pack",
                    });
                }
                if self.core.resource_packs.attach(pack.id, reply) {
                    self.core.send(ctx, pack.into())?;
                }
                Ok(())
            }
            ConnectionCommand::Disconnect(reason) => {
                self.core.disconnect(reason);
                self.listener = PhaseListener::Disconnected;
                Ok(())
            }
        }
    }

    /// Per-tick housekeeping: keepalive pings.
    pub fn tick(&mut self, ctx: &ServerContext, now: Instant) -> Result<()> {
        let Some(tracker) = self.core.keepalive.as_mut() else {
            return Ok(());
        };
        match tracker.poll(now) {
            KeepAlivePoll::Send(id) => self.core.send(ctx, KeepAlive { id }.into()),
            KeepAlivePoll::Expired => {
                ctx.metrics().keepalive_timeout();
                Err(ProtocolError::Timeout)
            }
            KeepAlivePoll::Idle => Ok(()),
        }
    }

    /// Attach this connection's identity to an error that has none yet.
    ///
    /// Translator failures are already wrapped as server faults by the time
    /// they get here; anything else was caused by the peer. Transport failures are
    /// nobody's fault and stay as they are.
    pub fn attribute(&self, error: ProtocolError) -> ProtocolError {
        if error.fault_origin().is_some() || error.is_transport() {
            return error;
        }
        error.on_connection(self.core.describe(), FaultOrigin::Client)
    }

    /// End the connection because of `error`.
    ///
    /// A broken transport is closed silently; anything else gets the
    /// error's disconnect reason first.
    pub fn fail(&mut self, ctx: &ServerContext, error: &ProtocolError) {
        if self.core.state().is_terminal() {
            return;
        }
        if self.core.state() == ConnectionState::Login {
            ctx.metrics().login_failed();
        }
        if error.is_transport() {
            ctx.metrics().connection_error();
            self.core.close();
        } else {
            ctx.metrics().protocol_error();
            self.core.disconnect(error.disconnect_reason());
        }
        self.listener = PhaseListener::Disconnected;
    }

    /// The I/O task is gone; release everything, including the player slot.
    pub fn on_transport_closed(&mut self, ctx: &ServerContext) {
        self.core.close();
        self.listener = PhaseListener::Disconnected;
        if mem::take(&mut self.core.holds_slot) {
            ctx.release_slot();
        }
        if self.core.player_since.take().is_some() {
            ctx.metrics().player_left();
            info!(connection = %self.core.describe(), "Player left");
        }
    }

    pub fn is_closed(&self) -> bool {
        self.core.state().is_terminal()
    }
}
