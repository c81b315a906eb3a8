//! Phase listeners.
//!
//! A connection holds exactly one listener, the one for its current phase.
//! Each listener only has handlers for the packets of its phase; anything
//! else it reports as [`Disposition::Unhandled`]. Listeners move the
//! connection to the next phase through [`ConnectionCore::transition`] and the
//! connection swaps in the matching listener before the next packet.

use crate::core::codec::CompressionSettings;
use crate::core::text::TextComponent;
use crate::error::{constants, ProtocolError, Result};
use crate::protocol::auth::{
    offline_identity, session_hash, validate_username, verify_encryption_response, LoginChallenge,
};
use crate::protocol::connection::{current_millis, ChatSession, ConnectionCore};
use crate::protocol::packets::{
    ChatMessage, ClientIntention, EncryptionResponse, FinishConfiguration, Hello, LoginPluginResponse,
    LoginSuccess, PongResponse, ServerboundPacket, SetCompression, StartConfiguration, StatusResponse,
};
use crate::protocol::profile::VerifiedIdentity;
use crate::protocol::state::{ConnectionState, Intent};
use crate::protocol::PROTOCOL_VERSION;
use crate::server::context::ServerContext;
use crate::server::tick::TickEvent;
use std::mem;
use tokio::time::Instant;
use tracing::{debug, info, instrument, warn};

/// What a listener did with a packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    Handled,
    /// Not a packet this phase acts on; translators may still apply it.
    Unhandled,
    /// Deliberately ignored; translators do not see it either.
    Dropped,
}

#[derive(Debug)]
pub enum PhaseListener {
    Handshake(HandshakeListener),
    Status(StatusListener),
    Login(LoginListener),
    Configuration(ConfigurationListener),
    Play(PlayListener),
    Disconnected,
}

impl PhaseListener {
    pub fn for_state(state: ConnectionState) -> Self {
        match state {
            ConnectionState::Handshake => PhaseListener::Handshake(HandshakeListener),
            ConnectionState::Status => PhaseListener::Status(StatusListener::default()),
            ConnectionState::Login => PhaseListener::Login(LoginListener::default()),
            ConnectionState::Configuration => {
                PhaseListener::Configuration(ConfigurationListener::default())
            }
            ConnectionState::Play => PhaseListener::Play(PlayListener::default()),
            ConnectionState::Disconnected => PhaseListener::Disconnected,
        }
    }

    pub fn state(&self) -> ConnectionState {
        match self {
            PhaseListener::Handshake(_) => ConnectionState::Handshake,
            PhaseListener::Status(_) => ConnectionState::Status,
            PhaseListener::Login(_) => ConnectionState::Login,
            PhaseListener::Configuration(_) => ConnectionState::Configuration,
            PhaseListener::Play(_) => ConnectionState::Play,
            PhaseListener::Disconnected => ConnectionState::Disconnected,
        }
    }

    pub fn handle(
        &mut self,
        core: &mut ConnectionCore,
        ctx: &ServerContext,
        packet: &ServerboundPacket,
        now: Instant,
    ) -> Result<Disposition> {
        match self {
            PhaseListener::Handshake(listener) => listener.handle(core, ctx, packet, now),
            PhaseListener::Status(listener) => listener.handle(core, ctx, packet),
            PhaseListener::Login(listener) => listener.handle(core, ctx, packet, now),
            PhaseListener::Configuration(listener) => listener.handle(core, ctx, packet, now),
            PhaseListener::Play(listener) => listener.handle(core, ctx, packet, now),
            PhaseListener::Disconnected => Ok(Disposition::Dropped),
        }
    }
}

#[derive(Debug, Default)]
pub struct HandshakeListener;

impl HandshakeListener {
    fn handle(
        &mut self,
        core: &mut ConnectionCore,
        ctx: &ServerContext,
        packet: &ServerboundPacket,
        now: Instant,
    ) -> Result<Disposition> {
        match packet {
            ServerboundPacket::Intention(intention) => self.on_intention(core, ctx, intention, now),
            _ => Ok(Disposition::Unhandled),
        }
    }

    #[instrument(skip_all, fields(intent = ?intention.intent, protocol = intention.protocol_version))]
    fn on_intention(
        &mut self,
        core: &mut ConnectionCore,
        ctx: &ServerContext,
        intention: &ClientIntention,
        now: Instant,
    ) -> Result<Disposition> {
        core.record_handshake(
            intention.protocol_version,
            &intention.host,
            intention.port,
            intention.intent == Intent::Transfer,
        );
        core.transition(ctx, intention.intent.target_state(), now)?;
        if intention.intent == Intent::Status {
            return Ok(Disposition::Handled);
        }

        // Rejections go out as a login disconnect, the only one older clients read.
        if intention.protocol_version != PROTOCOL_VERSION {
            let key = if intention.protocol_version < PROTOCOL_VERSION {
                constants::REASON_OUTDATED_CLIENT
            } else {
                constants::REASON_OUTDATED_SERVER
            };
            core.disconnect(TextComponent::translate(key));
        } else if intention.intent == Intent::Transfer && !ctx.config.server.accepts_transfers {
            core.disconnect(TextComponent::translate(constants::REASON_TRANSFERS_DISABLED));
        }
        Ok(Disposition::Handled)
    }
}

/// Answers one status request and at most one ping.
#[derive(Debug, Default)]
pub struct StatusListener {
    answered: bool,
}

impl StatusListener {
    fn handle(
        &mut self,
        core: &mut ConnectionCore,
        ctx: &ServerContext,
        packet: &ServerboundPacket,
    ) -> Result<Disposition> {
        match packet {
            ServerboundPacket::StatusRequest(_) => {
                if mem::replace(&mut self.answered, true) {
                    return Err(ProtocolError::ProtocolState {
                        state: ConnectionState::Status,
                        packet: "status_request",
                    });
                }
                let response = StatusResponse::from_status(&ctx.status())?;
                core.send(ctx, response.into())?;
                Ok(Disposition::Handled)
            }
            ServerboundPacket::PingRequest(ping) => {
                core.send(ctx, PongResponse { payload: ping.payload }.into())?;
                core.close();
                Ok(Disposition::Handled)
            }
            _ => Ok(Disposition::Unhandled),
        }
    }
}

#[derive(Debug, Default)]
enum LoginPhase {
    #[default]
    AwaitingHello,
    AwaitingKey(LoginChallenge),
    /// Cipher installed; waiting for the identity service.
    Authenticating,
    AwaitingAcknowledgment,
}

#[derive(Debug, Default)]
pub struct LoginListener {
    phase: LoginPhase,
}

impl LoginListener {
    fn handle(
        &mut self,
        core: &mut ConnectionCore,
        ctx: &ServerContext,
        packet: &ServerboundPacket,
        now: Instant,
    ) -> Result<Disposition> {
        match packet {
            ServerboundPacket::Hello(hello) => self.on_hello(core, ctx, hello),
            ServerboundPacket::EncryptionResponse(response) => {
                self.on_encryption_response(core, ctx, response)
            }
            ServerboundPacket::LoginAcknowledged(_) => self.on_login_acknowledged(core, ctx, now),
            ServerboundPacket::LoginPluginResponse(response) => self.on_plugin_response(core, response),
            _ => Ok(Disposition::Unhandled),
        }
    }

    fn unexpected(packet: &'static str) -> ProtocolError {
        ProtocolError::ProtocolState {
            state: ConnectionState::Login,
            packet,
        }
    }

    #[instrument(skip_all, fields(username = %hello.name))]
    fn on_hello(&mut self, core: &mut ConnectionCore, ctx: &ServerContext, hello: &Hello) -> Result<Disposition> {
        if !matches!(self.phase, LoginPhase::AwaitingHello) {
            return Err(Self::unexpected("hello"));
        }
        ctx.metrics().login_attempt();
        validate_username(&hello.name)?;
        core.set_username(&hello.name);

        if ctx.config.auth.encrypts() {
            let challenge = LoginChallenge::new();
            let request = challenge.request(&ctx.keys, ctx.config.auth.online_mode);
            core.send(ctx, request.into())?;
            self.phase = LoginPhase::AwaitingKey(challenge);
            debug!("Encryption requested");
        } else {
            self.finish_login(core, ctx, offline_identity(&hello.name))?;
        }
        Ok(Disposition::Handled)
    }

    #[instrument(skip_all, fields(connection = %core.describe()))]
    fn on_encryption_response(
        &mut self,
        core: &mut ConnectionCore,
        ctx: &ServerContext,
        response: &EncryptionResponse,
    ) -> Result<Disposition> {
        let LoginPhase::AwaitingKey(challenge) = mem::replace(&mut self.phase, LoginPhase::Authenticating) else {
            return Err(ProtocolError::AuthenticationFailure(
                constants::ERR_UNEXPECTED_KEY.into(),
            ));
        };
        let secret = verify_encryption_response(&ctx.keys, &challenge, response)?;
        let hash = session_hash(&ctx.keys, &secret);
        core.enable_encryption(ctx, crate::utils::crypto::CipherSession::new(&secret)?)?;

        let Some(username) = core.username().map(str::to_string) else {
            return Err(Self::unexpected("encryption_response"));
        };
        if !ctx.config.auth.online_mode {
            self.finish_login(core, ctx, offline_identity(&username))?;
            return Ok(Disposition::Handled);
        }

        let verifier = ctx.verifier.clone();
        let events = ctx.events().clone();
        let id = core.id();
        debug!(username = %username, "Querying identity service");
        tokio::spawn(async move {
            let result = verifier.has_joined(&username, &hash).await;
            if events.send(TickEvent::IdentityResolved { id, result }).await.is_err() {
                debug!(connection = id, "Tick context gone before identity resolved");
            }
        });
        Ok(Disposition::Handled)
    }

    /// Finish (or fail) a login once the identity service has answered.
    pub fn on_identity_resolved(
        &mut self,
        core: &mut ConnectionCore,
        ctx: &ServerContext,
        result: Result<Option<VerifiedIdentity>>,
    ) -> Result<()> {
        if !matches!(self.phase, LoginPhase::Authenticating) {
            debug!(connection = core.id(), "Ignoring identity for a login that is not authenticating");
            return Ok(());
        }
        match result {
            Ok(Some(identity)) => self.finish_login(core, ctx, identity),
            Ok(None) => Err(ProtocolError::AuthenticationFailure(
                constants::ERR_SESSION_NOT_FOUND.into(),
            )),
            Err(e @ ProtocolError::AuthenticationFailure(_)) => Err(e),
            Err(e) => Err(ProtocolError::AuthenticationFailure(format!(
                "{}: {e}",
                constants::ERR_SESSION_UNREACHABLE
            ))),
        }
    }

    fn finish_login(
        &mut self,
        core: &mut ConnectionCore,
        ctx: &ServerContext,
        identity: VerifiedIdentity,
    ) -> Result<()> {
        if !core.claim_slot(ctx) {
            core.disconnect(TextComponent::translate(constants::REASON_SERVER_FULL));
            return Ok(());
        }
        if let Some(threshold) = ctx.config.transport.compression() {
            core.send(
                ctx,
                SetCompression {
                    threshold: threshold as i32,
                }
                .into(),
            )?;
            core.enable_compression(CompressionSettings {
                threshold,
                level: ctx.config.transport.compression_level,
            })?;
        }

        info!(username = %identity.name, uuid = %identity.id, peer = %core.peer(), "Login succeeded");
        core.send(
            ctx,
            LoginSuccess {
                profile: identity.clone(),
                strict_error_handling: false,
            }
            .into(),
        )?;
        core.set_identity(identity);
        ctx.metrics().login_success();
        self.phase = LoginPhase::AwaitingAcknowledgment;
        Ok(())
    }

    fn on_login_acknowledged(
        &mut self,
        core: &mut ConnectionCore,
        ctx: &ServerContext,
        now: Instant,
    ) -> Result<Disposition> {
        if !matches!(self.phase, LoginPhase::AwaitingAcknowledgment) {
            return Err(Self::unexpected("login_acknowledged"));
        }
        core.transition(ctx, ConnectionState::Configuration, now)?;
        Ok(Disposition::Handled)
    }

    fn on_plugin_response(
        &mut self,
        core: &mut ConnectionCore,
        response: &LoginPluginResponse,
    ) -> Result<Disposition> {
        if !core.take_plugin_query(response.message_id) {
            return Err(ProtocolError::UnexpectedQueryResponse(response.message_id));
        }
        Ok(Disposition::Handled)
    }
}

#[derive(Debug, Default)]
pub struct ConfigurationListener {
    finish_sent: bool,
}

impl ConfigurationListener {
    fn handle(
        &mut self,
        core: &mut ConnectionCore,
        ctx: &ServerContext,
        packet: &ServerboundPacket,
        now: Instant,
    ) -> Result<Disposition> {
        match packet {
            ServerboundPacket::ClientInformation(information) => {
                core.set_client_information(information.clone());
                Ok(Disposition::Handled)
            }
            ServerboundPacket::PluginMessage(message) => Ok(if core.observe_plugin_message(message) {
                Disposition::Handled
            } else {
                Disposition::Unhandled
            }),
            ServerboundPacket::FinishConfigurationAck(_) => {
                if !self.finish_sent {
                    return Err(ProtocolError::ProtocolState {
                        state: ConnectionState::Configuration,
                        packet: "finish_configuration_ack",
                    });
                }
                core.transition(ctx, ConnectionState::Play, now)?;
                Ok(Disposition::Handled)
            }
            _ => Ok(Disposition::Unhandled),
        }
    }

    /// Tell the client configuration is over. Sent at most once.
    pub fn finish(&mut self, core: &mut ConnectionCore, ctx: &ServerContext) -> Result<()> {
        if mem::replace(&mut self.finish_sent, true) {
            return Ok(());
        }
        core.send(ctx, FinishConfiguration.into())
    }

    pub fn is_finishing(&self) -> bool {
        self.finish_sent
    }
}

#[derive(Debug, Default)]
pub struct PlayListener {
    reconfigure_requested: bool,
}

impl PlayListener {
    fn handle(
        &mut self,
        core: &mut ConnectionCore,
        ctx: &ServerContext,
        packet: &ServerboundPacket,
        now: Instant,
    ) -> Result<Disposition> {
        match packet {
            ServerboundPacket::ChatMessage(chat) => self.on_chat(core, chat),
            ServerboundPacket::MessageAcknowledgment(ack) => {
                core.acknowledgments_mut().apply_offset(ack.offset)?;
                Ok(Disposition::Handled)
            }
            ServerboundPacket::PlayerSession(session) => {
                if session.expires_at <= current_millis() {
                    warn!(connection = %core.describe(), "Client sent an expired chat key");
                }
                core.set_chat_session(ChatSession::from(session));
                Ok(Disposition::Handled)
            }
            ServerboundPacket::ClientInformation(information) => {
                core.set_client_information(information.clone());
                Ok(Disposition::Handled)
            }
            ServerboundPacket::PluginMessage(message) => Ok(if core.observe_plugin_message(message) {
                Disposition::Handled
            } else {
                Disposition::Unhandled
            }),
            ServerboundPacket::PingRequest(ping) => {
                core.send(ctx, PongResponse { payload: ping.payload }.into())?;
                Ok(Disposition::Handled)
            }
            ServerboundPacket::ConfigurationAcknowledged(_) => {
                if !self.reconfigure_requested {
                    return Err(ProtocolError::ProtocolState {
                        state: ConnectionState::Play,
                        packet: "configuration_acknowledged",
                    });
                }
                core.transition(ctx, ConnectionState::Configuration, now)?;
                Ok(Disposition::Handled)
            }
            _ => Ok(Disposition::Unhandled),
        }
    }

    fn on_chat(&mut self, core: &mut ConnectionCore, chat: &ChatMessage) -> Result<Disposition> {
        if !core.is_player() {
            debug!(connection = core.id(), "Dropping chat from a connection with no player");
            return Ok(Disposition::Dropped);
        }
        if chat.signature.is_some() {
            let valid_key = core
                .chat_session()
                .is_some_and(|session| !session.is_expired(current_millis()));
            if !valid_key {
                return Err(ProtocolError::ChatValidationFailure(
                    constants::ERR_MISSING_PROFILE_KEY.into(),
                ));
            }
        }
        if !core.check_chat_order(chat.timestamp) {
            return Err(ProtocolError::ChatValidationFailure(
                constants::ERR_CHAT_OUT_OF_ORDER.into(),
            ));
        }
        core.acknowledgments_mut()
            .apply_update(chat.offset, chat.acknowledged)?;
        Ok(Disposition::Handled)
    }

    /// Ask the client to go back to configuration. Sent at most once per stay in play.
    pub fn start_configuration(&mut self, core: &mut ConnectionCore, ctx: &ServerContext) -> Result<()> {
        if mem::replace(&mut self.reconfigure_requested, true) {
            return Ok(());
        }
        core.send(ctx, StartConfiguration.into())
    }

    pub fn is_reconfiguring(&self) -> bool {
        self.reconfigure_requested
    }
}
