//! The authoritative tick context.
//!
//! One task owns every [`Connection`]. I/O tasks post decoded packets here,
//! identity lookups post their results here, and collaborators post commands
//! here, so packet application, phase changes and correlation completions
//! all happen on this one task and never race each other.

use crate::core::text::TextComponent;
use crate::error::{constants, FaultOrigin, ProtocolError, Result};
use crate::protocol::connection::{
    Connection, ConnectionCommand, ConnectionId, InboundControl, Outbound,
};
use crate::protocol::packets::ServerboundPacket;
use crate::protocol::profile::VerifiedIdentity;
use crate::server::context::ServerContext;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, error, info, instrument, warn};

/// Everything that flows into the tick context from outside it.
#[derive(Debug)]
pub enum TickEvent {
    Connected {
        id: ConnectionId,
        peer: SocketAddr,
        outbound: mpsc::UnboundedSender<Outbound>,
        control: mpsc::UnboundedSender<InboundControl>,
    },
    Inbound {
        id: ConnectionId,
        packet: ServerboundPacket,
    },
    /// The I/O task ended; `error` is why, if it was not a clean close.
    Closed {
        id: ConnectionId,
        error: Option<ProtocolError>,
    },
    IdentityResolved {
        id: ConnectionId,
        result: Result<Option<VerifiedIdentity>>,
    },
}

/// A collaborator request addressed to one connection.
#[derive(Debug)]
pub struct Command {
    pub target: ConnectionId,
    pub command: ConnectionCommand,
}

pub struct TickLoop {
    context: Arc<ServerContext>,
    connections: HashMap<ConnectionId, Connection>,
    events: mpsc::Receiver<TickEvent>,
    commands: mpsc::UnboundedReceiver<Command>,
}

impl TickLoop {
    pub fn new(
        context: Arc<ServerContext>,
        events: mpsc::Receiver<TickEvent>,
        commands: mpsc::UnboundedReceiver<Command>,
    ) -> Self {
        Self {
            context,
            connections: HashMap::new(),
            events,
            commands,
        }
    }

    pub fn connection(&self, id: ConnectionId) -> Option<&Connection> {
        self.connections.get(&id)
    }

    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    /// Run until `shutdown` flips, then disconnect everyone.
    #[instrument(skip_all, name = "tick")]
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
        let mut interval = tokio::time::interval(self.context.config.server.tick_interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        info!("Tick context started");

        loop {
            tokio::select! {
                biased;

                _ = shutdown.changed() => break,

                Some(event) = self.events.recv() => self.on_event(event, Instant::now()),

                Some(command) = self.commands.recv() => self.on_command(command),

                _ = interval.tick() => self.on_tick(Instant::now()),
            }
        }

        self.shutdown();
    }

    pub fn on_event(&mut self, event: TickEvent, now: Instant) {
        match event {
            TickEvent::Connected {
                id,
                peer,
                outbound,
                control,
            } => {
                debug!(connection = id, peer = %peer, "Connection registered");
                self.connections
                    .insert(id, Connection::new(id, peer, outbound, control));
            }
            TickEvent::Inbound { id, packet } => {
                let context = &self.context;
                let Some(connection) = self.connections.get_mut(&id) else {
                    debug!(connection = id, "Packet for unknown connection");
                    return;
                };
                if let Err(e) = connection.handle_packet(context, packet, now) {
                    Self::fail(context, connection, e);
                }
            }
            TickEvent::Closed { id, error } => {
                let Some(mut connection) = self.connections.remove(&id) else {
                    return;
                };
                match error {
                    Some(e) if !e.is_transport() => {
                        // framing or decode failure noticed by the reader
                        Self::fail(&self.context, &mut connection, e);
                    }
                    Some(e) => debug!(connection = id, error = %e, "Transport closed"),
                    None => debug!(connection = id, "Transport closed"),
                }
                connection.on_transport_closed(&self.context);
            }
            TickEvent::IdentityResolved { id, result } => {
                let context = &self.context;
                let Some(connection) = self.connections.get_mut(&id) else {
                    debug!(connection = id, "Discarding identity for closed connection");
                    return;
                };
                if let Err(e) = connection.on_identity_resolved(context, result, now) {
                    Self::fail(context, connection, e);
                }
            }
        }
    }

    pub fn on_command(&mut self, command: Command) {
        let context = &self.context;
        let Some(connection) = self.connections.get_mut(&command.target) else {
            debug!(connection = command.target, "Command for unknown connection");
            return;
        };
        match connection.on_command(context, command.command) {
            Ok(()) => {}
            Err(e @ ProtocolError::ProtocolState { .. }) => {
                warn!(connection = %connection.core().describe(), error = %e, "Refused collaborator command");
            }
            Err(e) => Self::fail(context, connection, e),
        }
    }

    pub fn on_tick(&mut self, now: Instant) {
        let context = &self.context;
        for connection in self.connections.values_mut() {
            if let Err(e) = connection.tick(context, now) {
                Self::fail(context, connection, e);
            }
        }
    }

    /// The process-wide error handler.
    fn fail(context: &ServerContext, connection: &mut Connection, error: ProtocolError) {
        let error = connection.attribute(error);
        match error.fault_origin() {
            Some(FaultOrigin::Server) => error!(error = %error, "Collaborator failed while handling a packet"),
            Some(FaultOrigin::Client) => warn!(
                state = %connection.state(),
                error = %error,
                "Protocol error"
            ),
            None => debug!(error = %error, "Transport failure"),
        }
        connection.fail(context, &error);
    }

    fn shutdown(&mut self) {
        info!(connections = self.connections.len(), "Disconnecting all connections");
        let reason = TextComponent::translate(constants::REASON_SERVER_SHUTDOWN);
        for (_, mut connection) in self.connections.drain() {
            let _ = connection.on_command(&self.context, ConnectionCommand::Disconnect(reason.clone()));
            connection.on_transport_closed(&self.context);
        }

        let totals = self.context.metrics().snapshot();
        info!(
            connections = totals.connections_total,
            logins = totals.logins_success,
            protocol_errors = totals.protocol_errors,
            uptime_seconds = totals.uptime_seconds,
            "Tick context stopped"
        );
    }
}
