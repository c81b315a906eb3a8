use crate::core::text::TextComponent;
use crate::core::wire::Identifier;
use crate::error::{constants, ProtocolError, Result};
use crate::protocol::connection::{ConnectionCommand, ConnectionId};
use crate::protocol::packets::{AddResourcePack, ClientboundPacket, MessageSignature, ResourcePackStatus};
use crate::protocol::state::ConnectionState;
use crate::server::tick::Command;
use bytes::Bytes;
use tokio::sync::{mpsc, oneshot};

/// Cloneable entry point for collaborators.
///
/// Every call is a message to the tick context; nothing here touches a
/// connection directly. Requests for unknown or closed connections are
/// dropped there, which cancels any reply the caller is waiting on.
#[derive(Debug, Clone)]
pub struct ServerHandle {
    commands: mpsc::UnboundedSender<Command>,
}

impl ServerHandle {
    pub(crate) fn new(commands: mpsc::UnboundedSender<Command>) -> Self {
        Self { commands }
    }

    fn post(&self, target: ConnectionId, command: ConnectionCommand) -> Result<()> {
        self.commands
            .send(Command { target, command })
            .map_err(|_| ProtocolError::Custom(constants::ERR_TICK_UNAVAILABLE.to_string()))
    }

    /// Queue any catalogued packet. Packets invalid for the connection's
    /// current phase are refused and logged by the tick context.
    pub fn send(&self, target: ConnectionId, packet: impl Into<ClientboundPacket>) -> Result<()> {
        self.post(target, ConnectionCommand::Send(packet.into()))
    }

    /// Relay a signed chat message and track its signature for acknowledgment.
    pub fn send_signed(
        &self,
        target: ConnectionId,
        packet: impl Into<ClientboundPacket>,
        signature: MessageSignature,
    ) -> Result<()> {
        self.post(
            target,
            ConnectionCommand::SendSigned {
                packet: packet.into(),
                signature,
            },
        )
    }

    /// Ask to move between play and configuration.
    pub fn transition(&self, target: ConnectionId, state: ConnectionState) -> Result<()> {
        self.post(target, ConnectionCommand::Transition(state))
    }

    pub fn disconnect(&self, target: ConnectionId, reason: TextComponent) -> Result<()> {
        self.post(target, ConnectionCommand::Disconnect(reason))
    }

    /// Fetch a cookie from the client. Concurrent requests for the same key
    /// share one round trip.
    pub async fn request_cookie(&self, target: ConnectionId, key: Identifier) -> Result<Option<Bytes>> {
        let (reply, response) = oneshot::channel();
        self.post(target, ConnectionCommand::RequestCookie { key, reply })?;
        response.await.map_err(|_| ProtocolError::ConnectionClosed)
    }

    /// Push a resource pack and wait for the client's final status.
    pub async fn request_resource_pack(
        &self,
        target: ConnectionId,
        pack: AddResourcePack,
    ) -> Result<ResourcePackStatus> {
        let (reply, response) = oneshot::channel();
        self.post(target, ConnectionCommand::RequestResourcePack { pack, reply })?;
        response.await.map_err(|_| ProtocolError::ConnectionClosed)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::panic)]
mod tests {
    use super::*;
    use crate::protocol::packets::KeepAlive;

    #[tokio::test]
    async fn test_commands_are_addressed() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let handle = ServerHandle::new(tx);
        handle.send(4, KeepAlive { id: 9 }).unwrap();

        let command = rx.recv().await.unwrap();
        assert_eq!(command.target, 4);
        assert!(matches!(
            command.command,
            ConnectionCommand::Send(ClientboundPacket::KeepAlive(KeepAlive { id: 9 }))
        ));
    }

    #[tokio::test]
    async fn test_dropped_reply_is_connection_closed() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let handle = ServerHandle::new(tx);
        tokio::spawn(async move {
            // the tick context drops requests for connections it does not know
            let command = rx.recv().await.unwrap();
            drop(command);
        });

        let err = handle
            .request_cookie(1, Identifier::minecraft("token").unwrap())
            .await
            .unwrap_err();
        assert!(matches!(err, ProtocolError::ConnectionClosed));
    }

    #[tokio::test]
    async fn test_stopped_tick_context() {
        let (tx, rx) = mpsc::unbounded_channel();
        drop(rx);
        let handle = ServerHandle::new(tx);
        let err = handle.disconnect(1, TextComponent::text("bye")).unwrap_err();
        assert!(matches!(err, ProtocolError::Custom(_)));
    }
}
