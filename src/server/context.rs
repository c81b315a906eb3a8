//! Process-wide state every connection reads: configuration, the packet
//! catalogue, the RSA key pair, the identity verifier and the dispatcher.
//! Built once at startup and never mutated afterwards, apart from the
//! player slots taken by logged-in connections.

use crate::config::NetworkConfig;
use crate::core::legacy::LegacyStatus;
use crate::core::text::TextComponent;
use crate::protocol::auth::ServerKeyPair;
use crate::protocol::catalogue::PacketCatalogue;
use crate::protocol::dispatcher::Dispatcher;
use crate::protocol::packets::{ServerStatus, StatusPlayers, StatusVersion};
use crate::server::tick::TickEvent;
use crate::service::session::IdentityVerifier;
use crate::utils::metrics::{global_metrics, Metrics};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;

pub struct ServerContext {
    pub config: Arc<NetworkConfig>,
    pub catalogue: Arc<PacketCatalogue>,
    pub keys: Arc<ServerKeyPair>,
    pub verifier: Arc<dyn IdentityVerifier>,
    pub dispatcher: Dispatcher,
    events: mpsc::Sender<TickEvent>,
    online: AtomicUsize,
}

impl std::fmt::Debug for ServerContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServerContext")
            .field("address", &self.config.server.address)
            .field("online", &self.online_players())
            .finish_non_exhaustive()
    }
}

impl ServerContext {
    pub fn new(
        config: Arc<NetworkConfig>,
        catalogue: Arc<PacketCatalogue>,
        keys: Arc<ServerKeyPair>,
        verifier: Arc<dyn IdentityVerifier>,
        dispatcher: Dispatcher,
        events: mpsc::Sender<TickEvent>,
    ) -> Self {
        Self {
            config,
            catalogue,
            keys,
            verifier,
            dispatcher,
            events,
            online: AtomicUsize::new(0),
        }
    }

    /// Queue into the tick context. I/O tasks and identity lookups post here.
    pub fn events(&self) -> &mpsc::Sender<TickEvent> {
        &self.events
    }

    pub fn metrics(&self) -> &'static Metrics {
        global_metrics()
    }

    /// Connections holding a player slot, whether in configuration or play.
    pub fn online_players(&self) -> usize {
        self.online.load(Ordering::Relaxed)
    }

    /// Take a player slot unless all `max_players` are in use.
    pub fn try_claim_slot(&self) -> bool {
        let max = self.config.status.max_players;
        self.online
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |online| {
                (online < max).then_some(online + 1)
            })
            .is_ok()
    }

    pub fn release_slot(&self) {
        let _ = self
            .online
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |online| online.checked_sub(1));
    }

    /// The server list entry answered in the status phase.
    pub fn status(&self) -> ServerStatus {
        let status = &self.config.status;
        ServerStatus {
            version: StatusVersion {
                name: status.version_name.clone(),
                protocol: status.protocol_version,
            },
            players: StatusPlayers {
                max: status.max_players,
                online: self.online_players(),
                sample: Vec::new(),
            },
            description: TextComponent::text(status.motd.clone()),
            favicon: status.favicon.clone(),
            enforces_secure_chat: status.enforces_secure_chat,
        }
    }

    pub fn legacy_status(&self) -> LegacyStatus {
        let status = &self.config.status;
        LegacyStatus {
            protocol: status.protocol_version,
            version: status.version_name.clone(),
            motd: status.motd.clone(),
            online: self.online_players(),
            max: status.max_players,
        }
    }
}
