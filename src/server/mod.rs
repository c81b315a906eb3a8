//! # Server
//!
//! Wires the shared [`ServerContext`], the [`TickLoop`] and the collaborator
//! [`ServerHandle`] together. The socket side lives in [`crate::transport`].
//!
//! ## Example
//! ```rust,no_run
//! use machine_protocol::config::NetworkConfig;
//! use machine_protocol::server::Server;
//! use tokio::sync::mpsc;
//!
//! # async fn run() -> machine_protocol::error::Result<()> {
//! let server = Server::new(NetworkConfig::default())?;
//! server.dispatcher().register_fn("chat_message", |ctx, packet| {
//!     tracing::info!(player = ?ctx.username, ?packet, "chat");
//!     Ok(())
//! })?;
//!
//! let listener = tokio::net::TcpListener::bind("127.0.0.1:25565").await?;
//! let (_shutdown_tx, shutdown_rx) = mpsc::channel(1);
//! server.serve(listener, shutdown_rx).await
//! # }
//! ```

pub mod context;
pub mod handle;
pub mod tick;

pub use context::ServerContext;
pub use handle::ServerHandle;
pub use tick::{Command, TickEvent, TickLoop};

use crate::config::NetworkConfig;
use crate::error::Result;
use crate::protocol::auth::ServerKeyPair;
use crate::protocol::catalogue::PacketCatalogue;
use crate::protocol::dispatcher::Dispatcher;
use crate::service::session::{IdentityVerifier, SessionService};
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tracing::info;

/// A configured server that has not started serving yet.
pub struct Server {
    context: Arc<ServerContext>,
    handle: ServerHandle,
    tick: TickLoop,
}

impl std::fmt::Debug for Server {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Server")
            .field("context", &self.context)
            .finish_non_exhaustive()
    }
}

impl Server {
    /// Validate `config`, generate the key pair and use the HTTPS identity service.
    pub fn new(config: NetworkConfig) -> Result<Self> {
        let verifier = Arc::new(SessionService::from_config(&config.auth)?);
        Self::with_verifier(config, verifier)
    }

    pub fn with_verifier(config: NetworkConfig, verifier: Arc<dyn IdentityVerifier>) -> Result<Self> {
        config.validate_strict()?;
        let keys = Arc::new(ServerKeyPair::generate(config.auth.key_bits)?);
        Self::with_parts(config, keys, verifier)
    }

    /// Build from an existing key pair, skipping key generation.
    pub fn with_parts(
        config: NetworkConfig,
        keys: Arc<ServerKeyPair>,
        verifier: Arc<dyn IdentityVerifier>,
    ) -> Result<Self> {
        let catalogue = Arc::new(PacketCatalogue::standard()?);
        let (events_tx, events_rx) = mpsc::channel(config.server.backpressure_limit);
        let (commands_tx, commands_rx) = mpsc::unbounded_channel();

        let context = Arc::new(ServerContext::new(
            Arc::new(config),
            catalogue,
            keys,
            verifier,
            Dispatcher::new(),
            events_tx,
        ));
        let tick = TickLoop::new(context.clone(), events_rx, commands_rx);
        info!(
            address = %context.config.server.address,
            online_mode = context.config.auth.online_mode,
            "Server configured"
        );

        Ok(Self {
            context,
            handle: ServerHandle::new(commands_tx),
            tick,
        })
    }

    pub fn context(&self) -> &Arc<ServerContext> {
        &self.context
    }

    pub fn handle(&self) -> ServerHandle {
        self.handle.clone()
    }

    /// Register translators here before serving.
    pub fn dispatcher(&self) -> &Dispatcher {
        &self.context.dispatcher
    }

    /// Accept connections on `listener` until `shutdown` fires.
    pub async fn serve(self, listener: TcpListener, shutdown: mpsc::Receiver<()>) -> Result<()> {
        crate::transport::tcp::serve(self.context, self.tick, listener, shutdown).await
    }
}
