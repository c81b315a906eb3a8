//! # machine-protocol
//!
//! Server-side core of the Minecraft Java wire protocol: framing, zlib
//! compression, the AES/CFB8 stream cipher, the connection phases from
//! handshake to play, RSA login with optional identity-service verification,
//! keepalives, the signed chat acknowledgment chain and the legacy server
//! list ping.
//!
//! Gameplay is out of scope. Packets the catalogue does not model pass
//! through as [`protocol::packets::RawPacket`], and collaborators hook in
//! through the [`protocol::Dispatcher`] and the [`server::ServerHandle`].
//!
//! ```rust,no_run
//! use machine_protocol::config::NetworkConfig;
//!
//! # async fn run() -> machine_protocol::error::Result<()> {
//! let config = NetworkConfig::from_file("server.toml")?;
//! machine_protocol::utils::logging::init_logging(&config.logging)?;
//! machine_protocol::transport::start_server(config).await
//! # }
//! ```

pub mod config;
pub mod core;
pub mod error;
pub mod protocol;
pub mod server;
pub mod service;
pub mod transport;
pub mod utils;

pub use config::NetworkConfig;
pub use error::{ProtocolError, Result};
pub use protocol::{PROTOCOL_VERSION, VERSION_NAME};
pub use server::{Server, ServerHandle};
