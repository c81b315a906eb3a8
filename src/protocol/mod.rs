//! # Protocol Layer
//!
//! Everything above the frame pipeline: which packets exist in which phase,
//! how a connection moves between phases, and how logins establish trust.
//!
//! ## Components
//! - **State**: the connection phases and their legal transitions
//! - **Packets**: every packet shape, grouped by phase
//! - **Catalogue**: `(state, direction, id)` to decoder/encoder tables
//! - **Auth**: RSA key exchange, verify tokens, session hash, offline identities
//! - **Listener**: one handler set per phase, swapped on every transition
//! - **Connection**: per-peer state owned by the tick context
//! - **Dispatcher**: collaborator translators with validate/apply hooks

pub mod auth;
pub mod catalogue;
pub mod connection;
pub mod dispatcher;
pub mod listener;
pub mod packets;
pub mod profile;
pub mod state;


pub use catalogue::PacketCatalogue;
pub use connection::{Connection, ConnectionCommand, ConnectionId};
pub use dispatcher::{Dispatcher, PacketContext, PacketTranslator};
pub use state::{ConnectionState, Intent, PacketFlow};

/// Protocol version this server speaks.
pub const PROTOCOL_VERSION: i32 = 767;

/// Game version name shown in the server list.
pub const VERSION_NAME: &str = "1.21";
