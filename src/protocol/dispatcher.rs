use crate::error::{constants, ProtocolError, Result};
use crate::protocol::connection::ConnectionId;
use crate::protocol::packets::{CataloguedPacket, ClientInformation, ServerboundPacket};
use crate::protocol::profile::VerifiedIdentity;
use crate::protocol::state::ConnectionState;
use std::borrow::Cow;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, RwLock};

/// What a translator may see of the connection a packet arrived on.
#[derive(Debug, Clone, Copy)]
pub struct PacketContext<'a> {
    pub connection: ConnectionId,
    pub peer: SocketAddr,
    pub state: ConnectionState,
    /// Claimed during login; only trustworthy once `identity` is set.
    pub username: Option<&'a str>,
    pub identity: Option<&'a VerifiedIdentity>,
    pub client_information: Option<&'a ClientInformation>,
    pub transferred: bool,
    pub is_player: bool,
}

/// Collaborator hook for one packet name.
///
/// `validate` runs before the connection observes the packet and must not
/// have side effects; returning `false` drops the packet. `apply` runs after
/// the phase listener and cross-cutting bookkeeping have seen it.
pub trait PacketTranslator: Send + Sync + 'static {
    fn validate(&self, _ctx: &PacketContext<'_>, _packet: &ServerboundPacket) -> Result<bool> {
        Ok(true)
    }

    fn apply(&self, ctx: &PacketContext<'_>, packet: &ServerboundPacket) -> Result<()>;
}

/// Apply-only translator built from a closure.
struct FnTranslator<F>(F);

impl<F> PacketTranslator for FnTranslator<F>
where
    F: Fn(&PacketContext<'_>, &ServerboundPacket) -> Result<()> + Send + Sync + 'static,
{
    fn apply(&self, ctx: &PacketContext<'_>, packet: &ServerboundPacket) -> Result<()> {
        (self.0)(ctx, packet)
    }
}

type TranslatorList = Vec<Arc<dyn PacketTranslator>>;

/// Routes decoded packets to collaborator translators by packet name.
/// Uses Cow<'static, str> so catalogue names are stored without allocating.
#[derive(Clone)]
pub struct Dispatcher {
    translators: Arc<RwLock<HashMap<Cow<'static, str>, TranslatorList>>>,
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let names = self
            .translators
            .read()
            .map(|t| t.len())
            .unwrap_or_default();
        f.debug_struct("Dispatcher").field("packets", &names).finish()
    }
}

impl Dispatcher {
    pub fn new() -> Self {
        Self {
            translators: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Add a translator for `packet`. Translators for the same packet run in
    /// registration order.
    pub fn register<T>(&self, packet: &'static str, translator: T) -> Result<()>
    where
        T: PacketTranslator,
    {
        let mut translators = self.translators.write().map_err(|_| {
            ProtocolError::Custom(constants::ERR_DISPATCHER_WRITE_LOCK.to_string())
        })?;

        translators
            .entry(Cow::Borrowed(packet))
            .or_default()
            .push(Arc::new(translator));
        Ok(())
    }

    /// Register a closure that only applies, never vetoes.
    pub fn register_fn<F>(&self, packet: &'static str, apply: F) -> Result<()>
    where
        F: Fn(&PacketContext<'_>, &ServerboundPacket) -> Result<()> + Send + Sync + 'static,
    {
        self.register(packet, FnTranslator(apply))
    }

    pub fn has_translator(&self, packet: &str) -> Result<bool> {
        Ok(!self.lookup(packet)?.is_empty())
    }

    /// Ask every translator whether the packet may proceed. Any veto wins.
    pub fn validate(&self, ctx: &PacketContext<'_>, packet: &ServerboundPacket) -> Result<bool> {
        for translator in self.lookup(packet.name())? {
            if !translator.validate(ctx, packet)? {
                return Ok(false);
            }
        }
        Ok(true)
    }

    /// Run every translator's `apply`. Returns whether any translator ran.
    pub fn apply(&self, ctx: &PacketContext<'_>, packet: &ServerboundPacket) -> Result<bool> {
        let translators = self.lookup(packet.name())?;
        for translator in &translators {
            translator.apply(ctx, packet)?;
        }
        Ok(!translators.is_empty())
    }

    // Clones out of the lock so translators may register others while running.
    fn lookup(&self, packet: &str) -> Result<TranslatorList> {
        let translators = self.translators.read().map_err(|_| {
            ProtocolError::Custom(constants::ERR_DISPATCHER_READ_LOCK.to_string())
        })?;
        Ok(translators.get(packet).cloned().unwrap_or_default())
    }
}
