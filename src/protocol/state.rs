use std::fmt;

/// The phase a connection is in.
///
/// Transitions only move forward, except the Play/Configuration toggle used for
/// reconfiguration and transfers. `Disconnected` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ConnectionState {
    Handshake,
    Status,
    Login,
    Configuration,
    Play,
    Disconnected,
}

impl ConnectionState {
    pub fn can_transition_to(self, next: ConnectionState) -> bool {
        use ConnectionState::*;
        matches!(
            (self, next),
            (Handshake, Status)
                | (Handshake, Login)
                | (Login, Configuration)
                | (Configuration, Play)
                | (Play, Configuration)
        ) || (next == Disconnected && self != Disconnected)
    }

    pub fn is_terminal(self) -> bool {
        self == ConnectionState::Disconnected
    }

    /// Phases in which keepalive pings run.
    pub fn has_keepalive(self) -> bool {
        matches!(self, ConnectionState::Configuration | ConnectionState::Play)
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ConnectionState::Handshake => "handshake",
            ConnectionState::Status => "status",
            ConnectionState::Login => "login",
            ConnectionState::Configuration => "configuration",
            ConnectionState::Play => "play",
            ConnectionState::Disconnected => "disconnected",
        };
        f.write_str(name)
    }
}

/// Direction a packet travels in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PacketFlow {
    Serverbound,
    Clientbound,
}

/// What the client declares it wants in its handshake.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Intent {
    Status,
    Login,
    Transfer,
}

impl Intent {
    pub fn from_id(id: i32) -> Option<Self> {
        match id {
            1 => Some(Intent::Status),
            2 => Some(Intent::Login),
            3 => Some(Intent::Transfer),
            _ => None,
        }
    }

    pub fn id(self) -> i32 {
        match self {
            Intent::Status => 1,
            Intent::Login => 2,
            Intent::Transfer => 3,
        }
    }

    /// The phase the handshake moves into.
    pub fn target_state(self) -> ConnectionState {
        match self {
            Intent::Status => ConnectionState::Status,
            Intent::Login | Intent::Transfer => ConnectionState::Login,
        }
    }
}
