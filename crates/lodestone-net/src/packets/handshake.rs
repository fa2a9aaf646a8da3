//! Handshake phase: a single serverbound packet declaring intent.

use serde::{Deserialize, Serialize};

/// What the client wants to do after the handshake.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Intent {
    /// Server list ping.
    Status,
    /// Normal join.
    Login,
    /// Join following a server-initiated transfer.
    Transfer,
}

impl Intent {
    /// Wire id of this intent.
    pub fn id(self) -> i32 {
        match self {
            Intent::Status => 1,
            Intent::Login => 2,
            Intent::Transfer => 3,
        }
    }

    /// Parse a wire id. Unknown ids return `None`.
    pub fn from_id(id: i32) -> Option<Self> {
        match id {
            1 => Some(Intent::Status),
            2 => Some(Intent::Login),
            3 => Some(Intent::Transfer),
            _ => None,
        }
    }
}

/// Serverbound handshake packets.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ServerboundHandshake {
    /// Declares protocol version, target address and intent.
    Intention {
        /// Client protocol version.
        protocol_version: u32,
        /// Host name the client connected to.
        host: String,
        /// Port the client connected to.
        port: u16,
        /// Raw intent id, see [`Intent`].
        intent: i32,
    },
}
