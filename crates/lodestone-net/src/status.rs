//! Server status shared between the tick loop and the I/O tasks.
//!
//! The tick loop publishes the current status on a [`watch`] channel; the
//! Status phase and the legacy probe responder read the latest value
//! without touching session state.

use serde::{Deserialize, Serialize};
use tokio::sync::watch;

/// Human-readable game version advertised in status responses.
pub const VERSION_NAME: &str = "lodestone 0.1";

/// Protocol number advertised in status responses.
pub const PROTOCOL_NUMBER: u32 = 1;

/// Snapshot of what a status query reports.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerStatus {
    /// Version block.
    pub version: StatusVersion,
    /// Player counts.
    pub players: StatusPlayers,
    /// Message of the day.
    pub description: StatusDescription,
    /// Whether the server rejects unsigned chat.
    #[serde(rename = "enforcesSecureChat")]
    pub enforces_secure_chat: bool,
}

/// Version block of a status response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusVersion {
    /// Version name.
    pub name: String,
    /// Protocol number.
    pub protocol: u32,
}

/// Player block of a status response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusPlayers {
    /// Maximum players.
    pub max: u32,
    /// Players online.
    pub online: u32,
}

/// Description block of a status response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusDescription {
    /// Plain text.
    pub text: String,
}

impl ServerStatus {
    /// Status with no players online.
    pub fn new(motd: impl Into<String>, max_players: u32, enforces_secure_chat: bool) -> Self {
        Self {
            version: StatusVersion {
                name: VERSION_NAME.to_string(),
                protocol: PROTOCOL_NUMBER,
            },
            players: StatusPlayers {
                max: max_players,
                online: 0,
            },
            description: StatusDescription { text: motd.into() },
            enforces_secure_chat,
        }
    }

    /// Serialize to the JSON document sent in a status response.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

/// Create the status channel. The sender stays with the tick loop.
pub fn status_channel(
    initial: ServerStatus,
) -> (watch::Sender<ServerStatus>, watch::Receiver<ServerStatus>) {
    watch::channel(initial)
}
