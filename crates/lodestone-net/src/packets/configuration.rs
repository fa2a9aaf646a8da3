//! Configuration phase: registry sync and pre-join setup.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::types::{ClientInformation, KnownPack, RegistryEntry, ResourcePackAction};

/// Serverbound configuration packets.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ServerboundConfiguration {
    /// Updated client preferences.
    ClientInformation(ClientInformation),
    /// Answer to a keep-alive challenge.
    KeepAlive {
        /// Challenge id.
        id: i64,
    },
    /// Packs the client already has.
    SelectKnownPacks {
        /// Known packs.
        packs: Vec<KnownPack>,
    },
    /// Resource pack progress.
    ResourcePack {
        /// Pack id.
        id: Uuid,
        /// Reported action.
        action: ResourcePackAction,
    },
    /// Player accepted the code of conduct.
    AcceptCodeOfConduct,
    /// Client applied everything and is ready to play.
    FinishConfiguration,
}

/// Clientbound configuration packets.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ClientboundConfiguration {
    /// Keep-alive challenge.
    KeepAlive {
        /// Challenge id.
        id: i64,
    },
    /// Packs the server offers.
    SelectKnownPacks {
        /// Offered packs.
        packs: Vec<KnownPack>,
    },
    /// One registry's contents.
    RegistryData {
        /// Registry id.
        registry: String,
        /// Entries.
        entries: Vec<RegistryEntry>,
    },
    /// Code of conduct the player must accept.
    CodeOfConduct {
        /// Text to display.
        text: String,
    },
    /// Resource pack offer.
    ResourcePackPush {
        /// Pack id.
        id: Uuid,
        /// Download URL.
        url: String,
        /// Hex SHA-1.
        hash: String,
        /// Whether declining disconnects.
        required: bool,
        /// Prompt text.
        prompt: Option<String>,
    },
    /// Server is done, client should acknowledge and switch to Play.
    FinishConfiguration,
    /// Disconnect with a reason.
    Disconnect {
        /// Reason text or translation key.
        reason: String,
    },
}
