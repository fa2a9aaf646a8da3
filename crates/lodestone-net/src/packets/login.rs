//! Login phase: identity, key exchange and compression negotiation.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::types::GameProfile;

/// Serverbound login packets.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ServerboundLogin {
    /// Requested display name and the client's idea of its profile id.
    Hello {
        /// Requested name.
        name: String,
        /// Profile id the client believes it has.
        profile_id: Uuid,
    },
    /// Client's half of the key exchange plus proof it derived the same key.
    Key {
        /// Client X25519 public key.
        public_key: [u8; 32],
        /// The server challenge sealed under the derived challenge key.
        encrypted_challenge: Vec<u8>,
    },
    /// Client has switched to the Configuration phase.
    LoginAcknowledged,
}

/// Clientbound login packets.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ClientboundLogin {
    /// Start of the key exchange.
    Hello {
        /// Server id mixed into the verification digest.
        server_id: String,
        /// Server X25519 public key.
        public_key: [u8; 32],
        /// Random challenge the client must return sealed.
        challenge: [u8; 4],
        /// Whether the client should contact the identity service.
        should_authenticate: bool,
    },
    /// Enable compression for all following frames in both directions.
    LoginCompression {
        /// Threshold in bytes.
        threshold: i32,
    },
    /// Login accepted.
    LoginFinished {
        /// The resolved profile.
        profile: GameProfile,
    },
    /// Login rejected.
    LoginDisconnect {
        /// Reason text or translation key.
        reason: String,
    },
}
