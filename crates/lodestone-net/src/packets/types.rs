//! Value types shared by several phases' packets.

use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use uuid::Uuid;

/// A player's identity as resolved during login.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct GameProfile {
    /// Stable unique id.
    pub id: Uuid,
    /// Display name.
    pub name: String,
    /// Opaque signed properties (skins and the like).
    pub properties: Vec<ProfileProperty>,
}

impl GameProfile {
    /// Profile with no properties.
    pub fn new(id: Uuid, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            properties: Vec::new(),
        }
    }
}

/// One signed profile property.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ProfileProperty {
    /// Property name.
    pub name: String,
    /// Property value.
    pub value: String,
    /// Signature from the identity service, if any.
    pub signature: Option<String>,
}

/// Chunk column coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ChunkPos {
    /// Chunk X.
    pub x: i32,
    /// Chunk Z.
    pub z: i32,
}

impl ChunkPos {
    /// Create a chunk position.
    pub const fn new(x: i32, z: i32) -> Self {
        Self { x, z }
    }

    /// The chunk containing block coordinates `(x, z)`.
    pub fn containing(x: f64, z: f64) -> Self {
        Self {
            x: (x.floor() as i32) >> 4,
            z: (z.floor() as i32) >> 4,
        }
    }

    /// Squared euclidean distance in chunks.
    pub fn distance_squared(self, other: ChunkPos) -> i64 {
        let dx = i64::from(self.x) - i64::from(other.x);
        let dz = i64::from(self.z) - i64::from(other.z);
        dx * dx + dz * dz
    }

    /// Chebyshev distance in chunks, the shape of a square view area.
    pub fn chessboard_distance(self, other: ChunkPos) -> u32 {
        self.x.abs_diff(other.x).max(self.z.abs_diff(other.z))
    }
}

/// How much chat the client wants to see.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChatVisibility {
    /// Everything.
    #[default]
    Full,
    /// Only system messages.
    System,
    /// Nothing.
    Hidden,
}

/// Client preferences, sent in Configuration and again in Play whenever they change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientInformation {
    /// Locale, e.g. `en_us`.
    pub language: String,
    /// Requested view distance in chunks.
    pub view_distance: u8,
    /// Chat visibility.
    pub chat_visibility: ChatVisibility,
    /// Whether colour codes are rendered.
    pub chat_colors: bool,
    /// Whether the client wants filtered chat.
    pub text_filtering_enabled: bool,
    /// Whether the player may appear in the public player list.
    pub allows_listing: bool,
}

impl Default for ClientInformation {
    fn default() -> Self {
        Self {
            language: "en_us".to_string(),
            view_distance: 2,
            chat_visibility: ChatVisibility::Full,
            chat_colors: true,
            text_filtering_enabled: false,
            allows_listing: true,
        }
    }
}

/// Ed25519 signature over a chat message body.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct MessageSignature(pub [u8; 64]);

impl MessageSignature {
    /// Signature bytes.
    pub fn as_bytes(&self) -> &[u8; 64] {
        &self.0
    }
}

impl std::fmt::Debug for MessageSignature {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "MessageSignature({:02x}{:02x}..)", self.0[0], self.0[1])
    }
}

impl Serialize for MessageSignature {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.0.as_slice().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for MessageSignature {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let bytes = Vec::<u8>::deserialize(deserializer)?;
        let array: [u8; 64] = bytes
            .try_into()
            .map_err(|v: Vec<u8>| D::Error::invalid_length(v.len(), &"64 signature bytes"))?;
        Ok(Self(array))
    }
}

/// Client's claim about which recently received signed messages it has seen.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LastSeenUpdate {
    /// Number of tracked messages the client has moved past since its last report.
    pub offset: u32,
    /// Bitset over the 20-slot window, bit `i` set when slot `i` is acknowledged.
    pub acknowledged: u32,
    /// Checksum of the acknowledged signatures.
    pub checksum: u8,
}

/// A signature for one named command argument.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArgumentSignature {
    /// Argument name as declared by the command.
    pub name: String,
    /// Signature over the argument value.
    pub signature: MessageSignature,
}

/// A signature sent either in full or as an id into the recipient's cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PackedSignature {
    /// Index into the recipient's recent-signature cache.
    Id(u32),
    /// Full signature.
    Full(MessageSignature),
}

/// Which characters of a chat message the content filter redacted.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum FilterMask {
    /// Nothing redacted.
    #[default]
    PassThrough,
    /// The whole message is hidden.
    FullyFiltered,
    /// Bitset over character indices, set bits are redacted.
    PartiallyFiltered(Vec<u64>),
}

impl FilterMask {
    /// Build a mask from redacted character indices.
    pub fn from_indices(indices: impl IntoIterator<Item = usize>) -> Self {
        let mut words: Vec<u64> = Vec::new();
        for index in indices {
            let word = index / 64;
            if words.len() <= word {
                words.resize(word + 1, 0);
            }
            words[word] |= 1 << (index % 64);
        }
        if words.iter().all(|w| *w == 0) {
            FilterMask::PassThrough
        } else {
            FilterMask::PartiallyFiltered(words)
        }
    }

    fn is_masked(words: &[u64], index: usize) -> bool {
        words
            .get(index / 64)
            .is_some_and(|w| w & (1 << (index % 64)) != 0)
    }

    /// Apply the mask. `None` means the message must not be shown at all.
    pub fn apply(&self, text: &str) -> Option<String> {
        match self {
            FilterMask::PassThrough => Some(text.to_string()),
            FilterMask::FullyFiltered => None,
            FilterMask::PartiallyFiltered(words) => Some(
                text.chars()
                    .enumerate()
                    .map(|(i, c)| if Self::is_masked(words, i) { '#' } else { c })
                    .collect(),
            ),
        }
    }
}

/// A data pack both sides may already know.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KnownPack {
    /// Namespace, e.g. `minecraft`.
    pub namespace: String,
    /// Pack id.
    pub id: String,
    /// Pack version.
    pub version: String,
}

/// One entry of a synchronized registry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistryEntry {
    /// Entry id.
    pub id: String,
    /// Opaque entry payload, omitted when the client knows the pack.
    pub data: Option<Vec<u8>>,
}

/// Client's progress report for a pushed resource pack.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ResourcePackAction {
    /// Pack applied.
    SuccessfullyLoaded,
    /// Player refused the pack.
    Declined,
    /// Download failed.
    FailedDownload,
    /// Player accepted, download starting.
    Accepted,
    /// Download finished.
    Downloaded,
    /// URL could not be parsed.
    InvalidUrl,
    /// Pack could not be reloaded.
    FailedReload,
    /// Pack was discarded.
    Discarded,
}

impl ResourcePackAction {
    /// Whether this report ends the client's handling of the pack.
    pub fn is_terminal(self) -> bool {
        !matches!(
            self,
            ResourcePackAction::Accepted | ResourcePackAction::Downloaded
        )
    }

    /// Whether the pack ended up applied.
    pub fn is_success(self) -> bool {
        self == ResourcePackAction::SuccessfullyLoaded
    }
}

/// A player's chat signing session, as declared by the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteChatSession {
    /// Session id, unique per client launch.
    pub session_id: uuid::Uuid,
    /// Ed25519 public key.
    pub public_key: [u8; 32],
    /// Key expiry as milliseconds since the Unix epoch.
    pub expires_at: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chunk_pos_containing_negative_blocks() {
        assert_eq!(ChunkPos::containing(-1.0, 15.9), ChunkPos::new(-1, 0));
        assert_eq!(ChunkPos::containing(16.0, -16.0), ChunkPos::new(1, -1));
    }

    #[test]
    fn test_chunk_distance() {
        let origin = ChunkPos::new(0, 0);
        assert_eq!(origin.distance_squared(ChunkPos::new(3, -4)), 25);
        assert_eq!(origin.chessboard_distance(ChunkPos::new(3, -4)), 4);
    }

    #[test]
    fn test_filter_mask_partial() {
        let mask = FilterMask::from_indices([0, 2]);
        assert_eq!(mask.apply("abc").as_deref(), Some("#b#"));
    }

    #[test]
    fn test_filter_mask_empty_indices_pass_through() {
        assert_eq!(FilterMask::from_indices([]), FilterMask::PassThrough);
        assert_eq!(FilterMask::FullyFiltered.apply("hello"), None);
    }

    #[test]
    fn test_signature_rejects_wrong_length() {
        let bytes = postcard::to_allocvec(&vec![1u8; 10]).unwrap();
        assert!(postcard::from_bytes::<MessageSignature>(&bytes).is_err());
    }

    #[test]
    fn test_signature_survives_postcard() {
        let signature = MessageSignature([9u8; 64]);
        let bytes = postcard::to_allocvec(&signature).unwrap();
        assert_eq!(
            postcard::from_bytes::<MessageSignature>(&bytes).unwrap(),
            signature
        );
    }

    #[test]
    fn test_resource_pack_terminal_actions() {
        assert!(!ResourcePackAction::Accepted.is_terminal());
        assert!(ResourcePackAction::Declined.is_terminal());
        assert!(ResourcePackAction::SuccessfullyLoaded.is_success());
    }
}
