//! Play phase: in-world traffic, chat and chunk streaming.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::types::{
    ArgumentSignature, ChunkPos, ClientInformation, FilterMask, LastSeenUpdate, MessageSignature,
    PackedSignature, RemoteChatSession,
};

/// A player chat message as sent by its author.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatPacket {
    /// Raw message text.
    pub message: String,
    /// Milliseconds since the Unix epoch when the client signed it.
    pub timestamp: i64,
    /// Per-message salt.
    pub salt: i64,
    /// Signature, absent when the client has no chat session.
    pub signature: Option<MessageSignature>,
    /// Acknowledgement of previously seen messages.
    pub last_seen: LastSeenUpdate,
}

/// A command whose arguments carry signatures.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignedCommandPacket {
    /// Command line without the leading slash.
    pub command: String,
    /// Milliseconds since the Unix epoch.
    pub timestamp: i64,
    /// Per-command salt.
    pub salt: i64,
    /// One signature per signable argument.
    pub argument_signatures: Vec<ArgumentSignature>,
    /// Acknowledgement of previously seen messages.
    pub last_seen: LastSeenUpdate,
}

/// A player chat message as delivered to a recipient.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlayerChatPacket {
    /// Sender profile id.
    pub sender: Uuid,
    /// Sender display name.
    pub sender_name: String,
    /// Index of the message in the sender's chain.
    pub index: u32,
    /// Signature of the message, if signed.
    pub signature: Option<MessageSignature>,
    /// Signed text.
    pub content: String,
    /// Milliseconds since the Unix epoch.
    pub timestamp: i64,
    /// Salt.
    pub salt: i64,
    /// Signatures the sender had seen, packed against the recipient's cache.
    pub last_seen: Vec<PackedSignature>,
    /// Decorated form shown instead of `content` when present.
    pub unsigned_content: Option<String>,
    /// Redactions applied by the content filter.
    pub filter_mask: FilterMask,
    /// Chat type, e.g. `chat`, `say_command`, `msg_command_incoming`.
    pub chat_type: String,
    /// Target name for directed chat types.
    pub target_name: Option<String>,
}

/// Serverbound play packets.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ServerboundPlay {
    /// Answer to a keep-alive challenge.
    KeepAlive {
        /// Challenge id.
        id: i64,
    },
    /// Updated client preferences.
    ClientInformation(ClientInformation),
    /// Client has switched back to Configuration.
    ConfigurationAcknowledged,
    /// Position update.
    MovePlayer {
        /// Block X.
        x: f64,
        /// Block Y.
        y: f64,
        /// Block Z.
        z: f64,
        /// Whether the player stands on the ground.
        on_ground: bool,
    },
    /// Chat message.
    Chat(ChatPacket),
    /// Unsigned command.
    ChatCommand {
        /// Command line without the leading slash.
        command: String,
    },
    /// Command with signed arguments.
    ChatCommandSigned(SignedCommandPacket),
    /// Acknowledge received messages without sending one.
    ChatAck {
        /// Number of messages moved past.
        offset: u32,
    },
    /// Install a chat signing session.
    ChatSessionUpdate(RemoteChatSession),
    /// Client finished a chunk batch.
    ChunkBatchReceived {
        /// Client-measured consumption rate.
        desired_chunks_per_tick: f32,
    },
    /// Drop the held item.
    DropItem {
        /// Drop the full stack rather than one item.
        full_stack: bool,
    },
}

/// Clientbound play packets.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ClientboundPlay {
    /// Player has joined the world.
    Login {
        /// Entity id assigned to the player.
        entity_id: i32,
        /// Server view distance.
        view_distance: u32,
        /// Whether unsigned chat is rejected.
        enforces_secure_chat: bool,
    },
    /// Keep-alive challenge.
    KeepAlive {
        /// Challenge id.
        id: i64,
    },
    /// Teleport.
    PlayerPosition {
        /// Block X.
        x: f64,
        /// Block Y.
        y: f64,
        /// Block Z.
        z: f64,
    },
    /// Chunk the client should center its cache on.
    SetChunkCacheCenter {
        /// Center chunk.
        pos: ChunkPos,
    },
    /// Start of a chunk batch.
    ChunkBatchStart,
    /// One chunk's data.
    LevelChunk {
        /// Chunk position.
        pos: ChunkPos,
        /// Serialized chunk.
        data: Vec<u8>,
    },
    /// End of a chunk batch.
    ChunkBatchFinished {
        /// Chunks in the batch.
        batch_size: u32,
    },
    /// Unload a chunk the client already has.
    ForgetLevelChunk {
        /// Chunk position.
        pos: ChunkPos,
    },
    /// Player chat.
    PlayerChat(Box<PlayerChatPacket>),
    /// Server-originated text.
    SystemChat {
        /// Text or translation key.
        content: String,
        /// Show above the hotbar instead of in chat.
        overlay: bool,
    },
    /// Another player's chat session.
    PlayerInfoChatSession {
        /// Profile id.
        profile_id: Uuid,
        /// Session, `None` when removed.
        session: Option<RemoteChatSession>,
    },
    /// Server wants the client back in Configuration.
    StartConfiguration,
    /// Disconnect with a reason.
    Disconnect {
        /// Reason text or translation key.
        reason: String,
    },
}
