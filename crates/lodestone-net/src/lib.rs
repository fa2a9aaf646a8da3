//! Transport layer: framing, compression, encryption, phase-tagged packets,
//! the TCP accept loop and in-process transports.

pub mod bandwidth;
pub mod cipher;
pub mod client;
pub mod codec;
pub mod compression;
pub mod framing;
pub mod legacy;
pub mod packets;
pub mod phase;
pub mod status;
pub mod tcp_server;
pub mod transport;

pub use bandwidth::{NetworkCounters, StatsSnapshot};
pub use cipher::{CipherError, Direction, FrameCipher};
pub use client::{ClientError, ProtocolClient};
pub use codec::{CodecError, PacketDecoder, PacketEncoder};
pub use compression::CompressionError;
pub use framing::{FrameConfig, FrameError, MAX_FRAME_PAYLOAD, encode_frame, read_frame, write_frame};
pub use packets::types::{ChunkPos, GameProfile};
pub use packets::{ClientboundPacket, PacketError, ServerboundPacket};
pub use phase::ProtocolPhase;
pub use status::{ServerStatus, status_channel};
pub use tcp_server::{AcceptorConfig, TcpAcceptor};
pub use transport::{
    ConnectionId, IdGenerator, Liveness, Outbound, PeerLink, Transport, TransportClosed,
    TransportKind, memory_pair,
};
