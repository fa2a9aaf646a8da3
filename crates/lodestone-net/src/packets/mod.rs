//! Phase-tagged packet definitions and body serialization.
//!
//! A packet body is a protocol version byte followed by the [`postcard`]
//! encoding of the phase's packet enum. The same bytes mean different
//! packets in different phases, so decoding always takes the phase the
//! receiving side is in.

pub mod configuration;
pub mod handshake;
pub mod login;
pub mod play;
pub mod status;
pub mod types;

use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::phase::ProtocolPhase;

pub use configuration::{ClientboundConfiguration, ServerboundConfiguration};
pub use handshake::{Intent, ServerboundHandshake};
pub use login::{ClientboundLogin, ServerboundLogin};
pub use play::{ChatPacket, ClientboundPlay, PlayerChatPacket, ServerboundPlay, SignedCommandPacket};
pub use status::{ClientboundStatus, ServerboundStatus};

/// Current wire-protocol version. Prepended to every packet body.
pub const PROTOCOL_VERSION: u8 = 1;

/// Errors that can occur while encoding or decoding a packet body.
#[derive(Debug, thiserror::Error)]
pub enum PacketError {
    /// The body was empty, no version byte present.
    #[error("empty payload, no version byte")]
    EmptyPayload,
    /// Version byte does not match [`PROTOCOL_VERSION`].
    #[error("unsupported protocol version: {0}")]
    UnsupportedVersion(u8),
    /// No packets travel in this direction during this phase.
    #[error("no {direction} packets exist in the {phase} phase")]
    NoPacketsInPhase {
        /// Phase the body was decoded in.
        phase: ProtocolPhase,
        /// `serverbound` or `clientbound`.
        direction: &'static str,
    },
    /// Postcard (de)serialization failed.
    #[error("serialization error: {0}")]
    Postcard(#[from] postcard::Error),
}

/// Serialize a packet body: version byte plus postcard.
pub fn encode_packet<P: Serialize>(packet: &P) -> Result<Vec<u8>, PacketError> {
    let mut buf = vec![PROTOCOL_VERSION];
    let body = postcard::to_allocvec(packet)?;
    buf.extend_from_slice(&body);
    Ok(buf)
}

/// Deserialize a packet body, checking the version byte.
pub fn decode_packet<P: DeserializeOwned>(data: &[u8]) -> Result<P, PacketError> {
    let Some((&version, body)) = data.split_first() else {
        return Err(PacketError::EmptyPayload);
    };
    if version != PROTOCOL_VERSION {
        return Err(PacketError::UnsupportedVersion(version));
    }
    Ok(postcard::from_bytes(body)?)
}

/// Any packet a client may send.
#[derive(Debug, Clone, PartialEq)]
pub enum ServerboundPacket {
    /// Handshake phase.
    Handshake(ServerboundHandshake),
    /// Status phase.
    Status(ServerboundStatus),
    /// Login phase.
    Login(ServerboundLogin),
    /// Configuration phase.
    Configuration(ServerboundConfiguration),
    /// Play phase.
    Play(ServerboundPlay),
}

impl ServerboundPacket {
    /// Phase this packet belongs to.
    pub fn phase(&self) -> ProtocolPhase {
        match self {
            ServerboundPacket::Handshake(_) => ProtocolPhase::Handshake,
            ServerboundPacket::Status(_) => ProtocolPhase::Status,
            ServerboundPacket::Login(_) => ProtocolPhase::Login,
            ServerboundPacket::Configuration(_) => ProtocolPhase::Configuration,
            ServerboundPacket::Play(_) => ProtocolPhase::Play,
        }
    }

    /// Serialize the inner phase packet.
    pub fn encode(&self) -> Result<Vec<u8>, PacketError> {
        match self {
            ServerboundPacket::Handshake(p) => encode_packet(p),
            ServerboundPacket::Status(p) => encode_packet(p),
            ServerboundPacket::Login(p) => encode_packet(p),
            ServerboundPacket::Configuration(p) => encode_packet(p),
            ServerboundPacket::Play(p) => encode_packet(p),
        }
    }

    /// Decode a body received while in `phase`.
    pub fn decode(phase: ProtocolPhase, data: &[u8]) -> Result<Self, PacketError> {
        Ok(match phase {
            ProtocolPhase::Handshake => ServerboundPacket::Handshake(decode_packet(data)?),
            ProtocolPhase::Status => ServerboundPacket::Status(decode_packet(data)?),
            ProtocolPhase::Login => ServerboundPacket::Login(decode_packet(data)?),
            ProtocolPhase::Configuration => ServerboundPacket::Configuration(decode_packet(data)?),
            ProtocolPhase::Play => ServerboundPacket::Play(decode_packet(data)?),
        })
    }
}

/// Any packet the server may send.
#[derive(Debug, Clone, PartialEq)]
pub enum ClientboundPacket {
    /// Status phase.
    Status(ClientboundStatus),
    /// Login phase.
    Login(ClientboundLogin),
    /// Configuration phase.
    Configuration(ClientboundConfiguration),
    /// Play phase.
    Play(ClientboundPlay),
}

impl ClientboundPacket {
    /// Phase this packet belongs to.
    pub fn phase(&self) -> ProtocolPhase {
        match self {
            ClientboundPacket::Status(_) => ProtocolPhase::Status,
            ClientboundPacket::Login(_) => ProtocolPhase::Login,
            ClientboundPacket::Configuration(_) => ProtocolPhase::Configuration,
            ClientboundPacket::Play(_) => ProtocolPhase::Play,
        }
    }

    /// Serialize the inner phase packet.
    pub fn encode(&self) -> Result<Vec<u8>, PacketError> {
        match self {
            ClientboundPacket::Status(p) => encode_packet(p),
            ClientboundPacket::Login(p) => encode_packet(p),
            ClientboundPacket::Configuration(p) => encode_packet(p),
            ClientboundPacket::Play(p) => encode_packet(p),
        }
    }

    /// Decode a body received while in `phase`.
    pub fn decode(phase: ProtocolPhase, data: &[u8]) -> Result<Self, PacketError> {
        Ok(match phase {
            ProtocolPhase::Handshake => {
                return Err(PacketError::NoPacketsInPhase {
                    phase,
                    direction: "clientbound",
                });
            }
            ProtocolPhase::Status => ClientboundPacket::Status(decode_packet(data)?),
            ProtocolPhase::Login => ClientboundPacket::Login(decode_packet(data)?),
            ProtocolPhase::Configuration => ClientboundPacket::Configuration(decode_packet(data)?),
            ProtocolPhase::Play => ClientboundPacket::Play(decode_packet(data)?),
        })
    }

    /// Whether this packet tells the client it is being disconnected.
    pub fn is_disconnect(&self) -> bool {
        matches!(
            self,
            ClientboundPacket::Login(ClientboundLogin::LoginDisconnect { .. })
                | ClientboundPacket::Configuration(ClientboundConfiguration::Disconnect { .. })
                | ClientboundPacket::Play(ClientboundPlay::Disconnect { .. })
        )
    }

    /// The disconnect reason, if this is a disconnect packet.
    pub fn disconnect_reason(&self) -> Option<&str> {
        match self {
            ClientboundPacket::Login(ClientboundLogin::LoginDisconnect { reason })
            | ClientboundPacket::Configuration(ClientboundConfiguration::Disconnect { reason })
            | ClientboundPacket::Play(ClientboundPlay::Disconnect { reason }) => Some(reason),
            _ => None,
        }
    }
}

macro_rules! impl_from_phase_packet {
    ($wrapper:ident :: $variant:ident ($inner:ty)) => {
        impl From<$inner> for $wrapper {
            fn from(packet: $inner) -> Self {
                $wrapper::$variant(packet)
            }
        }
    };
}

impl_from_phase_packet!(ServerboundPacket::Handshake(ServerboundHandshake));
impl_from_phase_packet!(ServerboundPacket::Status(ServerboundStatus));
impl_from_phase_packet!(ServerboundPacket::Login(ServerboundLogin));
impl_from_phase_packet!(ServerboundPacket::Configuration(ServerboundConfiguration));
impl_from_phase_packet!(ServerboundPacket::Play(ServerboundPlay));
impl_from_phase_packet!(ClientboundPacket::Status(ClientboundStatus));
impl_from_phase_packet!(ClientboundPacket::Login(ClientboundLogin));
impl_from_phase_packet!(ClientboundPacket::Configuration(ClientboundConfiguration));
impl_from_phase_packet!(ClientboundPacket::Play(ClientboundPlay));
