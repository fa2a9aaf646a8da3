//! Packet-level protocol client.
//!
//! Drives the client side of a connection over either an in-process
//! [`PeerLink`] or a TCP socket. Tracks the client's own protocol phase the
//! way a real client does: the outbound phase flips when the client sends
//! the acknowledgement packet for a phase change.

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tokio::sync::mpsc;

use crate::cipher::Direction;
use crate::codec::{CodecError, PacketDecoder, PacketEncoder};
use crate::framing::{FrameConfig, read_frame, write_frame};
use crate::packets::{
    ClientboundLogin, ClientboundPacket, ServerboundConfiguration, ServerboundLogin,
    ServerboundPacket, ServerboundPlay,
};
use crate::phase::ProtocolPhase;
use crate::transport::{Liveness, Outbound, PeerLink, TransportClosed, TransportKind};

/// Errors raised by [`ProtocolClient`].
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// Encoding or decoding failed.
    #[error(transparent)]
    Codec(#[from] CodecError),
    /// The connection is closed.
    #[error(transparent)]
    Closed(#[from] TransportClosed),
}

/// Client side of one connection.
pub struct ProtocolClient {
    link: PeerLink,
    encoder: PacketEncoder,
    decoder: PacketDecoder,
    phase: ProtocolPhase,
    closed: bool,
}

impl ProtocolClient {
    /// Wrap an existing peer link, starting in the Handshake phase.
    pub fn new(link: PeerLink) -> Self {
        Self {
            link,
            encoder: PacketEncoder::new(Direction::Serverbound),
            decoder: PacketDecoder::new(Direction::Clientbound),
            phase: ProtocolPhase::Handshake,
            closed: false,
        }
    }

    /// Connect to a server over TCP.
    pub async fn connect(addr: SocketAddr, frame_config: FrameConfig) -> std::io::Result<Self> {
        let stream = TcpStream::connect(addr).await?;
        stream.set_nodelay(true)?;
        let (mut reader, mut writer) = stream.into_split();

        let (to_server_tx, mut to_server_rx) = mpsc::channel::<Vec<u8>>(256);
        let (from_server_tx, from_server_rx) = mpsc::unbounded_channel();
        let liveness = Liveness::new(TransportKind::Tcp);

        let read_config = frame_config.clone();
        let read_task = tokio::spawn(async move {
            while let Ok(frame) = read_frame(&mut reader, &read_config).await {
                if from_server_tx.send(Outbound::Frame(frame)).is_err() {
                    return;
                }
            }
            let _ = from_server_tx.send(Outbound::Close);
        });
        let write_task = tokio::spawn(async move {
            while let Some(frame) = to_server_rx.recv().await {
                if write_frame(&mut writer, &frame, &frame_config).await.is_err() {
                    break;
                }
            }
            let _ = writer.shutdown().await;
        });
        liveness.register_task(read_task.abort_handle());
        liveness.register_task(write_task.abort_handle());

        Ok(Self::new(PeerLink {
            to_server: to_server_tx,
            from_server: from_server_rx,
            liveness,
        }))
    }

    /// Phase the client currently encodes and decodes in.
    pub fn phase(&self) -> ProtocolPhase {
        self.phase
    }

    /// Force the client's phase.
    pub fn set_phase(&mut self, phase: ProtocolPhase) {
        self.phase = phase;
    }

    /// Encrypt and decrypt all following frames under `key`.
    pub fn enable_encryption(&mut self, key: &[u8; 32]) {
        self.encoder.enable_encryption(key);
        self.decoder.enable_encryption(key);
    }

    /// Whether the server closed the connection.
    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Shared liveness of the underlying link.
    pub fn liveness(&self) -> &Arc<Liveness> {
        &self.link.liveness
    }

    /// Encode and send a packet, following any phase change it implies.
    pub async fn send(&mut self, packet: impl Into<ServerboundPacket>) -> Result<(), ClientError> {
        let packet = packet.into();
        let body = packet.encode().map_err(CodecError::from)?;
        let frame = self.encoder.encode_body(&body)?;
        self.link.send_frame(frame).await?;

        match packet {
            ServerboundPacket::Login(ServerboundLogin::LoginAcknowledged) => {
                self.phase = ProtocolPhase::Configuration;
            }
            ServerboundPacket::Configuration(ServerboundConfiguration::FinishConfiguration) => {
                self.phase = ProtocolPhase::Play;
            }
            ServerboundPacket::Play(ServerboundPlay::ConfigurationAcknowledged) => {
                self.phase = ProtocolPhase::Configuration;
            }
            _ => {}
        }
        Ok(())
    }

    /// Decode the next queued packet without waiting.
    pub fn try_recv(&mut self) -> Result<Option<ClientboundPacket>, ClientError> {
        match self.link.try_recv() {
            Some(Outbound::Frame(frame)) => self.decode(&frame).map(Some),
            Some(Outbound::Close) => {
                self.closed = true;
                Ok(None)
            }
            None => Ok(None),
        }
    }

    /// Wait for the next packet. `None` once the server closed the connection.
    pub async fn recv(&mut self) -> Result<Option<ClientboundPacket>, ClientError> {
        match self.link.recv().await {
            Some(Outbound::Frame(frame)) => self.decode(&frame).map(Some),
            Some(Outbound::Close) | None => {
                self.closed = true;
                Ok(None)
            }
        }
    }

    /// Decode everything queued so far.
    pub fn drain(&mut self) -> Result<Vec<ClientboundPacket>, ClientError> {
        let mut packets = Vec::new();
        while let Some(packet) = self.try_recv()? {
            packets.push(packet);
        }
        Ok(packets)
    }

    fn decode(&mut self, frame: &[u8]) -> Result<ClientboundPacket, ClientError> {
        let body = self.decoder.decode_frame(frame)?;
        let packet = ClientboundPacket::decode(self.phase, &body).map_err(CodecError::from)?;
        if let ClientboundPacket::Login(ClientboundLogin::LoginCompression { threshold }) = &packet {
            let threshold = usize::try_from(*threshold).ok();
            self.encoder.set_compression(threshold);
            self.decoder.set_compression(threshold);
        }
        Ok(packet)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::packets::{ClientboundStatus, ServerboundHandshake, ServerboundStatus, encode_packet};
    use crate::transport::{ConnectionId, memory_pair};

    #[tokio::test]
    async fn test_client_sends_encoded_packets() {
        let (mut transport, link) =
            memory_pair(ConnectionId(1), "127.0.0.1:1".parse().unwrap(), 8);
        let mut client = ProtocolClient::new(link);
        client
            .send(ServerboundHandshake::Intention {
                protocol_version: 1,
                host: "localhost".into(),
                port: 25565,
                intent: 1,
            })
            .await
            .unwrap();
        let frame = transport.inbound.recv().await.unwrap();
        let packet = ServerboundPacket::decode(ProtocolPhase::Handshake, &frame).unwrap();
        assert!(matches!(packet, ServerboundPacket::Handshake(_)));
    }

    #[tokio::test]
    async fn test_client_decodes_in_current_phase() {
        let (transport, link) = memory_pair(ConnectionId(1), "127.0.0.1:1".parse().unwrap(), 8);
        let mut client = ProtocolClient::new(link);
        client.set_phase(ProtocolPhase::Status);
        let body = encode_packet(&ClientboundStatus::PongResponse { time: 9 }).unwrap();
        transport.outbound.send(Outbound::Frame(body)).unwrap();
        transport.outbound.send(Outbound::Close).unwrap();

        let packets = client.drain().unwrap();
        assert_eq!(
            packets,
            vec![ClientboundPacket::Status(ClientboundStatus::PongResponse { time: 9 })]
        );
        assert!(client.is_closed());
        assert!(client.send(ServerboundStatus::StatusRequest).await.is_err());
    }

    #[tokio::test]
    async fn test_compression_packet_applies_to_following_frames() {
        let (transport, link) = memory_pair(ConnectionId(1), "127.0.0.1:1".parse().unwrap(), 8);
        let mut client = ProtocolClient::new(link);
        client.set_phase(ProtocolPhase::Login);

        let compression = encode_packet(&ClientboundLogin::LoginCompression { threshold: 0 }).unwrap();
        transport.outbound.send(Outbound::Frame(compression)).unwrap();
        let mut encoder = PacketEncoder::new(Direction::Clientbound);
        encoder.set_compression(Some(0));
        let reason = encode_packet(&ClientboundLogin::LoginDisconnect {
            reason: "later".into(),
        })
        .unwrap();
        let frame = encoder.encode_body(&reason).unwrap();
        transport.outbound.send(Outbound::Frame(frame)).unwrap();

        let packets = client.drain().unwrap();
        assert_eq!(packets.len(), 2);
        assert_eq!(packets[1].disconnect_reason(), Some("later"));
    }
}
