//! Handshake phase: route the connection by declared intent.

use lodestone_net::packets::{Intent, ServerboundHandshake};
use lodestone_net::status::PROTOCOL_NUMBER;
use lodestone_net::{ProtocolPhase, ServerboundPacket};

use crate::error::{DisconnectReason, SessionError};
use crate::listener::{ListenerContext, PacketListener};
use crate::login::LoginListener;
use crate::status::StatusListener;

/// First listener of every connection.
#[derive(Debug, Default)]
pub struct HandshakeListener;

impl HandshakeListener {
    /// New handshake listener.
    pub fn new() -> Self {
        Self
    }
}

impl PacketListener for HandshakeListener {
    fn phase(&self) -> ProtocolPhase {
        ProtocolPhase::Handshake
    }

    fn handle_packet(
        &mut self,
        packet: ServerboundPacket,
        ctx: &mut ListenerContext<'_>,
    ) -> Result<(), SessionError> {
        let ServerboundPacket::Handshake(ServerboundHandshake::Intention {
            protocol_version,
            host,
            port,
            intent,
        }) = packet
        else {
            return Err(SessionError::violation("expected handshake"));
        };

        let intent = Intent::from_id(intent)
            .ok_or_else(|| SessionError::violation(format!("unknown intent {intent}")))?;
        tracing::debug!(
            connection = %ctx.connection.id(),
            "Handshake from {} via {host}:{port}: {intent:?}, protocol {protocol_version}",
            ctx.connection.remote_addr()
        );

        match intent {
            Intent::Status => {
                ctx.hand_off(Box::new(StatusListener::new()));
                Ok(())
            }
            Intent::Login | Intent::Transfer => {
                let transferred = intent == Intent::Transfer;
                let rejection = if protocol_version < PROTOCOL_NUMBER {
                    Some(DisconnectReason::OutdatedClient)
                } else if protocol_version > PROTOCOL_NUMBER {
                    Some(DisconnectReason::OutdatedServer)
                } else if transferred && !ctx.server.config.server.accepts_transfers {
                    Some(DisconnectReason::TransfersDisabled)
                } else {
                    None
                };
                if let Some(reason) = rejection {
                    // Rejections are reported with a Login disconnect.
                    ctx.connection.set_outbound_phase(ProtocolPhase::Login);
                    return Err(reason.into());
                }
                ctx.hand_off(Box::new(LoginListener::new(transferred)));
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use lodestone_config::Config;
    use lodestone_net::packets::{ClientboundLogin, ClientboundStatus, ServerboundStatus};
    use lodestone_net::status::ServerStatus;
    use lodestone_net::{ClientboundPacket, ProtocolClient};

    use super::*;
    use crate::server::Server;
    use crate::testing::{recv_all, test_server};

    async fn connect(server: &Server, protocol_version: u32, intent: Intent) -> ProtocolClient {
        let mut client = ProtocolClient::new(server.connect_memory("127.0.0.1:46000".parse().unwrap()));
        client
            .send(ServerboundHandshake::Intention {
                protocol_version,
                host: "localhost".to_string(),
                port: 25565,
                intent: intent.id(),
            })
            .await
            .unwrap();
        client
    }

    async fn pump_until_closed(server: &mut Server, client: &mut ProtocolClient) -> Vec<ClientboundPacket> {
        let mut received = Vec::new();
        for _ in 0..100 {
            server.tick();
            received.extend(recv_all(client));
            if server.connection_count() == 0 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(2)).await;
        }
        received
    }

    #[tokio::test]
    async fn test_status_query_then_ping_closes() {
        let mut server = test_server(Config::default());
        let mut client = connect(&server, PROTOCOL_NUMBER, Intent::Status).await;
        client.set_phase(ProtocolPhase::Status);
        client.send(ServerboundStatus::StatusRequest).await.unwrap();
        client
            .send(ServerboundStatus::PingRequest { time: 42 })
            .await
            .unwrap();

        let packets = pump_until_closed(&mut server, &mut client).await;
        let Some(ClientboundPacket::Status(ClientboundStatus::StatusResponse { json })) = packets.first()
        else {
            panic!("expected status response, got {packets:?}");
        };
        let status: ServerStatus = serde_json::from_str(json).unwrap();
        assert_eq!(status.version.protocol, PROTOCOL_NUMBER);
        assert_eq!(status.description.text, "A Lodestone Server");
        assert_eq!(
            packets.get(1),
            Some(&ClientboundPacket::Status(ClientboundStatus::PongResponse { time: 42 }))
        );
        assert_eq!(server.connection_count(), 0);
    }

    #[tokio::test]
    async fn test_second_status_request_is_a_violation() {
        let mut server = test_server(Config::default());
        let mut client = connect(&server, PROTOCOL_NUMBER, Intent::Status).await;
        client.set_phase(ProtocolPhase::Status);
        client.send(ServerboundStatus::StatusRequest).await.unwrap();
        client.send(ServerboundStatus::StatusRequest).await.unwrap();

        let packets = pump_until_closed(&mut server, &mut client).await;
        assert_eq!(packets.len(), 1);
        assert_eq!(server.connection_count(), 0);
    }

    #[tokio::test]
    async fn test_version_mismatch_is_reported_during_login() {
        for (version, reason) in [
            (PROTOCOL_NUMBER - 1, "multiplayer.disconnect.outdated_client"),
            (PROTOCOL_NUMBER + 1, "multiplayer.disconnect.outdated_server"),
        ] {
            let mut server = test_server(Config::default());
            let mut client = connect(&server, version, Intent::Login).await;
            client.set_phase(ProtocolPhase::Login);
            let packets = pump_until_closed(&mut server, &mut client).await;
            assert_eq!(
                packets,
                vec![ClientboundPacket::Login(ClientboundLogin::LoginDisconnect {
                    reason: reason.to_string(),
                })]
            );
        }
    }

    #[tokio::test]
    async fn test_transfers_follow_config() {
        let mut server = test_server(Config::default());
        let mut client = connect(&server, PROTOCOL_NUMBER, Intent::Transfer).await;
        client.set_phase(ProtocolPhase::Login);
        let packets = pump_until_closed(&mut server, &mut client).await;
        assert_eq!(
            packets.last().and_then(ClientboundPacket::disconnect_reason),
            Some("multiplayer.disconnect.transfers_disabled")
        );

        let mut config = Config::default();
        config.server.accepts_transfers = true;
        let mut server = test_server(config);
        let _client = connect(&server, PROTOCOL_NUMBER, Intent::Transfer).await;
        for _ in 0..100 {
            server.tick();
            if server.phase_of(lodestone_net::ConnectionId(1)) == Some(ProtocolPhase::Login) {
                break;
            }
            tokio::time::sleep(Duration::from_millis(2)).await;
        }
        assert_eq!(
            server.phase_of(lodestone_net::ConnectionId(1)),
            Some(ProtocolPhase::Login)
        );
    }
}
