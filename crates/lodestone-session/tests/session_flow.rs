//! Drives in-memory clients through the full session lifecycle.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use lodestone_config::Config;
use lodestone_net::packets::types::KnownPack;
use lodestone_net::packets::{
    ClientboundConfiguration, ClientboundLogin, ClientboundPlay, Intent, ServerboundConfiguration,
    ServerboundHandshake, ServerboundLogin, ServerboundPlay,
};
use lodestone_net::{ClientboundPacket, ConnectionId, ProtocolClient, ProtocolPhase};
use lodestone_session::{FlatWorld, OfflineIdentityService, PassthroughFilter, Server};
use uuid::Uuid;

fn server() -> Server {
    let mut config = Config::default();
    config.chat.filter_workers = 1;
    Server::new(
        config,
        Box::new(FlatWorld::new(2)),
        Arc::new(OfflineIdentityService),
        Arc::new(PassthroughFilter),
    )
}

fn addr() -> SocketAddr {
    "127.0.0.1:41000".parse().unwrap()
}

/// Tick until a received packet satisfies `done`, returning everything received.
async fn pump(
    server: &mut Server,
    client: &mut ProtocolClient,
    done: impl Fn(&ClientboundPacket) -> bool,
) -> Vec<ClientboundPacket> {
    let mut received = Vec::new();
    for _ in 0..100 {
        server.tick();
        while let Some(packet) = client.try_recv().unwrap() {
            received.push(packet);
        }
        if received.iter().any(&done) || client.is_closed() {
            return received;
        }
        tokio::time::sleep(Duration::from_millis(2)).await;
    }
    panic!("condition not reached, received {received:?}");
}

async fn login(server: &mut Server, client: &mut ProtocolClient, name: &str) -> Vec<ClientboundPacket> {
    client
        .send(ServerboundHandshake::Intention {
            protocol_version: lodestone_net::status::PROTOCOL_NUMBER,
            host: "localhost".to_string(),
            port: 25565,
            intent: Intent::Login.id(),
        })
        .await
        .unwrap();
    client.set_phase(ProtocolPhase::Login);
    client
        .send(ServerboundLogin::Hello {
            name: name.to_string(),
            profile_id: Uuid::nil(),
        })
        .await
        .unwrap();
    pump(server, client, |p| {
        matches!(
            p,
            ClientboundPacket::Login(
                ClientboundLogin::LoginFinished { .. } | ClientboundLogin::LoginDisconnect { .. }
            )
        )
    })
    .await
}

/// Answer the configuration tasks until the server finishes, then enter Play.
async fn configure(server: &mut Server, client: &mut ProtocolClient) -> Vec<ClientboundPacket> {
    let offer = pump(server, client, |p| {
        matches!(
            p,
            ClientboundPacket::Configuration(ClientboundConfiguration::SelectKnownPacks { .. })
        )
    })
    .await;
    assert!(offer.iter().all(|p| p.disconnect_reason().is_none()));

    client
        .send(ServerboundConfiguration::SelectKnownPacks {
            packs: vec![KnownPack {
                namespace: "minecraft".to_string(),
                id: "core".to_string(),
                version: "1".to_string(),
            }],
        })
        .await
        .unwrap();
    let setup = pump(server, client, |p| {
        matches!(
            p,
            ClientboundPacket::Configuration(ClientboundConfiguration::FinishConfiguration)
        )
    })
    .await;
    assert!(setup.iter().any(|p| matches!(
        p,
        ClientboundPacket::Configuration(ClientboundConfiguration::RegistryData { .. })
    )));

    client
        .send(ServerboundConfiguration::FinishConfiguration)
        .await
        .unwrap();
    pump(server, client, |p| {
        matches!(p, ClientboundPacket::Play(ClientboundPlay::Login { .. }))
    })
    .await
}

#[tokio::test]
async fn test_full_session_with_reconfiguration() {
    let mut server = server();
    let mut client = ProtocolClient::new(server.connect_memory(addr()));
    let id = ConnectionId(1);

    let packets = login(&mut server, &mut client, "Alex").await;
    assert!(matches!(
        packets.first(),
        Some(ClientboundPacket::Login(ClientboundLogin::LoginCompression { threshold: 256 }))
    ));
    let Some(ClientboundPacket::Login(ClientboundLogin::LoginFinished { profile })) = packets.last()
    else {
        panic!("expected login success, got {packets:?}");
    };
    assert_eq!(profile.name, "Alex");
    let profile_id = profile.id;

    client.send(ServerboundLogin::LoginAcknowledged).await.unwrap();
    configure(&mut server, &mut client).await;
    assert_eq!(server.phase_of(id), Some(ProtocolPhase::Play));
    assert!(server.context().players.contains(profile_id));

    assert!(server.reconfigure(profile_id));
    pump(&mut server, &mut client, |p| {
        matches!(p, ClientboundPacket::Play(ClientboundPlay::StartConfiguration))
    })
    .await;
    assert!(!server.context().players.contains(profile_id));

    client
        .send(ServerboundPlay::ConfigurationAcknowledged)
        .await
        .unwrap();
    configure(&mut server, &mut client).await;

    assert_eq!(
        server.phase_history(id),
        Some(
            &[
                ProtocolPhase::Handshake,
                ProtocolPhase::Login,
                ProtocolPhase::Configuration,
                ProtocolPhase::Play,
                ProtocolPhase::Configuration,
                ProtocolPhase::Play,
            ][..]
        )
    );
    assert!(server.context().players.contains(profile_id));
    assert_eq!(server.context().sessions.len(), 1);
}

#[tokio::test]
async fn test_invalid_name_is_rejected_during_login() {
    let mut server = server();
    let mut client = ProtocolClient::new(server.connect_memory(addr()));

    let packets = login(&mut server, &mut client, "no spaces allowed").await;
    assert_eq!(
        packets.last().and_then(ClientboundPacket::disconnect_reason),
        Some("multiplayer.disconnect.invalid_player_data")
    );
    assert!(server.context().sessions.is_empty());
}

#[tokio::test]
async fn test_client_disconnect_releases_session() {
    let mut server = server();
    let mut client = ProtocolClient::new(server.connect_memory(addr()));
    login(&mut server, &mut client, "Steve").await;
    client.send(ServerboundLogin::LoginAcknowledged).await.unwrap();
    configure(&mut server, &mut client).await;
    assert_eq!(server.context().sessions.len(), 1);

    drop(client);
    for _ in 0..10 {
        server.tick();
        if server.connection_count() == 0 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(2)).await;
    }
    assert_eq!(server.connection_count(), 0);
    assert!(server.context().sessions.is_empty());
    assert!(server.context().players.is_empty());
}
