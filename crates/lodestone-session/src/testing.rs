//! Shared fixtures for unit tests.

use std::sync::Arc;
use std::time::{Duration, Instant};

use lodestone_config::Config;
use lodestone_net::{
    ClientboundPacket, ConnectionId, GameProfile, NetworkCounters, ProtocolClient, memory_pair,
};

use crate::chat::filter::PassthroughFilter;
use crate::connection::Connection;
use crate::cookie::SessionCookie;
use crate::identity::{IdentityService, OfflineIdentityService, offline_profile};
use crate::listener::PacketListener;
use crate::play::PlayListener;
use crate::server::{Server, ServerContext};
use crate::world::{FlatWorld, World};

fn small_pool(mut config: Config) -> Config {
    config.chat.filter_workers = 1;
    config
}

/// Context with default settings, a flat world and offline identities.
pub(crate) fn test_context() -> ServerContext {
    context_with(Config::default())
}

pub(crate) fn context_with(config: Config) -> ServerContext {
    context_with_world(config, Box::new(FlatWorld::default()))
}

pub(crate) fn context_with_world(config: Config, world: Box<dyn World>) -> ServerContext {
    ServerContext::new(
        small_pool(config),
        world,
        Arc::new(OfflineIdentityService),
        Arc::new(PassthroughFilter),
    )
}

pub(crate) fn test_server(config: Config) -> Server {
    server_with_identity(config, Arc::new(OfflineIdentityService))
}

pub(crate) fn server_with_identity(config: Config, identity: Arc<dyn IdentityService>) -> Server {
    Server::new(
        small_pool(config),
        Box::new(FlatWorld::default()),
        identity,
        Arc::new(PassthroughFilter),
    )
}

/// Decode everything the server has queued for `client`.
pub(crate) fn recv_all(client: &mut ProtocolClient) -> Vec<ClientboundPacket> {
    std::iter::from_fn(|| client.try_recv().ok().flatten()).collect()
}

/// One connection driven directly by a listener, with the client end.
pub(crate) struct SessionHarness {
    pub server: ServerContext,
    pub connection: Connection,
    pub client: ProtocolClient,
    pub profile: GameProfile,
}

impl SessionHarness {
    /// A player that skipped straight to the Play phase.
    pub fn join(name: &str) -> Self {
        Self::join_with(name, |_| {})
    }

    /// Join after adjusting the config, then run the first tick.
    pub fn join_with(name: &str, configure: impl FnOnce(&mut Config)) -> Self {
        let mut config = Config::default();
        configure(&mut config);
        let profile = offline_profile(name);
        let cookie = SessionCookie::initial(profile.clone(), false);
        let listener = PlayListener::new(cookie, Instant::now(), &config);
        Self::attach(config, profile, Box::new(listener))
    }

    /// A player that skipped straight to the Play phase on `server`.
    pub fn join_in(server: ServerContext, name: &str) -> Self {
        let profile = offline_profile(name);
        let cookie = SessionCookie::initial(profile.clone(), false);
        let listener = PlayListener::new(cookie, Instant::now(), &server.config);
        Self::attach_to(server, profile, Box::new(listener))
    }

    /// A registered player whose connection starts with `listener`.
    pub fn attach(config: Config, profile: GameProfile, listener: Box<dyn PacketListener>) -> Self {
        Self::attach_to(context_with(config), profile, listener)
    }

    fn attach_to(
        mut server: ServerContext,
        profile: GameProfile,
        listener: Box<dyn PacketListener>,
    ) -> Self {
        let phase = listener.phase();
        let (transport, peer) = memory_pair(ConnectionId(1), "127.0.0.1:40000".parse().unwrap(), 1024);
        let connection = Connection::new(
            transport,
            Arc::new(NetworkCounters::new()),
            Duration::from_secs(15),
            listener,
        );
        server
            .sessions
            .register(profile.id, connection.handle().clone());

        let mut client = ProtocolClient::new(peer);
        client.set_phase(phase);
        let mut harness = Self {
            server,
            connection,
            client,
            profile,
        };
        harness.tick();
        harness
    }

    pub fn tick(&mut self) {
        self.server.world.tick();
        self.connection.tick(&mut self.server, Instant::now());
    }

    /// Tick until `done` holds for everything received, the connection
    /// closes, or about a second passes.
    pub async fn tick_until(
        &mut self,
        done: impl Fn(&[ClientboundPacket]) -> bool,
    ) -> Vec<ClientboundPacket> {
        let mut received = Vec::new();
        for _ in 0..200 {
            self.tick();
            received.extend(recv_all(&mut self.client));
            if done(&received) || self.connection.handle().is_read_only() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        received
    }
}
