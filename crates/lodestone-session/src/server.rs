//! The tick loop: owns every connection and all session state.
//!
//! I/O tasks hand new [`Transport`]s over a channel; everything after that
//! happens inside [`Server::tick_at`] on one thread.

use std::net::{AddrParseError, SocketAddr};
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use lodestone_config::Config;
use lodestone_net::{
    AcceptorConfig, ConnectionId, FrameConfig, IdGenerator, NetworkCounters, PeerLink,
    ProtocolPhase, ServerStatus, TcpAcceptor, Transport, memory_pair, status_channel,
};
use tokio::sync::{mpsc, watch};
use uuid::Uuid;

use crate::chat::commands::CommandRegistry;
use crate::chat::filter::{FilterPool, TextFilter};
use crate::connection::Connection;
use crate::error::DisconnectReason;
use crate::handshake::HandshakeListener;
use crate::identity::IdentityService;
use crate::login::crypto::ServerKeyPair;
use crate::players::{PlayerList, SessionRegistry};
use crate::world::World;

/// Server-wide state every listener can reach.
pub struct ServerContext {
    /// Active configuration.
    pub config: Config,
    /// Players in the Play phase.
    pub players: PlayerList,
    /// Authenticated sessions, Configuration and Play.
    pub sessions: SessionRegistry,
    /// Game world.
    pub world: Box<dyn World>,
    /// Login identity verification.
    pub identity: Arc<dyn IdentityService>,
    /// Chat content filter workers.
    pub filter_pool: FilterPool,
    /// Chat commands.
    pub commands: CommandRegistry,
    /// Traffic counters shared with the I/O tasks.
    pub counters: Arc<NetworkCounters>,
    /// Login key pair.
    pub key_pair: Arc<ServerKeyPair>,
    /// Ticks run so far.
    pub tick_count: u64,
    authenticators: u64,
    status_tx: watch::Sender<ServerStatus>,
}

impl ServerContext {
    /// Build the context. Starts the filter worker threads.
    pub fn new(
        config: Config,
        world: Box<dyn World>,
        identity: Arc<dyn IdentityService>,
        filter: Arc<dyn TextFilter>,
    ) -> Self {
        let status = ServerStatus::new(
            config.server.motd.clone(),
            config.server.max_players,
            config.server.enforce_secure_chat,
        );
        let (status_tx, _) = status_channel(status);
        Self {
            filter_pool: FilterPool::new(filter, config.chat.filter_workers),
            config,
            players: PlayerList::default(),
            sessions: SessionRegistry::default(),
            world,
            identity,
            commands: CommandRegistry::with_defaults(),
            counters: Arc::new(NetworkCounters::new()),
            key_pair: Arc::new(ServerKeyPair::generate()),
            tick_count: 0,
            authenticators: 0,
            status_tx,
        }
    }

    /// Number for the next authenticator thread name.
    pub fn next_authenticator_id(&mut self) -> u64 {
        self.authenticators += 1;
        self.authenticators
    }

    /// Current status as shown to server list queries.
    pub fn status(&self) -> ServerStatus {
        let mut status = self.status_tx.borrow().clone();
        status.players.online = u32::try_from(self.players.len()).unwrap_or(u32::MAX);
        status
    }

    /// Receiver for status updates published each tick.
    pub fn status_receiver(&self) -> watch::Receiver<ServerStatus> {
        self.status_tx.subscribe()
    }

    /// Wall-clock milliseconds since the Unix epoch.
    pub fn now_millis(&self) -> i64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_or(0, |d| i64::try_from(d.as_millis()).unwrap_or(i64::MAX))
    }

    fn publish_status(&self) {
        let online = u32::try_from(self.players.len()).unwrap_or(u32::MAX);
        self.status_tx.send_if_modified(|status| {
            if status.players.online == online {
                return false;
            }
            status.players.online = online;
            true
        });
    }
}

/// A game server instance.
pub struct Server {
    context: ServerContext,
    connections: Vec<Connection>,
    incoming_tx: mpsc::UnboundedSender<Transport>,
    incoming_rx: mpsc::UnboundedReceiver<Transport>,
    id_gen: Arc<IdGenerator>,
}

impl Server {
    /// Create a server around the given collaborators.
    pub fn new(
        config: Config,
        world: Box<dyn World>,
        identity: Arc<dyn IdentityService>,
        filter: Arc<dyn TextFilter>,
    ) -> Self {
        let (incoming_tx, incoming_rx) = mpsc::unbounded_channel();
        Self {
            context: ServerContext::new(config, world, identity, filter),
            connections: Vec::new(),
            incoming_tx,
            incoming_rx,
            id_gen: Arc::new(IdGenerator::new()),
        }
    }

    /// Shared server state.
    pub fn context(&self) -> &ServerContext {
        &self.context
    }

    /// Shared server state, mutably.
    pub fn context_mut(&mut self) -> &mut ServerContext {
        &mut self.context
    }

    /// Channel the I/O side uses to hand over new transports.
    pub fn transport_sink(&self) -> mpsc::UnboundedSender<Transport> {
        self.incoming_tx.clone()
    }

    /// Open an in-process connection and return the client's end.
    pub fn connect_memory(&self, remote_addr: SocketAddr) -> PeerLink {
        let id = self.id_gen.next_id();
        let (transport, peer) = memory_pair(
            id,
            remote_addr,
            self.context.config.network.inbound_queue_capacity,
        );
        self.context.counters.record_accept();
        if self.incoming_tx.send(transport).is_err() {
            tracing::warn!(connection = %id, "Server is gone, memory connection dropped");
        }
        peer
    }

    /// TCP acceptor bound to the configured address.
    pub fn acceptor(&self) -> Result<TcpAcceptor, AddrParseError> {
        let network = &self.context.config.network;
        let bind_addr: SocketAddr = format!("{}:{}", network.bind_address, network.port).parse()?;
        let config = AcceptorConfig {
            bind_addr,
            max_connections: network.max_connections,
            frame: FrameConfig::new(network.max_frame_size),
            inbound_capacity: network.inbound_queue_capacity,
        };
        Ok(TcpAcceptor::new(
            config,
            Arc::clone(&self.id_gen),
            Arc::clone(&self.context.counters),
            self.context.status_receiver(),
        ))
    }

    /// Live connections.
    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    /// Active phase of a live connection.
    pub fn phase_of(&self, id: ConnectionId) -> Option<ProtocolPhase> {
        self.connection(id).and_then(Connection::phase)
    }

    /// Every phase a live connection has been in, in order.
    pub fn phase_history(&self, id: ConnectionId) -> Option<&[ProtocolPhase]> {
        self.connection(id).map(Connection::phase_history)
    }

    fn connection(&self, id: ConnectionId) -> Option<&Connection> {
        self.connections.iter().find(|c| c.handle().id() == id)
    }

    /// Ask a playing client to go back to configuration.
    pub fn reconfigure(&mut self, id: Uuid) -> bool {
        match self.context.players.get_mut(id) {
            Some(player) => {
                player.reconfigure_requested = true;
                true
            }
            None => false,
        }
    }

    /// Run one tick at the current time.
    pub fn tick(&mut self) {
        self.tick_at(Instant::now());
    }

    /// Run one tick as if it were `now`.
    pub fn tick_at(&mut self, now: Instant) {
        let grace = Duration::from_millis(self.context.config.network.disconnect_grace_ms);
        while let Ok(transport) = self.incoming_rx.try_recv() {
            tracing::debug!(connection = %transport.id, "New connection from {}", transport.remote_addr);
            self.connections.push(Connection::new(
                transport,
                Arc::clone(&self.context.counters),
                grace,
                Box::new(HandshakeListener::new()),
            ));
        }

        self.context.world.tick();
        for connection in &mut self.connections {
            connection.tick(&mut self.context, now);
        }
        self.connections.retain(|c| !c.is_finished());

        self.context.tick_count += 1;
        self.context.publish_status();
    }

    /// Disconnect everyone and tear the connections down.
    pub fn shutdown(&mut self) {
        tracing::info!("Stopping server, disconnecting {} connections", self.connections.len());
        for connection in &self.connections {
            connection
                .handle()
                .disconnect(DisconnectReason::ServerShutdown);
        }
        self.tick();
    }

    /// Tick at the configured rate until `shutdown` turns `true`.
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
        let tick_millis = self.context.config.network.tick_millis();
        let mut interval = tokio::time::interval(Duration::from_millis(tick_millis));
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        let mut last_stats = Instant::now();
        tracing::info!("Server ticking every {tick_millis}ms");

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    let started = Instant::now();
                    self.tick_at(started);
                    let elapsed = started.elapsed();
                    if elapsed > Duration::from_millis(tick_millis) {
                        tracing::warn!("Tick {} took {elapsed:?}", self.context.tick_count);
                    }
                    if last_stats.elapsed() >= Duration::from_secs(1) {
                        last_stats = Instant::now();
                        self.context.counters.snapshot_and_reset().log();
                    }
                }
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        break;
                    }
                }
            }
        }
        self.shutdown();
    }
}
