//! Connections: the shared send handle and the tick-side packet pump.
//!
//! A [`ConnectionHandle`] is the cloneable, non-owning way to talk to a
//! client: other players hold one to deliver chat, listeners use it to
//! reply. The [`Connection`] owns the inbound queue and the one active
//! [`PacketListener`], and is only ever driven by the tick loop.

use std::net::SocketAddr;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use lodestone_net::packets::{ClientboundConfiguration, ClientboundLogin, ClientboundPlay};
use lodestone_net::{
    ClientboundPacket, CodecError, ConnectionId, Direction, Liveness, NetworkCounters, Outbound,
    PacketDecoder, PacketEncoder, ProtocolPhase, ServerboundPacket, Transport, TransportKind,
};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TryRecvError;

use crate::error::{DisconnectReason, SessionError};
use crate::listener::{ListenerContext, PacketListener};
use crate::server::ServerContext;

struct HandleState {
    phase: ProtocolPhase,
    encoder: PacketEncoder,
    decoder: PacketDecoder,
    disconnect: Option<DisconnectReason>,
}

struct HandleInner {
    id: ConnectionId,
    remote_addr: SocketAddr,
    outbound: mpsc::UnboundedSender<Outbound>,
    liveness: Arc<Liveness>,
    counters: Arc<NetworkCounters>,
    state: Mutex<HandleState>,
}

/// Cloneable send side of a connection.
#[derive(Clone)]
pub struct ConnectionHandle {
    inner: Arc<HandleInner>,
}

impl std::fmt::Debug for ConnectionHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionHandle")
            .field("id", &self.inner.id)
            .field("remote_addr", &self.inner.remote_addr)
            .finish_non_exhaustive()
    }
}

impl ConnectionHandle {
    fn new(
        id: ConnectionId,
        remote_addr: SocketAddr,
        outbound: mpsc::UnboundedSender<Outbound>,
        liveness: Arc<Liveness>,
        counters: Arc<NetworkCounters>,
    ) -> Self {
        Self {
            inner: Arc::new(HandleInner {
                id,
                remote_addr,
                outbound,
                liveness,
                counters,
                state: Mutex::new(HandleState {
                    phase: ProtocolPhase::Handshake,
                    encoder: PacketEncoder::new(Direction::Clientbound),
                    decoder: PacketDecoder::new(Direction::Serverbound),
                    disconnect: None,
                }),
            }),
        }
    }

    fn state(&self) -> MutexGuard<'_, HandleState> {
        self.inner.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Connection id.
    pub fn id(&self) -> ConnectionId {
        self.inner.id
    }

    /// Peer address.
    pub fn remote_addr(&self) -> SocketAddr {
        self.inner.remote_addr
    }

    /// Whether the underlying transport is still open.
    pub fn is_alive(&self) -> bool {
        self.inner.liveness.is_alive()
    }

    /// Whether the transport is an in-process channel.
    pub fn is_memory(&self) -> bool {
        self.inner.liveness.kind() == TransportKind::Memory
    }

    /// Whether a disconnect has been dispatched. No further sends happen.
    pub fn is_read_only(&self) -> bool {
        self.state().disconnect.is_some()
    }

    /// Reason of the dispatched disconnect, if any.
    pub fn disconnect_reason(&self) -> Option<DisconnectReason> {
        self.state().disconnect.clone()
    }

    /// Phase outgoing packets are encoded for.
    pub fn outbound_phase(&self) -> ProtocolPhase {
        self.state().phase
    }

    pub(crate) fn set_outbound_phase(&self, phase: ProtocolPhase) {
        self.state().phase = phase;
    }

    /// Encrypt both directions from the next frame on.
    pub fn enable_encryption(&self, key: &[u8; 32]) {
        let mut state = self.state();
        state.encoder.enable_encryption(key);
        state.decoder.enable_encryption(key);
    }

    /// Compress both directions from the next frame on.
    pub fn set_compression(&self, threshold: Option<usize>) {
        let mut state = self.state();
        state.encoder.set_compression(threshold);
        state.decoder.set_compression(threshold);
    }

    pub(crate) fn liveness(&self) -> &Arc<Liveness> {
        &self.inner.liveness
    }

    pub(crate) fn decode(&self, frame: &[u8]) -> Result<Vec<u8>, CodecError> {
        let body = self.state().decoder.decode_frame(frame)?;
        self.inner
            .counters
            .record_receive(frame.len() as u64, body.len() as u64);
        Ok(body)
    }

    /// Queue a packet for the client.
    ///
    /// Dropped when the connection is read-only or closed, or when the
    /// packet does not belong to the current outbound phase.
    pub fn send(&self, packet: impl Into<ClientboundPacket>) {
        let packet = packet.into();
        let mut state = self.state();
        if state.disconnect.is_some() || !self.is_alive() {
            tracing::trace!(connection = %self.inner.id, "Dropping packet for closed connection");
            return;
        }
        self.send_locked(&mut state, &packet);
    }

    fn send_locked(&self, state: &mut HandleState, packet: &ClientboundPacket) {
        if packet.phase() != state.phase {
            tracing::warn!(
                connection = %self.inner.id,
                "Refusing to send {} packet in {} phase",
                packet.phase(),
                state.phase
            );
            return;
        }
        let frame = match packet
            .encode()
            .map_err(CodecError::from)
            .and_then(|body| {
                let frame = state.encoder.encode_body(&body)?;
                Ok((body.len(), frame))
            }) {
            Ok((raw_len, frame)) => {
                self.inner
                    .counters
                    .record_send(frame.len() as u64, raw_len as u64);
                frame
            }
            Err(e) => {
                tracing::error!(connection = %self.inner.id, "Failed to encode packet: {e}");
                return;
            }
        };
        let _ = self.inner.outbound.send(Outbound::Frame(frame));
    }

    /// Tell the client why, then close. Idempotent: later calls do nothing.
    pub fn disconnect(&self, reason: DisconnectReason) {
        let mut state = self.state();
        if state.disconnect.is_some() {
            return;
        }
        let message = reason.message();
        let notice: Option<ClientboundPacket> = match state.phase {
            ProtocolPhase::Handshake | ProtocolPhase::Status => None,
            ProtocolPhase::Login => Some(
                ClientboundLogin::LoginDisconnect {
                    reason: message.clone(),
                }
                .into(),
            ),
            ProtocolPhase::Configuration => Some(
                ClientboundConfiguration::Disconnect {
                    reason: message.clone(),
                }
                .into(),
            ),
            ProtocolPhase::Play => Some(
                ClientboundPlay::Disconnect {
                    reason: message.clone(),
                }
                .into(),
            ),
        };
        if let Some(notice) = notice
            && self.is_alive()
        {
            self.send_locked(&mut state, &notice);
        }
        tracing::info!(
            connection = %self.inner.id,
            phase = %state.phase,
            "Disconnecting {}: {message}",
            self.inner.remote_addr
        );
        state.disconnect = Some(reason);
        drop(state);

        let _ = self.inner.outbound.send(Outbound::Close);
        if self.is_memory() {
            self.inner.liveness.mark_closed();
        }
    }
}

/// Tick-side owner of one connection and its active listener.
pub struct Connection {
    handle: ConnectionHandle,
    inbound: mpsc::Receiver<Vec<u8>>,
    listener: Option<Box<dyn PacketListener>>,
    history: Vec<ProtocolPhase>,
    closing_since: Option<Instant>,
    grace: Duration,
    attached: bool,
    finished: bool,
}

impl Connection {
    /// Wrap a transport with `listener` as the first active listener.
    ///
    /// The listener is attached on the first [`Connection::tick`].
    pub fn new(
        transport: Transport,
        counters: Arc<NetworkCounters>,
        grace: Duration,
        listener: Box<dyn PacketListener>,
    ) -> Self {
        let Transport {
            id,
            remote_addr,
            inbound,
            outbound,
            liveness,
        } = transport;
        let handle = ConnectionHandle::new(id, remote_addr, outbound, liveness, counters);
        let phase = listener.phase();
        handle.set_outbound_phase(phase);
        Self {
            handle,
            inbound,
            listener: Some(listener),
            history: vec![phase],
            closing_since: None,
            grace,
            attached: false,
            finished: false,
        }
    }

    /// The send handle.
    pub fn handle(&self) -> &ConnectionHandle {
        &self.handle
    }

    /// Phase of the active listener.
    pub fn phase(&self) -> Option<ProtocolPhase> {
        self.listener.as_ref().map(|l| l.phase())
    }

    /// Every phase this connection's listener has had, in order.
    pub fn phase_history(&self) -> &[ProtocolPhase] {
        &self.history
    }

    /// Whether the connection is gone and its listener has been told.
    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Process queued frames, tick the listener and detect closure.
    pub fn tick(&mut self, server: &mut ServerContext, now: Instant) {
        if self.finished {
            return;
        }

        if !self.attached {
            self.attached = true;
            if let Some(listener) = self.listener.as_mut() {
                let mut ctx = ListenerContext::new(&self.handle, server, now);
                let result = listener.on_attach(&mut ctx);
                let handoff = ctx.take_handoff();
                self.settle(result, handoff, server, now);
            }
        }

        while !self.handle.is_read_only() {
            match self.inbound.try_recv() {
                Ok(frame) => self.receive(&frame, server, now),
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => {
                    self.handle.liveness().mark_closed();
                    break;
                }
            }
        }

        if !self.handle.is_read_only()
            && self.handle.is_alive()
            && let Some(listener) = self.listener.as_mut()
        {
            let mut ctx = ListenerContext::new(&self.handle, server, now);
            let result = listener.tick(&mut ctx);
            let handoff = ctx.take_handoff();
            self.settle(result, handoff, server, now);
        }

        self.check_closed(server, now);
    }

    fn receive(&mut self, frame: &[u8], server: &mut ServerContext, now: Instant) {
        let Some(listener) = self.listener.as_mut() else {
            return;
        };
        let phase = listener.phase();
        let packet = match self
            .handle
            .decode(frame)
            .map_err(SessionError::from)
            .and_then(|body| {
                ServerboundPacket::decode(phase, &body)
                    .map_err(|e| SessionError::violation(format!("malformed {phase} packet: {e}")))
            }) {
            Ok(packet) => packet,
            Err(e) => {
                self.fail(e);
                return;
            }
        };

        if !listener.is_accepting_messages() {
            tracing::trace!(connection = %self.handle.id(), "Ignoring packet, listener not accepting");
            return;
        }

        let mut ctx = ListenerContext::new(&self.handle, server, now);
        let result = listener.handle_packet(packet, &mut ctx);
        let handoff = ctx.take_handoff();
        self.settle(result, handoff, server, now);
    }

    fn settle(
        &mut self,
        result: Result<(), SessionError>,
        handoff: Option<Box<dyn PacketListener>>,
        server: &mut ServerContext,
        now: Instant,
    ) {
        match result {
            Err(e) => self.fail(e),
            Ok(()) => {
                if let Some(next) = handoff
                    && !self.handle.is_read_only()
                {
                    self.swap_listener(next, server, now);
                }
            }
        }
    }

    fn swap_listener(
        &mut self,
        next: Box<dyn PacketListener>,
        server: &mut ServerContext,
        now: Instant,
    ) {
        let next_phase = next.phase();
        if let Some(current) = self.phase()
            && !current.can_transition_to(next_phase)
        {
            tracing::error!(
                connection = %self.handle.id(),
                "Illegal phase transition {current} -> {next_phase}"
            );
            self.fail(SessionError::violation(format!(
                "illegal transition {current} -> {next_phase}"
            )));
            return;
        }

        tracing::debug!(connection = %self.handle.id(), "Entering {next_phase} phase");
        self.handle.set_outbound_phase(next_phase);
        self.listener = Some(next);
        self.history.push(next_phase);

        if let Some(listener) = self.listener.as_mut() {
            let mut ctx = ListenerContext::new(&self.handle, server, now);
            let result = listener.on_attach(&mut ctx);
            let handoff = ctx.take_handoff();
            self.settle(result, handoff, server, now);
        }
    }

    fn fail(&mut self, error: SessionError) {
        tracing::debug!(connection = %self.handle.id(), "Session error: {error}");
        self.handle.disconnect(error.disconnect_reason());
    }

    fn check_closed(&mut self, server: &mut ServerContext, now: Instant) {
        if self.handle.is_alive() {
            if !self.handle.is_read_only() {
                return;
            }
            let since = *self.closing_since.get_or_insert(now);
            if now.duration_since(since) < self.grace {
                return;
            }
            tracing::warn!(
                connection = %self.handle.id(),
                "Client did not close after disconnect, terminating"
            );
            self.handle.liveness().terminate();
        }

        let reason = self
            .handle
            .disconnect_reason()
            .unwrap_or(DisconnectReason::ConnectionLost);
        if let Some(listener) = self.listener.as_mut() {
            listener.on_disconnect(&reason, &self.handle, server);
        }
        self.finished = true;
        tracing::debug!(connection = %self.handle.id(), "Connection closed: {reason}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::server::ServerContext;
    use crate::testing::test_context;
    use lodestone_net::packets::{ServerboundStatus, encode_packet};
    use lodestone_net::{ClientboundPacket, memory_pair};

    struct Recorder {
        phase: ProtocolPhase,
        seen: Arc<Mutex<Vec<ServerboundPacket>>>,
        disconnects: Arc<Mutex<u32>>,
        fail_on_packet: bool,
    }

    impl PacketListener for Recorder {
        fn phase(&self) -> ProtocolPhase {
            self.phase
        }

        fn handle_packet(
            &mut self,
            packet: ServerboundPacket,
            _ctx: &mut ListenerContext<'_>,
        ) -> Result<(), SessionError> {
            self.seen.lock().unwrap().push(packet);
            if self.fail_on_packet {
                return Err(SessionError::violation("nope"));
            }
            Ok(())
        }

        fn on_disconnect(
            &mut self,
            _reason: &DisconnectReason,
            _connection: &ConnectionHandle,
            _server: &mut ServerContext,
        ) {
            *self.disconnects.lock().unwrap() += 1;
        }
    }

    fn setup(
        phase: ProtocolPhase,
        fail_on_packet: bool,
    ) -> (
        Connection,
        lodestone_net::PeerLink,
        Arc<Mutex<Vec<ServerboundPacket>>>,
        Arc<Mutex<u32>>,
    ) {
        let (transport, peer) = memory_pair(ConnectionId(1), "127.0.0.1:5000".parse().unwrap(), 16);
        let seen = Arc::new(Mutex::new(Vec::new()));
        let disconnects = Arc::new(Mutex::new(0));
        let listener = Recorder {
            phase,
            seen: Arc::clone(&seen),
            disconnects: Arc::clone(&disconnects),
            fail_on_packet,
        };
        let connection = Connection::new(
            transport,
            Arc::new(NetworkCounters::new()),
            Duration::from_secs(15),
            Box::new(listener),
        );
        (connection, peer, seen, disconnects)
    }

    fn drain(peer: &mut lodestone_net::PeerLink) -> Vec<Outbound> {
        std::iter::from_fn(|| peer.try_recv()).collect()
    }

    #[test]
    fn test_disconnect_is_idempotent() {
        let (connection, mut peer, _, _) = setup(ProtocolPhase::Play, false);
        let handle = connection.handle().clone();
        handle.disconnect(DisconnectReason::Timeout);
        handle.disconnect(DisconnectReason::Spam);

        let items = drain(&mut peer);
        assert_eq!(items.len(), 2);
        let Outbound::Frame(frame) = &items[0] else {
            panic!("expected disconnect frame");
        };
        let packet = ClientboundPacket::decode(ProtocolPhase::Play, frame).unwrap();
        assert_eq!(packet.disconnect_reason(), Some("disconnect.timeout"));
        assert_eq!(items[1], Outbound::Close);
        assert_eq!(handle.disconnect_reason(), Some(DisconnectReason::Timeout));
    }

    #[test]
    fn test_no_sends_after_disconnect() {
        let (connection, mut peer, _, _) = setup(ProtocolPhase::Play, false);
        let handle = connection.handle();
        handle.disconnect(DisconnectReason::Timeout);
        handle.send(ClientboundPlay::KeepAlive { id: 1 });
        assert_eq!(drain(&mut peer).len(), 2);
    }

    #[test]
    fn test_wrong_phase_packet_is_not_sent() {
        let (connection, mut peer, _, _) = setup(ProtocolPhase::Login, false);
        connection.handle().send(ClientboundPlay::KeepAlive { id: 1 });
        assert!(drain(&mut peer).is_empty());
    }

    #[tokio::test]
    async fn test_packets_reach_listener_and_close_is_reported_once() {
        let (mut connection, peer, seen, disconnects) = setup(ProtocolPhase::Status, false);
        let mut server = test_context();
        let body = encode_packet(&ServerboundStatus::StatusRequest).unwrap();
        peer.send_frame(body).await.unwrap();
        drop(peer);

        connection.tick(&mut server, Instant::now());
        connection.tick(&mut server, Instant::now());
        assert_eq!(seen.lock().unwrap().len(), 1);
        assert!(connection.is_finished());
        assert_eq!(*disconnects.lock().unwrap(), 1);
    }

    #[tokio::test]
    async fn test_listener_error_disconnects_and_drops_rest() {
        let (mut connection, peer, seen, disconnects) = setup(ProtocolPhase::Status, true);
        let mut server = test_context();
        for _ in 0..3 {
            let body = encode_packet(&ServerboundStatus::StatusRequest).unwrap();
            peer.send_frame(body).await.unwrap();
        }
        connection.tick(&mut server, Instant::now());
        assert_eq!(seen.lock().unwrap().len(), 1);
        assert!(connection.handle().is_read_only());
        assert!(connection.is_finished());
        assert_eq!(*disconnects.lock().unwrap(), 1);
    }

    #[tokio::test]
    async fn test_garbage_frame_is_a_protocol_violation() {
        let (mut connection, mut peer, _, _) = setup(ProtocolPhase::Play, false);
        let mut server = test_context();
        peer.send_frame(vec![0xAA, 0xBB]).await.unwrap();
        connection.tick(&mut server, Instant::now());
        assert!(matches!(
            connection.handle().disconnect_reason(),
            Some(DisconnectReason::ProtocolViolation(_))
        ));
        assert_eq!(drain(&mut peer).last(), Some(&Outbound::Close));
    }
}
