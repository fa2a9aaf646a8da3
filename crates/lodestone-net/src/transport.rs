//! Transport handles handed from the I/O side to the tick loop.
//!
//! A [`Transport`] is the tick loop's view of one physical or in-process
//! channel: a bounded queue of raw inbound frames, an outbound queue of
//! frames and close requests, and a shared liveness flag. The I/O tasks on
//! the other end never touch session state; they only move frames.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::mpsc;
use tokio::task::AbortHandle;

/// Unique identifier for a connection within a server instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(pub u64);

impl std::fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Atomic generator for monotonically increasing [`ConnectionId`]s.
#[derive(Debug)]
pub struct IdGenerator {
    next: AtomicU64,
}

impl IdGenerator {
    /// Create a new generator starting at 1.
    pub fn new() -> Self {
        Self {
            next: AtomicU64::new(1),
        }
    }

    /// Return the next unique [`ConnectionId`].
    pub fn next_id(&self) -> ConnectionId {
        ConnectionId(self.next.fetch_add(1, Ordering::Relaxed))
    }
}

impl Default for IdGenerator {
    fn default() -> Self {
        Self::new()
    }
}

/// Item queued for the writer side of a transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outbound {
    /// An encoded frame payload.
    Frame(Vec<u8>),
    /// Flush what was queued, then close.
    Close,
}

/// What backs a transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportKind {
    /// A TCP socket driven by reader and writer tasks.
    Tcp,
    /// An in-process channel pair.
    Memory,
}

/// Shared liveness of a transport, flipped by whichever side notices the end.
#[derive(Debug)]
pub struct Liveness {
    alive: AtomicBool,
    kind: TransportKind,
    tasks: Mutex<Vec<AbortHandle>>,
}

impl Liveness {
    /// A live transport of the given kind.
    pub fn new(kind: TransportKind) -> Arc<Self> {
        Arc::new(Self {
            alive: AtomicBool::new(true),
            kind,
            tasks: Mutex::new(Vec::new()),
        })
    }

    /// Whether the transport is still open.
    pub fn is_alive(&self) -> bool {
        self.alive.load(Ordering::Acquire)
    }

    /// Record that the transport has closed.
    pub fn mark_closed(&self) {
        self.alive.store(false, Ordering::Release);
    }

    /// What backs the transport.
    pub fn kind(&self) -> TransportKind {
        self.kind
    }

    /// Register an I/O task to abort on [`Liveness::terminate`].
    pub fn register_task(&self, handle: AbortHandle) {
        self.tasks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(handle);
    }

    /// Force the transport closed, aborting its I/O tasks.
    pub fn terminate(&self) {
        self.mark_closed();
        let tasks = std::mem::take(&mut *self.tasks.lock().unwrap_or_else(PoisonError::into_inner));
        for task in tasks {
            task.abort();
        }
    }
}

/// The tick loop's end of a connection.
#[derive(Debug)]
pub struct Transport {
    /// Connection id.
    pub id: ConnectionId,
    /// Peer address.
    pub remote_addr: SocketAddr,
    /// Raw frames received from the peer.
    pub inbound: mpsc::Receiver<Vec<u8>>,
    /// Frames and close requests for the peer.
    pub outbound: mpsc::UnboundedSender<Outbound>,
    /// Shared liveness flag.
    pub liveness: Arc<Liveness>,
}

/// The peer's end of a connection: used by in-process clients and by the
/// client side of a TCP link.
#[derive(Debug)]
pub struct PeerLink {
    /// Frames for the server.
    pub to_server: mpsc::Sender<Vec<u8>>,
    /// Frames and close requests from the server.
    pub from_server: mpsc::UnboundedReceiver<Outbound>,
    /// Shared liveness flag.
    pub liveness: Arc<Liveness>,
}

impl PeerLink {
    /// Queue a frame for the server.
    pub async fn send_frame(&self, frame: Vec<u8>) -> Result<(), TransportClosed> {
        if !self.liveness.is_alive() {
            return Err(TransportClosed);
        }
        self.to_server.send(frame).await.map_err(|_| TransportClosed)
    }

    /// Take the next item the server queued, if any, without waiting.
    pub fn try_recv(&mut self) -> Option<Outbound> {
        let item = self.from_server.try_recv().ok()?;
        if item == Outbound::Close {
            self.liveness.mark_closed();
        }
        Some(item)
    }

    /// Wait for the next item the server queues. `None` once the server side is gone.
    pub async fn recv(&mut self) -> Option<Outbound> {
        let item = self.from_server.recv().await;
        if matches!(item, None | Some(Outbound::Close)) {
            self.liveness.mark_closed();
        }
        item
    }
}

/// The transport has already been closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("transport closed")]
pub struct TransportClosed;

/// Create an in-process transport and the peer link that drives it.
pub fn memory_pair(
    id: ConnectionId,
    remote_addr: SocketAddr,
    inbound_capacity: usize,
) -> (Transport, PeerLink) {
    let (inbound_tx, inbound_rx) = mpsc::channel(inbound_capacity.max(1));
    let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
    let liveness = Liveness::new(TransportKind::Memory);
    (
        Transport {
            id,
            remote_addr,
            inbound: inbound_rx,
            outbound: outbound_tx,
            liveness: Arc::clone(&liveness),
        },
        PeerLink {
            to_server: inbound_tx,
            from_server: outbound_rx,
            liveness,
        },
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr() -> SocketAddr {
        "127.0.0.1:40000".parse().unwrap()
    }

    #[test]
    fn test_ids_are_monotonic() {
        let generator = IdGenerator::new();
        let a = generator.next_id();
        let b = generator.next_id();
        assert!(b > a);
        assert_eq!(a, ConnectionId(1));
    }

    #[tokio::test]
    async fn test_memory_pair_moves_frames_both_ways() {
        let (mut transport, mut peer) = memory_pair(ConnectionId(1), addr(), 4);
        peer.send_frame(b"up".to_vec()).await.unwrap();
        assert_eq!(transport.inbound.recv().await.unwrap(), b"up");

        transport
            .outbound
            .send(Outbound::Frame(b"down".to_vec()))
            .unwrap();
        assert_eq!(peer.recv().await, Some(Outbound::Frame(b"down".to_vec())));
        assert!(peer.try_recv().is_none());
    }

    #[tokio::test]
    async fn test_close_marks_memory_transport_dead() {
        let (transport, mut peer) = memory_pair(ConnectionId(2), addr(), 4);
        transport.outbound.send(Outbound::Close).unwrap();
        assert_eq!(peer.try_recv(), Some(Outbound::Close));
        assert!(!transport.liveness.is_alive());
        assert_eq!(
            peer.send_frame(vec![1]).await,
            Err(TransportClosed)
        );
    }

    #[tokio::test]
    async fn test_terminate_aborts_registered_tasks() {
        let liveness = Liveness::new(TransportKind::Tcp);
        let task = tokio::spawn(async {
            tokio::time::sleep(std::time::Duration::from_secs(60)).await;
        });
        liveness.register_task(task.abort_handle());
        liveness.terminate();
        assert!(!liveness.is_alive());
        assert!(task.await.unwrap_err().is_cancelled());
    }
}
