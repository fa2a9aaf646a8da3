//! TCP accept loop feeding transports to the tick loop.
//!
//! Each accepted socket gets a reader task and a writer task. The reader
//! only moves frames into a bounded queue; the writer only drains the
//! outbound queue. Everything else happens on the tick loop, which picks
//! new [`Transport`]s up from the sink channel.

use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use tokio::io::AsyncWriteExt;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, watch};

use crate::bandwidth::NetworkCounters;
use crate::framing::{FrameConfig, read_frame, write_frame};
use crate::legacy::{self, LegacyProbe};
use crate::status::ServerStatus;
use crate::transport::{ConnectionId, IdGenerator, Liveness, Outbound, Transport, TransportKind};

/// How long a fresh socket may stay silent before it is dropped.
const FIRST_BYTE_TIMEOUT: Duration = Duration::from_secs(30);
/// How long a lone legacy ping byte waits for the byte that may follow it.
const LEGACY_FOLLOWUP_TIMEOUT: Duration = Duration::from_millis(100);
const LEGACY_FOLLOWUP_POLL: Duration = Duration::from_millis(5);

/// Configuration for [`TcpAcceptor`].
#[derive(Debug, Clone)]
pub struct AcceptorConfig {
    /// Address to bind to.
    pub bind_addr: SocketAddr,
    /// Maximum concurrent sockets. Default: 256.
    pub max_connections: usize,
    /// Frame limits.
    pub frame: FrameConfig,
    /// Frames buffered between a reader task and the tick loop.
    pub inbound_capacity: usize,
}

impl Default for AcceptorConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 25565)),
            max_connections: 256,
            frame: FrameConfig::default(),
            inbound_capacity: 1024,
        }
    }
}

/// Decrements the active socket count when the last task of a socket ends.
struct ActiveGuard(Arc<AtomicUsize>);

impl Drop for ActiveGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::AcqRel);
    }
}

/// Accepts TCP connections and hands them to the tick loop as [`Transport`]s.
pub struct TcpAcceptor {
    config: AcceptorConfig,
    id_gen: Arc<IdGenerator>,
    counters: Arc<NetworkCounters>,
    status: watch::Receiver<ServerStatus>,
    active: Arc<AtomicUsize>,
    shutdown_tx: watch::Sender<bool>,
    shutdown_rx: watch::Receiver<bool>,
}

impl TcpAcceptor {
    /// Create an acceptor sharing the server's id generator, counters and status.
    pub fn new(
        config: AcceptorConfig,
        id_gen: Arc<IdGenerator>,
        counters: Arc<NetworkCounters>,
        status: watch::Receiver<ServerStatus>,
    ) -> Self {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        Self {
            config,
            id_gen,
            counters,
            status,
            active: Arc::new(AtomicUsize::new(0)),
            shutdown_tx,
            shutdown_rx,
        }
    }

    /// Number of sockets with at least one live I/O task.
    pub fn active_connections(&self) -> usize {
        self.active.load(Ordering::Acquire)
    }

    /// Bind to the configured address and run the accept loop.
    pub async fn run(&self, sink: mpsc::UnboundedSender<Transport>) -> std::io::Result<()> {
        let listener = TcpListener::bind(self.config.bind_addr).await?;
        tracing::info!("Listening on {}", self.config.bind_addr);
        self.run_with_listener(listener, sink).await
    }

    /// Run the accept loop with a pre-bound listener (useful for tests).
    pub async fn run_with_listener(
        &self,
        listener: TcpListener,
        sink: mpsc::UnboundedSender<Transport>,
    ) -> std::io::Result<()> {
        let mut shutdown_rx = self.shutdown_rx.clone();

        loop {
            tokio::select! {
                result = listener.accept() => {
                    let (stream, peer_addr) = result?;
                    stream.set_nodelay(true)?;

                    if self.active.load(Ordering::Acquire) >= self.config.max_connections {
                        tracing::warn!("Connection limit reached, rejecting {peer_addr}");
                        continue;
                    }
                    self.active.fetch_add(1, Ordering::AcqRel);
                    let guard = Arc::new(ActiveGuard(Arc::clone(&self.active)));

                    let id = self.id_gen.next_id();
                    self.counters.record_accept();
                    tracing::debug!(connection = %id, "Accepted connection from {peer_addr}");

                    let config = self.config.clone();
                    let counters = Arc::clone(&self.counters);
                    let status = self.status.clone();
                    let sink = sink.clone();
                    tokio::spawn(async move {
                        Self::serve(id, stream, peer_addr, config, counters, status, sink, guard).await;
                    });
                }
                _ = shutdown_rx.changed() => {
                    if *shutdown_rx.borrow() {
                        tracing::info!("Accept loop shutting down");
                        break;
                    }
                }
            }
        }

        Ok(())
    }

    /// Signal the accept loop to stop.
    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(true);
    }

    #[allow(clippy::too_many_arguments)]
    async fn serve(
        id: ConnectionId,
        mut stream: TcpStream,
        peer_addr: SocketAddr,
        config: AcceptorConfig,
        counters: Arc<NetworkCounters>,
        status: watch::Receiver<ServerStatus>,
        sink: mpsc::UnboundedSender<Transport>,
        guard: Arc<ActiveGuard>,
    ) {
        let mut prefix = [0u8; 2];
        let peeked = match tokio::time::timeout(FIRST_BYTE_TIMEOUT, peek_prefix(&stream, &mut prefix)).await {
            Ok(Ok(0)) | Err(_) => return,
            Ok(Ok(n)) => n,
            Ok(Err(e)) => {
                tracing::debug!(connection = %id, "Peek failed: {e}");
                return;
            }
        };

        if let Some(probe) = LegacyProbe::detect(&prefix[..peeked]) {
            let snapshot = status.borrow().clone();
            counters.record_legacy_probe();
            tracing::debug!(connection = %id, "Answering legacy status probe from {peer_addr}");
            if let Err(e) = legacy::respond(&mut stream, &snapshot, probe).await {
                tracing::debug!(connection = %id, "Legacy response failed: {e}");
            }
            return;
        }

        let (reader, writer) = stream.into_split();
        let (inbound_tx, inbound_rx) = mpsc::channel(config.inbound_capacity.max(1));
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let liveness = Liveness::new(TransportKind::Tcp);

        let read_task = tokio::spawn(Self::read_loop(
            id,
            reader,
            config.frame.clone(),
            inbound_tx,
            Arc::clone(&liveness),
            Arc::clone(&guard),
        ));
        let write_task = tokio::spawn(Self::write_loop(
            id,
            writer,
            config.frame,
            outbound_rx,
            Arc::clone(&liveness),
            guard,
        ));
        liveness.register_task(read_task.abort_handle());
        liveness.register_task(write_task.abort_handle());

        let transport = Transport {
            id,
            remote_addr: peer_addr,
            inbound: inbound_rx,
            outbound: outbound_tx,
            liveness: Arc::clone(&liveness),
        };
        if sink.send(transport).is_err() {
            liveness.terminate();
        }
    }

    async fn read_loop(
        id: ConnectionId,
        mut reader: OwnedReadHalf,
        frame_config: FrameConfig,
        inbound: mpsc::Sender<Vec<u8>>,
        liveness: Arc<Liveness>,
        _guard: Arc<ActiveGuard>,
    ) {
        loop {
            match read_frame(&mut reader, &frame_config).await {
                Ok(frame) => {
                    if inbound.send(frame).await.is_err() {
                        break;
                    }
                }
                Err(e) if e.is_disconnect() => {
                    tracing::trace!(connection = %id, "Peer closed: {e}");
                    break;
                }
                Err(e) => {
                    tracing::debug!(connection = %id, "Reader stopped: {e}");
                    break;
                }
            }
        }
        liveness.mark_closed();
    }

    async fn write_loop(
        id: ConnectionId,
        mut writer: OwnedWriteHalf,
        frame_config: FrameConfig,
        mut outbound: mpsc::UnboundedReceiver<Outbound>,
        liveness: Arc<Liveness>,
        _guard: Arc<ActiveGuard>,
    ) {
        while let Some(item) = outbound.recv().await {
            match item {
                Outbound::Frame(frame) => {
                    if let Err(e) = write_frame(&mut writer, &frame, &frame_config).await {
                        tracing::debug!(connection = %id, "Writer stopped: {e}");
                        break;
                    }
                }
                Outbound::Close => break,
            }
        }
        let _ = writer.shutdown().await;
        liveness.terminate();
    }
}

/// Peek the first two bytes of a connection. A lone `0xFE` is given a short
/// window for the `0x01` of a 1.4+ ping to arrive.
async fn peek_prefix(stream: &TcpStream, prefix: &mut [u8; 2]) -> std::io::Result<usize> {
    let mut peeked = stream.peek(prefix).await?;
    if peeked == 1 && prefix[0] == legacy::LEGACY_PROBE {
        let deadline = tokio::time::Instant::now() + LEGACY_FOLLOWUP_TIMEOUT;
        while peeked == 1 && tokio::time::Instant::now() < deadline {
            tokio::time::sleep(LEGACY_FOLLOWUP_POLL).await;
            peeked = stream.peek(prefix).await?;
        }
    }
    Ok(peeked)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncReadExt;
    use tokio::net::TcpStream;

    async fn start_acceptor(
        max_connections: usize,
    ) -> (SocketAddr, Arc<TcpAcceptor>, mpsc::UnboundedReceiver<Transport>) {
        let config = AcceptorConfig {
            bind_addr: "127.0.0.1:0".parse().unwrap(),
            max_connections,
            ..Default::default()
        };
        let (_status_tx, status_rx) = watch::channel(ServerStatus::new("test motd", 10, false));
        let acceptor = Arc::new(TcpAcceptor::new(
            config,
            Arc::new(IdGenerator::new()),
            Arc::new(NetworkCounters::new()),
            status_rx,
        ));
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (sink_tx, sink_rx) = mpsc::unbounded_channel();
        let runner = Arc::clone(&acceptor);
        tokio::spawn(async move {
            runner.run_with_listener(listener, sink_tx).await.unwrap();
        });
        (addr, acceptor, sink_rx)
    }

    #[tokio::test]
    async fn test_framed_client_becomes_transport() {
        let (addr, _acceptor, mut sink) = start_acceptor(16).await;
        let mut stream = TcpStream::connect(addr).await.unwrap();
        write_frame(&mut stream, b"hello", &FrameConfig::default())
            .await
            .unwrap();

        let mut transport = sink.recv().await.unwrap();
        assert_eq!(transport.inbound.recv().await.unwrap(), b"hello");

        transport
            .outbound
            .send(Outbound::Frame(b"reply".to_vec()))
            .unwrap();
        let reply = read_frame(&mut stream, &FrameConfig::default())
            .await
            .unwrap();
        assert_eq!(reply, b"reply");
    }

    #[tokio::test]
    async fn test_close_request_closes_socket() {
        let (addr, _acceptor, mut sink) = start_acceptor(16).await;
        let mut stream = TcpStream::connect(addr).await.unwrap();
        write_frame(&mut stream, b"x", &FrameConfig::default())
            .await
            .unwrap();
        let transport = sink.recv().await.unwrap();
        transport.outbound.send(Outbound::Close).unwrap();

        let mut buf = [0u8; 8];
        let n = tokio::time::timeout(Duration::from_secs(5), stream.read(&mut buf))
            .await
            .unwrap()
            .unwrap_or(0);
        assert_eq!(n, 0);
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!transport.liveness.is_alive());
    }

    #[tokio::test]
    async fn test_legacy_probe_answered_without_transport() {
        let (addr, _acceptor, mut sink) = start_acceptor(16).await;
        let mut stream = TcpStream::connect(addr).await.unwrap();
        stream.write_all(&[0xFE, 0x01]).await.unwrap();

        let mut response = Vec::new();
        stream.read_to_end(&mut response).await.unwrap();
        assert_eq!(response[0], legacy::LEGACY_KICK);
        let text: Vec<u16> = response[3..]
            .chunks(2)
            .map(|pair| u16::from_be_bytes([pair[0], pair[1]]))
            .collect();
        let text = String::from_utf16(&text).unwrap();
        assert!(text.contains("test motd"));
        assert!(sink.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_split_v1_ping_is_not_mistaken_for_beta() {
        let (addr, _acceptor, _sink) = start_acceptor(16).await;
        let mut stream = TcpStream::connect(addr).await.unwrap();
        stream.set_nodelay(true).unwrap();
        stream.write_all(&[0xFE]).await.unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;
        stream.write_all(&[0x01]).await.unwrap();

        let mut response = Vec::new();
        stream.read_to_end(&mut response).await.unwrap();
        let text: Vec<u16> = response[3..]
            .chunks(2)
            .map(|pair| u16::from_be_bytes([pair[0], pair[1]]))
            .collect();
        assert!(String::from_utf16(&text).unwrap().starts_with("\u{a7}1\0"));
    }

    #[tokio::test]
    async fn test_connection_limit_rejects_extra_sockets() {
        let (addr, acceptor, mut sink) = start_acceptor(1).await;
        let mut first = TcpStream::connect(addr).await.unwrap();
        write_frame(&mut first, b"a", &FrameConfig::default())
            .await
            .unwrap();
        let _transport = sink.recv().await.unwrap();
        assert_eq!(acceptor.active_connections(), 1);

        let mut second = TcpStream::connect(addr).await.unwrap();
        let mut buf = [0u8; 1];
        let n = tokio::time::timeout(Duration::from_secs(5), second.read(&mut buf))
            .await
            .unwrap()
            .unwrap_or(0);
        assert_eq!(n, 0);
    }
}
