//! Per-server traffic counters.
//!
//! Counters are owned by a server instance and shared by reference with
//! its connections, so tests running several servers never see each
//! other's traffic.

use std::sync::atomic::{AtomicU64, Ordering};

/// Live counters incremented by connections and the accept loop.
///
/// Atomics let the I/O tasks and the tick loop bump counters without locking.
#[derive(Debug, Default)]
pub struct NetworkCounters {
    /// Wire bytes sent (after compression and encryption).
    pub bytes_sent: AtomicU64,
    /// Wire bytes received.
    pub bytes_received: AtomicU64,
    /// Packet body bytes sent (before compression).
    pub bytes_sent_raw: AtomicU64,
    /// Packet body bytes received (after decompression).
    pub bytes_received_raw: AtomicU64,
    /// Packets sent.
    pub packets_sent: AtomicU64,
    /// Packets received.
    pub packets_received: AtomicU64,
    /// Connections accepted.
    pub connections_accepted: AtomicU64,
    /// Legacy status probes answered.
    pub legacy_probes: AtomicU64,
}

impl NetworkCounters {
    /// Create zeroed counters.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an outgoing packet.
    pub fn record_send(&self, wire_bytes: u64, raw_bytes: u64) {
        self.bytes_sent.fetch_add(wire_bytes, Ordering::Relaxed);
        self.bytes_sent_raw.fetch_add(raw_bytes, Ordering::Relaxed);
        self.packets_sent.fetch_add(1, Ordering::Relaxed);
    }

    /// Record an incoming packet.
    pub fn record_receive(&self, wire_bytes: u64, raw_bytes: u64) {
        self.bytes_received.fetch_add(wire_bytes, Ordering::Relaxed);
        self.bytes_received_raw
            .fetch_add(raw_bytes, Ordering::Relaxed);
        self.packets_received.fetch_add(1, Ordering::Relaxed);
    }

    /// Record an accepted connection.
    pub fn record_accept(&self) {
        self.connections_accepted.fetch_add(1, Ordering::Relaxed);
    }

    /// Record an answered legacy probe.
    pub fn record_legacy_probe(&self) {
        self.legacy_probes.fetch_add(1, Ordering::Relaxed);
    }

    /// Snapshot and reset all counters (swap with 0).
    pub fn snapshot_and_reset(&self) -> StatsSnapshot {
        StatsSnapshot {
            bytes_sent: self.bytes_sent.swap(0, Ordering::Relaxed),
            bytes_received: self.bytes_received.swap(0, Ordering::Relaxed),
            bytes_sent_raw: self.bytes_sent_raw.swap(0, Ordering::Relaxed),
            bytes_received_raw: self.bytes_received_raw.swap(0, Ordering::Relaxed),
            packets_sent: self.packets_sent.swap(0, Ordering::Relaxed),
            packets_received: self.packets_received.swap(0, Ordering::Relaxed),
            connections_accepted: self.connections_accepted.swap(0, Ordering::Relaxed),
            legacy_probes: self.legacy_probes.swap(0, Ordering::Relaxed),
        }
    }
}

/// Point-in-time snapshot of [`NetworkCounters`] for one measurement period.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StatsSnapshot {
    /// Wire bytes sent.
    pub bytes_sent: u64,
    /// Wire bytes received.
    pub bytes_received: u64,
    /// Packet body bytes sent.
    pub bytes_sent_raw: u64,
    /// Packet body bytes received.
    pub bytes_received_raw: u64,
    /// Packets sent.
    pub packets_sent: u64,
    /// Packets received.
    pub packets_received: u64,
    /// Connections accepted.
    pub connections_accepted: u64,
    /// Legacy status probes answered.
    pub legacy_probes: u64,
}

impl StatsSnapshot {
    /// Fraction of outgoing body bytes saved by compression, in percent.
    pub fn compression_savings(&self) -> f64 {
        if self.bytes_sent_raw == 0 {
            return 0.0;
        }
        (1.0 - self.bytes_sent as f64 / self.bytes_sent_raw as f64) * 100.0
    }

    /// Emit the snapshot at debug level.
    pub fn log(&self) {
        tracing::debug!(
            sent = self.bytes_sent,
            packets_sent = self.packets_sent,
            received = self.bytes_received,
            packets_received = self.packets_received,
            accepted = self.connections_accepted,
            "Network: compression saved {:.1}%",
            self.compression_savings()
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stats_track_bytes_sent() {
        let counters = NetworkCounters::new();
        counters.record_send(100, 120);
        counters.record_send(200, 250);

        let snapshot = counters.snapshot_and_reset();
        assert_eq!(snapshot.bytes_sent, 300);
        assert_eq!(snapshot.bytes_sent_raw, 370);
        assert_eq!(snapshot.packets_sent, 2);
    }

    #[test]
    fn test_stats_track_bytes_received() {
        let counters = NetworkCounters::new();
        counters.record_receive(500, 600);
        counters.record_receive(300, 400);

        let snapshot = counters.snapshot_and_reset();
        assert_eq!(snapshot.bytes_received, 800);
        assert_eq!(snapshot.bytes_received_raw, 1000);
        assert_eq!(snapshot.packets_received, 2);
    }

    #[test]
    fn test_snapshot_resets_counters() {
        let counters = NetworkCounters::new();
        counters.record_accept();
        counters.record_legacy_probe();
        assert_eq!(counters.snapshot_and_reset().connections_accepted, 1);
        assert_eq!(counters.snapshot_and_reset(), StatsSnapshot::default());
    }

    #[test]
    fn test_compression_savings() {
        let snapshot = StatsSnapshot {
            bytes_sent: 25,
            bytes_sent_raw: 100,
            ..Default::default()
        };
        assert!((snapshot.compression_savings() - 75.0).abs() < f64::EPSILON);
        assert_eq!(StatsSnapshot::default().compression_savings(), 0.0);
    }
}
