//! Chunk delivery flow control.
//!
//! Chunks are paced to the client by a leaky-bucket quota fed with the
//! client's reported consumption rate, and by a window on unacknowledged
//! batches that starts at one and opens to ten after the first ack.

use lodestone_net::ChunkPos;
use lodestone_net::packets::ClientboundPlay;
use rustc_hash::FxHashSet;

use crate::world::World;

/// Lowest accepted chunks-per-tick rate.
pub const MIN_CHUNKS_PER_TICK: f32 = 0.01;
/// Highest accepted chunks-per-tick rate.
pub const MAX_CHUNKS_PER_TICK: f32 = 64.0;
/// Rate assumed before the client reports one.
pub const START_CHUNKS_PER_TICK: f32 = 9.0;
/// Batch window once the client has acknowledged a batch.
pub const MAX_UNACKNOWLEDGED_BATCHES: u32 = 10;

/// Per-player chunk pacing and view tracking.
#[derive(Debug, Clone)]
pub struct PlayerChunkSender {
    pending: FxHashSet<ChunkPos>,
    sent: FxHashSet<ChunkPos>,
    center: ChunkPos,
    view_distance: u32,
    desired_per_tick: f32,
    quota: f32,
    unacknowledged: u32,
    max_unacknowledged: u32,
}

impl PlayerChunkSender {
    /// Empty sender; call [`PlayerChunkSender::update_view`] to start tracking.
    pub fn new(center: ChunkPos, view_distance: u32) -> Self {
        Self {
            pending: FxHashSet::default(),
            sent: FxHashSet::default(),
            center,
            view_distance,
            desired_per_tick: START_CHUNKS_PER_TICK,
            quota: 0.0,
            unacknowledged: 0,
            max_unacknowledged: 1,
        }
    }

    /// Queue a chunk for delivery.
    pub fn mark_pending(&mut self, pos: ChunkPos) {
        if !self.sent.contains(&pos) {
            self.pending.insert(pos);
        }
    }

    /// Stop tracking a chunk. Sent chunks are explicitly forgotten by the client.
    pub fn drop_chunk(&mut self, pos: ChunkPos, mut send: impl FnMut(ClientboundPlay)) {
        if self.pending.remove(&pos) {
            return;
        }
        if self.sent.remove(&pos) {
            send(ClientboundPlay::ForgetLevelChunk { pos });
        }
    }

    /// Move the view. Chunks leaving it are dropped, chunks entering it are queued.
    ///
    /// Returns `true` when the center chunk changed.
    pub fn update_view(
        &mut self,
        center: ChunkPos,
        view_distance: u32,
        mut send: impl FnMut(ClientboundPlay),
    ) -> bool {
        let moved = center != self.center;
        self.center = center;
        self.view_distance = view_distance;

        let leaving: Vec<ChunkPos> = self
            .pending
            .iter()
            .chain(self.sent.iter())
            .filter(|pos| pos.chessboard_distance(center) > view_distance)
            .copied()
            .collect();
        for pos in leaving {
            self.drop_chunk(pos, &mut send);
        }

        let radius = i32::try_from(view_distance).unwrap_or(i32::MAX);
        for dx in -radius..=radius {
            for dz in -radius..=radius {
                let pos = ChunkPos::new(center.x.saturating_add(dx), center.z.saturating_add(dz));
                self.mark_pending(pos);
            }
        }
        moved
    }

    /// Send the next batch if the window and quota allow. Returns the batch size.
    pub fn send_next_chunks(&mut self, world: &dyn World, mut send: impl FnMut(ClientboundPlay)) -> usize {
        if self.unacknowledged >= self.max_unacknowledged {
            return 0;
        }
        let per_tick = self.desired_per_tick;
        self.quota = (self.quota + per_tick).min(per_tick.max(1.0));
        if self.quota < 1.0 || self.pending.is_empty() {
            return 0;
        }

        let budget = self.quota.floor() as usize;
        let center = self.center;
        let mut batch: Vec<ChunkPos> = self.pending.iter().copied().collect();
        if batch.len() > budget {
            batch.select_nth_unstable_by_key(budget - 1, |pos| pos.distance_squared(center));
            batch.truncate(budget);
        }
        batch.sort_by_key(|pos| pos.distance_squared(center));

        send(ClientboundPlay::ChunkBatchStart);
        for pos in &batch {
            self.pending.remove(pos);
            self.sent.insert(*pos);
            send(ClientboundPlay::LevelChunk {
                pos: *pos,
                data: world.chunk_data(*pos).unwrap_or_default(),
            });
        }
        send(ClientboundPlay::ChunkBatchFinished {
            batch_size: batch.len() as u32,
        });

        self.quota -= batch.len() as f32;
        self.unacknowledged += 1;
        tracing::trace!(
            chunks = batch.len(),
            pending = self.pending.len(),
            "Sent chunk batch"
        );
        batch.len()
    }

    /// Apply the client's batch acknowledgement and reported rate.
    pub fn on_batch_received(&mut self, desired_chunks_per_tick: f32) {
        self.unacknowledged = self.unacknowledged.saturating_sub(1);
        self.desired_per_tick = if desired_chunks_per_tick.is_finite() {
            desired_chunks_per_tick.clamp(MIN_CHUNKS_PER_TICK, MAX_CHUNKS_PER_TICK)
        } else {
            MIN_CHUNKS_PER_TICK
        };
        if self.unacknowledged == 0 {
            self.quota = 1.0;
        }
        self.max_unacknowledged = MAX_UNACKNOWLEDGED_BATCHES;
    }

    /// Current center chunk.
    pub fn center(&self) -> ChunkPos {
        self.center
    }

    /// Chunks waiting to be sent.
    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    /// Whether `pos` is queued.
    pub fn is_pending(&self, pos: ChunkPos) -> bool {
        self.pending.contains(&pos)
    }

    /// Whether `pos` was delivered.
    pub fn is_sent(&self, pos: ChunkPos) -> bool {
        self.sent.contains(&pos)
    }

    /// Accumulated quota.
    pub fn quota(&self) -> f32 {
        self.quota
    }

    /// Target rate in chunks per tick.
    pub fn desired_per_tick(&self) -> f32 {
        self.desired_per_tick
    }

    /// Batches sent but not yet acknowledged.
    pub fn unacknowledged_batches(&self) -> u32 {
        self.unacknowledged
    }

    /// Current batch window.
    pub fn max_unacknowledged_batches(&self) -> u32 {
        self.max_unacknowledged
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::world::FlatWorld;

    fn sender_with_pending(count: i32) -> PlayerChunkSender {
        let mut sender = PlayerChunkSender::new(ChunkPos::new(0, 0), 10);
        for i in 0..count {
            sender.mark_pending(ChunkPos::new(i % 10, i / 10));
        }
        sender
    }

    fn collect(sender: &mut PlayerChunkSender, world: &FlatWorld) -> Vec<ClientboundPlay> {
        let mut out = Vec::new();
        sender.send_next_chunks(world, |p| out.push(p));
        out
    }

    #[test]
    fn test_slow_start_batch_and_window() {
        let world = FlatWorld::default();
        let mut sender = sender_with_pending(50);

        let packets = collect(&mut sender, &world);
        assert_eq!(packets.first(), Some(&ClientboundPlay::ChunkBatchStart));
        assert_eq!(
            packets.last(),
            Some(&ClientboundPlay::ChunkBatchFinished { batch_size: 9 })
        );
        assert_eq!(packets.len(), 11);
        assert_eq!(sender.pending_count(), 41);
        assert_eq!(sender.unacknowledged_batches(), 1);
        assert_eq!(sender.quota(), 0.0);

        // Window of one is closed until the ack.
        assert!(collect(&mut sender, &world).is_empty());

        sender.on_batch_received(12.0);
        assert_eq!(sender.unacknowledged_batches(), 0);
        assert_eq!(sender.quota(), 1.0);
        assert_eq!(sender.max_unacknowledged_batches(), 10);
        assert_eq!(sender.desired_per_tick(), 12.0);
    }

    #[test]
    fn test_batch_takes_nearest_chunks_in_order() {
        let world = FlatWorld::default();
        let mut sender = sender_with_pending(50);
        let packets = collect(&mut sender, &world);
        let distances: Vec<i64> = packets
            .iter()
            .filter_map(|p| match p {
                ClientboundPlay::LevelChunk { pos, .. } => Some(pos.distance_squared(ChunkPos::new(0, 0))),
                _ => None,
            })
            .collect();
        assert!(distances.windows(2).all(|w| w[0] <= w[1]));
        // The nine nearest of a 10x5 block around the origin are all within distance^2 of 8.
        assert!(distances.iter().all(|d| *d <= 8));
    }

    #[test]
    fn test_window_never_exceeds_ceiling() {
        let world = FlatWorld::default();
        let mut sender = sender_with_pending(2000);
        sender.on_batch_received(64.0);
        for _ in 0..50 {
            collect(&mut sender, &world);
            assert!(sender.unacknowledged_batches() <= sender.max_unacknowledged_batches());
            assert!(sender.quota() >= 0.0);
        }
        assert_eq!(sender.unacknowledged_batches(), 10);
    }

    #[test]
    fn test_rate_is_clamped_and_non_finite_is_minimum() {
        let mut sender = PlayerChunkSender::new(ChunkPos::new(0, 0), 2);
        sender.on_batch_received(1000.0);
        assert_eq!(sender.desired_per_tick(), MAX_CHUNKS_PER_TICK);
        sender.on_batch_received(0.0);
        assert_eq!(sender.desired_per_tick(), MIN_CHUNKS_PER_TICK);
        sender.on_batch_received(f32::NAN);
        assert_eq!(sender.desired_per_tick(), MIN_CHUNKS_PER_TICK);
        sender.on_batch_received(f32::INFINITY);
        assert_eq!(sender.desired_per_tick(), MIN_CHUNKS_PER_TICK);
    }

    #[test]
    fn test_low_rate_accumulates_quota() {
        let world = FlatWorld::default();
        let mut sender = sender_with_pending(5);
        sender.on_batch_received(0.5);
        // Start from an empty bucket.
        sender.quota = 0.0;
        assert!(collect(&mut sender, &world).is_empty());
        assert_eq!(sender.quota(), 0.5);
        assert_eq!(collect(&mut sender, &world).len(), 3);
    }

    #[test]
    fn test_drop_pending_is_silent_drop_sent_forgets() {
        let world = FlatWorld::default();
        let mut sender = PlayerChunkSender::new(ChunkPos::new(0, 0), 0);
        let origin = ChunkPos::new(0, 0);
        let far = ChunkPos::new(5, 5);
        sender.mark_pending(origin);
        collect(&mut sender, &world);
        sender.mark_pending(far);

        let mut out = Vec::new();
        sender.drop_chunk(far, |p| out.push(p));
        assert!(out.is_empty());
        sender.drop_chunk(origin, |p| out.push(p));
        assert_eq!(out, vec![ClientboundPlay::ForgetLevelChunk { pos: origin }]);
    }

    #[test]
    fn test_view_update_queues_and_forgets() {
        let world = FlatWorld::default();
        let mut sender = PlayerChunkSender::new(ChunkPos::new(0, 0), 1);
        let mut out = Vec::new();
        assert!(!sender.update_view(ChunkPos::new(0, 0), 1, |p| out.push(p)));
        assert_eq!(sender.pending_count(), 9);
        collect(&mut sender, &world);
        assert!(sender.is_sent(ChunkPos::new(-1, -1)));

        assert!(sender.update_view(ChunkPos::new(3, 0), 1, |p| out.push(p)));
        assert!(out.contains(&ClientboundPlay::ForgetLevelChunk {
            pos: ChunkPos::new(-1, -1)
        }));
        assert!(sender.is_pending(ChunkPos::new(4, 1)));
    }
}
