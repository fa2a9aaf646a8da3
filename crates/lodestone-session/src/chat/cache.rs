//! Per-recipient cache of recently sent signatures.
//!
//! Signatures the recipient already holds are sent as cache ids instead
//! of 64 raw bytes. Client and server apply the same push sequence, so
//! ids stay in sync without being transmitted.

use lodestone_net::packets::types::{MessageSignature, PackedSignature};
use rustc_hash::FxHashSet;

/// Fixed-capacity, most-recent-first signature cache.
#[derive(Debug, Clone)]
pub struct MessageSignatureCache {
    entries: Vec<Option<MessageSignature>>,
}

impl MessageSignatureCache {
    /// Cache holding up to `capacity` signatures.
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: vec![None; capacity.max(1)],
        }
    }

    /// Cache id of `signature`, if held.
    pub fn index_of(&self, signature: &MessageSignature) -> Option<u32> {
        self.entries
            .iter()
            .position(|e| e.as_ref() == Some(signature))
            .map(|i| i as u32)
    }

    /// Pack `signature` as an id when cached.
    pub fn pack(&self, signature: &MessageSignature) -> PackedSignature {
        match self.index_of(signature) {
            Some(id) => PackedSignature::Id(id),
            None => PackedSignature::Full(*signature),
        }
    }

    /// Pack a last-seen list.
    pub fn pack_all(&self, signatures: &[MessageSignature]) -> Vec<PackedSignature> {
        signatures.iter().map(|s| self.pack(s)).collect()
    }

    /// Resolve a packed signature sent with this cache's state.
    pub fn unpack(&self, packed: &PackedSignature) -> Option<MessageSignature> {
        match packed {
            PackedSignature::Full(signature) => Some(*signature),
            PackedSignature::Id(id) => self.entries.get(*id as usize).copied().flatten(),
        }
    }

    /// Record a delivered message: its last-seen list, then its own signature.
    pub fn push(&mut self, last_seen: &[MessageSignature], signature: Option<MessageSignature>) {
        let mut queue: std::collections::VecDeque<MessageSignature> =
            last_seen.iter().copied().chain(signature).collect();
        let incoming: FxHashSet<MessageSignature> = queue.iter().copied().collect();

        for slot in self.entries.iter_mut() {
            let Some(next) = queue.pop_back() else {
                break;
            };
            if let Some(evicted) = slot.replace(next)
                && !incoming.contains(&evicted)
            {
                queue.push_front(evicted);
            }
        }
    }
}
