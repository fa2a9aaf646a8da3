//! Last-seen acknowledgement windows.
//!
//! The server keeps a [`LastSeenValidator`] per receiving player: every
//! signed message delivered to that player becomes a pending entry, and
//! the client's acknowledgement updates must agree with that history.
//! [`LastSeenTracker`] is the matching client-side ring.

use lodestone_net::packets::types::{LastSeenUpdate, MessageSignature};

/// Number of signatures a last-seen window holds.
pub const LAST_SEEN_WINDOW: usize = 20;

/// Client acknowledgement that disagrees with the server's history.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LastSeenError {
    /// Offset moved the window past messages that were never delivered.
    #[error("advanced last seen window by {offset} messages, expected at most {max}")]
    OffsetOutOfRange {
        /// Requested offset.
        offset: u32,
        /// Largest valid offset.
        max: usize,
    },
    /// Bits set beyond the window size.
    #[error("last seen update acknowledged more than {LAST_SEEN_WINDOW} messages")]
    TooManyAcknowledged,
    /// Acknowledged a slot holding no message or an ignored one.
    #[error("acknowledged unknown or previously ignored message at index {0}")]
    UnknownAcknowledged(usize),
    /// Ignored a slot the client had already acknowledged.
    #[error("ignored previously acknowledged message at index {0}")]
    IgnoredAcknowledged(usize),
    /// Checksum over the acknowledged signatures differs.
    #[error("checksum mismatch on last seen update")]
    ChecksumMismatch,
}

/// `Arrays.hashCode(byte[])` over signed bytes.
fn signature_hash(signature: &MessageSignature) -> i32 {
    signature
        .as_bytes()
        .iter()
        .fold(1i32, |acc, &b| acc.wrapping_mul(31).wrapping_add(i32::from(b as i8)))
}

/// Checksum over an acknowledged signature list. Never zero.
pub fn last_seen_checksum(signatures: &[MessageSignature]) -> u8 {
    let folded = signatures
        .iter()
        .fold(1i32, |acc, s| acc.wrapping_mul(31).wrapping_add(signature_hash(s)));
    match folded as u8 {
        0 => 1,
        b => b,
    }
}

#[derive(Debug, Clone, Copy)]
struct TrackedEntry {
    signature: MessageSignature,
    pending: bool,
}

/// Server-side record of what a recipient has been sent and acknowledged.
#[derive(Debug, Clone)]
pub struct LastSeenValidator {
    tracked: Vec<Option<TrackedEntry>>,
    last_pending: Option<MessageSignature>,
}

impl Default for LastSeenValidator {
    fn default() -> Self {
        Self::new()
    }
}

impl LastSeenValidator {
    /// Empty window.
    pub fn new() -> Self {
        Self {
            tracked: vec![None; LAST_SEEN_WINDOW],
            last_pending: None,
        }
    }

    /// Record a signature delivered to the client. Repeats of the last one are ignored.
    pub fn add_pending(&mut self, signature: MessageSignature) {
        if self.last_pending == Some(signature) {
            return;
        }
        self.tracked.push(Some(TrackedEntry {
            signature,
            pending: true,
        }));
        self.last_pending = Some(signature);
    }

    /// Delivered signatures the client has not yet moved past.
    pub fn pending_count(&self) -> usize {
        self.tracked.len() - LAST_SEEN_WINDOW
    }

    /// Slide the window forward by `offset` delivered messages.
    pub fn apply_offset(&mut self, offset: u32) -> Result<(), LastSeenError> {
        let max = self.tracked.len() - LAST_SEEN_WINDOW;
        let skip = offset as usize;
        if skip > max {
            return Err(LastSeenError::OffsetOutOfRange { offset, max });
        }
        self.tracked.drain(..skip);
        Ok(())
    }

    /// Apply a full update and return the acknowledged signatures, oldest first.
    pub fn apply_update(
        &mut self,
        update: &LastSeenUpdate,
    ) -> Result<Vec<MessageSignature>, LastSeenError> {
        self.apply_offset(update.offset)?;
        if update.acknowledged >> LAST_SEEN_WINDOW != 0 {
            return Err(LastSeenError::TooManyAcknowledged);
        }

        let mut acknowledged = Vec::with_capacity(update.acknowledged.count_ones() as usize);
        for index in 0..LAST_SEEN_WINDOW {
            let slot = &mut self.tracked[index];
            if update.acknowledged & (1 << index) != 0 {
                let Some(entry) = slot.as_mut() else {
                    return Err(LastSeenError::UnknownAcknowledged(index));
                };
                entry.pending = false;
                acknowledged.push(entry.signature);
            } else {
                if slot.is_some_and(|entry| !entry.pending) {
                    return Err(LastSeenError::IgnoredAcknowledged(index));
                }
                *slot = None;
            }
        }

        if update.checksum != 0 && update.checksum != last_seen_checksum(&acknowledged) {
            return Err(LastSeenError::ChecksumMismatch);
        }
        Ok(acknowledged)
    }
}

/// Client-side ring of recently received signatures.
#[derive(Debug, Clone)]
pub struct LastSeenTracker {
    ring: [Option<MessageSignature>; LAST_SEEN_WINDOW],
    tail: usize,
    offset: u32,
    last_tracked: Option<MessageSignature>,
}

impl Default for LastSeenTracker {
    fn default() -> Self {
        Self {
            ring: [None; LAST_SEEN_WINDOW],
            tail: 0,
            offset: 0,
            last_tracked: None,
        }
    }
}

impl LastSeenTracker {
    /// Record a received signature. Returns `false` for a repeat of the last one.
    pub fn add_pending(&mut self, signature: MessageSignature) -> bool {
        if self.last_tracked == Some(signature) {
            return false;
        }
        self.last_tracked = Some(signature);
        self.ring[self.tail] = Some(signature);
        self.tail = (self.tail + 1) % LAST_SEEN_WINDOW;
        self.offset += 1;
        true
    }

    /// Messages received since the last update.
    pub fn offset(&self) -> u32 {
        self.offset
    }

    /// Take the offset for a standalone acknowledgement.
    pub fn take_offset(&mut self) -> u32 {
        std::mem::take(&mut self.offset)
    }

    /// Build the update for an outgoing message, acknowledging everything held.
    pub fn generate_update(&mut self) -> (Vec<MessageSignature>, LastSeenUpdate) {
        let offset = self.take_offset();
        let mut acknowledged = 0u32;
        let mut signatures = Vec::with_capacity(LAST_SEEN_WINDOW);
        for i in 0..LAST_SEEN_WINDOW {
            if let Some(signature) = self.ring[(self.tail + i) % LAST_SEEN_WINDOW] {
                acknowledged |= 1 << i;
                signatures.push(signature);
            }
        }
        let checksum = last_seen_checksum(&signatures);
        (
            signatures,
            LastSeenUpdate {
                offset,
                acknowledged,
                checksum,
            },
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sig(n: u8) -> MessageSignature {
        MessageSignature([n; 64])
    }

    #[test]
    fn test_checksum_matches_reference_hash() {
        // Arrays.hashCode of 64 zero bytes is 31^64 (mod 2^32).
        let zero_hash = (0..64).fold(1i32, |acc, _| acc.wrapping_mul(31));
        assert_eq!(signature_hash(&sig(0)), zero_hash);
        let expected = match 31i32.wrapping_add(zero_hash) as u8 {
            0 => 1,
            b => b,
        };
        assert_eq!(last_seen_checksum(&[sig(0)]), expected);
        assert_eq!(last_seen_checksum(&[]), 1);
    }

    #[test]
    fn test_tracker_and_validator_agree() {
        let mut validator = LastSeenValidator::new();
        let mut tracker = LastSeenTracker::default();
        for n in 1..=25 {
            validator.add_pending(sig(n));
            tracker.add_pending(sig(n));
        }
        let (signatures, update) = tracker.generate_update();
        assert_eq!(update.offset, 25);
        let acknowledged = validator.apply_update(&update).unwrap();
        assert_eq!(acknowledged, signatures);
        assert_eq!(acknowledged.first(), Some(&sig(6)));
        assert_eq!(validator.pending_count(), 0);
    }

    #[test]
    fn test_checksum_mismatch_is_rejected() {
        let mut validator = LastSeenValidator::new();
        let mut tracker = LastSeenTracker::default();
        validator.add_pending(sig(1));
        tracker.add_pending(sig(1));
        let (_, mut update) = tracker.generate_update();
        update.checksum = update.checksum.wrapping_add(1).max(1);
        assert_eq!(
            validator.apply_update(&update),
            Err(LastSeenError::ChecksumMismatch)
        );
    }

    #[test]
    fn test_zero_checksum_skips_check() {
        let mut validator = LastSeenValidator::new();
        validator.add_pending(sig(1));
        let update = LastSeenUpdate {
            offset: 1,
            acknowledged: 1 << 19,
            checksum: 0,
        };
        assert_eq!(validator.apply_update(&update).unwrap(), vec![sig(1)]);
    }

    #[test]
    fn test_offset_past_history_is_rejected() {
        let mut validator = LastSeenValidator::new();
        validator.add_pending(sig(1));
        assert_eq!(
            validator.apply_offset(2),
            Err(LastSeenError::OffsetOutOfRange { offset: 2, max: 1 })
        );
        assert!(validator.apply_offset(1).is_ok());
    }

    #[test]
    fn test_acknowledging_empty_slot_is_rejected() {
        let mut validator = LastSeenValidator::new();
        let update = LastSeenUpdate {
            offset: 0,
            acknowledged: 1,
            checksum: 0,
        };
        assert_eq!(
            validator.apply_update(&update),
            Err(LastSeenError::UnknownAcknowledged(0))
        );
    }

    #[test]
    fn test_ignoring_acknowledged_message_is_rejected() {
        let mut validator = LastSeenValidator::new();
        validator.add_pending(sig(1));
        let ack = LastSeenUpdate {
            offset: 1,
            acknowledged: 1 << 19,
            checksum: 0,
        };
        validator.apply_update(&ack).unwrap();
        let ignore = LastSeenUpdate {
            offset: 0,
            acknowledged: 0,
            checksum: 0,
        };
        assert_eq!(
            validator.apply_update(&ignore),
            Err(LastSeenError::IgnoredAcknowledged(19))
        );
    }

    #[test]
    fn test_duplicate_pending_is_collapsed() {
        let mut validator = LastSeenValidator::new();
        validator.add_pending(sig(1));
        validator.add_pending(sig(1));
        assert_eq!(validator.pending_count(), 1);
    }

    #[test]
    fn test_bits_beyond_window_are_rejected() {
        let mut validator = LastSeenValidator::new();
        let update = LastSeenUpdate {
            offset: 0,
            acknowledged: 1 << 20,
            checksum: 0,
        };
        assert_eq!(
            validator.apply_update(&update),
            Err(LastSeenError::TooManyAcknowledged)
        );
    }
}
