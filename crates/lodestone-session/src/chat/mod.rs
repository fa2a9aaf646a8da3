//! Chat integrity: signed chains, acknowledgement windows, filtering,
//! per-sender ordering and spam control.

pub mod cache;
pub mod chain;
pub mod commands;
pub mod filter;
pub mod last_seen;
pub mod ordering;
pub mod signature;
pub mod throttle;

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use lodestone_net::packets::types::{LastSeenUpdate, MessageSignature};

use cache::MessageSignatureCache;
use last_seen::{LastSeenError, LastSeenValidator};

/// State a recipient's incoming validation and outgoing deliveries both touch.
#[derive(Debug)]
pub struct PlayerChatState {
    /// Acknowledgement window.
    pub validator: LastSeenValidator,
    /// Recently delivered signatures.
    pub cache: MessageSignatureCache,
}

/// Shared handle to one player's [`PlayerChatState`]; every access takes the same lock.
#[derive(Debug, Clone)]
pub struct SharedChatState(Arc<Mutex<PlayerChatState>>);

impl SharedChatState {
    /// Fresh state with a signature cache of `cache_capacity`.
    pub fn new(cache_capacity: usize) -> Self {
        Self(Arc::new(Mutex::new(PlayerChatState {
            validator: LastSeenValidator::new(),
            cache: MessageSignatureCache::new(cache_capacity),
        })))
    }

    /// Lock the state.
    pub fn lock(&self) -> MutexGuard<'_, PlayerChatState> {
        self.0.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Validate a client's last-seen update.
    pub fn apply_update(
        &self,
        update: &LastSeenUpdate,
    ) -> Result<Vec<MessageSignature>, LastSeenError> {
        self.lock().validator.apply_update(update)
    }

    /// Validate a standalone acknowledgement.
    pub fn apply_offset(&self, offset: u32) -> Result<(), LastSeenError> {
        self.lock().validator.apply_offset(offset)
    }
}

/// Whether `c` may appear in chat.
pub fn is_allowed_chat_character(c: char) -> bool {
    c != '\u{a7}' && c >= ' ' && c != '\u{7f}'
}
