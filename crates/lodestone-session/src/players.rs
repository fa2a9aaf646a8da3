//! Players currently in the Play phase.

use lodestone_net::packets::types::{ClientInformation, RemoteChatSession};
use lodestone_net::{ConnectionId, GameProfile};
use rustc_hash::FxHashMap;
use uuid::Uuid;

use crate::chat::SharedChatState;
use crate::connection::ConnectionHandle;
use crate::error::DisconnectReason;

/// A player in the world. Holds a non-owning handle to its connection.
#[derive(Debug, Clone)]
pub struct ServerPlayer {
    /// Profile.
    pub profile: GameProfile,
    /// Send handle.
    pub connection: ConnectionHandle,
    /// Acknowledgement window and signature cache.
    pub chat: SharedChatState,
    /// Latest client preferences.
    pub client_info: ClientInformation,
    /// Installed chat session, if any.
    pub chat_session: Option<RemoteChatSession>,
    /// World entity id.
    pub entity_id: i32,
    /// Set by [`crate::Server::reconfigure`], consumed by the Play listener.
    pub reconfigure_requested: bool,
}

/// Players by profile id.
#[derive(Debug, Default)]
pub struct PlayerList {
    players: FxHashMap<Uuid, ServerPlayer>,
}

impl PlayerList {
    /// Add a player, replacing any entry with the same id.
    pub fn add(&mut self, player: ServerPlayer) {
        tracing::info!(player = %player.profile.name, "Player joined");
        self.players.insert(player.profile.id, player);
    }

    /// Remove a player.
    pub fn remove(&mut self, id: Uuid) -> Option<ServerPlayer> {
        let removed = self.players.remove(&id);
        if let Some(player) = &removed {
            tracing::info!(player = %player.profile.name, "Player left");
        }
        removed
    }

    /// Remove a player only if its entry belongs to `connection`.
    pub fn remove_if_connection(&mut self, id: Uuid, connection: ConnectionId) -> Option<ServerPlayer> {
        if self.players.get(&id)?.connection.id() != connection {
            return None;
        }
        self.remove(id)
    }

    /// Look up a player.
    pub fn get(&self, id: Uuid) -> Option<&ServerPlayer> {
        self.players.get(&id)
    }

    /// Look up a player mutably.
    pub fn get_mut(&mut self, id: Uuid) -> Option<&mut ServerPlayer> {
        self.players.get_mut(&id)
    }

    /// Whether a player with this id is present.
    pub fn contains(&self, id: Uuid) -> bool {
        self.players.contains_key(&id)
    }

    /// Case-insensitive lookup by name.
    pub fn by_name(&self, name: &str) -> Option<&ServerPlayer> {
        self.players
            .values()
            .find(|p| p.profile.name.eq_ignore_ascii_case(name))
    }

    /// All players.
    pub fn iter(&self) -> impl Iterator<Item = &ServerPlayer> {
        self.players.values()
    }

    /// Player count.
    pub fn len(&self) -> usize {
        self.players.len()
    }

    /// Whether nobody is online.
    pub fn is_empty(&self) -> bool {
        self.players.is_empty()
    }
}

/// Authenticated sessions by profile id, from login acceptance until
/// disconnect, across Configuration and Play.
#[derive(Debug, Default)]
pub struct SessionRegistry {
    sessions: FxHashMap<Uuid, ConnectionHandle>,
}

impl SessionRegistry {
    /// Record `connection` as the live session for `id`.
    pub fn register(&mut self, id: Uuid, connection: ConnectionHandle) {
        self.sessions.insert(id, connection);
    }

    /// Forget the session for `id` if it belongs to `connection`.
    pub fn unregister(&mut self, id: Uuid, connection: ConnectionId) -> bool {
        let owned = self
            .sessions
            .get(&id)
            .is_some_and(|handle| handle.id() == connection);
        if owned {
            self.sessions.remove(&id);
        }
        owned
    }

    /// Whether a session for `id` is live.
    pub fn contains(&self, id: Uuid) -> bool {
        self.sessions.contains_key(&id)
    }

    /// Number of live sessions.
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    /// Whether no session is live.
    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Disconnect the session holding `id`. Returns whether one existed.
    pub fn disconnect_profile(&self, id: Uuid, reason: DisconnectReason) -> bool {
        match self.sessions.get(&id) {
            Some(handle) => {
                handle.disconnect(reason);
                true
            }
            None => false,
        }
    }
}
