//! The game world as the session layer sees it.

use lodestone_net::packets::types::{KnownPack, RegistryEntry};
use lodestone_net::{ChunkPos, GameProfile};
use rustc_hash::FxHashMap;
use uuid::Uuid;

/// World-side failure surfaced to a session.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum WorldError {
    /// The player is not known to the world.
    #[error("unknown player {0}")]
    UnknownPlayer(Uuid),
    /// Spawn could not be prepared.
    #[error("spawn preparation failed: {0}")]
    Spawn(String),
}

/// One synchronized registry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Registry {
    /// Registry id, e.g. `dimension_type`.
    pub id: String,
    /// Entries with their full data.
    pub entries: Vec<RegistryEntry>,
}

/// Operations the session layer performs on the world.
///
/// Called only from the tick loop.
pub trait World: Send {
    /// Advance world time by one tick.
    fn tick(&mut self) {}

    /// Place a player into the world and return its entity id.
    fn add_player(&mut self, profile: &GameProfile) -> i32;

    /// Remove a player from the world. Unknown ids are ignored.
    fn remove_player(&mut self, id: Uuid);

    /// Apply a client-reported move. Returns `false` when the world rejects it.
    fn apply_movement(&mut self, id: Uuid, position: [f64; 3], on_ground: bool) -> bool;

    /// Current position of a player.
    fn position(&self, id: Uuid) -> Option<[f64; 3]>;

    /// Start loading the area around a player's spawn.
    fn prepare_spawn(&mut self, profile: &GameProfile) -> Result<(), WorldError>;

    /// Whether the spawn area requested by [`World::prepare_spawn`] is loaded.
    fn is_spawn_ready(&self, id: Uuid) -> bool;

    /// Where a player enters the world.
    fn spawn_position(&self, id: Uuid) -> [f64; 3];

    /// Serialized chunk contents.
    fn chunk_data(&self, pos: ChunkPos) -> Option<Vec<u8>>;

    /// Registries sent during configuration.
    fn registries(&self) -> Vec<Registry>;

    /// Data packs the registries come from.
    fn known_packs(&self) -> Vec<KnownPack>;

    /// Run a command no chat command handles. `None` means unknown.
    fn perform_command(&mut self, sender: &GameProfile, command: &str) -> Option<String>;

    /// Display form of a chat message, sent alongside the signed content.
    /// `None` leaves the message undecorated.
    fn decorate_chat(&self, _sender: &GameProfile, _content: &str) -> Option<String> {
        None
    }
}

#[derive(Debug, Clone)]
struct FlatPlayer {
    entity_id: i32,
    position: [f64; 3],
}

/// Deterministic superflat world.
#[derive(Debug, Clone)]
pub struct FlatWorld {
    players: FxHashMap<Uuid, FlatPlayer>,
    pending_spawns: FxHashMap<Uuid, u64>,
    tick: u64,
    next_entity_id: i32,
    spawn_delay_ticks: u64,
    surface_height: f64,
    chat_prefix: Option<String>,
}

impl Default for FlatWorld {
    fn default() -> Self {
        Self::new(0)
    }
}

impl FlatWorld {
    /// World whose spawn areas take `spawn_delay_ticks` ticks to load.
    pub fn new(spawn_delay_ticks: u64) -> Self {
        Self {
            players: FxHashMap::default(),
            pending_spawns: FxHashMap::default(),
            tick: 0,
            next_entity_id: 1,
            spawn_delay_ticks,
            surface_height: 4.0,
            chat_prefix: None,
        }
    }

    /// Decorate chat by prepending `prefix`.
    pub fn with_chat_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.chat_prefix = Some(prefix.into());
        self
    }

    /// Number of players in the world.
    pub fn player_count(&self) -> usize {
        self.players.len()
    }

    /// Whether a player is in the world.
    pub fn contains(&self, id: Uuid) -> bool {
        self.players.contains_key(&id)
    }

    fn spawn_point(&self) -> [f64; 3] {
        [0.5, self.surface_height, 0.5]
    }
}

impl World for FlatWorld {
    fn tick(&mut self) {
        self.tick += 1;
    }

    fn add_player(&mut self, profile: &GameProfile) -> i32 {
        let entity_id = self.next_entity_id;
        self.next_entity_id = self.next_entity_id.wrapping_add(1).max(1);
        let position = self.spawn_position(profile.id);
        self.players.insert(
            profile.id,
            FlatPlayer {
                entity_id,
                position,
            },
        );
        tracing::debug!(player = %profile.name, entity_id, "Player entered world");
        entity_id
    }

    fn remove_player(&mut self, id: Uuid) {
        if let Some(player) = self.players.remove(&id) {
            tracing::debug!(%id, entity_id = player.entity_id, "Player left world");
        }
        self.pending_spawns.remove(&id);
    }

    fn apply_movement(&mut self, id: Uuid, position: [f64; 3], _on_ground: bool) -> bool {
        if position[1] < -64.0 {
            return false;
        }
        match self.players.get_mut(&id) {
            Some(player) => {
                player.position = position;
                true
            }
            None => false,
        }
    }

    fn position(&self, id: Uuid) -> Option<[f64; 3]> {
        self.players.get(&id).map(|p| p.position)
    }

    fn prepare_spawn(&mut self, profile: &GameProfile) -> Result<(), WorldError> {
        self.pending_spawns
            .insert(profile.id, self.tick + self.spawn_delay_ticks);
        Ok(())
    }

    fn is_spawn_ready(&self, id: Uuid) -> bool {
        self.pending_spawns
            .get(&id)
            .is_some_and(|ready_at| self.tick >= *ready_at)
    }

    fn spawn_position(&self, _id: Uuid) -> [f64; 3] {
        self.spawn_point()
    }

    fn chunk_data(&self, pos: ChunkPos) -> Option<Vec<u8>> {
        // Layer ids bottom to top, then the chunk coordinates.
        let mut data = vec![1u8, 2, 2, 3];
        data.extend_from_slice(&pos.x.to_be_bytes());
        data.extend_from_slice(&pos.z.to_be_bytes());
        Some(data)
    }

    fn registries(&self) -> Vec<Registry> {
        let entry = |id: &str, data: &[u8]| RegistryEntry {
            id: id.to_string(),
            data: Some(data.to_vec()),
        };
        vec![
            Registry {
                id: "dimension_type".to_string(),
                entries: vec![entry("overworld", b"flat:height=384")],
            },
            Registry {
                id: "worldgen/biome".to_string(),
                entries: vec![entry("plains", b"temperature=0.8")],
            },
            Registry {
                id: "chat_type".to_string(),
                entries: ["chat", "say_command", "emote_command", "msg_command_incoming", "msg_command_outgoing"]
                    .into_iter()
                    .map(|id| entry(id, id.as_bytes()))
                    .collect(),
            },
        ]
    }

    fn known_packs(&self) -> Vec<KnownPack> {
        vec![KnownPack {
            namespace: "lodestone".to_string(),
            id: "core".to_string(),
            version: "1".to_string(),
        }]
    }

    fn perform_command(&mut self, sender: &GameProfile, command: &str) -> Option<String> {
        match command.split_whitespace().next()? {
            "spawn" => {
                let [x, y, z] = self.spawn_point();
                Some(format!("Spawn is at {x} {y} {z}"))
            }
            "whereami" => {
                let [x, y, z] = self.position(sender.id)?;
                Some(format!("{} is at {x:.1} {y:.1} {z:.1}", sender.name))
            }
            _ => None,
        }
    }

    fn decorate_chat(&self, _sender: &GameProfile, content: &str) -> Option<String> {
        self.chat_prefix
            .as_ref()
            .map(|prefix| format!("{prefix}{content}"))
    }
}
