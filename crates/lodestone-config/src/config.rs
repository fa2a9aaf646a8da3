//! Configuration structs with sensible defaults and RON persistence.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Top-level server configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Config {
    /// Gameplay-facing server settings.
    pub server: ServerConfig,
    /// Transport and session timing settings.
    pub network: NetworkConfig,
    /// Chat integrity and spam settings.
    pub chat: ChatConfig,
    /// Debug/development settings.
    pub debug: DebugConfig,
}

/// Server identity and join policy.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ServerConfig {
    /// Message of the day shown in status responses.
    pub motd: String,
    /// Maximum number of players advertised and admitted.
    pub max_players: u32,
    /// Authenticate joining players against the identity service.
    pub online_mode: bool,
    /// Require every chat message to carry a valid signature.
    pub enforce_secure_chat: bool,
    /// Accept logins that arrive through a server-initiated transfer.
    pub accepts_transfers: bool,
    /// Name of the local owner when hosting a single-player world.
    pub single_player_owner: Option<String>,
    /// Names of players exempt from spam throttles.
    pub operators: Vec<String>,
    /// Code of conduct text players must accept during configuration.
    pub code_of_conduct: Option<String>,
    /// Resource pack pushed during configuration.
    pub resource_pack: Option<ResourcePackConfig>,
    /// View distance in chunks.
    pub view_distance: u32,
}

/// A server resource pack offered during configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ResourcePackConfig {
    /// Download URL.
    pub url: String,
    /// Hex SHA-1 of the pack archive.
    pub hash: String,
    /// Disconnect players who decline or fail to load the pack.
    pub required: bool,
    /// Optional prompt shown to the player.
    pub prompt: Option<String>,
}

/// Network and session timing configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct NetworkConfig {
    /// Address to bind the listener to.
    pub bind_address: String,
    /// Port to listen on.
    pub port: u16,
    /// Maximum concurrent connections.
    pub max_connections: usize,
    /// Minimum packet size that gets compressed. Negative disables compression.
    pub compression_threshold: i32,
    /// Maximum accepted frame payload in bytes.
    pub max_frame_size: u32,
    /// Frames buffered per connection between the I/O task and the tick loop.
    pub inbound_queue_capacity: usize,
    /// Server ticks per second.
    pub tick_rate: u32,
    /// Ticks a login may take before it is dropped.
    pub login_timeout_ticks: u32,
    /// Interval between keep-alive challenges in milliseconds.
    pub keep_alive_interval_ms: u64,
    /// Time without a keep-alive answer before disconnecting, in milliseconds.
    pub keep_alive_timeout_ms: u64,
    /// Time a closed connection may linger before it is torn down, in milliseconds.
    pub disconnect_grace_ms: u64,
}

/// Chat integrity configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ChatConfig {
    /// Throttle increment per chat message or command.
    pub spam_increment: u32,
    /// Chat throttle level that triggers a disconnect.
    pub spam_threshold: u32,
    /// Item-drop throttle level that triggers a disconnect.
    pub drop_spam_threshold: u32,
    /// Content filter worker threads (0 picks a count from the CPU).
    pub filter_workers: usize,
    /// Unacknowledged chat messages a client may accumulate.
    pub max_pending_acknowledgements: usize,
    /// Capacity of the per-recipient recent signature cache.
    pub signature_cache_capacity: usize,
    /// Maximum chat message length in characters.
    pub max_message_length: usize,
}

/// Debug/development configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DebugConfig {
    /// Log level override (e.g., "debug", "info", "warn").
    pub log_level: String,
}

// --- Default implementations ---

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            motd: "A Lodestone Server".to_string(),
            max_players: 20,
            online_mode: false,
            enforce_secure_chat: false,
            accepts_transfers: false,
            single_player_owner: None,
            operators: Vec::new(),
            code_of_conduct: None,
            resource_pack: None,
            view_distance: 10,
        }
    }
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0".to_string(),
            port: 25565,
            max_connections: 256,
            compression_threshold: 256,
            max_frame_size: 2_097_152,
            inbound_queue_capacity: 1024,
            tick_rate: 20,
            login_timeout_ticks: 600,
            keep_alive_interval_ms: 15_000,
            keep_alive_timeout_ms: 15_000,
            disconnect_grace_ms: 15_000,
        }
    }
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            spam_increment: 20,
            spam_threshold: 200,
            drop_spam_threshold: 1480,
            filter_workers: 0,
            max_pending_acknowledgements: 4096,
            signature_cache_capacity: 128,
            max_message_length: 256,
        }
    }
}

impl Default for DebugConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
        }
    }
}

impl NetworkConfig {
    /// Compression threshold, or `None` when compression is disabled.
    pub fn compression(&self) -> Option<usize> {
        usize::try_from(self.compression_threshold).ok()
    }

    /// Duration of one server tick in milliseconds.
    pub fn tick_millis(&self) -> u64 {
        1000 / u64::from(self.tick_rate.max(1))
    }
}

impl ServerConfig {
    /// Whether `name` is exempt from spam throttling.
    pub fn is_exempt_from_throttling(&self, name: &str) -> bool {
        self.single_player_owner.as_deref() == Some(name)
            || self.operators.iter().any(|op| op == name)
    }
}

// --- Load / Save / Reload ---

impl Config {
    /// The platform default config directory (`<config>/lodestone`).
    pub fn default_dir() -> Result<PathBuf, ConfigError> {
        dirs::config_dir()
            .map(|base| base.join("lodestone"))
            .ok_or(ConfigError::NoConfigDir)
    }

    /// Load config from the given directory, or create a default config file.
    pub fn load_or_create(config_dir: &Path) -> Result<Self, ConfigError> {
        let config_path = config_dir.join("server.ron");

        if config_path.exists() {
            let contents = std::fs::read_to_string(&config_path).map_err(ConfigError::ReadError)?;
            let config: Config = ron::from_str(&contents).map_err(ConfigError::ParseError)?;
            log::info!("Loaded config from {}", config_path.display());
            Ok(config)
        } else {
            let config = Config::default();
            config.save(config_dir)?;
            log::info!("Created default config at {}", config_path.display());
            Ok(config)
        }
    }

    /// Save config to the given directory as `server.ron`.
    pub fn save(&self, config_dir: &Path) -> Result<(), ConfigError> {
        std::fs::create_dir_all(config_dir).map_err(ConfigError::WriteError)?;

        let config_path = config_dir.join("server.ron");
        let pretty = ron::ser::PrettyConfig::new()
            .depth_limit(3)
            .separate_tuple_members(true)
            .enumerate_arrays(false);

        let serialized =
            ron::ser::to_string_pretty(self, pretty).map_err(ConfigError::SerializeError)?;

        std::fs::write(&config_path, serialized).map_err(ConfigError::WriteError)?;
        Ok(())
    }

    /// Hot-reload: returns `Some(new_config)` if the file changed, `None` otherwise.
    pub fn reload(&self, config_dir: &Path) -> Result<Option<Self>, ConfigError> {
        let config_path = config_dir.join("server.ron");
        let contents = std::fs::read_to_string(&config_path).map_err(ConfigError::ReadError)?;
        let new_config: Config = ron::from_str(&contents).map_err(ConfigError::ParseError)?;

        if &new_config != self {
            log::info!("Config reloaded with changes");
            Ok(Some(new_config))
        } else {
            Ok(None)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_serializes() {
        let config = Config::default();
        let ron_str =
            ron::ser::to_string_pretty(&config, ron::ser::PrettyConfig::new().depth_limit(3))
                .unwrap();
        assert!(ron_str.contains("port: 25565"));
        assert!(ron_str.contains("login_timeout_ticks: 600"));
    }

    #[test]
    fn test_config_roundtrip() {
        let mut config = Config::default();
        config.server.resource_pack = Some(ResourcePackConfig {
            url: "https://example.invalid/pack.zip".to_string(),
            hash: "00".repeat(20),
            required: true,
            prompt: None,
        });
        let ron_str = ron::to_string(&config).unwrap();
        let deserialized: Config = ron::from_str(&ron_str).unwrap();
        assert_eq!(config, deserialized);
    }

    #[test]
    fn test_missing_section_uses_default() {
        let ron_str = "(server: (), network: ())";
        let config: Config = ron::from_str(ron_str).unwrap();
        assert_eq!(config.chat, ChatConfig::default());
    }

    #[test]
    fn test_extra_field_ignored() {
        let result: Result<Config, _> = ron::from_str("(future_setting: true)");
        assert!(result.is_ok());
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = Config::default();
        config.server.online_mode = true;
        config.network.port = 25570;
        config.server.operators.push("Notch".to_string());

        config.save(dir.path()).unwrap();
        let loaded = Config::load_or_create(dir.path()).unwrap();
        assert_eq!(config, loaded);
    }

    #[test]
    fn test_load_creates_default_file() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::load_or_create(dir.path()).unwrap();
        assert_eq!(config, Config::default());
        assert!(dir.path().join("server.ron").exists());
    }

    #[test]
    fn test_reload_detects_changes() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::default();
        config.save(dir.path()).unwrap();

        let mut modified = config.clone();
        modified.chat.spam_threshold = 400;
        modified.save(dir.path()).unwrap();

        let result = config.reload(dir.path()).unwrap();
        assert_eq!(result.unwrap().chat.spam_threshold, 400);
    }

    #[test]
    fn test_reload_no_changes() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::default();
        config.save(dir.path()).unwrap();
        assert!(config.reload(dir.path()).unwrap().is_none());
    }

    #[test]
    fn test_negative_threshold_disables_compression() {
        let mut network = NetworkConfig::default();
        assert_eq!(network.compression(), Some(256));
        network.compression_threshold = -1;
        assert_eq!(network.compression(), None);
    }

    #[test]
    fn test_throttle_exemption() {
        let mut server = ServerConfig::default();
        server.single_player_owner = Some("Owner".to_string());
        server.operators.push("Moderator".to_string());
        assert!(server.is_exempt_from_throttling("Owner"));
        assert!(server.is_exempt_from_throttling("Moderator"));
        assert!(!server.is_exempt_from_throttling("Guest"));
    }
}
