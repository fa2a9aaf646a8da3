//! Command-line argument parsing for the Lodestone server.

use std::path::PathBuf;

use clap::Parser;

use crate::Config;

/// Lodestone server command-line arguments.
///
/// CLI values override settings loaded from `server.ron`.
#[derive(Parser, Debug)]
#[command(name = "lodestone", about = "Lodestone game server")]
pub struct CliArgs {
    /// Address to bind to.
    #[arg(long)]
    pub bind: Option<String>,

    /// Port to listen on.
    #[arg(long)]
    pub port: Option<u16>,

    /// Authenticate players against the identity service.
    #[arg(long)]
    pub online_mode: Option<bool>,

    /// Log level (error, warn, info, debug, trace).
    #[arg(long)]
    pub log_level: Option<String>,

    /// Path to config directory (overrides default location).
    #[arg(long)]
    pub config: Option<PathBuf>,
}

impl Config {
    /// Apply CLI overrides to a loaded config.
    pub fn apply_cli_overrides(&mut self, args: &CliArgs) {
        if let Some(ref bind) = args.bind {
            self.network.bind_address = bind.clone();
        }
        if let Some(port) = args.port {
            self.network.port = port;
        }
        if let Some(online) = args.online_mode {
            self.server.online_mode = online;
        }
        if let Some(ref level) = args.log_level {
            self.debug.log_level = level.clone();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn empty_args() -> CliArgs {
        CliArgs {
            bind: None,
            port: None,
            online_mode: None,
            log_level: None,
            config: None,
        }
    }

    #[test]
    fn test_cli_override() {
        let mut config = Config::default();
        let args = CliArgs {
            port: Some(25600),
            online_mode: Some(true),
            ..empty_args()
        };
        config.apply_cli_overrides(&args);
        assert_eq!(config.network.port, 25600);
        assert!(config.server.online_mode);
        // Non-overridden fields retain defaults
        assert_eq!(config.network.bind_address, "0.0.0.0");
    }

    #[test]
    fn test_cli_no_override() {
        let original = Config::default();
        let mut config = Config::default();
        config.apply_cli_overrides(&empty_args());
        assert_eq!(config, original);
    }

    #[test]
    fn test_cli_parses_flags() {
        let args = CliArgs::parse_from(["lodestone", "--port", "1234", "--log-level", "debug"]);
        assert_eq!(args.port, Some(1234));
        assert_eq!(args.log_level.as_deref(), Some("debug"));
    }
}
