//! Wire-level protocol phases.

use serde::{Deserialize, Serialize};

/// The protocol sub-state a connection is in. Each phase has its own
/// packet set; a packet is only valid in the phase it belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ProtocolPhase {
    /// First packet only: declares the intent of the connection.
    Handshake,
    /// Server list ping. Terminal.
    Status,
    /// Identity verification and encryption setup.
    Login,
    /// Registry sync and other pre-join setup.
    Configuration,
    /// In-world gameplay.
    Play,
}

impl ProtocolPhase {
    /// Whether a listener for `self` may hand off to a listener for `next`.
    ///
    /// Play may only return to Configuration; nothing returns to Handshake
    /// or Login.
    pub fn can_transition_to(self, next: ProtocolPhase) -> bool {
        use ProtocolPhase::*;
        matches!(
            (self, next),
            (Handshake, Status)
                | (Handshake, Login)
                | (Login, Configuration)
                | (Configuration, Play)
                | (Play, Configuration)
        )
    }

    /// Lowercase phase name used in logs and disconnect text.
    pub fn name(self) -> &'static str {
        match self {
            ProtocolPhase::Handshake => "handshake",
            ProtocolPhase::Status => "status",
            ProtocolPhase::Login => "login",
            ProtocolPhase::Configuration => "configuration",
            ProtocolPhase::Play => "play",
        }
    }
}

impl std::fmt::Display for ProtocolPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ProtocolPhase::*;

    #[test]
    fn test_valid_join_path() {
        assert!(Handshake.can_transition_to(Login));
        assert!(Login.can_transition_to(Configuration));
        assert!(Configuration.can_transition_to(Play));
        assert!(Play.can_transition_to(Configuration));
    }

    #[test]
    fn test_status_is_terminal() {
        assert!(Handshake.can_transition_to(Status));
        for next in [Handshake, Status, Login, Configuration, Play] {
            assert!(!Status.can_transition_to(next));
        }
    }

    #[test]
    fn test_play_cannot_return_to_login() {
        assert!(!Play.can_transition_to(Login));
        assert!(!Play.can_transition_to(Handshake));
        assert!(!Configuration.can_transition_to(Login));
    }

    #[test]
    fn test_phases_cannot_be_skipped() {
        assert!(!Handshake.can_transition_to(Play));
        assert!(!Handshake.can_transition_to(Configuration));
        assert!(!Login.can_transition_to(Play));
    }
}
