//! Session error taxonomy and disconnect reasons.
//!
//! Every fatal path ends in a [`DisconnectReason`] handed to
//! [`crate::ConnectionHandle::disconnect`].

use lodestone_net::CodecError;

use crate::chat::last_seen::LastSeenError;
use crate::configuration::tasks::TaskError;

/// Why a connection is being closed. Rendered as a translation key or plain text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DisconnectReason {
    /// Unexpected or malformed packet.
    ProtocolViolation(String),
    /// Keep-alive not answered in time.
    Timeout,
    /// Login did not finish within the tick budget.
    SlowLogin,
    /// Same profile logged in from elsewhere.
    DuplicateLogin,
    /// Identity service rejected the login.
    UnverifiedUsername,
    /// Identity service could not be reached.
    AuthServersDown,
    /// Transfer logins are not accepted.
    TransfersDisabled,
    /// Client protocol is older than the server's.
    OutdatedClient,
    /// Client protocol is newer than the server's.
    OutdatedServer,
    /// No free player slot.
    ServerFull,
    /// Requested name is not a valid player name.
    InvalidPlayerName,
    /// A configuration task failed.
    ConfigurationError,
    /// Required resource pack was declined or failed.
    RequiredResourcePack,
    /// Last-seen acknowledgement did not match server history.
    ChatValidationFailed,
    /// Client stopped acknowledging chat.
    TooManyPendingChats,
    /// Chat or command spam.
    Spam,
    /// Chat contained disallowed characters.
    IllegalCharacters,
    /// Unsigned command where signed arguments were required.
    InvalidCommandSignature,
    /// Transport went away without a disconnect.
    ConnectionLost,
    /// Server is stopping.
    ServerShutdown,
    /// Free-form reason.
    Custom(String),
}

impl DisconnectReason {
    /// Text sent to the client.
    pub fn message(&self) -> String {
        let key = match self {
            DisconnectReason::ProtocolViolation(detail) => {
                return format!("Protocol violation: {detail}");
            }
            DisconnectReason::Custom(text) => return text.clone(),
            DisconnectReason::Timeout => "disconnect.timeout",
            DisconnectReason::SlowLogin => "multiplayer.disconnect.slow_login",
            DisconnectReason::DuplicateLogin => "multiplayer.disconnect.duplicate_login",
            DisconnectReason::UnverifiedUsername => "multiplayer.disconnect.unverified_username",
            DisconnectReason::AuthServersDown => "multiplayer.disconnect.authservers_down",
            DisconnectReason::TransfersDisabled => "multiplayer.disconnect.transfers_disabled",
            DisconnectReason::OutdatedClient => "multiplayer.disconnect.outdated_client",
            DisconnectReason::OutdatedServer => "multiplayer.disconnect.outdated_server",
            DisconnectReason::ServerFull => "multiplayer.disconnect.server_full",
            DisconnectReason::InvalidPlayerName => "multiplayer.disconnect.invalid_player_data",
            DisconnectReason::ConfigurationError => "multiplayer.disconnect.configuration_error",
            DisconnectReason::RequiredResourcePack => "multiplayer.requiredTexturePrompt.disconnect",
            DisconnectReason::ChatValidationFailed => {
                "multiplayer.disconnect.chat_validation_failed"
            }
            DisconnectReason::TooManyPendingChats => "multiplayer.disconnect.too_many_pending_chats",
            DisconnectReason::Spam => "disconnect.spam",
            DisconnectReason::IllegalCharacters => "multiplayer.disconnect.illegal_characters",
            DisconnectReason::InvalidCommandSignature => {
                "multiplayer.disconnect.invalid_command_signature"
            }
            DisconnectReason::ConnectionLost => "disconnect.lost",
            DisconnectReason::ServerShutdown => "multiplayer.disconnect.server_shutdown",
        };
        key.to_string()
    }
}

impl std::fmt::Display for DisconnectReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.message())
    }
}

/// Errors raised while a listener handles a packet or ticks.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// Packet not valid for the current phase or state.
    #[error("protocol violation: {0}")]
    ProtocolViolation(String),
    /// Client's chat acknowledgement disagreed with server history.
    #[error("chat validation failed: {0}")]
    ChatValidation(#[from] LastSeenError),
    /// A configuration task failed to start or tick.
    #[error("configuration task failed: {0}")]
    Task(#[from] TaskError),
    /// Frame could not be decoded.
    #[error("codec error: {0}")]
    Codec(#[from] CodecError),
    /// A condition with its own disconnect reason.
    #[error("{0}")]
    Disconnect(DisconnectReason),
}

impl SessionError {
    /// Build a protocol violation.
    pub fn violation(detail: impl Into<String>) -> Self {
        SessionError::ProtocolViolation(detail.into())
    }

    /// The reason the client is told when this error ends the connection.
    pub fn disconnect_reason(&self) -> DisconnectReason {
        match self {
            SessionError::ProtocolViolation(detail) => {
                DisconnectReason::ProtocolViolation(detail.clone())
            }
            SessionError::ChatValidation(_) => DisconnectReason::ChatValidationFailed,
            SessionError::Task(_) => DisconnectReason::ConfigurationError,
            SessionError::Codec(e) => DisconnectReason::ProtocolViolation(e.to_string()),
            SessionError::Disconnect(reason) => reason.clone(),
        }
    }
}

impl From<DisconnectReason> for SessionError {
    fn from(reason: DisconnectReason) -> Self {
        SessionError::Disconnect(reason)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_maps_to_reason() {
        let e = SessionError::from(LastSeenError::ChecksumMismatch);
        assert_eq!(e.disconnect_reason(), DisconnectReason::ChatValidationFailed);
        assert!(e.disconnect_reason().message().contains("chat_validation_failed"));

        let e = SessionError::from(TaskError::Failed("boom".into()));
        assert_eq!(e.disconnect_reason(), DisconnectReason::ConfigurationError);
    }

    #[test]
    fn test_violation_text_includes_detail() {
        let reason = SessionError::violation("unexpected key packet").disconnect_reason();
        assert_eq!(reason.message(), "Protocol violation: unexpected key packet");
    }
}
