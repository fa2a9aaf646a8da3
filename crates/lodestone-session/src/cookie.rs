//! The record handed from one phase listener to the next.

use lodestone_net::GameProfile;
use lodestone_net::packets::types::ClientInformation;

/// Everything a connection keeps across listener replacement.
///
/// Immutable once built; changes produce an updated copy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionCookie {
    /// Authenticated identity.
    pub profile: GameProfile,
    /// Smoothed round-trip latency estimate.
    pub latency_millis: u32,
    /// Latest client preferences.
    pub client_info: ClientInformation,
    /// Whether the login arrived through a server-initiated transfer.
    pub transferred: bool,
}

impl SessionCookie {
    /// Cookie created right after login.
    pub fn initial(profile: GameProfile, transferred: bool) -> Self {
        Self {
            profile,
            latency_millis: 0,
            client_info: ClientInformation::default(),
            transferred,
        }
    }

    /// Copy with a new latency estimate.
    pub fn with_latency(&self, latency_millis: u32) -> Self {
        Self {
            latency_millis,
            ..self.clone()
        }
    }

    /// Copy with new client preferences.
    pub fn with_client_info(&self, client_info: ClientInformation) -> Self {
        Self {
            client_info,
            ..self.clone()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn test_updates_produce_copies() {
        let cookie = SessionCookie::initial(GameProfile::new(Uuid::nil(), "Alex"), true);
        let updated = cookie.with_latency(42);
        assert_eq!(cookie.latency_millis, 0);
        assert_eq!(updated.latency_millis, 42);
        assert_eq!(updated.profile, cookie.profile);
        assert!(updated.transferred);

        let info = ClientInformation {
            view_distance: 12,
            ..Default::default()
        };
        assert_eq!(updated.with_client_info(info).client_info.view_distance, 12);
    }
}
