//! Identity service seam used by online-mode logins.

use std::net::IpAddr;
use std::sync::atomic::{AtomicBool, Ordering};

use lodestone_net::GameProfile;
use rustc_hash::FxHashMap;
use uuid::Uuid;

/// Why an identity lookup did not produce a profile.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum IdentityError {
    /// The service could not be reached.
    #[error("identity service unavailable: {0}")]
    Unavailable(String),
    /// The service does not vouch for this login.
    #[error("identity rejected")]
    Invalid,
}

/// Resolves a joining player to a canonical profile.
///
/// Called on a dedicated thread per login, never on the tick loop.
pub trait IdentityService: Send + Sync {
    /// Check that `name` joined with the session identified by `digest`.
    fn has_joined(
        &self,
        name: &str,
        digest: &str,
        address: Option<IpAddr>,
    ) -> Result<GameProfile, IdentityError>;
}

/// Stable profile id for a player without an authenticated identity.
pub fn offline_uuid(name: &str) -> Uuid {
    Uuid::new_v5(&Uuid::NAMESPACE_OID, format!("OfflinePlayer:{name}").as_bytes())
}

/// Profile for a player without an authenticated identity.
pub fn offline_profile(name: &str) -> GameProfile {
    GameProfile::new(offline_uuid(name), name)
}

/// Accepts everyone under their offline profile.
#[derive(Debug, Clone, Copy, Default)]
pub struct OfflineIdentityService;

impl IdentityService for OfflineIdentityService {
    fn has_joined(
        &self,
        name: &str,
        _digest: &str,
        _address: Option<IpAddr>,
    ) -> Result<GameProfile, IdentityError> {
        Ok(offline_profile(name))
    }
}

/// Fixed table of known players, with a switch to simulate an outage.
#[derive(Debug, Default)]
pub struct StaticIdentityService {
    profiles: FxHashMap<String, GameProfile>,
    unavailable: AtomicBool,
}

impl StaticIdentityService {
    /// Service that knows the given profiles.
    pub fn new(profiles: impl IntoIterator<Item = GameProfile>) -> Self {
        Self {
            profiles: profiles
                .into_iter()
                .map(|p| (p.name.to_lowercase(), p))
                .collect(),
            unavailable: AtomicBool::new(false),
        }
    }

    /// Make every lookup fail as unavailable.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::Relaxed);
    }
}

impl IdentityService for StaticIdentityService {
    fn has_joined(
        &self,
        name: &str,
        digest: &str,
        _address: Option<IpAddr>,
    ) -> Result<GameProfile, IdentityError> {
        if self.unavailable.load(Ordering::Relaxed) {
            return Err(IdentityError::Unavailable("service offline".to_string()));
        }
        if digest.is_empty() {
            return Err(IdentityError::Invalid);
        }
        self.profiles
            .get(&name.to_lowercase())
            .cloned()
            .ok_or(IdentityError::Invalid)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_offline_uuid_is_stable_and_name_bound() {
        assert_eq!(offline_uuid("Steve"), offline_uuid("Steve"));
        assert_ne!(offline_uuid("Steve"), offline_uuid("Alex"));
        assert_eq!(offline_uuid("Steve").get_version_num(), 5);
    }

    #[test]
    fn test_static_service_outcomes() {
        let known = GameProfile::new(Uuid::from_u128(7), "Notch");
        let service = StaticIdentityService::new([known.clone()]);
        assert_eq!(service.has_joined("notch", "ab", None), Ok(known));
        assert_eq!(
            service.has_joined("Herobrine", "ab", None),
            Err(IdentityError::Invalid)
        );
        service.set_unavailable(true);
        assert!(matches!(
            service.has_joined("Notch", "ab", None),
            Err(IdentityError::Unavailable(_))
        ));
    }
}
