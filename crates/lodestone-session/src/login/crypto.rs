//! Login key exchange.
//!
//! X25519 between a per-server static key and a per-login client key.
//! Both sides derive the session key and a separate challenge key from the
//! shared secret and both public keys. The client proves it holds the
//! shared secret by sealing the server's 4-byte challenge under the
//! challenge key.

use lodestone_net::{CipherError, Direction, FrameCipher};
use sha2::{Digest, Sha256};
use x25519_dalek::{PublicKey, StaticSecret};

const SESSION_LABEL: &[u8] = b"lodestone-session";
const CHALLENGE_LABEL: &[u8] = b"lodestone-challenge";

/// The server's long-lived exchange key.
pub struct ServerKeyPair {
    secret: StaticSecret,
    public: PublicKey,
}

impl std::fmt::Debug for ServerKeyPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServerKeyPair")
            .field("public", &self.public.as_bytes())
            .finish_non_exhaustive()
    }
}

impl ServerKeyPair {
    /// Fresh random key pair.
    pub fn generate() -> Self {
        let secret = StaticSecret::from(rand::random::<[u8; 32]>());
        let public = PublicKey::from(&secret);
        Self { secret, public }
    }

    /// Public key bytes advertised in the login hello.
    pub fn public_bytes(&self) -> [u8; 32] {
        self.public.to_bytes()
    }

    /// Derive keys for a client's public key. `None` for a low-order client key.
    pub fn derive(&self, client_public: &[u8; 32]) -> Option<DerivedKeys> {
        let shared = self.secret.diffie_hellman(&PublicKey::from(*client_public));
        if !shared.was_contributory() {
            return None;
        }
        Some(DerivedKeys::new(
            shared.as_bytes(),
            client_public,
            &self.public_bytes(),
        ))
    }
}

/// Keys both sides derive from one exchange.
#[derive(Clone)]
pub struct DerivedKeys {
    /// Raw X25519 output.
    pub shared: [u8; 32],
    /// Key for the encrypted stream.
    pub session_key: [u8; 32],
    /// Key the challenge is sealed under.
    pub challenge_key: [u8; 32],
}

impl DerivedKeys {
    fn new(shared: &[u8; 32], client_public: &[u8; 32], server_public: &[u8; 32]) -> Self {
        let derive = |label: &[u8]| -> [u8; 32] {
            let mut hasher = Sha256::new();
            hasher.update(label);
            hasher.update(shared);
            hasher.update(client_public);
            hasher.update(server_public);
            hasher.finalize().into()
        };
        Self {
            shared: *shared,
            session_key: derive(SESSION_LABEL),
            challenge_key: derive(CHALLENGE_LABEL),
        }
    }

    /// Whether `sealed` is `challenge` sealed under the challenge key.
    pub fn verify_challenge(&self, sealed: &[u8], challenge: &[u8; 4]) -> bool {
        FrameCipher::new(&self.challenge_key, Direction::Serverbound)
            .open(sealed)
            .is_ok_and(|plain| plain == challenge)
    }
}

/// Hex SHA-256 over the server id, shared secret and server public key.
pub fn server_digest(server_id: &str, shared: &[u8; 32], server_public: &[u8; 32]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(server_id.as_bytes());
    hasher.update(shared);
    hasher.update(server_public);
    hasher
        .finalize()
        .iter()
        .map(|b| format!("{b:02x}"))
        .collect()
}

/// What a client sends back, and what it keeps.
#[derive(Clone)]
pub struct ClientKeyExchange {
    /// Client public key for the `Key` packet.
    pub public_key: [u8; 32],
    /// Sealed challenge for the `Key` packet.
    pub encrypted_challenge: Vec<u8>,
    /// Key to enable on the client's codec.
    pub session_key: [u8; 32],
    /// Digest the client would report to the identity service.
    pub digest: String,
}

/// Client half of the exchange.
pub fn client_key_exchange(
    server_id: &str,
    server_public: &[u8; 32],
    challenge: &[u8; 4],
) -> Result<ClientKeyExchange, CipherError> {
    let secret = StaticSecret::from(rand::random::<[u8; 32]>());
    let public_key = PublicKey::from(&secret).to_bytes();
    let shared = secret.diffie_hellman(&PublicKey::from(*server_public));
    let keys = DerivedKeys::new(shared.as_bytes(), &public_key, server_public);
    let encrypted_challenge =
        FrameCipher::new(&keys.challenge_key, Direction::Serverbound).seal(challenge)?;
    Ok(ClientKeyExchange {
        public_key,
        encrypted_challenge,
        session_key: keys.session_key,
        digest: server_digest(server_id, &keys.shared, server_public),
    })
}
