//! Per-frame authenticated encryption.
//!
//! After the login key exchange both sides hold the same 32-byte session
//! key. Each frame is sealed with ChaCha20-Poly1305 under a nonce built
//! from the traffic direction and a per-direction counter, so frames must
//! be opened in exactly the order they were sealed.

use chacha20poly1305::aead::Aead;
use chacha20poly1305::{ChaCha20Poly1305, Key, KeyInit, Nonce};

/// Which way traffic flows. Each direction has its own nonce space.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Client to server.
    Serverbound,
    /// Server to client.
    Clientbound,
}

impl Direction {
    fn tag(self) -> u8 {
        match self {
            Direction::Serverbound => 0x01,
            Direction::Clientbound => 0x02,
        }
    }
}

/// Errors raised by [`FrameCipher`].
#[derive(Debug, thiserror::Error)]
pub enum CipherError {
    /// Encryption failed.
    #[error("frame encryption failed")]
    Seal,
    /// Authentication tag mismatch or truncated frame.
    #[error("frame authentication failed")]
    Open,
    /// The per-direction counter ran out.
    #[error("nonce counter exhausted")]
    CounterExhausted,
}

/// One direction of an encrypted stream.
pub struct FrameCipher {
    aead: ChaCha20Poly1305,
    direction: Direction,
    counter: u64,
}

impl FrameCipher {
    /// Create a cipher for frames travelling in `direction`.
    pub fn new(key: &[u8; 32], direction: Direction) -> Self {
        Self {
            aead: ChaCha20Poly1305::new(Key::from_slice(key)),
            direction,
            counter: 0,
        }
    }

    /// Encrypt one frame body.
    pub fn seal(&mut self, plaintext: &[u8]) -> Result<Vec<u8>, CipherError> {
        let nonce = self.next_nonce()?;
        self.aead
            .encrypt(Nonce::from_slice(&nonce), plaintext)
            .map_err(|_| CipherError::Seal)
    }

    /// Decrypt and authenticate one frame body.
    pub fn open(&mut self, ciphertext: &[u8]) -> Result<Vec<u8>, CipherError> {
        let nonce = self.next_nonce()?;
        self.aead
            .decrypt(Nonce::from_slice(&nonce), ciphertext)
            .map_err(|_| CipherError::Open)
    }

    fn next_nonce(&mut self) -> Result<[u8; 12], CipherError> {
        let counter = self.counter;
        self.counter = counter.checked_add(1).ok_or(CipherError::CounterExhausted)?;
        let mut nonce = [0u8; 12];
        nonce[0] = self.direction.tag();
        nonce[4..].copy_from_slice(&counter.to_be_bytes());
        Ok(nonce)
    }
}

impl std::fmt::Debug for FrameCipher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FrameCipher")
            .field("direction", &self.direction)
            .field("counter", &self.counter)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const KEY: [u8; 32] = [7u8; 32];

    #[test]
    fn test_sealed_frames_open_in_order() {
        let mut sealer = FrameCipher::new(&KEY, Direction::Clientbound);
        let mut opener = FrameCipher::new(&KEY, Direction::Clientbound);

        let first = sealer.seal(b"first").unwrap();
        let second = sealer.seal(b"second").unwrap();
        assert_ne!(first, second);

        assert_eq!(opener.open(&first).unwrap(), b"first");
        assert_eq!(opener.open(&second).unwrap(), b"second");
    }

    #[test]
    fn test_out_of_order_frame_fails() {
        let mut sealer = FrameCipher::new(&KEY, Direction::Clientbound);
        let mut opener = FrameCipher::new(&KEY, Direction::Clientbound);

        let _first = sealer.seal(b"first").unwrap();
        let second = sealer.seal(b"second").unwrap();
        assert!(matches!(opener.open(&second), Err(CipherError::Open)));
    }

    #[test]
    fn test_directions_do_not_share_nonces() {
        let mut serverbound = FrameCipher::new(&KEY, Direction::Serverbound);
        let mut clientbound = FrameCipher::new(&KEY, Direction::Clientbound);
        let sealed = serverbound.seal(b"hello").unwrap();
        assert!(clientbound.open(&sealed).is_err());
    }

    #[test]
    fn test_tampered_frame_fails() {
        let mut sealer = FrameCipher::new(&KEY, Direction::Serverbound);
        let mut opener = FrameCipher::new(&KEY, Direction::Serverbound);
        let mut sealed = sealer.seal(b"payload").unwrap();
        sealed[0] ^= 0x80;
        assert!(opener.open(&sealed).is_err());
    }

    #[test]
    fn test_wrong_key_fails() {
        let mut sealer = FrameCipher::new(&KEY, Direction::Serverbound);
        let mut opener = FrameCipher::new(&[8u8; 32], Direction::Serverbound);
        let sealed = sealer.seal(b"payload").unwrap();
        assert!(opener.open(&sealed).is_err());
    }
}
