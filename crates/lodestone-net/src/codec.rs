//! Per-connection packet codec: body serialization, compression, encryption.
//!
//! Outgoing: packet -> body -> (flag + maybe LZ4) -> (AEAD seal) -> frame.
//! Incoming runs the same steps in reverse. Compression and encryption are
//! switched on mid-stream by the login phase, so each side keeps its own
//! encoder and decoder state and applies changes between two packets.

use crate::cipher::{CipherError, Direction, FrameCipher};
use crate::compression::{CompressionError, compress_payload, decompress_payload};
use crate::packets::PacketError;

/// Errors raised while turning packets into frames or back.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    /// Body (de)serialization failed.
    #[error(transparent)]
    Packet(#[from] PacketError),
    /// Compression layer failed.
    #[error(transparent)]
    Compression(#[from] CompressionError),
    /// Encryption layer failed.
    #[error(transparent)]
    Cipher(#[from] CipherError),
}

/// Outgoing half of a connection's codec.
#[derive(Debug)]
pub struct PacketEncoder {
    direction: Direction,
    compression: Option<usize>,
    cipher: Option<FrameCipher>,
}

impl PacketEncoder {
    /// Plain encoder for frames travelling in `direction`.
    pub fn new(direction: Direction) -> Self {
        Self {
            direction,
            compression: None,
            cipher: None,
        }
    }

    /// Set or clear the compression threshold for all following frames.
    pub fn set_compression(&mut self, threshold: Option<usize>) {
        self.compression = threshold;
    }

    /// Encrypt all following frames under `key`.
    pub fn enable_encryption(&mut self, key: &[u8; 32]) {
        self.cipher = Some(FrameCipher::new(key, self.direction));
    }

    /// Whether frames are encrypted.
    pub fn is_encrypted(&self) -> bool {
        self.cipher.is_some()
    }

    /// Current compression threshold.
    pub fn compression(&self) -> Option<usize> {
        self.compression
    }

    /// Turn a serialized packet body into a frame payload.
    pub fn encode_body(&mut self, body: &[u8]) -> Result<Vec<u8>, CodecError> {
        let compressed = match self.compression {
            Some(threshold) => compress_payload(body, threshold),
            None => body.to_vec(),
        };
        match self.cipher.as_mut() {
            Some(cipher) => Ok(cipher.seal(&compressed)?),
            None => Ok(compressed),
        }
    }
}

/// Incoming half of a connection's codec.
#[derive(Debug)]
pub struct PacketDecoder {
    direction: Direction,
    compression: Option<usize>,
    cipher: Option<FrameCipher>,
}

impl PacketDecoder {
    /// Plain decoder for frames travelling in `direction`.
    pub fn new(direction: Direction) -> Self {
        Self {
            direction,
            compression: None,
            cipher: None,
        }
    }

    /// Set or clear the compression threshold for all following frames.
    pub fn set_compression(&mut self, threshold: Option<usize>) {
        self.compression = threshold;
    }

    /// Decrypt all following frames under `key`.
    pub fn enable_encryption(&mut self, key: &[u8; 32]) {
        self.cipher = Some(FrameCipher::new(key, self.direction));
    }

    /// Turn a frame payload back into a serialized packet body.
    pub fn decode_frame(&mut self, frame: &[u8]) -> Result<Vec<u8>, CodecError> {
        let plain = match self.cipher.as_mut() {
            Some(cipher) => cipher.open(frame)?,
            None => frame.to_vec(),
        };
        match self.compression {
            Some(threshold) => Ok(decompress_payload(&plain, threshold)?),
            None => Ok(plain),
        }
    }
}
