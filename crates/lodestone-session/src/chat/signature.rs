//! Signed message bodies, chain links and the bytes a signature covers.

use ed25519_dalek::{Signer, SigningKey};
use lodestone_net::packets::types::MessageSignature;
use uuid::Uuid;

const SIGNED_PAYLOAD_VERSION: u32 = 1;

/// The part of a chat message covered by its signature.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedMessageBody {
    /// Raw text as typed.
    pub content: String,
    /// Client timestamp, milliseconds since the Unix epoch.
    pub timestamp: i64,
    /// Per-message salt.
    pub salt: i64,
    /// Signatures the sender had seen when signing.
    pub last_seen: Vec<MessageSignature>,
}

/// Position of a message in its sender's chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MessageLink {
    /// Zero-based index within the chat session.
    pub index: u32,
    /// Sender profile id.
    pub sender: Uuid,
    /// Chat session the chain belongs to.
    pub session_id: Uuid,
}

impl MessageLink {
    /// First link of a new chat session.
    pub fn root(sender: Uuid, session_id: Uuid) -> Self {
        Self {
            index: 0,
            sender,
            session_id,
        }
    }

    /// The following link, `None` once the index space is exhausted.
    pub fn advance(self) -> Option<Self> {
        Some(Self {
            index: self.index.checked_add(1)?,
            ..self
        })
    }
}

/// Bytes a chain signature is computed over.
pub fn signed_payload(
    link: &MessageLink,
    previous: Option<&MessageSignature>,
    body: &SignedMessageBody,
) -> Vec<u8> {
    let mut out = Vec::with_capacity(160 + body.content.len() + body.last_seen.len() * 64);
    out.extend_from_slice(&SIGNED_PAYLOAD_VERSION.to_be_bytes());
    out.extend_from_slice(link.sender.as_bytes());
    out.extend_from_slice(link.session_id.as_bytes());
    out.extend_from_slice(&link.index.to_be_bytes());
    match previous {
        Some(signature) => out.extend_from_slice(signature.as_bytes()),
        None => out.extend_from_slice(&[0u8; 64]),
    }
    out.extend_from_slice(&body.salt.to_be_bytes());
    out.extend_from_slice(&body.timestamp.to_be_bytes());
    out.extend_from_slice(&(body.content.len() as u32).to_be_bytes());
    out.extend_from_slice(body.content.as_bytes());
    out.extend_from_slice(&(body.last_seen.len() as u32).to_be_bytes());
    for signature in &body.last_seen {
        out.extend_from_slice(signature.as_bytes());
    }
    out
}

/// Client-side signer that walks a chain the same way the server verifies it.
pub struct ChainSigner {
    key: SigningKey,
    next: Option<MessageLink>,
    previous: Option<MessageSignature>,
}

impl ChainSigner {
    /// Start a new chain for `sender` under `session_id`.
    pub fn new(key: SigningKey, sender: Uuid, session_id: Uuid) -> Self {
        Self {
            key,
            next: Some(MessageLink::root(sender, session_id)),
            previous: None,
        }
    }

    /// Public half of the signing key.
    pub fn public_key(&self) -> [u8; 32] {
        self.key.verifying_key().to_bytes()
    }

    /// Sign `body` as the next message in the chain.
    pub fn sign(&mut self, body: &SignedMessageBody) -> Option<MessageSignature> {
        let link = self.next?;
        let payload = signed_payload(&link, self.previous.as_ref(), body);
        let signature = MessageSignature(self.key.sign(&payload).to_bytes());
        self.next = link.advance();
        self.previous = Some(signature);
        Some(signature)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn body(content: &str) -> SignedMessageBody {
        SignedMessageBody {
            content: content.to_string(),
            timestamp: 1_000,
            salt: 7,
            last_seen: Vec::new(),
        }
    }

    #[test]
    fn test_link_advance_overflows_to_none() {
        let mut link = MessageLink::root(Uuid::nil(), Uuid::nil());
        assert_eq!(link.advance().map(|l| l.index), Some(1));
        link.index = u32::MAX;
        assert!(link.advance().is_none());
    }

    #[test]
    fn test_payload_binds_index_and_previous() {
        let link = MessageLink::root(Uuid::nil(), Uuid::nil());
        let base = signed_payload(&link, None, &body("hi"));
        let next = signed_payload(&link.advance().unwrap(), None, &body("hi"));
        let chained = signed_payload(&link, Some(&MessageSignature([1; 64])), &body("hi"));
        assert_ne!(base, next);
        assert_ne!(base, chained);
    }

    #[test]
    fn test_signer_produces_distinct_signatures() {
        let mut signer = ChainSigner::new(SigningKey::from_bytes(&[3; 32]), Uuid::nil(), Uuid::nil());
        let first = signer.sign(&body("same")).unwrap();
        let second = signer.sign(&body("same")).unwrap();
        assert_ne!(first, second);
    }
}
