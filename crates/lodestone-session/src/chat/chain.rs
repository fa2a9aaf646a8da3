//! Per-sender signed message chain decoding.
//!
//! A chain is either unsigned (no chat session installed) or signed under
//! an Ed25519 session key. An invalid signature, an out-of-order message or
//! a mismatched signed command breaks it for good: every later message is
//! rejected without being verified, and installing a new session does not
//! repair it.

use ed25519_dalek::{Signature, VerifyingKey};
use lodestone_net::packets::types::{MessageSignature, RemoteChatSession};
use uuid::Uuid;

use super::signature::{MessageLink, SignedMessageBody, signed_payload};

/// Why a message could not be unpacked from its sender's chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum ChainError {
    /// Secure chat is enforced and the sender has no session key.
    #[error("missing profile key")]
    MissingProfileKey,
    /// A signed chain received a message without a signature.
    #[error("missing signature")]
    MissingSignature,
    /// The chain was broken by an earlier failure.
    #[error("chain broken")]
    ChainBroken,
    /// The session key has expired.
    #[error("expired profile key")]
    ExpiredProfileKey,
    /// Signature did not verify.
    #[error("invalid signature")]
    InvalidSignature,
    /// Message timestamp went backwards.
    #[error("out of order chat")]
    OutOfOrder,
}

impl ChainError {
    /// Translation key of the system message shown to the sender.
    pub fn translation_key(self) -> &'static str {
        match self {
            ChainError::MissingProfileKey => "chat.disabled.missingProfileKey",
            ChainError::MissingSignature | ChainError::InvalidSignature => {
                "chat.disabled.invalid_signature"
            }
            ChainError::ChainBroken => "chat.disabled.chain_broken",
            ChainError::ExpiredProfileKey => "chat.disabled.expiredProfileKey",
            ChainError::OutOfOrder => "chat.disabled.out_of_order_chat",
        }
    }
}

/// A message accepted from a chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifiedMessage {
    /// Sender profile id.
    pub sender: Uuid,
    /// Chain position, `None` for unsigned messages.
    pub link: Option<MessageLink>,
    /// Verified signature, `None` for unsigned messages.
    pub signature: Option<MessageSignature>,
    /// The signed content.
    pub body: SignedMessageBody,
}

impl VerifiedMessage {
    /// Whether the message carries a verified signature.
    pub fn is_signed(&self) -> bool {
        self.signature.is_some()
    }
}

/// A validated chat session key.
#[derive(Debug, Clone)]
pub struct SessionKey {
    session_id: Uuid,
    key: VerifyingKey,
    expires_at: i64,
}

impl SessionKey {
    /// Parse the key a client announced. Malformed keys are invalid signatures.
    pub fn from_remote(session: &RemoteChatSession) -> Result<Self, ChainError> {
        let key =
            VerifyingKey::from_bytes(&session.public_key).map_err(|_| ChainError::InvalidSignature)?;
        Ok(Self {
            session_id: session.session_id,
            key,
            expires_at: session.expires_at,
        })
    }

    /// Session id.
    pub fn session_id(&self) -> Uuid {
        self.session_id
    }

    /// Whether the key has expired at `now_millis`.
    pub fn is_expired(&self, now_millis: i64) -> bool {
        now_millis > self.expires_at
    }
}

/// Decoder state for one sender.
#[derive(Debug, Clone)]
pub enum SignedMessageChain {
    /// No chat session installed.
    Unsigned {
        /// Sender profile id.
        sender: Uuid,
        /// Reject messages because secure chat is enforced.
        enforce_secure_chat: bool,
    },
    /// A chat session is installed.
    Signed {
        /// Sender profile id.
        sender: Uuid,
        /// Session key.
        key: SessionKey,
        /// Link the next message must occupy, `None` once the index space is exhausted.
        next: Option<MessageLink>,
        /// Signature of the last accepted message.
        previous: Option<MessageSignature>,
        /// Timestamp of the last accepted message.
        last_timestamp: i64,
    },
    /// An earlier failure broke the chain.
    Broken {
        /// Sender profile id.
        sender: Uuid,
    },
}

impl SignedMessageChain {
    /// Chain for a sender without a chat session.
    pub fn unsigned(sender: Uuid, enforce_secure_chat: bool) -> Self {
        SignedMessageChain::Unsigned {
            sender,
            enforce_secure_chat,
        }
    }

    /// Fresh chain under `key`.
    pub fn signed(sender: Uuid, key: SessionKey) -> Self {
        let next = Some(MessageLink::root(sender, key.session_id()));
        SignedMessageChain::Signed {
            sender,
            key,
            next,
            previous: None,
            last_timestamp: i64::MIN,
        }
    }

    /// Sender profile id.
    pub fn sender(&self) -> Uuid {
        match self {
            SignedMessageChain::Unsigned { sender, .. }
            | SignedMessageChain::Signed { sender, .. }
            | SignedMessageChain::Broken { sender } => *sender,
        }
    }

    /// Whether an earlier failure broke the chain.
    pub fn is_broken(&self) -> bool {
        matches!(self, SignedMessageChain::Broken { .. })
    }

    /// Break the chain so every later message is rejected.
    pub fn set_broken(&mut self) {
        *self = SignedMessageChain::Broken {
            sender: self.sender(),
        };
    }

    /// Start a new chat session under `key`. A broken chain stays broken.
    pub fn install(&mut self, key: SessionKey) -> Result<(), ChainError> {
        if self.is_broken() {
            return Err(ChainError::ChainBroken);
        }
        *self = SignedMessageChain::signed(self.sender(), key);
        Ok(())
    }

    /// Verify `body` as the next message of this chain.
    pub fn unpack(
        &mut self,
        signature: Option<&MessageSignature>,
        body: SignedMessageBody,
        now_millis: i64,
    ) -> Result<VerifiedMessage, ChainError> {
        let result = self.unpack_next(signature, body, now_millis);
        if let Err(ChainError::InvalidSignature | ChainError::OutOfOrder) = result {
            self.set_broken();
        }
        result
    }

    fn unpack_next(
        &mut self,
        signature: Option<&MessageSignature>,
        body: SignedMessageBody,
        now_millis: i64,
    ) -> Result<VerifiedMessage, ChainError> {
        match self {
            SignedMessageChain::Broken { .. } => Err(ChainError::ChainBroken),
            SignedMessageChain::Unsigned {
                sender,
                enforce_secure_chat,
            } => {
                if *enforce_secure_chat {
                    return Err(ChainError::MissingProfileKey);
                }
                Ok(VerifiedMessage {
                    sender: *sender,
                    link: None,
                    signature: None,
                    body,
                })
            }
            SignedMessageChain::Signed {
                sender,
                key,
                next,
                previous,
                last_timestamp,
            } => {
                let Some(signature) = signature else {
                    return Err(ChainError::MissingSignature);
                };
                if key.is_expired(now_millis) {
                    return Err(ChainError::ExpiredProfileKey);
                }
                let Some(link) = *next else {
                    return Err(ChainError::ChainBroken);
                };
                if body.timestamp < *last_timestamp {
                    return Err(ChainError::OutOfOrder);
                }

                let payload = signed_payload(&link, previous.as_ref(), &body);
                if key
                    .key
                    .verify_strict(&payload, &Signature::from_bytes(signature.as_bytes()))
                    .is_err()
                {
                    return Err(ChainError::InvalidSignature);
                }
                *last_timestamp = body.timestamp;
                *next = link.advance();
                *previous = Some(*signature);
                Ok(VerifiedMessage {
                    sender: *sender,
                    link: Some(link),
                    signature: Some(*signature),
                    body,
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chat::signature::ChainSigner;
    use ed25519_dalek::SigningKey;

    const NOW: i64 = 1_700_000_000_000;

    fn body(content: &str, timestamp: i64) -> SignedMessageBody {
        SignedMessageBody {
            content: content.to_string(),
            timestamp,
            salt: 42,
            last_seen: Vec::new(),
        }
    }

    fn setup() -> (ChainSigner, SignedMessageChain) {
        let sender = Uuid::from_u128(1);
        let session_id = Uuid::from_u128(2);
        let signer = ChainSigner::new(SigningKey::from_bytes(&[5; 32]), sender, session_id);
        let key = SessionKey::from_remote(&RemoteChatSession {
            session_id,
            public_key: signer.public_key(),
            expires_at: NOW + 60_000,
        })
        .unwrap();
        (signer, SignedMessageChain::signed(sender, key))
    }

    #[test]
    fn test_valid_chain_accepts_in_sequence() {
        let (mut signer, mut chain) = setup();
        for (i, text) in ["one", "two", "three"].into_iter().enumerate() {
            let b = body(text, NOW + i as i64);
            let sig = signer.sign(&b).unwrap();
            let verified = chain.unpack(Some(&sig), b, NOW).unwrap();
            assert_eq!(verified.link.unwrap().index, i as u32);
        }
    }

    #[test]
    fn test_bad_signature_breaks_chain_permanently() {
        let (mut signer, mut chain) = setup();
        let b = body("forged", NOW);
        signer.sign(&b).unwrap();
        let err = chain.unpack(Some(&MessageSignature([0; 64])), b, NOW).unwrap_err();
        assert_eq!(err, ChainError::InvalidSignature);
        assert!(chain.is_broken());

        // A correctly signed follow-up is still rejected.
        let b = body("honest", NOW + 1);
        let sig = signer.sign(&b).unwrap();
        assert_eq!(chain.unpack(Some(&sig), b, NOW), Err(ChainError::ChainBroken));
    }

    #[test]
    fn test_skipped_message_fails_verification() {
        let (mut signer, mut chain) = setup();
        signer.sign(&body("never sent", NOW)).unwrap();
        let b = body("second", NOW + 1);
        let sig = signer.sign(&b).unwrap();
        assert_eq!(
            chain.unpack(Some(&sig), b, NOW),
            Err(ChainError::InvalidSignature)
        );
    }

    #[test]
    fn test_backwards_timestamp_is_out_of_order() {
        let (mut signer, mut chain) = setup();
        let b = body("later", NOW + 10);
        let sig = signer.sign(&b).unwrap();
        chain.unpack(Some(&sig), b, NOW).unwrap();

        let b = body("earlier", NOW);
        let sig = signer.sign(&b).unwrap();
        assert_eq!(chain.unpack(Some(&sig), b, NOW), Err(ChainError::OutOfOrder));
        assert!(chain.is_broken());
    }

    #[test]
    fn test_expired_key_rejects_without_breaking() {
        let (mut signer, mut chain) = setup();
        let b = body("late", NOW);
        let sig = signer.sign(&b).unwrap();
        assert_eq!(
            chain.unpack(Some(&sig), b, NOW + 120_000),
            Err(ChainError::ExpiredProfileKey)
        );
        assert!(!chain.is_broken());
    }

    #[test]
    fn test_unsigned_chain_respects_enforcement() {
        let mut relaxed = SignedMessageChain::unsigned(Uuid::nil(), false);
        assert!(!relaxed.unpack(None, body("hi", NOW), NOW).unwrap().is_signed());

        let mut strict = SignedMessageChain::unsigned(Uuid::nil(), true);
        assert_eq!(
            strict.unpack(None, body("hi", NOW), NOW),
            Err(ChainError::MissingProfileKey)
        );
    }

    #[test]
    fn test_unsigned_chain_can_be_broken() {
        let mut chain = SignedMessageChain::unsigned(Uuid::from_u128(9), false);
        chain.set_broken();
        assert!(chain.is_broken());
        assert_eq!(chain.sender(), Uuid::from_u128(9));
        assert_eq!(
            chain.unpack(None, body("after", NOW), NOW),
            Err(ChainError::ChainBroken)
        );
    }

    #[test]
    fn test_reinstalling_session_keeps_chain_broken() {
        let (mut signer, mut chain) = setup();
        let key = match &chain {
            SignedMessageChain::Signed { key, .. } => key.clone(),
            other => panic!("expected signed chain, got {other:?}"),
        };
        let b = body("forged", NOW);
        signer.sign(&b).unwrap();
        chain.unpack(Some(&MessageSignature([0; 64])), b, NOW).unwrap_err();

        assert_eq!(chain.install(key), Err(ChainError::ChainBroken));
        assert!(chain.is_broken());
    }

    #[test]
    fn test_install_replaces_healthy_chain() {
        let (_, signed) = setup();
        let SignedMessageChain::Signed { key, .. } = signed else {
            panic!("expected signed chain");
        };
        let mut chain = SignedMessageChain::unsigned(Uuid::from_u128(1), true);
        chain.install(key).unwrap();
        assert!(matches!(chain, SignedMessageChain::Signed { .. }));
    }

    #[test]
    fn test_signed_chain_requires_signature() {
        let (_, mut chain) = setup();
        assert_eq!(
            chain.unpack(None, body("hi", NOW), NOW),
            Err(ChainError::MissingSignature)
        );
    }
}
