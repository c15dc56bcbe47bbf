//! Key generation and agreement for the datagram codec.
//!
//! Identity keys are Ed25519; a peer's id is its 32-byte verifying key, and
//! the same key pair both signs datagrams and anchors key agreement. The
//! X25519 half is obtained through the standard birational map: the
//! verifying key converts to its Montgomery form, the signing key to its
//! clamped scalar. Ephemeral pairs are native X25519 and live for a single
//! message.

use ed25519_dalek::{SigningKey, VerifyingKey};
use x25519_dalek::{PublicKey, StaticSecret};
use zeroize::Zeroizing;

use crate::peer_id::PeerId;
use crate::types::{Result, WireError};

/// A fresh X25519 key pair, generated per outbound message.
///
/// The private half is held only long enough to derive the one-shot cipher
/// key (and, for requests, to decrypt the matching reply), then dropped;
/// the secret zeroizes itself on drop.
#[derive(Clone)]
pub struct EphemeralKeyPair {
    secret: StaticSecret,
    public: PublicKey,
}

impl EphemeralKeyPair {
    /// Generates a random ephemeral pair.
    pub fn generate() -> Self {
        let secret = StaticSecret::random_from_rng(rand::thread_rng());
        let public = PublicKey::from(&secret);
        EphemeralKeyPair { secret, public }
    }

    pub fn public_bytes(&self) -> [u8; 32] {
        self.public.to_bytes()
    }

    pub fn secret(&self) -> &StaticSecret {
        &self.secret
    }
}

impl std::fmt::Debug for EphemeralKeyPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "EphemeralKeyPair(public: {})", hex_head(&self.public.to_bytes()))
    }
}

fn hex_head(bytes: &[u8]) -> String {
    bytes.iter().take(4).map(|b| format!("{:02x}", b)).collect::<String>() + "…"
}

/// Generates a fresh identity: the 32-byte Ed25519 seed and the peer id
/// derived from it.
pub fn generate_identity() -> ([u8; 32], PeerId) {
    let signing = SigningKey::generate(&mut rand::rngs::OsRng);
    let peer_id = PeerId::from_bytes(signing.verifying_key().to_bytes());
    (signing.to_bytes(), peer_id)
}

/// Derives the peer id (the verifying key) from an identity seed.
pub fn derive_peer_id(seed: &[u8; 32]) -> PeerId {
    let signing = SigningKey::from_bytes(seed);
    PeerId::from_bytes(signing.verifying_key().to_bytes())
}

/// X25519 public half of a peer's identity key: the verifying key mapped to
/// its Montgomery form. Fails with `CryptoFailure` if the id bytes are not
/// a valid public key.
pub fn identity_agreement_public(peer_id: &PeerId) -> Result<[u8; 32]> {
    let verifying = VerifyingKey::from_bytes(peer_id.as_bytes()).map_err(|e| {
        WireError::CryptoFailure(format!("peer id is not a valid public key: {}", e))
    })?;
    Ok(verifying.to_montgomery().to_bytes())
}

/// X25519 private half of an identity: the signing key's clamped scalar.
pub fn seed_agreement_secret(seed: &[u8; 32]) -> StaticSecret {
    let signing = SigningKey::from_bytes(seed);
    StaticSecret::from(signing.to_scalar_bytes())
}

/// X25519 ECDH. The raw 32-byte shared secret IS the cipher key: no KDF is
/// applied, which is sound here only because every key is one-shot. Each
/// message mixes in a fresh ephemeral pair.
pub fn x25519_agree(secret: &StaticSecret, public_bytes: &[u8; 32]) -> Zeroizing<[u8; 32]> {
    let public = PublicKey::from(*public_bytes);
    Zeroizing::new(secret.diffie_hellman(&public).to_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ephemeral_agreement_symmetric() {
        let a = EphemeralKeyPair::generate();
        let b = EphemeralKeyPair::generate();
        let shared_a = x25519_agree(a.secret(), &b.public_bytes());
        let shared_b = x25519_agree(b.secret(), &a.public_bytes());
        assert_eq!(*shared_a, *shared_b);
    }

    #[test]
    fn test_identity_agreement_matches_ephemeral_side() {
        // A request is encrypted to the recipient's identity key; the
        // recipient derives the same secret from its seed and the
        // ephemeral public key that arrived with the datagram.
        let (seed, peer_id) = generate_identity();
        let ephemeral = EphemeralKeyPair::generate();

        let sender_side = x25519_agree(
            ephemeral.secret(),
            &identity_agreement_public(&peer_id).unwrap(),
        );
        let recipient_side =
            x25519_agree(&seed_agreement_secret(&seed), &ephemeral.public_bytes());
        assert_eq!(*sender_side, *recipient_side);
    }

    #[test]
    fn test_derive_peer_id_deterministic() {
        let (seed, peer_id) = generate_identity();
        assert_eq!(derive_peer_id(&seed), peer_id);
    }

    #[test]
    fn test_invalid_identity_rejected() {
        // Roughly half of all 32-byte strings are not curve points; a sweep
        // of constant-byte ids is guaranteed to hit one.
        assert!((0u8..=255)
            .any(|b| identity_agreement_public(&PeerId::from_bytes([b; 32])).is_err()));
    }
}
