//! Symmetric encryption and datagram signatures.
//!
//! The cipher suite is fixed: X25519 agreement, raw ChaCha20 for
//! confidentiality, Ed25519 for authenticity. There is no AEAD tag; the
//! trailing signature over the whole datagram authenticates the ciphertext,
//! so a stream cipher is all the encrypted region needs.

use chacha20::cipher::{KeyIvInit, StreamCipher};
use chacha20::{ChaCha20, Key, Nonce};
use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};
use zeroize::Zeroizing;

use crate::peer_id::PeerId;
use crate::types::{Result, WireError, NONCE_SIZE, SIGNATURE_SIZE};

/// One-shot ChaCha20 stream over a 32-byte shared secret.
///
/// The wire form is `nonce (12 bytes) || ciphertext`. The nonce is all
/// zeros: every message derives a fresh key from a fresh ephemeral pair, so
/// the (key, nonce) pair can never repeat. Reusing a key across messages is
/// forbidden.
pub struct ChaCha20Stream {
    key: Zeroizing<[u8; 32]>,
}

impl ChaCha20Stream {
    pub fn new(key: &[u8; 32]) -> Self {
        ChaCha20Stream {
            key: Zeroizing::new(*key),
        }
    }

    /// Encrypts `plaintext`, producing `nonce || ciphertext`
    /// (`plaintext.len() + 12` bytes).
    pub fn encrypt(&self, plaintext: &[u8]) -> Vec<u8> {
        let nonce = [0u8; NONCE_SIZE];
        let mut out = Vec::with_capacity(NONCE_SIZE + plaintext.len());
        out.extend_from_slice(&nonce);
        out.extend_from_slice(plaintext);
        let mut cipher = ChaCha20::new(Key::from_slice(&*self.key), Nonce::from_slice(&nonce));
        cipher.apply_keystream(&mut out[NONCE_SIZE..]);
        out
    }

    /// Decrypts `nonce || ciphertext`, returning the plaintext
    /// (`data.len() - 12` bytes).
    pub fn decrypt(&self, data: &[u8]) -> Result<Vec<u8>> {
        if data.len() < NONCE_SIZE {
            return Err(WireError::CryptoFailure(format!(
                "encrypted region too short for nonce: {} bytes",
                data.len()
            )));
        }
        let mut nonce = [0u8; NONCE_SIZE];
        nonce.copy_from_slice(&data[..NONCE_SIZE]);
        let mut plain = data[NONCE_SIZE..].to_vec();
        let mut cipher = ChaCha20::new(Key::from_slice(&*self.key), Nonce::from_slice(&nonce));
        cipher.apply_keystream(&mut plain);
        Ok(plain)
    }
}

/// Signs a datagram region with the sender's identity seed.
pub fn sign_datagram(seed: &[u8; 32], region: &[u8]) -> [u8; SIGNATURE_SIZE] {
    let signing = SigningKey::from_bytes(seed);
    signing.sign(region).to_bytes()
}

/// Verifies a datagram signature against the sender's peer id.
///
/// Returns `false` for a bad signature AND for id bytes that are not a
/// valid verifying key: both mean "not provably from that sender", and the
/// caller records the boolean rather than erroring out.
pub fn verify_datagram(signer: &PeerId, region: &[u8], signature: &[u8; SIGNATURE_SIZE]) -> bool {
    let verifying = match VerifyingKey::from_bytes(signer.as_bytes()) {
        Ok(v) => v,
        Err(_) => return false,
    };
    let sig = Signature::from_bytes(signature);
    verifying.verify(region, &sig).is_ok()
}
