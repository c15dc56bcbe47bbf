//! 256-bit peer identifiers and the XOR-overlap pack.
//!
//! A `PeerId` is the peer's 32-byte public identity key. Two ids travel in
//! every datagram header as a 36-byte pack in which the middle 28 bytes of
//! both ids overlap via XOR; the leading 4 bytes of the sender id and the
//! trailing 4 bytes of the recipient id stay in clear as demultiplexing
//! hints. The full ids are reconstructed before the signature check, so the
//! overlap costs no authenticity.

use sha2::{Digest, Sha256};

use crate::types::OVERLAP_PACK_SIZE;

/// 32-byte peer identifier. Equal to the peer's public identity key.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct PeerId([u8; 32]);

impl PeerId {
    pub const SIZE: usize = 32;

    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        PeerId(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    pub fn to_bytes(&self) -> [u8; 32] {
        self.0
    }

    /// The short id this peer is known by when it is the recipient of a
    /// datagram: the trailing 4 bytes, big-endian. This is the value that
    /// survives in clear at offset 32 of the overlap pack, and the key an
    /// address book indexes local identities under.
    pub fn short_id(&self) -> u32 {
        u32::from_be_bytes([self.0[28], self.0[29], self.0[30], self.0[31]])
    }

    /// Packs `self` (the sender) and `recipient` into 36 bytes.
    ///
    /// Bytes 0..32 start as the sender id; the recipient id is then XORed
    /// onto bytes 4..36. Offsets 0..4 end up as the plain sender head,
    /// offsets 32..36 as the plain recipient tail, and everything between is
    /// the 28-byte overlap.
    pub fn xor_overlapped_by_4(&self, recipient: &PeerId) -> [u8; OVERLAP_PACK_SIZE] {
        let mut packed = [0u8; OVERLAP_PACK_SIZE];
        packed[..32].copy_from_slice(&self.0);
        for i in 0..32 {
            packed[i + 4] ^= recipient.0[i];
        }
        packed
    }

    /// Recovers the sender id from a pack, with `self` as the recipient.
    ///
    /// XORing the recipient's own bytes back out cancels the overlap:
    /// `sender[i] = packed[i] ^ recipient[i - 4]` for `i >= 4`. The first
    /// four bytes come from `sender_short`, which the caller already
    /// extracted from the pack to key its inbound demux table.
    pub fn de_xor_overlapped_by_4(
        &self,
        packed: &[u8; OVERLAP_PACK_SIZE],
        sender_short: u32,
    ) -> PeerId {
        let mut sender = [0u8; 32];
        sender[..4].copy_from_slice(&sender_short.to_be_bytes());
        for i in 4..32 {
            sender[i] = packed[i] ^ self.0[i - 4];
        }
        PeerId(sender)
    }

    /// Human-readable fingerprint: truncated SHA-256, formatted for easy
    /// comparison, e.g. `"A7B3 C9D1 E5F2 8A4B"`. Used anywhere a peer shows
    /// up in logs; raw id bytes are never logged.
    pub fn fingerprint(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.0);
        let hash = hasher.finalize();

        hash.iter()
            .take(8)
            .map(|b| format!("{:02X}", b))
            .collect::<Vec<_>>()
            .chunks(2)
            .map(|chunk| chunk.join(""))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

impl From<[u8; 32]> for PeerId {
    fn from(bytes: [u8; 32]) -> Self {
        PeerId(bytes)
    }
}

impl AsRef<[u8]> for PeerId {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl std::fmt::Debug for PeerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "PeerId({})", self.fingerprint())
    }
}

impl std::fmt::Display for PeerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.fingerprint())
    }
}
