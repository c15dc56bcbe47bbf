//! Protocol constants and error types for the dhtwire codec.

use thiserror::Error;

/// Minimum size of an encoded datagram in bytes.
///
/// A minimal frame carries the 4-byte version word, the 4-byte message id,
/// the 36-byte overlapped id pack, the 32-byte ephemeral key, the 12-byte
/// cipher nonce, a 2-byte inner peer address, the type/options and command
/// bytes, and the trailing 64-byte signature.
pub const HEADER_SIZE_MIN: usize = 156;

/// Size of the XOR-overlapped sender/recipient id pack.
pub const OVERLAP_PACK_SIZE: usize = 36;

/// Size of a public key (X25519 or Ed25519) in bytes.
pub const PUBLIC_KEY_SIZE: usize = 32;

/// Size of a private key seed in bytes.
pub const PRIVATE_KEY_SIZE: usize = 32;

/// Size of the ChaCha20 nonce carried at the front of the encrypted region.
pub const NONCE_SIZE: usize = 12;

/// Size of the trailing Ed25519 signature.
pub const SIGNATURE_SIZE: usize = 64;

/// Size of the plaintext datagram prefix: version word, message id, id pack.
pub const PLAIN_PREFIX_SIZE: usize = 44;

/// Offset of the encrypted region within a datagram.
pub const ENCRYPTED_REGION_OFFSET: usize = PLAIN_PREFIX_SIZE + PUBLIC_KEY_SIZE;

/// Errors surfaced by the codec and the send surface.
///
/// A failed signature check is intentionally NOT an error: it is surfaced as
/// `Message::done == false` so the decoded fields still reach the policy
/// layer above.
#[derive(Error, Debug)]
pub enum WireError {
    /// Buffer cannot hold (or does not contain) a whole datagram.
    #[error("buffer too small: need {needed} bytes, have {available}")]
    BufferTooSmall { needed: usize, available: usize },

    /// No local peer is registered under the recipient short id.
    #[error("no peer registered for short id {0:#010x}")]
    UnknownRecipient(u32),

    /// The sender's private key could not be resolved for signing.
    #[error("no private key for sender {0}")]
    UnknownSender(String),

    /// A cryptographic primitive failed.
    #[error("crypto failure: {0}")]
    CryptoFailure(String),

    /// The inner peer address could not be decoded.
    #[error("malformed peer address: {0}")]
    MalformedPeerAddress(String),

    /// The decrypted control bytes could not be decoded.
    #[error("malformed message: {0}")]
    MalformedMessage(String),

    /// An encode precondition was not met.
    #[error("incomplete message: missing {0}")]
    IncompleteMessage(&'static str),

    /// The peer is shutting down; no new sends are accepted.
    #[error("peer is shutting down")]
    PeerShutdown,

    /// The outbound queue is at capacity.
    #[error("outbound queue is full")]
    QueueFull,
}

pub type Result<T> = std::result::Result<T, WireError>;
