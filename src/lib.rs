//! dhtwire - encrypted, authenticated datagram codec for a peer-to-peer DHT
//!
//! One message is one datagram. The frame interleaves plaintext identity
//! hints (for cheap demultiplexing), a per-message X25519 agreement feeding
//! a raw ChaCha20 stream, and a trailing Ed25519 signature over the entire
//! transmitted frame. Requests are 0-RTT: they encrypt to the recipient's
//! identity key; replies bind to the ephemeral key that arrived with the
//! request.

mod address_book;
mod codec;
mod crypto;
mod keys;
mod message;
mod peer_address;
mod peer_id;
mod send;
mod types;

pub use address_book::*;
pub use codec::*;
pub use crypto::*;
pub use keys::*;
pub use message::*;
pub use peer_address::*;
pub use peer_id::*;
pub use send::*;
pub use types::*;
