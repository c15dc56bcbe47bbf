//! Peer address lookup: the contract the codec consumes, plus an in-memory
//! implementation.
//!
//! The codec resolves peers twice: by full id on encode (to fetch the
//! sender's signing seed) and by short id on decode (to find which local
//! identity a datagram is addressed to). Lookups are read-mostly and must
//! be safe for concurrent readers; the codec never mutates the book.

use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};

use crate::peer_address::PeerAddress;
use crate::peer_id::PeerId;
use crate::types::PRIVATE_KEY_SIZE;

/// Resolves peer identities to addresses and private key seeds.
///
/// A `None` from either method maps to `UnknownRecipient` /
/// `UnknownSender` at the codec call sites.
pub trait PeerAddressManager: Send + Sync {
    /// Full address and identity seed for a local peer known by the short
    /// id found at offset 32 of a datagram's overlap pack.
    fn peer_address_from_short_id(
        &self,
        short_id: u32,
    ) -> Option<(PeerAddress, [u8; PRIVATE_KEY_SIZE])>;

    /// Full address and identity seed for a peer known by its complete id.
    fn peer_address_from_id(
        &self,
        peer_id: &PeerId,
    ) -> Option<(PeerAddress, [u8; PRIVATE_KEY_SIZE])>;
}

struct Inner {
    by_id: HashMap<PeerId, (PeerAddress, [u8; PRIVATE_KEY_SIZE])>,
    by_short_id: HashMap<u32, PeerId>,
}

/// Hash-map address book behind a read-write lock.
pub struct InMemoryAddressBook {
    inner: RwLock<Inner>,
}

impl InMemoryAddressBook {
    pub fn new() -> Self {
        InMemoryAddressBook {
            inner: RwLock::new(Inner {
                by_id: HashMap::new(),
                by_short_id: HashMap::new(),
            }),
        }
    }

    /// Registers a peer under both its full id and its short id.
    pub fn register(&self, address: PeerAddress, private_key: [u8; PRIVATE_KEY_SIZE]) {
        let peer_id = address.peer_id();
        let mut inner = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        inner.by_short_id.insert(peer_id.short_id(), peer_id);
        inner.by_id.insert(peer_id, (address, private_key));
    }

    /// Removes a peer. Returns whether it was present.
    pub fn remove(&self, peer_id: &PeerId) -> bool {
        let mut inner = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        inner.by_short_id.remove(&peer_id.short_id());
        inner.by_id.remove(peer_id).is_some()
    }

    pub fn len(&self) -> usize {
        let inner = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        inner.by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for InMemoryAddressBook {
    fn default() -> Self {
        InMemoryAddressBook::new()
    }
}

impl PeerAddressManager for InMemoryAddressBook {
    fn peer_address_from_short_id(
        &self,
        short_id: u32,
    ) -> Option<(PeerAddress, [u8; PRIVATE_KEY_SIZE])> {
        let inner = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        let peer_id = inner.by_short_id.get(&short_id)?;
        inner.by_id.get(peer_id).copied()
    }

    fn peer_address_from_id(
        &self,
        peer_id: &PeerId,
    ) -> Option<(PeerAddress, [u8; PRIVATE_KEY_SIZE])> {
        let inner = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        inner.by_id.get(peer_id).copied()
    }
}
