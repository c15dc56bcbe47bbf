//! Peer addresses and their compact wire encoding.
//!
//! A `PeerAddress` bundles a peer id with up to two IP endpoints and a few
//! feature flags. On the wire, two parts are suppressible: the 32-byte peer
//! id (when the id travels elsewhere, as in the datagram header's overlap
//! pack) and one of the two IP families (when the IP arrives with the
//! transport datagram itself). The 2-byte flag word makes the encoding
//! self-describing.

use std::net::{SocketAddr, SocketAddrV4, SocketAddrV6};

use crate::peer_id::PeerId;
use crate::types::{Result, WireError};

const FLAG_IPV4: u16 = 1 << 15;
const FLAG_IPV6: u16 = 1 << 14;
const FLAG_SKIP_PEER_ID: u16 = 1 << 13;
const FLAG_FIREWALLED: u16 = 1 << 12;
const FLAG_RELAYED: u16 = 1 << 11;
const RESERVED_MASK: u16 = (1 << 11) - 1;

const IPV4_SOCKET_SIZE: usize = 4 + 2;
const IPV6_SOCKET_SIZE: usize = 16 + 2;

/// An IP endpoint + peer id + feature flags. A value type, copied freely.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PeerAddress {
    peer_id: PeerId,
    ipv4: Option<SocketAddrV4>,
    ipv6: Option<SocketAddrV6>,
    skip_peer_id: bool,
    firewalled: bool,
    relayed: bool,
}

impl PeerAddress {
    /// Largest possible encoding: flags, both sockets, peer id.
    pub const MAX_SIZE: usize = 2 + IPV4_SOCKET_SIZE + IPV6_SOCKET_SIZE + PeerId::SIZE;

    /// Largest possible encoding with the peer id suppressed. Used to size
    /// the plaintext scratch buffer on encode.
    pub const MAX_SIZE_NO_PEER_ID: usize = 2 + IPV4_SOCKET_SIZE + IPV6_SOCKET_SIZE;

    pub fn new(peer_id: PeerId) -> Self {
        PeerAddress {
            peer_id,
            ipv4: None,
            ipv6: None,
            skip_peer_id: false,
            firewalled: false,
            relayed: false,
        }
    }

    pub fn peer_id(&self) -> PeerId {
        self.peer_id
    }

    pub fn ipv4(&self) -> Option<SocketAddrV4> {
        self.ipv4
    }

    pub fn ipv6(&self) -> Option<SocketAddrV6> {
        self.ipv6
    }

    pub fn is_skip_peer_id(&self) -> bool {
        self.skip_peer_id
    }

    pub fn is_firewalled(&self) -> bool {
        self.firewalled
    }

    pub fn is_relayed(&self) -> bool {
        self.relayed
    }

    /// Copy with the peer id replaced.
    pub fn with_peer_id(mut self, peer_id: PeerId) -> Self {
        self.peer_id = peer_id;
        self
    }

    /// Copy with the skip-peer-id flag set or cleared.
    pub fn with_skip_peer_id(mut self, skip: bool) -> Self {
        self.skip_peer_id = skip;
        self
    }

    /// Copy with the socket of the matching family attached.
    pub fn with_ip_socket(mut self, socket: SocketAddr) -> Self {
        match socket {
            SocketAddr::V4(v4) => self.ipv4 = Some(v4),
            SocketAddr::V6(v6) => self.ipv6 = Some(v6),
        }
        self
    }

    /// Copy with the IPv4 part kept (`true`, a no-op) or elided (`false`).
    pub fn with_ipv4_flag(mut self, keep: bool) -> Self {
        if !keep {
            self.ipv4 = None;
        }
        self
    }

    /// Copy with the IPv6 part kept (`true`, a no-op) or elided (`false`).
    pub fn with_ipv6_flag(mut self, keep: bool) -> Self {
        if !keep {
            self.ipv6 = None;
        }
        self
    }

    pub fn with_firewalled(mut self, firewalled: bool) -> Self {
        self.firewalled = firewalled;
        self
    }

    pub fn with_relayed(mut self, relayed: bool) -> Self {
        self.relayed = relayed;
        self
    }

    fn flags(&self) -> u16 {
        let mut flags = 0u16;
        if self.ipv4.is_some() {
            flags |= FLAG_IPV4;
        }
        if self.ipv6.is_some() {
            flags |= FLAG_IPV6;
        }
        if self.skip_peer_id {
            flags |= FLAG_SKIP_PEER_ID;
        }
        if self.firewalled {
            flags |= FLAG_FIREWALLED;
        }
        if self.relayed {
            flags |= FLAG_RELAYED;
        }
        flags
    }

    /// Number of bytes `encode` will produce.
    pub fn encoded_size(&self) -> usize {
        let mut size = 2;
        if self.ipv4.is_some() {
            size += IPV4_SOCKET_SIZE;
        }
        if self.ipv6.is_some() {
            size += IPV6_SOCKET_SIZE;
        }
        if !self.skip_peer_id {
            size += PeerId::SIZE;
        }
        size
    }

    /// Appends the wire form to `out`.
    ///
    /// Format (big-endian): flags u16, then IPv4 addr + port if the ipv4
    /// bit is set, then IPv6 addr + port if the ipv6 bit is set, then the
    /// 32-byte peer id unless the skip bit is set.
    pub fn encode(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.flags().to_be_bytes());
        if let Some(v4) = self.ipv4 {
            out.extend_from_slice(&v4.ip().octets());
            out.extend_from_slice(&v4.port().to_be_bytes());
        }
        if let Some(v6) = self.ipv6 {
            out.extend_from_slice(&v6.ip().octets());
            out.extend_from_slice(&v6.port().to_be_bytes());
        }
        if !self.skip_peer_id {
            out.extend_from_slice(self.peer_id.as_bytes());
        }
    }

    /// Decodes one peer address from the front of `input`. Returns the
    /// address and the number of bytes consumed.
    ///
    /// When the skip-peer-id bit is set the returned address carries an
    /// all-zero placeholder id; the caller attaches the real id recovered
    /// from the datagram header.
    pub fn decode(input: &[u8]) -> Result<(PeerAddress, usize)> {
        if input.len() < 2 {
            return Err(WireError::MalformedPeerAddress(format!(
                "truncated flags: {} bytes",
                input.len()
            )));
        }
        let flags = u16::from_be_bytes([input[0], input[1]]);
        if flags & RESERVED_MASK != 0 {
            return Err(WireError::MalformedPeerAddress(format!(
                "reserved flag bits set: {:#06x}",
                flags
            )));
        }
        let mut cursor = 2;

        let ipv4 = if flags & FLAG_IPV4 != 0 {
            let rest = input
                .get(cursor..cursor + IPV4_SOCKET_SIZE)
                .ok_or_else(|| WireError::MalformedPeerAddress("truncated IPv4 socket".into()))?;
            let ip = std::net::Ipv4Addr::new(rest[0], rest[1], rest[2], rest[3]);
            let port = u16::from_be_bytes([rest[4], rest[5]]);
            cursor += IPV4_SOCKET_SIZE;
            Some(SocketAddrV4::new(ip, port))
        } else {
            None
        };

        let ipv6 = if flags & FLAG_IPV6 != 0 {
            let rest = input
                .get(cursor..cursor + IPV6_SOCKET_SIZE)
                .ok_or_else(|| WireError::MalformedPeerAddress("truncated IPv6 socket".into()))?;
            let mut octets = [0u8; 16];
            octets.copy_from_slice(&rest[..16]);
            let port = u16::from_be_bytes([rest[16], rest[17]]);
            cursor += IPV6_SOCKET_SIZE;
            Some(SocketAddrV6::new(octets.into(), port, 0, 0))
        } else {
            None
        };

        let skip_peer_id = flags & FLAG_SKIP_PEER_ID != 0;
        let peer_id = if skip_peer_id {
            PeerId::from_bytes([0u8; 32])
        } else {
            let rest = input
                .get(cursor..cursor + PeerId::SIZE)
                .ok_or_else(|| WireError::MalformedPeerAddress("truncated peer id".into()))?;
            let mut bytes = [0u8; 32];
            bytes.copy_from_slice(rest);
            cursor += PeerId::SIZE;
            PeerId::from_bytes(bytes)
        };

        let address = PeerAddress {
            peer_id,
            ipv4,
            ipv6,
            skip_peer_id,
            firewalled: flags & FLAG_FIREWALLED != 0,
            relayed: flags & FLAG_RELAYED != 0,
        };
        Ok((address, cursor))
    }
}
