//! Message carrier types.
//!
//! `Message` is the mutable record the codec reads from on encode and
//! writes into on decode. `MessageHeader` is the cheap triage view produced
//! by the first decode phase and consumed by the second.

use std::net::SocketAddr;

use crate::keys::EphemeralKeyPair;
use crate::peer_address::PeerAddress;
use crate::peer_id::PeerId;
use crate::types::{WireError, PRIVATE_KEY_SIZE};

/// Transport framing selector, the two high bits of the first word.
///
/// Only `Udp` is processed by this codec. For the KCP variants the low 30
/// bits of the first word are a session id followed by a KCP header, and
/// the datagram is handed to the KCP framing layer instead; peek the type
/// with [`crate::peek_protocol_type_byte`] before decoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ProtocolType {
    #[default]
    Udp = 0,
    Kcp = 1,
    Kcp2 = 2,
    Kcp3 = 3,
}

impl ProtocolType {
    /// Decodes a two-bit value. Total over `0..=3`, so this cannot fail.
    pub fn from_bits(bits: u8) -> ProtocolType {
        match bits & 0b11 {
            0 => ProtocolType::Udp,
            1 => ProtocolType::Kcp,
            2 => ProtocolType::Kcp2,
            _ => ProtocolType::Kcp3,
        }
    }
}

/// Message type nibble.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MessageType {
    #[default]
    Request = 0,
    Ack = 1,
    Ok = 2,
    PartiallyOk = 3,
    NotFound = 4,
    Denied = 5,
    UnknownId = 6,
    Exception = 7,
    Cancel = 8,
}

impl TryFrom<u8> for MessageType {
    type Error = WireError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(MessageType::Request),
            1 => Ok(MessageType::Ack),
            2 => Ok(MessageType::Ok),
            3 => Ok(MessageType::PartiallyOk),
            4 => Ok(MessageType::NotFound),
            5 => Ok(MessageType::Denied),
            6 => Ok(MessageType::UnknownId),
            7 => Ok(MessageType::Exception),
            8 => Ok(MessageType::Cancel),
            other => Err(WireError::MalformedMessage(format!(
                "unassigned message type nibble {}",
                other
            ))),
        }
    }
}

/// A single DHT message, one per datagram.
///
/// Populated by the builder before encode, or by the two decode phases.
/// The codec owns no state; the message is the unit that travels through
/// the BUILDING → ENCODED → RECEIVED → VERIFIED/TAMPERED lifecycle.
#[derive(Debug, Default)]
pub struct Message {
    pub protocol_type: ProtocolType,
    /// 30-bit protocol version; the codec masks off anything higher.
    pub version: u32,
    pub message_id: u32,
    pub sender: Option<PeerAddress>,
    pub recipient: Option<PeerAddress>,
    pub msg_type: MessageType,
    /// 4-bit option nibble, packed next to the type on the wire.
    pub options: u8,
    pub command: u8,
    pub payload: Option<Vec<u8>>,
    /// Fresh pair for this message; populated at outbound construction.
    pub ephemeral_key_pair: Option<EphemeralKeyPair>,
    /// The ephemeral public key that arrived with an inbound datagram.
    pub ephemeral_public_key: Option<[u8; 32]>,
    /// Set by decode: did the trailing signature verify?
    pub done: bool,
    pub sender_socket: Option<SocketAddr>,
    pub recipient_socket: Option<SocketAddr>,
}

impl Message {
    /// A new outbound message with a fresh ephemeral key pair.
    pub fn outbound(
        sender: PeerAddress,
        recipient: PeerAddress,
        message_id: u32,
        version: u32,
        msg_type: MessageType,
        command: u8,
    ) -> Self {
        Message {
            protocol_type: ProtocolType::Udp,
            version,
            message_id,
            sender: Some(sender),
            recipient: Some(recipient),
            msg_type,
            options: 0,
            command,
            payload: None,
            ephemeral_key_pair: Some(EphemeralKeyPair::generate()),
            ephemeral_public_key: None,
            done: false,
            sender_socket: None,
            recipient_socket: None,
        }
    }

    /// An empty carrier for `decode_payload` to fill.
    pub fn inbound() -> Self {
        Message::default()
    }

    pub fn with_payload(mut self, payload: Vec<u8>) -> Self {
        self.payload = Some(payload);
        self
    }

    pub fn with_options(mut self, options: u8) -> Self {
        self.options = options & 0x0F;
        self
    }
}

/// Triage view of an inbound datagram: everything a receiver learns before
/// any cryptographic work. Produced by `decode_header`, consumed by value
/// by `decode_payload`, then gone.
pub struct MessageHeader {
    pub version: u32,
    pub message_id: u32,
    /// The local identity this datagram is addressed to.
    pub recipient: PeerAddress,
    /// The recipient's identity seed, straight from the lookup.
    pub private_key: [u8; PRIVATE_KEY_SIZE],
    /// Full sender id recovered from the overlap pack.
    pub sender_id: PeerId,
}

impl std::fmt::Debug for MessageHeader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MessageHeader")
            .field("version", &self.version)
            .field("message_id", &self.message_id)
            .field("recipient", &self.recipient.peer_id())
            .field("sender_id", &self.sender_id)
            .finish_non_exhaustive()
    }
}
