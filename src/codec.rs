//! Datagram encoding and two-phase decoding.
//!
//! Wire layout, big-endian throughout:
//!
//! | Offset | Size | Field |
//! |---|---|---|
//! | 0 | 4 | 2-bit protocol type, 30-bit version |
//! | 4 | 4 | message id |
//! | 8 | 36 | sender ⊕ recipient id pack (see [`PeerId`]) |
//! | 44 | 32 | sender ephemeral X25519 public key |
//! | 76 | 12 | ChaCha20 nonce |
//! | 88 | var | encrypted: inner sender address, type/options byte, command byte, payload |
//! | end-64 | 64 | Ed25519 signature over every byte before it |
//!
//! A minimal frame is [`HEADER_SIZE_MIN`] (156) bytes. The signature is
//! computed over the transmitted bytes (ciphertext, not plaintext), so a
//! man-in-the-middle cannot swap the ephemeral key or the id pack without
//! invalidating it.
//!
//! Decoding is split in two so a receiver can triage cheaply:
//! [`decode_header`] parses the fixed 44-byte prefix and resolves the local
//! recipient without any cryptographic work; [`decode_payload`] then does
//! the agreement, decryption and signature check on whichever worker the
//! datagram was routed to.

use std::net::SocketAddr;

use tracing::debug;
use x25519_dalek::StaticSecret;

use crate::address_book::PeerAddressManager;
use crate::crypto::{sign_datagram, verify_datagram, ChaCha20Stream};
use crate::keys::{identity_agreement_public, seed_agreement_secret, x25519_agree};
use crate::message::{Message, MessageHeader, MessageType, ProtocolType};
use crate::peer_address::PeerAddress;
use crate::types::{
    Result, WireError, ENCRYPTED_REGION_OFFSET, HEADER_SIZE_MIN, NONCE_SIZE, OVERLAP_PACK_SIZE,
    PLAIN_PREFIX_SIZE, PUBLIC_KEY_SIZE, SIGNATURE_SIZE,
};

const VERSION_MASK: u32 = 0x3FFF_FFFF;

/// Protocol type of a datagram, from its first word.
pub fn peek_protocol_type(version_and_type: u32) -> ProtocolType {
    ProtocolType::from_bits((version_and_type >> 30) as u8)
}

/// Protocol type of a datagram, from its first byte alone. The byte is
/// unsigned, so the shift cannot smear a sign bit into the result.
pub fn peek_protocol_type_byte(first_byte: u8) -> ProtocolType {
    ProtocolType::from_bits(first_byte >> 6)
}

/// Encodes `message` into `buf` as a single datagram. Returns the datagram
/// length.
///
/// `ephemeral_public_remote` selects the key-agreement input (the 0-RTT
/// rule): `None` marks a request, encrypted to the recipient's identity key
/// so no prior exchange is needed; `Some` marks a reply, bound to the
/// ephemeral key that arrived with the request. `encode_for_ipv4` names the
/// outer datagram family, whose socket is elided from the inner sender
/// address because the transport carries it anyway.
///
/// On error the buffer contents are unspecified; the caller discards them.
pub fn encode(
    buf: &mut [u8],
    message: &Message,
    lookup: &dyn PeerAddressManager,
    ephemeral_public_remote: Option<&[u8; PUBLIC_KEY_SIZE]>,
    encode_for_ipv4: bool,
) -> Result<usize> {
    if buf.len() < HEADER_SIZE_MIN {
        return Err(WireError::BufferTooSmall {
            needed: HEADER_SIZE_MIN,
            available: buf.len(),
        });
    }
    let sender = message
        .sender
        .as_ref()
        .ok_or(WireError::IncompleteMessage("sender"))?;
    let recipient = message
        .recipient
        .as_ref()
        .ok_or(WireError::IncompleteMessage("recipient"))?;
    let pair = message
        .ephemeral_key_pair
        .as_ref()
        .ok_or(WireError::IncompleteMessage("ephemeral key pair"))?;

    // Assemble the plaintext region. The peer id travels in the overlap
    // pack and the outer family's socket with the datagram itself, so the
    // inner address elides both.
    let payload_len = message.payload.as_ref().map_or(0, |p| p.len());
    let mut plain = Vec::with_capacity(
        PeerAddress::MAX_SIZE_NO_PEER_ID + 4 + 1 + 1 + payload_len + NONCE_SIZE,
    );
    let inner = sender.with_skip_peer_id(true);
    let inner = if encode_for_ipv4 {
        inner.with_ipv4_flag(false)
    } else {
        inner.with_ipv6_flag(false)
    };
    inner.encode(&mut plain);
    plain.push((message.msg_type as u8) << 4 | (message.options & 0x0F));
    plain.push(message.command);
    if let Some(payload) = &message.payload {
        plain.extend_from_slice(payload);
    }

    let total = ENCRYPTED_REGION_OFFSET + NONCE_SIZE + plain.len() + SIGNATURE_SIZE;
    if buf.len() < total {
        return Err(WireError::BufferTooSmall {
            needed: total,
            available: buf.len(),
        });
    }

    let version_and_type =
        (message.protocol_type as u32) << 30 | (message.version & VERSION_MASK);
    buf[0..4].copy_from_slice(&version_and_type.to_be_bytes());
    buf[4..8].copy_from_slice(&message.message_id.to_be_bytes());
    let packed = sender.peer_id().xor_overlapped_by_4(&recipient.peer_id());
    buf[8..PLAIN_PREFIX_SIZE].copy_from_slice(&packed);
    buf[PLAIN_PREFIX_SIZE..ENCRYPTED_REGION_OFFSET].copy_from_slice(&pair.public_bytes());

    let shared_key = match ephemeral_public_remote {
        Some(remote) => x25519_agree(pair.secret(), remote),
        None => x25519_agree(
            pair.secret(),
            &identity_agreement_public(&recipient.peer_id())?,
        ),
    };
    let sealed = ChaCha20Stream::new(&shared_key).encrypt(&plain);
    let signed_end = ENCRYPTED_REGION_OFFSET + sealed.len();
    buf[ENCRYPTED_REGION_OFFSET..signed_end].copy_from_slice(&sealed);

    let (_, seed) = lookup
        .peer_address_from_id(&sender.peer_id())
        .ok_or_else(|| WireError::UnknownSender(sender.peer_id().fingerprint()))?;
    let signature = sign_datagram(&seed, &buf[..signed_end]);
    buf[signed_end..total].copy_from_slice(&signature);

    debug!(
        message_id = message.message_id,
        bytes = total,
        reply = ephemeral_public_remote.is_some(),
        "encoded datagram"
    );
    Ok(total)
}

/// Parses the fixed 44-byte prefix of an inbound datagram and resolves the
/// local recipient. No cryptographic work happens here; the call is cheap
/// enough to run on the receive path before handing the datagram to a
/// worker.
pub fn decode_header(buf: &[u8], lookup: &dyn PeerAddressManager) -> Result<MessageHeader> {
    if buf.len() < HEADER_SIZE_MIN {
        return Err(WireError::BufferTooSmall {
            needed: HEADER_SIZE_MIN,
            available: buf.len(),
        });
    }

    let version_and_type = u32::from_be_bytes([buf[0], buf[1], buf[2], buf[3]]);
    let message_id = u32::from_be_bytes([buf[4], buf[5], buf[6], buf[7]]);

    let mut packed = [0u8; OVERLAP_PACK_SIZE];
    packed.copy_from_slice(&buf[8..PLAIN_PREFIX_SIZE]);
    let sender_short = u32::from_be_bytes([packed[0], packed[1], packed[2], packed[3]]);
    let recipient_short = u32::from_be_bytes([packed[32], packed[33], packed[34], packed[35]]);

    let (recipient, private_key) = lookup
        .peer_address_from_short_id(recipient_short)
        .ok_or(WireError::UnknownRecipient(recipient_short))?;
    let sender_id = recipient
        .peer_id()
        .de_xor_overlapped_by_4(&packed, sender_short);

    debug!(
        message_id,
        sender = %sender_id,
        "decoded header"
    );
    Ok(MessageHeader {
        version: version_and_type & VERSION_MASK,
        message_id,
        recipient,
        private_key,
        sender_id,
    })
}

/// Decrypts and parses the rest of a datagram into `message`, then checks
/// the trailing signature.
///
/// `ephemeral_private_local` mirrors the 0-RTT rule on the receive side:
/// present iff this peer issued the matching outbound request, absent for
/// inbound requests (which are decrypted with the recipient's identity
/// key from the header).
///
/// A bad signature is not an error: the fields are delivered anyway and
/// `message.done` is left `false` for the policy layer above to act on.
pub fn decode_payload(
    buf: &[u8],
    message: &mut Message,
    header: MessageHeader,
    ephemeral_private_local: Option<&StaticSecret>,
    local: SocketAddr,
    remote: SocketAddr,
) -> Result<()> {
    if buf.len() < HEADER_SIZE_MIN {
        return Err(WireError::BufferTooSmall {
            needed: HEADER_SIZE_MIN,
            available: buf.len(),
        });
    }

    message.recipient_socket = Some(local);
    message.sender_socket = Some(remote);
    message.version = header.version;
    message.message_id = header.message_id;
    message.recipient = Some(header.recipient);
    let sender_id = header.sender_id;

    let mut ephemeral_public = [0u8; PUBLIC_KEY_SIZE];
    ephemeral_public.copy_from_slice(&buf[PLAIN_PREFIX_SIZE..ENCRYPTED_REGION_OFFSET]);
    message.ephemeral_public_key = Some(ephemeral_public);

    let shared_key = match ephemeral_private_local {
        Some(secret) => x25519_agree(secret, &ephemeral_public),
        None => x25519_agree(&seed_agreement_secret(&header.private_key), &ephemeral_public),
    };

    let signed_end = buf.len() - SIGNATURE_SIZE;
    let plain = ChaCha20Stream::new(&shared_key).decrypt(&buf[ENCRYPTED_REGION_OFFSET..signed_end])?;

    let (inner, mut cursor) = PeerAddress::decode(&plain)?;
    let sender = inner
        .with_ip_socket(remote)
        .with_peer_id(sender_id)
        .with_skip_peer_id(false);
    message.sender = Some(sender);

    if plain.len() < cursor + 2 {
        return Err(WireError::MalformedMessage(format!(
            "plaintext truncated before control bytes: {} bytes",
            plain.len()
        )));
    }
    let type_and_options = plain[cursor];
    cursor += 1;
    message.msg_type = MessageType::try_from(type_and_options >> 4)?;
    message.options = type_and_options & 0x0F;
    message.command = plain[cursor];
    cursor += 1;
    message.payload = if cursor < plain.len() {
        Some(plain[cursor..].to_vec())
    } else {
        None
    };

    let mut signature = [0u8; SIGNATURE_SIZE];
    signature.copy_from_slice(&buf[signed_end..]);
    message.done = verify_datagram(&sender_id, &buf[..signed_end], &signature);

    debug!(
        message_id = message.message_id,
        sender = %sender_id,
        verified = message.done,
        "decoded payload"
    );
    Ok(())
}
