//! End-to-end wire format tests: encode on one side, decode on the other,
//! against live key pairs.

use std::net::SocketAddr;

use dhtwire::{
    decode_header, decode_payload, encode, generate_identity, seed_agreement_secret,
    ChaCha20Stream, EphemeralKeyPair, InMemoryAddressBook, Message, MessageType, PeerAddress,
    WireError, x25519_agree, HEADER_SIZE_MIN, SIGNATURE_SIZE,
};

struct Peer {
    seed: [u8; 32],
    address: PeerAddress,
}

fn peer(socket: &str) -> Peer {
    let (seed, peer_id) = generate_identity();
    let address = PeerAddress::new(peer_id).with_ip_socket(socket.parse().unwrap());
    Peer { seed, address }
}

fn book_for(peers: &[&Peer]) -> InMemoryAddressBook {
    let book = InMemoryAddressBook::new();
    for p in peers {
        book.register(p.address, p.seed);
    }
    book
}

fn sock(s: &str) -> SocketAddr {
    s.parse().unwrap()
}

/// Encode a request from `sender` to `recipient` and decode it on the
/// recipient's side. Returns the datagram and the decoded message.
fn roundtrip_request(
    sender: &Peer,
    recipient: &Peer,
    payload: Option<Vec<u8>>,
    tamper: impl FnOnce(&mut Vec<u8>),
) -> (Vec<u8>, Message) {
    let sender_book = book_for(&[sender, recipient]);
    let recipient_book = book_for(&[recipient]);

    let mut message = Message::outbound(
        sender.address,
        recipient.address,
        0x0A0B_0C0D,
        1,
        MessageType::Request,
        0x7F,
    );
    message.payload = payload;

    let mut buf = vec![0u8; 4096];
    let n = encode(&mut buf, &message, &sender_book, None, true).unwrap();
    buf.truncate(n);
    tamper(&mut buf);

    let header = decode_header(&buf, &recipient_book).unwrap();
    let mut decoded = Message::inbound();
    decode_payload(
        &buf,
        &mut decoded,
        header,
        None,
        sock("127.0.0.1:8888"),
        sock("127.0.0.1:9999"),
    )
    .unwrap();
    (buf, decoded)
}

#[test]
fn minimal_request_roundtrip() {
    let alice = peer("127.0.0.1:9999");
    let bob = peer("127.0.0.1:8888");

    let (datagram, decoded) = roundtrip_request(&alice, &bob, None, |_| {});

    assert_eq!(datagram.len(), HEADER_SIZE_MIN);
    assert!(decoded.done);
    assert_eq!(decoded.version, 1);
    assert_eq!(decoded.message_id, 0x0A0B_0C0D);
    assert_eq!(decoded.msg_type, MessageType::Request);
    assert_eq!(decoded.options, 0);
    assert_eq!(decoded.command, 0x7F);
    assert_eq!(decoded.payload, None);
    assert_eq!(decoded.recipient, Some(bob.address));
    assert_eq!(decoded.sender, Some(alice.address));
    assert_eq!(decoded.sender_socket, Some(sock("127.0.0.1:9999")));
    assert_eq!(decoded.recipient_socket, Some(sock("127.0.0.1:8888")));
}

#[test]
fn header_triage_fields() {
    let alice = peer("127.0.0.1:9999");
    let bob = peer("127.0.0.1:8888");
    let sender_book = book_for(&[&alice, &bob]);
    let recipient_book = book_for(&[&bob]);

    let message = Message::outbound(
        alice.address,
        bob.address,
        77,
        0x1234_5678 & 0x3FFF_FFFF,
        MessageType::Request,
        2,
    );
    let mut buf = vec![0u8; 1024];
    let n = encode(&mut buf, &message, &sender_book, None, true).unwrap();
    buf.truncate(n);

    let header = decode_header(&buf, &recipient_book).unwrap();
    assert_eq!(header.message_id, 77);
    assert_eq!(header.version, 0x1234_5678 & 0x3FFF_FFFF);
    assert_eq!(header.sender_id, alice.address.peer_id());
    assert_eq!(header.recipient, bob.address);
    assert_eq!(header.private_key, bob.seed);
}

#[test]
fn tampered_signature_leaves_fields_parsed() {
    let alice = peer("127.0.0.1:9999");
    let bob = peer("127.0.0.1:8888");

    // Byte 100 of a minimal frame sits inside the trailing signature.
    let (_, decoded) = roundtrip_request(&alice, &bob, None, |buf| buf[100] ^= 0x01);

    assert!(!decoded.done);
    assert_eq!(decoded.message_id, 0x0A0B_0C0D);
    assert_eq!(decoded.command, 0x7F);
    assert_eq!(decoded.sender, Some(alice.address));
}

#[test]
fn tampered_message_id_fails_verification() {
    let alice = peer("127.0.0.1:9999");
    let bob = peer("127.0.0.1:8888");

    let (_, decoded) = roundtrip_request(&alice, &bob, None, |buf| buf[5] ^= 0x80);
    assert!(!decoded.done);
}

#[test]
fn tampered_payload_ciphertext_fails_verification() {
    let alice = peer("127.0.0.1:9999");
    let bob = peer("127.0.0.1:8888");

    let payload = vec![0x55u8; 100];
    let (_, decoded) = roundtrip_request(&alice, &bob, Some(payload.clone()), |buf| {
        buf[100] ^= 0x01
    });

    assert!(!decoded.done);
    // The payload parses but no longer matches what was sent.
    let garbled = decoded.payload.unwrap();
    assert_eq!(garbled.len(), payload.len());
    assert_ne!(garbled, payload);
}

#[test]
fn oversized_payload_roundtrip() {
    let alice = peer("127.0.0.1:9999");
    let bob = peer("127.0.0.1:8888");

    let payload = vec![0xAAu8; 1024];
    let (datagram, decoded) = roundtrip_request(&alice, &bob, Some(payload.clone()), |_| {});

    assert_eq!(datagram.len(), HEADER_SIZE_MIN + 1024);
    assert!(decoded.done);
    assert_eq!(decoded.payload, Some(payload));
}

#[test]
fn ipv6_sender_keeps_inner_socket() {
    let alice = peer("[::1]:9999");
    let bob = peer("127.0.0.1:8888");
    let sender_book = book_for(&[&alice, &bob]);
    let recipient_book = book_for(&[&bob]);

    let message = Message::outbound(
        alice.address,
        bob.address,
        5,
        1,
        MessageType::Request,
        0,
    );
    let mut buf = vec![0u8; 1024];
    let n = encode(&mut buf, &message, &sender_book, None, true).unwrap();
    buf.truncate(n);

    // The IPv6 socket cannot ride the outer datagram, so it costs 18 inner
    // bytes: 16-byte address + 2-byte port.
    assert_eq!(n, HEADER_SIZE_MIN + 18);
    assert!(n >= 168);

    // Pin the inner flag word: ipv4 cleared, ipv6 set, peer id skipped.
    let ephemeral_public = message.ephemeral_key_pair.as_ref().unwrap().public_bytes();
    let shared = x25519_agree(&seed_agreement_secret(&bob.seed), &ephemeral_public);
    let plain = ChaCha20Stream::new(&shared)
        .decrypt(&buf[76..n - SIGNATURE_SIZE])
        .unwrap();
    assert_eq!(&plain[..2], &[0x60, 0x00]);

    let header = decode_header(&buf, &recipient_book).unwrap();
    let mut decoded = Message::inbound();
    decode_payload(
        &buf,
        &mut decoded,
        header,
        None,
        sock("[::2]:8888"),
        sock("[::1]:9999"),
    )
    .unwrap();

    assert!(decoded.done);
    let sender = decoded.sender.unwrap();
    assert_eq!(sender.ipv6(), alice.address.ipv6());
    assert_eq!(sender.peer_id(), alice.address.peer_id());
}

#[test]
fn dual_homed_sender_elides_one_family() {
    let (seed, peer_id) = generate_identity();
    let address = PeerAddress::new(peer_id)
        .with_ip_socket("10.1.2.3:7000".parse().unwrap())
        .with_ip_socket("[2001:db8::7]:7001".parse().unwrap());
    let alice = Peer { seed, address };
    let bob = peer("127.0.0.1:8888");
    let sender_book = book_for(&[&alice, &bob]);
    let recipient_book = book_for(&[&bob]);

    // Sent over IPv6: the IPv6 socket is elided, the IPv4 one rides inside.
    let message = Message::outbound(
        alice.address,
        bob.address,
        6,
        1,
        MessageType::Request,
        0,
    );
    let mut buf = vec![0u8; 1024];
    let n = encode(&mut buf, &message, &sender_book, None, false).unwrap();
    buf.truncate(n);
    assert_eq!(n, HEADER_SIZE_MIN + 6);

    let header = decode_header(&buf, &recipient_book).unwrap();
    let mut decoded = Message::inbound();
    decode_payload(
        &buf,
        &mut decoded,
        header,
        None,
        sock("[2001:db8::8]:8888"),
        sock("[2001:db8::7]:7001"),
    )
    .unwrap();

    // Both families are back: IPv4 from the frame, IPv6 from the socket.
    assert!(decoded.done);
    assert_eq!(decoded.sender, Some(alice.address));
}

#[test]
fn reply_binds_to_request_ephemeral() {
    let alice = peer("127.0.0.1:9999");
    let bob = peer("127.0.0.1:8888");
    let alice_book = book_for(&[&alice]);
    let bob_book = book_for(&[&alice, &bob]);

    // Alice's request ephemeral pair, as it would exist after she sent a
    // request: Bob holds the public half, Alice the private half.
    let request_ephemeral = EphemeralKeyPair::generate();

    let mut reply = Message::outbound(
        bob.address,
        alice.address,
        9,
        1,
        MessageType::Ok,
        0x7F,
    );
    reply.payload = Some(b"reply data".to_vec());

    let mut buf = vec![0u8; 1024];
    let n = encode(
        &mut buf,
        &reply,
        &bob_book,
        Some(&request_ephemeral.public_bytes()),
        true,
    )
    .unwrap();
    buf.truncate(n);

    let header = decode_header(&buf, &alice_book).unwrap();
    let mut decoded = Message::inbound();
    decode_payload(
        &buf,
        &mut decoded,
        header,
        Some(request_ephemeral.secret()),
        sock("127.0.0.1:9999"),
        sock("127.0.0.1:8888"),
    )
    .unwrap();

    assert!(decoded.done);
    assert_eq!(decoded.msg_type, MessageType::Ok);
    assert_eq!(decoded.payload, Some(b"reply data".to_vec()));
    assert_eq!(decoded.sender, Some(bob.address));
}

#[test]
fn reply_with_wrong_ephemeral_never_verifies() {
    let alice = peer("127.0.0.1:9999");
    let bob = peer("127.0.0.1:8888");
    let alice_book = book_for(&[&alice]);
    let bob_book = book_for(&[&alice, &bob]);

    let request_ephemeral = EphemeralKeyPair::generate();
    let unrelated = EphemeralKeyPair::generate();

    let reply = Message::outbound(bob.address, alice.address, 10, 1, MessageType::Ok, 0);
    let mut buf = vec![0u8; 1024];
    let n = encode(
        &mut buf,
        &reply,
        &bob_book,
        Some(&request_ephemeral.public_bytes()),
        true,
    )
    .unwrap();
    buf.truncate(n);

    let header = decode_header(&buf, &alice_book).unwrap();
    let mut decoded = Message::inbound();
    let result = decode_payload(
        &buf,
        &mut decoded,
        header,
        Some(unrelated.secret()),
        sock("127.0.0.1:9999"),
        sock("127.0.0.1:8888"),
    );

    // The wrong key yields keystream garbage: either the inner structure no
    // longer parses, or it happens to parse and the signature check fails.
    match result {
        Ok(()) => assert!(!decoded.done),
        Err(
            WireError::MalformedPeerAddress(_)
            | WireError::MalformedMessage(_)
            | WireError::CryptoFailure(_),
        ) => {}
        Err(other) => panic!("unexpected error: {}", other),
    }
}

#[test]
fn unknown_recipient_rejected() {
    let alice = peer("127.0.0.1:9999");
    let bob = peer("127.0.0.1:8888");
    let sender_book = book_for(&[&alice, &bob]);
    let empty_book = InMemoryAddressBook::new();

    let message = Message::outbound(alice.address, bob.address, 11, 1, MessageType::Request, 0);
    let mut buf = vec![0u8; 1024];
    let n = encode(&mut buf, &message, &sender_book, None, true).unwrap();
    buf.truncate(n);

    assert!(matches!(
        decode_header(&buf, &empty_book),
        Err(WireError::UnknownRecipient(_))
    ));
}

#[test]
fn short_frames_rejected() {
    let book = InMemoryAddressBook::new();
    let buf = [0u8; HEADER_SIZE_MIN - 1];
    assert!(matches!(
        decode_header(&buf, &book),
        Err(WireError::BufferTooSmall { .. })
    ));
}
