//! Direct-send surface: configuration record, outbound queue, completion
//! futures, and the shutdown sentinel.
//!
//! The wire codec is synchronous and stateless; this module is the thin
//! asynchronous shell a DHT node drives it through. A send is configured
//! with a plain record (no chained mutators), encoded up front, and parked
//! on a bounded outbound queue for the transport to drain. Each entry
//! carries a one-shot responder; completing it resolves the caller's
//! [`SendFuture`] with the decoded reply.

use std::collections::VecDeque;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};

use tokio::sync::{oneshot, RwLock};
use tracing::debug;

use crate::address_book::PeerAddressManager;
use crate::codec::encode;
use crate::message::{Message, MessageType};
use crate::peer_address::PeerAddress;
use crate::peer_id::PeerId;
use crate::types::{
    Result, WireError, ENCRYPTED_REGION_OFFSET, NONCE_SIZE, SIGNATURE_SIZE,
};

/// Command byte for direct data transfer.
pub const DIRECT_DATA_COMMAND: u8 = 6;

/// Default capacity of the outbound queue.
pub const DEFAULT_QUEUE_CAPACITY: usize = 100;

/// Configuration for one direct send. None of these fields change the wire
/// format; `cancel_on_finish` and `streaming` steer the surrounding send
/// state machine and travel with the queued entry.
#[derive(Debug, Clone)]
pub struct SendConfig {
    /// Raw payload bytes, used as-is.
    pub buffer: Option<Vec<u8>>,
    /// Structured payload; serialized by the builder, opaque to the codec.
    pub object: Option<serde_json::Value>,
    pub cancel_on_finish: bool,
    pub streaming: bool,
    /// DHT location the routing layer resolves recipients from.
    pub location_key: PeerId,
}

impl SendConfig {
    pub fn new(location_key: PeerId) -> Self {
        SendConfig {
            buffer: None,
            object: None,
            cancel_on_finish: false,
            streaming: false,
            location_key,
        }
    }

    /// A raw-buffer send.
    pub fn raw(location_key: PeerId, buffer: Vec<u8>) -> Self {
        let mut config = SendConfig::new(location_key);
        config.buffer = Some(buffer);
        config
    }

    /// An object send; the value is serialized into the payload.
    pub fn object(location_key: PeerId, object: serde_json::Value) -> Self {
        let mut config = SendConfig::new(location_key);
        config.object = Some(object);
        config
    }

    /// A send is raw when no object is attached.
    pub fn is_raw(&self) -> bool {
        self.object.is_none()
    }
}

/// An encoded datagram waiting for the transport, together with the
/// message that produced it (whose ephemeral private half decrypts the
/// reply) and the responder that resolves the caller's future.
pub struct OutboundDatagram {
    pub message_id: u32,
    pub recipient: PeerAddress,
    pub location_key: PeerId,
    pub datagram: Vec<u8>,
    pub cancel_on_finish: bool,
    pub streaming: bool,
    pub message: Message,
    responder: oneshot::Sender<Result<Message>>,
}

impl OutboundDatagram {
    /// Resolves the originating [`SendFuture`]. A reply decoded from the
    /// wire, or the error that ended the exchange.
    pub fn complete(self, result: Result<Message>) {
        let _ = self.responder.send(result);
    }
}

/// Completion handle returned by [`DirectSender::send`]. Resolves when the
/// transport completes the exchange, or immediately for sends that never
/// made it onto the queue.
pub struct SendFuture {
    rx: oneshot::Receiver<Result<Message>>,
}

impl SendFuture {
    fn failed(error: WireError) -> Self {
        let (tx, rx) = oneshot::channel();
        let _ = tx.send(Err(error));
        SendFuture { rx }
    }
}

impl Future for SendFuture {
    type Output = Result<Message>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match Pin::new(&mut self.rx).poll(cx) {
            Poll::Ready(Ok(result)) => Poll::Ready(result),
            // Responder dropped without completing: the peer went away.
            Poll::Ready(Err(_)) => Poll::Ready(Err(WireError::PeerShutdown)),
            Poll::Pending => Poll::Pending,
        }
    }
}

/// Encodes direct sends and queues them for the transport.
pub struct DirectSender {
    local: PeerAddress,
    lookup: Arc<dyn PeerAddressManager>,
    queue: RwLock<VecDeque<OutboundDatagram>>,
    capacity: usize,
    version: u32,
    next_message_id: AtomicU32,
    shutdown: AtomicBool,
}

impl DirectSender {
    pub fn new(local: PeerAddress, lookup: Arc<dyn PeerAddressManager>, version: u32) -> Self {
        DirectSender::with_capacity(local, lookup, version, DEFAULT_QUEUE_CAPACITY)
    }

    pub fn with_capacity(
        local: PeerAddress,
        lookup: Arc<dyn PeerAddressManager>,
        version: u32,
        capacity: usize,
    ) -> Self {
        DirectSender {
            local,
            lookup,
            queue: RwLock::new(VecDeque::new()),
            capacity,
            version,
            next_message_id: AtomicU32::new(1),
            shutdown: AtomicBool::new(false),
        }
    }

    /// Stops accepting sends. Already-queued datagrams stay queued; the
    /// transport decides whether to flush or drop them.
    pub fn shutdown(&self) {
        self.shutdown.store(true, Ordering::SeqCst);
    }

    pub fn is_shutdown(&self) -> bool {
        self.shutdown.load(Ordering::SeqCst)
    }

    /// Encodes one direct send to `recipient` and queues it. The returned
    /// future resolves with the reply once the transport completes the
    /// entry.
    ///
    /// After shutdown every call returns an already-failed future with the
    /// stable kind [`WireError::PeerShutdown`].
    pub async fn send(&self, recipient: PeerAddress, config: SendConfig) -> SendFuture {
        if self.is_shutdown() {
            return SendFuture::failed(WireError::PeerShutdown);
        }

        let payload = match (&config.buffer, &config.object) {
            (_, Some(object)) => match serde_json::to_vec(object) {
                Ok(bytes) => Some(bytes),
                Err(e) => {
                    return SendFuture::failed(WireError::MalformedMessage(format!(
                        "object payload serialization: {}",
                        e
                    )))
                }
            },
            (Some(buffer), None) => Some(buffer.clone()),
            (None, None) => None,
        };

        let message_id = self.next_message_id.fetch_add(1, Ordering::Relaxed);
        let mut message = Message::outbound(
            self.local,
            recipient,
            message_id,
            self.version,
            MessageType::Request,
            DIRECT_DATA_COMMAND,
        );
        message.payload = payload;

        let payload_len = message.payload.as_ref().map_or(0, |p| p.len());
        let mut buf = vec![
            0u8;
            ENCRYPTED_REGION_OFFSET
                + NONCE_SIZE
                + PeerAddress::MAX_SIZE_NO_PEER_ID
                + 2
                + payload_len
                + SIGNATURE_SIZE
        ];
        let encode_for_ipv4 = recipient.ipv4().is_some();
        let n = match encode(
            &mut buf,
            &message,
            self.lookup.as_ref(),
            None,
            encode_for_ipv4,
        ) {
            Ok(n) => n,
            Err(e) => return SendFuture::failed(e),
        };
        buf.truncate(n);

        let (tx, rx) = oneshot::channel();
        let entry = OutboundDatagram {
            message_id,
            recipient,
            location_key: config.location_key,
            datagram: buf,
            cancel_on_finish: config.cancel_on_finish,
            streaming: config.streaming,
            message,
            responder: tx,
        };

        let mut queue = self.queue.write().await;
        if queue.len() >= self.capacity {
            return SendFuture::failed(WireError::QueueFull);
        }
        queue.push_back(entry);
        debug!(message_id, queued = queue.len(), "queued direct send");
        SendFuture { rx }
    }

    /// Next datagram for the transport to put on the wire.
    pub async fn next_outbound(&self) -> Option<OutboundDatagram> {
        let mut queue = self.queue.write().await;
        queue.pop_front()
    }

    /// Number of datagrams waiting for the transport.
    pub async fn queued(&self) -> usize {
        let queue = self.queue.read().await;
        queue.len()
    }
}
