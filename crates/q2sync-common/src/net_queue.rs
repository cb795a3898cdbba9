// net_queue.rs -- hand-off of received datagrams to the client tick
//
// An I/O thread owns the socket and pushes each datagram, already stripped
// of its net channel header, into the queue. The client drains it once per
// frame and parses each datagram to completion before the next.

use crossbeam::channel::{bounded, Receiver, Sender, TrySendError};

/// A received datagram and the time it arrived.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueuedPacket {
    /// Message payload, starting at the first server command byte
    pub data: Vec<u8>,
    /// Arrival time in milliseconds
    pub timestamp: i32,
    /// Sequence number the server stamped on this datagram
    pub sequence: i32,
    /// Sequence number of the last outgoing packet the server acknowledged
    pub acknowledged: i32,
}

impl QueuedPacket {
    pub fn new(data: Vec<u8>, timestamp: i32, sequence: i32, acknowledged: i32) -> Self {
        Self {
            data,
            timestamp,
            sequence,
            acknowledged,
        }
    }
}

/// Bounded queue between the I/O thread and the client tick.
pub struct PacketQueue {
    sender: Sender<QueuedPacket>,
    receiver: Receiver<QueuedPacket>,
}

impl PacketQueue {
    /// When full, new packets are dropped; the producer never blocks.
    pub fn new(capacity: usize) -> Self {
        let (sender, receiver) = bounded(capacity.clamp(1, MAX_QUEUE_CAPACITY));
        Self { sender, receiver }
    }

    /// Get a clone of the sender handle (for I/O thread).
    pub fn sender(&self) -> PacketQueueSender {
        PacketQueueSender {
            sender: self.sender.clone(),
        }
    }

    /// Returns `None` if the queue is empty.
    pub fn try_recv(&self) -> Option<QueuedPacket> {
        self.receiver.try_recv().ok()
    }

    /// Drop everything still queued. Used when the connection is reset.
    pub fn clear(&self) -> usize {
        self.receiver.try_iter().count()
    }

    pub fn is_empty(&self) -> bool {
        self.receiver.is_empty()
    }

    pub fn len(&self) -> usize {
        self.receiver.len()
    }
}

impl Default for PacketQueue {
    fn default() -> Self {
        Self::new(DEFAULT_QUEUE_CAPACITY)
    }
}

/// Sender handle for the packet queue (used by I/O thread).
#[derive(Clone)]
pub struct PacketQueueSender {
    sender: Sender<QueuedPacket>,
}

impl PacketQueueSender {
    /// Returns `true` if sent, `false` if the queue is full (packet dropped)
    /// or the client side is gone.
    pub fn try_send(&self, packet: QueuedPacket) -> bool {
        match self.sender.try_send(packet) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                tracing::debug!("packet queue full, dropping datagram");
                false
            }
            Err(TrySendError::Disconnected(_)) => false,
        }
    }
}

pub const DEFAULT_QUEUE_CAPACITY: usize = 256;

/// Absolute limit to prevent memory exhaustion.
pub const MAX_QUEUE_CAPACITY: usize = 4096;
