//! What a message handler sees, and how it sends messages back.
//!
//! Handlers cannot touch the session directly while it is dispatching; they queue
//! [`OutgoingMessage`]s instead, and the session sends them once the handler returns.

use std::{net::SocketAddr, time::Instant};

/// Where a queued message should go.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum MessageTarget {
    /// The sender of the message being handled.
    Reply,
    /// A connection by index.
    Connection(u8),
    /// Every connection except our own.
    Broadcast,
    /// A bare address; only valid for connectionless types.
    Address(SocketAddr),
}

/// A message queued by a handler or hook.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OutgoingMessage {
    /// Destination.
    pub target: MessageTarget,
    /// Registered type of the message.
    pub message_type: u8,
    /// Encoded payload.
    pub payload: Vec<u8>,
}

/// Context passed to message handlers.
#[derive(Debug)]
pub struct MessageContext<'a> {
    sender_address: SocketAddr,
    sender_index: Option<u8>,
    local_index: Option<u8>,
    now: Instant,
    outgoing: &'a mut Vec<OutgoingMessage>,
}

impl<'a> MessageContext<'a> {
    /// Creates a context for a message from `sender_address`.
    pub fn new(
        sender_address: SocketAddr,
        sender_index: Option<u8>,
        local_index: Option<u8>,
        now: Instant,
        outgoing: &'a mut Vec<OutgoingMessage>,
    ) -> Self {
        Self { sender_address, sender_index, local_index, now, outgoing }
    }

    /// Address the message came from.
    pub fn sender_address(&self) -> SocketAddr {
        self.sender_address
    }

    /// Connection index of the sender, `None` for unconnected senders.
    pub fn sender_index(&self) -> Option<u8> {
        self.sender_index
    }

    /// Our own connection index, `None` until assigned.
    pub fn local_index(&self) -> Option<u8> {
        self.local_index
    }

    /// Time of the current update.
    pub fn now(&self) -> Instant {
        self.now
    }

    /// Queues a message back to the sender.
    pub fn reply(&mut self, message_type: u8, payload: Vec<u8>) {
        self.push(MessageTarget::Reply, message_type, payload);
    }

    /// Queues a message to a connection.
    pub fn send_to(&mut self, index: u8, message_type: u8, payload: Vec<u8>) {
        self.push(MessageTarget::Connection(index), message_type, payload);
    }

    /// Queues a message to every other connection.
    pub fn broadcast(&mut self, message_type: u8, payload: Vec<u8>) {
        self.push(MessageTarget::Broadcast, message_type, payload);
    }

    /// Queues a connectionless message to an address.
    pub fn send_to_address(&mut self, address: SocketAddr, message_type: u8, payload: Vec<u8>) {
        self.push(MessageTarget::Address(address), message_type, payload);
    }

    fn push(&mut self, target: MessageTarget, message_type: u8, payload: Vec<u8>) {
        self.outgoing.push(OutgoingMessage { target, message_type, payload });
    }
}
