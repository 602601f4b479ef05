//! Packet encoding.

use ackwire_core::{
    constants::{
        MAX_ENCODED_MESSAGE_SIZE, MAX_MESSAGES_PER_PACKET, MAX_RELIABLES_PER_PACKET,
        PACKET_HEADER_SIZE,
    },
    error::{ErrorKind, Result},
};
use byteorder::{LittleEndian, WriteBytesExt};

use crate::{message::Message, packet::PacketHeader};

/// Appends one message, size prefix included, to `buffer`.
///
/// Fails without touching `buffer` when the message is too long for the size prefix.
pub fn encode_message_into(buffer: &mut Vec<u8>, message: &Message) -> Result<()> {
    let kind = message.kind();
    let size = u16::try_from(kind.header_size() + message.payload().len()).map_err(|_| {
        ErrorKind::PayloadTooLarge { size: message.encoded_size(), max: MAX_ENCODED_MESSAGE_SIZE }
    })?;
    // Writing into a Vec cannot fail.
    let _ = buffer.write_u16::<LittleEndian>(size);
    let _ = buffer.write_u8(kind.message_type());
    if !kind.is_connectionless() {
        let _ = buffer.write_u8(message.sender_index);
    }
    if kind.is_reliable() {
        let _ = buffer.write_u16::<LittleEndian>(message.reliable_id.raw());
        if kind.is_sequenced() {
            let _ = buffer.write_u16::<LittleEndian>(message.sequence_id.raw());
        }
    }
    buffer.extend_from_slice(message.payload());
    Ok(())
}

/// Accumulates messages into a single datagram without exceeding the packet size limit.
#[derive(Debug)]
pub struct PacketBuilder {
    buffer: Vec<u8>,
    max_size: usize,
    message_count: usize,
    reliable_count: usize,
}

impl PacketBuilder {
    /// Creates an empty packet of at most `max_size` bytes.
    pub fn new(max_size: usize) -> Self {
        let mut buffer = Vec::with_capacity(max_size);
        buffer.resize(PACKET_HEADER_SIZE, 0);
        Self { buffer, max_size, message_count: 0, reliable_count: 0 }
    }

    /// Returns true when `message` still fits.
    pub fn fits(&self, message: &Message) -> bool {
        if self.message_count >= MAX_MESSAGES_PER_PACKET {
            return false;
        }
        if message.kind().is_reliable() && self.reliable_count >= MAX_RELIABLES_PER_PACKET {
            return false;
        }
        let size = message.encoded_size();
        size <= MAX_ENCODED_MESSAGE_SIZE && self.buffer.len() + size <= self.max_size
    }

    /// Appends `message` if it fits. Returns false, leaving the packet unchanged, otherwise.
    pub fn push(&mut self, message: &Message) -> bool {
        if !self.fits(message) || encode_message_into(&mut self.buffer, message).is_err() {
            return false;
        }
        self.message_count += 1;
        if message.kind().is_reliable() {
            self.reliable_count += 1;
        }
        true
    }

    /// Number of messages added so far.
    pub fn message_count(&self) -> usize {
        self.message_count
    }

    /// Number of reliable messages added so far.
    pub fn reliable_count(&self) -> usize {
        self.reliable_count
    }

    /// Returns true when no message has been added.
    pub fn is_empty(&self) -> bool {
        self.message_count == 0
    }

    /// Current datagram size, header included.
    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    /// Writes the header and returns the datagram. The header's message count is taken from
    /// the builder.
    pub fn finish(mut self, mut header: PacketHeader) -> Vec<u8> {
        header.message_count = self.message_count as u8;
        header.write_to(&mut self.buffer[..PACKET_HEADER_SIZE]);
        self.buffer
    }
}
