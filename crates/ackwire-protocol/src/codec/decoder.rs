//! Packet decoding.
//!
//! Malformed messages never fail the whole packet: they are counted and skipped, or, when
//! the packet turns out to be truncated, the rest of the packet is dropped.

use std::io::Cursor;

use ackwire_core::{
    constants::{MESSAGE_SIZE_PREFIX, PACKET_HEADER_SIZE},
    error::Result,
};
use byteorder::{LittleEndian, ReadBytesExt};
use tracing::trace;

use crate::{
    cyclic::{ReliableId, SequenceId},
    definition::DefinitionRegistry,
    message::Message,
    packet::PacketHeader,
};

/// Result of decoding one datagram.
#[derive(Debug)]
pub struct DecodedPacket {
    /// Parsed header.
    pub header: PacketHeader,
    /// Every message that decoded cleanly, in wire order.
    pub messages: Vec<Message>,
    /// Messages that were skipped or lost to truncation.
    pub invalid_messages: u32,
}

/// Decodes a datagram.
///
/// Only a datagram shorter than the header is an error. Every decoded message gets the
/// packet's ack id; connectionless messages get the header's sender index.
pub fn decode_packet(data: &[u8], registry: &DefinitionRegistry) -> Result<DecodedPacket> {
    let header = PacketHeader::read(data)?;
    let mut messages = Vec::with_capacity(header.message_count as usize);
    let mut invalid_messages = 0;
    let mut offset = PACKET_HEADER_SIZE;

    for _ in 0..header.message_count {
        let remaining = data.len() - offset;
        if remaining < MESSAGE_SIZE_PREFIX {
            trace!(
                "packet truncated before message {} of {}",
                messages.len(),
                header.message_count
            );
            invalid_messages += 1;
            break;
        }
        let size = u16::from_le_bytes([data[offset], data[offset + 1]]) as usize;
        offset += MESSAGE_SIZE_PREFIX;
        let available = remaining - MESSAGE_SIZE_PREFIX;
        if size > available {
            trace!("message declares {} bytes but only {} remain", size, available);
            invalid_messages += 1;
            break;
        }
        let body = &data[offset..offset + size];
        offset += size;

        match decode_message(body, &header, registry) {
            Some(message) => messages.push(message),
            None => invalid_messages += 1,
        }
    }

    Ok(DecodedPacket { header, messages, invalid_messages })
}

fn decode_message(
    body: &[u8],
    header: &PacketHeader,
    registry: &DefinitionRegistry,
) -> Option<Message> {
    let message_type = *body.first()?;
    let Some(kind) = registry.kind(message_type) else {
        trace!("skipping message of unregistered type {}", message_type);
        return None;
    };
    let header_size = kind.header_size();
    if body.len() < header_size {
        trace!("message of type {} shorter than its {} byte header", message_type, header_size);
        return None;
    }

    let mut cursor = Cursor::new(&body[1..header_size]);
    let sender_index =
        if kind.is_connectionless() { header.from_index } else { cursor.read_u8().ok()? };
    let mut message = Message::new(kind, body[header_size..].to_vec());
    message.sender_index = sender_index;
    message.ack_id = header.packet_ack;
    if kind.is_reliable() {
        message.reliable_id = ReliableId::new(cursor.read_u16::<LittleEndian>().ok()?);
        if !message.reliable_id.is_valid() {
            trace!("reliable message of type {} carries the invalid id", message_type);
            return None;
        }
        if kind.is_sequenced() {
            message.sequence_id = SequenceId::new(cursor.read_u16::<LittleEndian>().ok()?);
        }
    }
    Some(message)
}
