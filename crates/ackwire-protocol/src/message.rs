use std::time::Instant;

use ackwire_core::constants::MESSAGE_SIZE_PREFIX;

use crate::{
    cyclic::{AckId, ReliableId, SequenceId},
    definition::MessageKind,
    payload::PayloadReader,
};

/// One instance of a message definition, with its header fields and payload.
///
/// Header fields not used by the definition stay at their defaults and are not written to
/// the wire: `sender_index` for connectionless messages, `reliable_id` for unreliable ones and
/// `sequence_id` unless the message is both reliable and sequenced.
#[derive(Clone, Debug, PartialEq)]
pub struct Message {
    kind: MessageKind,
    /// Connection index of the peer that created the message.
    pub sender_index: u8,
    /// Assigned on first transmission for reliable messages.
    pub reliable_id: ReliableId,
    /// Per-channel ordering id for sequenced messages.
    pub sequence_id: SequenceId,
    /// Ack id of the packet the message arrived in.
    pub ack_id: AckId,
    /// Last time the message was put on the wire.
    pub last_sent: Option<Instant>,
    payload: Vec<u8>,
}

impl Message {
    /// Creates an outgoing message with unset ids.
    pub fn new(kind: MessageKind, payload: Vec<u8>) -> Self {
        Self {
            kind,
            sender_index: 0,
            reliable_id: ReliableId::INVALID,
            sequence_id: SequenceId::default(),
            ack_id: AckId::INVALID,
            last_sent: None,
            payload,
        }
    }

    /// Delivery semantics copied from the definition.
    pub fn kind(&self) -> MessageKind {
        self.kind
    }

    /// Message type id.
    pub fn message_type(&self) -> u8 {
        self.kind.message_type()
    }

    /// Payload bytes.
    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    /// Reader positioned at the start of the payload.
    pub fn reader(&self) -> PayloadReader<'_> {
        PayloadReader::new(&self.payload)
    }

    /// Bytes the message occupies in a packet, size prefix included.
    pub fn encoded_size(&self) -> usize {
        MESSAGE_SIZE_PREFIX + self.kind.header_size() + self.payload.len()
    }
}
