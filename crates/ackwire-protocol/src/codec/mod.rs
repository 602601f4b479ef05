//! Packet serialization and deserialization.
//!
//! A packet is a `PacketHeader` followed by `message_count` messages, each prefixed with its
//! size so that a receiver can skip messages it cannot interpret.

mod decoder;
mod encoder;

pub use decoder::{decode_packet, DecodedPacket};
pub use encoder::{encode_message_into, PacketBuilder};
