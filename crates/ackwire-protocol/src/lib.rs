#![warn(missing_docs)]

//! ackwire-protocol: wire-level building blocks.

/// Acknowledgment bundles, ack history and RTT estimate.
pub mod acknowledgment;
/// Packet serialization and deserialization.
pub mod codec;
/// Built-in message types and payloads.
pub mod core_messages;
/// Wrapping 16-bit ids.
pub mod cyclic;
/// Message definitions and the registry.
pub mod definition;
/// Handler context and queued outgoing messages.
pub mod dispatch;
/// Message instances.
pub mod message;
/// Packet header.
pub mod packet;
/// Payload reader and writer.
pub mod payload;

pub use acknowledgment::{AckBundle, AckBundleRing, AckHistory, Confirmation, RoundTripEstimator};
pub use codec::{decode_packet, DecodedPacket, PacketBuilder};
pub use core_messages::{CoreMessage, JoinAccept, JoinDeny, JoinDenyReason, JoinRequest};
pub use cyclic::{AckId, CyclicId, ReliableId, SequenceId};
pub use definition::{DefinitionRegistry, MessageDefinition, MessageHandler, MessageKind};
pub use dispatch::{MessageContext, MessageTarget, OutgoingMessage};
pub use message::Message;
pub use packet::PacketHeader;
pub use payload::{PayloadReader, PayloadWriter};
