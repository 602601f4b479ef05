#![warn(missing_docs)]

//! ackwire-core: foundational types shared by every layer.
//!
//! This crate provides the minimal set of pieces the other crates agree on:
//! - Protocol constants and fixed capacities
//! - Configuration types
//! - Error handling
//! - The datagram socket abstraction
//!
//! Protocol logic lives in the specialized crates:
//! - `ackwire-protocol`: cyclic ids, message definitions, packet codec, ack bundles
//! - `ackwire-peer`: per-connection delivery state machine
//! - `ackwire-host`: session, handshake and tick driver

/// Protocol constants shared across layers.
pub mod constants {
    /// Size of the packet header on the wire:
    /// from index (1) + packet ack (2) + most recent ack (2) + ack bitfield (2) + count (1).
    pub const PACKET_HEADER_SIZE: usize = 8;
    /// Size of the per-message length prefix.
    pub const MESSAGE_SIZE_PREFIX: usize = 2;
    /// Largest encoded message, size prefix included. The prefix counts header plus payload
    /// in a u16.
    pub const MAX_ENCODED_MESSAGE_SIZE: usize = MESSAGE_SIZE_PREFIX + u16::MAX as usize;
    /// Maximum transmission unit for a whole packet.
    ///
    /// 1232 = 1280 (minimum IPv6 link MTU) - 40 (ipv6 header) - 8 (udp header). Keeping to the
    /// smallest guaranteed MTU avoids IP fragmentation on every path we care about.
    pub const DEFAULT_MTU: usize = 1232;
    /// Maximum number of messages a single packet can carry (u8 count on the wire).
    pub const MAX_MESSAGES_PER_PACKET: usize = u8::MAX as usize;

    /// Number of connection slots in a session, including the host slot.
    pub const MAX_CONNECTIONS: usize = 32;
    /// Connection index reserved for the host.
    pub const HOST_CONNECTION_INDEX: u8 = 0;
    /// Connection index written on the wire while no index has been assigned.
    pub const INVALID_CONNECTION_INDEX: u8 = 0xFF;

    /// Number of message definitions a session can hold (indexed by u8 type).
    pub const MAX_DEFINITIONS: usize = 256;
    /// Number of independent sequence channels per connection.
    pub const MAX_CHANNELS: usize = 8;
    /// First message type available to application definitions.
    pub const FIRST_USER_MESSAGE_TYPE: u8 = 32;

    /// Maximum number of reliable ids in flight (sent but not confirmed) per connection.
    ///
    /// Sentinel-skipping ids cycle through 65535 values, so every ring indexed by them must
    /// have a size that divides 65535.
    pub const MAX_RELIABLE_RANGE: u16 = 255;
    /// Number of ack bundles remembered per connection.
    pub const ACK_BUNDLE_RING_SIZE: u16 = 255;
    /// Maximum number of reliable messages a single packet may carry.
    pub const MAX_RELIABLES_PER_PACKET: usize = 32;
    /// Number of historical acks reported in the packet header bitfield.
    pub const ACK_HISTORY_BITS: u16 = 16;

    /// Incremental monolithic protocol number, part of the join compatibility version.
    pub const PROTOCOL_VERSION: u16 = 1;

    const _: () = assert!(65535 % MAX_RELIABLE_RANGE as u32 == 0);
    const _: () = assert!(65535 % ACK_BUNDLE_RING_SIZE as u32 == 0);
}

/// Configuration options for the protocol and session.
pub mod config;
/// Error types and results.
pub mod error;
/// Transport abstraction for pluggable I/O.
pub mod transport;
