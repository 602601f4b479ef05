//! Connection statistics tracking.
//!
//! Counters for packets and bytes on the wire, plus the reasons messages were dropped
//! instead of delivered.

/// Counters for one connection.
#[derive(Debug, Clone, Default)]
pub struct ConnectionStatistics {
    /// Packets handed to the socket
    pub packets_sent: u64,
    /// Packets accepted from the socket
    pub packets_received: u64,
    /// Packets whose ack bundle was overwritten before the peer reported them
    pub packets_lost: u64,
    /// Datagram bytes sent, headers included
    pub bytes_sent: u64,
    /// Datagram bytes received, headers included
    pub bytes_received: u64,
    /// Messages placed into packets, retransmissions included
    pub messages_sent: u64,
    /// Messages delivered to the application
    pub messages_received: u64,
    /// Reliable messages sent again after no confirmation arrived in time
    pub messages_resent: u64,
    /// Messages that failed to decode or were rejected by the reliable window
    pub invalid_messages: u64,
    /// Reliable messages received more than once
    pub duplicate_messages: u64,
    /// Unreliable messages still queued at the end of a tick
    pub dropped_unreliables: u64,
    /// Unreliable sequenced messages older than the newest packet
    pub stale_messages: u64,
}

impl ConnectionStatistics {
    /// Returns the packet loss rate (0.0 to 1.0).
    pub fn packet_loss_rate(&self) -> f32 {
        if self.packets_sent == 0 {
            return 0.0;
        }
        self.packets_lost as f32 / self.packets_sent as f32
    }

    /// Resets all statistics counters.
    pub fn reset(&mut self) {
        *self = Self::default();
    }
}
