use std::{
    collections::VecDeque,
    fmt,
    net::SocketAddr,
    time::{Duration, Instant},
};

use ackwire_core::{config::Config, constants::MAX_CHANNELS};
use ackwire_protocol::{AckBundleRing, AckHistory, AckId, Message, RoundTripEstimator};

use crate::{
    channel_state::ChannelState,
    reliable_window::{ReceiveWindow, SendWindow},
    statistics::ConnectionStatistics,
};

mod receive;
mod send;

/// One remote endpoint of a session.
///
/// Owns everything needed to deliver messages to and from the peer: the send queues, the ack
/// and reliable-id windows, the per-channel reorder buffers and the round-trip estimate.
/// Time is always passed in, so the state machine is fully deterministic.
pub struct Connection {
    /// Connection index, `None` until the handshake assigns one
    index: Option<u8>,
    /// The address of the remote endpoint
    address: SocketAddr,
    /// Identity used to refuse duplicate joins
    guid: String,
    username: String,
    password_hash: u64,
    nuonce: u32,

    /// Last time we sent a packet to this peer
    last_sent: Instant,
    /// Last time we received a packet from this peer
    last_received: Instant,
    /// A packet with messages arrived and has not been acknowledged yet
    ack_report_pending: bool,

    rtt: RoundTripEstimator,
    statistics: ConnectionStatistics,

    /// Ack id for our next packet
    next_ack: AckId,
    /// Acks we received from the peer
    received_acks: AckHistory,
    /// What each of our recent packets carried
    bundles: AckBundleRing,

    send_window: SendWindow,
    receive_window: ReceiveWindow,
    channels: Vec<ChannelState>,

    unsent_unreliable: VecDeque<Message>,
    unsent_reliable: VecDeque<Message>,
    /// Sent but unconfirmed reliables, oldest first
    sent_reliable: VecDeque<Message>,

    config: Config,
}

impl Connection {
    /// Creates a connection to `address`. Both timestamps start at `time`.
    pub fn new(address: SocketAddr, config: &Config, time: Instant) -> Self {
        Self {
            index: None,
            address,
            guid: address.to_string(),
            username: String::new(),
            password_hash: 0,
            nuonce: 0,
            last_sent: time,
            last_received: time,
            ack_report_pending: false,
            rtt: RoundTripEstimator::new(config.initial_rtt, config.rtt_smoothing_factor),
            statistics: ConnectionStatistics::default(),
            next_ack: AckId::first(),
            received_acks: AckHistory::new(),
            bundles: AckBundleRing::new(),
            send_window: SendWindow::new(),
            receive_window: ReceiveWindow::new(),
            channels: (0..MAX_CHANNELS).map(|_| ChannelState::new()).collect(),
            unsent_unreliable: VecDeque::new(),
            unsent_reliable: VecDeque::new(),
            sent_reliable: VecDeque::new(),
            config: config.to_owned(),
        }
    }

    /// Connection index, if assigned.
    pub fn index(&self) -> Option<u8> {
        self.index
    }

    /// Assigns the connection index.
    pub fn set_index(&mut self, index: u8) {
        self.index = Some(index);
    }

    /// Address of the remote endpoint.
    pub fn address(&self) -> SocketAddr {
        self.address
    }

    /// The peer's address string.
    pub fn guid(&self) -> &str {
        &self.guid
    }

    /// Display name announced during the handshake.
    pub fn username(&self) -> &str {
        &self.username
    }

    /// Sets the display name.
    pub fn set_username(&mut self, username: impl Into<String>) {
        self.username = username.into();
    }

    /// Password hash sent with the join request.
    pub fn password_hash(&self) -> u64 {
        self.password_hash
    }

    /// Sets the password hash.
    pub fn set_password_hash(&mut self, hash: u64) {
        self.password_hash = hash;
    }

    /// Nuonce of the join request that created the connection.
    pub fn nuonce(&self) -> u32 {
        self.nuonce
    }

    /// Sets the join nuonce.
    pub fn set_nuonce(&mut self, nuonce: u32) {
        self.nuonce = nuonce;
    }

    /// Last time a packet was sent.
    pub fn last_sent(&self) -> Instant {
        self.last_sent
    }

    /// Last time a packet was received.
    pub fn last_received(&self) -> Instant {
        self.last_received
    }

    /// Time since the last received packet.
    pub fn silence(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.last_received)
    }

    /// Returns true when the peer has been silent for longer than `disconnect_timeout`.
    pub fn is_timed_out(&self, now: Instant) -> bool {
        self.silence(now) > self.config.disconnect_timeout
    }

    /// Current round-trip estimate.
    pub fn rtt(&self) -> Duration {
        self.rtt.rtt()
    }

    /// Connection counters.
    pub fn statistics(&self) -> &ConnectionStatistics {
        &self.statistics
    }

    /// Ack history of packets received from the peer.
    pub fn received_acks(&self) -> &AckHistory {
        &self.received_acks
    }

    /// Returns false while `MAX_RELIABLE_RANGE` reliables are unconfirmed.
    pub fn can_send_new_reliables(&self) -> bool {
        self.send_window.can_send_new()
    }

    /// Reliable id cursors of the sending side.
    pub fn send_window(&self) -> &SendWindow {
        &self.send_window
    }

    /// Reliable id cursors of the receiving side.
    pub fn receive_window(&self) -> &ReceiveWindow {
        &self.receive_window
    }

    /// Reliables not yet sent for the first time.
    pub fn unsent_reliable_count(&self) -> usize {
        self.unsent_reliable.len()
    }

    /// Reliables sent but not confirmed.
    pub fn unconfirmed_reliable_count(&self) -> usize {
        self.sent_reliable.len()
    }

    /// Unreliables waiting for this tick's flush.
    pub fn unsent_unreliable_count(&self) -> usize {
        self.unsent_unreliable.len()
    }

    /// Messages held back on `channel` until a gap is filled.
    pub fn buffered_count(&self, channel: u8) -> usize {
        self.channels.get(channel as usize).map_or(0, ChannelState::buffered_len)
    }

    /// Discards every queued and buffered message.
    pub fn clear(&mut self) {
        self.unsent_unreliable.clear();
        self.unsent_reliable.clear();
        self.sent_reliable.clear();
        self.channels.iter_mut().for_each(ChannelState::reset);
        self.bundles.clear();
    }
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("index", &self.index)
            .field("address", &self.address)
            .field("username", &self.username)
            .field("rtt", &self.rtt.rtt())
            .field("unsent_reliable", &self.unsent_reliable.len())
            .field("sent_reliable", &self.sent_reliable.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_connection_starts_unassigned() {
        let now = Instant::now();
        let address: SocketAddr = "127.0.0.1:4000".parse().unwrap();
        let connection = Connection::new(address, &Config::default(), now);
        assert_eq!(connection.index(), None);
        assert_eq!(connection.guid(), "127.0.0.1:4000");
        assert_eq!(connection.rtt(), Duration::from_millis(100));
        assert!(connection.can_send_new_reliables());
        assert!(!connection.is_timed_out(now + Duration::from_secs(15)));
        assert!(connection.is_timed_out(now + Duration::from_millis(15_001)));
    }

    #[test]
    fn test_clear_abandons_queued_and_unconfirmed_messages() {
        use ackwire_protocol::MessageKind;

        let now = Instant::now();
        let address: SocketAddr = "127.0.0.1:4000".parse().unwrap();
        let mut connection = Connection::new(address, &Config::default(), now);
        let reliable = MessageKind::new(40).reliable();
        connection.send(Message::new(reliable, vec![1])).unwrap();
        assert_eq!(connection.flush(0, now).len(), 1);
        connection.send(Message::new(reliable, vec![2])).unwrap();
        connection.send(Message::new(MessageKind::new(41), vec![3])).unwrap();

        connection.clear();
        assert_eq!(connection.unconfirmed_reliable_count(), 0);
        assert_eq!(connection.unsent_reliable_count(), 0);
        assert_eq!(connection.unsent_unreliable_count(), 0);
        assert!(connection.flush(0, now + Duration::from_millis(500)).is_empty());
    }
}
