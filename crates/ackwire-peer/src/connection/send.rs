//! Outgoing side of a connection: queueing and the per-tick send cycle.

use std::time::{Duration, Instant};

use ackwire_core::{
    constants::{MAX_ENCODED_MESSAGE_SIZE, PACKET_HEADER_SIZE},
    error::{ErrorKind, Result},
};
use ackwire_protocol::{AckBundle, Message, PacketBuilder, PacketHeader, ReliableId};
use tracing::{debug, trace};

use super::Connection;

impl Connection {
    /// Queues a message for the next flush.
    ///
    /// Reliable sequenced messages get their sequence id here, so channel order is queue
    /// order. Reliable ids are assigned when a message is first put on the wire. A message
    /// that cannot fit into an empty packet is refused.
    pub fn send(&mut self, mut message: Message) -> Result<()> {
        let max = self
            .config
            .max_packet_size
            .saturating_sub(PACKET_HEADER_SIZE)
            .min(MAX_ENCODED_MESSAGE_SIZE);
        let size = message.encoded_size();
        if size > max {
            return Err(ErrorKind::PayloadTooLarge { size, max });
        }

        let kind = message.kind();
        if kind.is_reliable() {
            if kind.is_sequenced() {
                message.sequence_id = self.channels[kind.channel() as usize].next_outgoing();
            }
            self.unsent_reliable.push_back(message);
        } else {
            self.unsent_unreliable.push_back(message);
        }
        Ok(())
    }

    /// Runs one send cycle and returns the datagrams to put on the wire.
    ///
    /// A keep-alive goes out when nothing was sent for `heartbeat_interval` and there is
    /// nothing else to send; a peer silent for `bad_connection_interval` only gets those.
    /// Otherwise up to `max_packets_per_tick` packets are filled with, in priority order, due
    /// retransmissions, new reliables and unreliables. Unreliables that did not fit this tick
    /// are dropped.
    pub fn flush(&mut self, local_index: u8, now: Instant) -> Vec<Vec<u8>> {
        let mut datagrams = Vec::new();
        let heartbeat_due =
            now.saturating_duration_since(self.last_sent) >= self.config.heartbeat_interval;
        let suppressed = self.silence(now) >= self.config.bad_connection_interval;

        if suppressed || (heartbeat_due && !self.has_work(now)) {
            if heartbeat_due {
                let builder = PacketBuilder::new(self.config.max_packet_size);
                datagrams.push(self.finish_packet(builder, Vec::new(), local_index, now));
            }
            self.drop_unsent_unreliables();
            return datagrams;
        }

        for _ in 0..self.config.max_packets_per_tick {
            if !self.has_work(now) {
                break;
            }
            let (builder, reliable_ids) = self.fill_packet(now);
            if builder.is_empty() && !self.ack_report_pending {
                break;
            }
            datagrams.push(self.finish_packet(builder, reliable_ids, local_index, now));
        }
        self.drop_unsent_unreliables();
        datagrams
    }

    fn resend_after(&self) -> Duration {
        self.rtt.rtt().mul_f32(self.config.resend_rtt_factor)
    }

    fn has_work(&self, now: Instant) -> bool {
        if self.ack_report_pending || !self.unsent_unreliable.is_empty() {
            return true;
        }
        if !self.unsent_reliable.is_empty() && self.send_window.can_send_new() {
            return true;
        }
        let resend_after = self.resend_after();
        self.sent_reliable.iter().any(|message| is_due(message, now, resend_after))
    }

    fn fill_packet(&mut self, now: Instant) -> (PacketBuilder, Vec<ReliableId>) {
        let mut builder = PacketBuilder::new(self.config.max_packet_size);
        let mut reliable_ids = Vec::new();

        let resend_after = self.resend_after();
        let mut resent = 0;
        for message in self.sent_reliable.iter_mut() {
            if !is_due(message, now, resend_after) {
                continue;
            }
            if !builder.push(message) {
                break;
            }
            message.last_sent = Some(now);
            reliable_ids.push(message.reliable_id);
            resent += 1;
        }
        self.statistics.messages_resent += resent;

        while self.send_window.can_send_new() {
            match self.unsent_reliable.front() {
                Some(front) if builder.fits(front) => {}
                _ => break,
            }
            let Some(mut message) = self.unsent_reliable.pop_front() else {
                break;
            };
            message.reliable_id = self.send_window.assign();
            message.last_sent = Some(now);
            builder.push(&message);
            reliable_ids.push(message.reliable_id);
            self.sent_reliable.push_back(message);
        }

        while let Some(front) = self.unsent_unreliable.front() {
            if !builder.fits(front) {
                break;
            }
            if let Some(message) = self.unsent_unreliable.pop_front() {
                builder.push(&message);
            }
        }

        (builder, reliable_ids)
    }

    fn finish_packet(
        &mut self,
        builder: PacketBuilder,
        reliable_ids: Vec<ReliableId>,
        local_index: u8,
        now: Instant,
    ) -> Vec<u8> {
        let ack = self.next_ack.increment();
        let mut header = PacketHeader::new(local_index, ack);
        header.most_recent_ack = self.received_acks.most_recent();
        header.ack_bitfield = self.received_acks.bitfield();

        self.statistics.messages_sent += builder.message_count() as u64;
        let datagram = builder.finish(header);
        if self.bundles.record(AckBundle::new(ack, now, reliable_ids)) {
            self.statistics.packets_lost += 1;
            trace!("packet to {} presumed lost when ack {} reused its slot", self.address, ack);
        }

        self.last_sent = now;
        self.ack_report_pending = false;
        self.statistics.packets_sent += 1;
        self.statistics.bytes_sent += datagram.len() as u64;
        trace!("sending packet {} to {} ({} bytes)", ack, self.address, datagram.len());
        datagram
    }

    fn drop_unsent_unreliables(&mut self) {
        let dropped = self.unsent_unreliable.len();
        if dropped > 0 {
            debug!(
                "dropping {} unreliable messages to {} that did not fit this tick",
                dropped, self.address
            );
            self.statistics.dropped_unreliables += dropped as u64;
            self.unsent_unreliable.clear();
        }
    }
}

fn is_due(message: &Message, now: Instant, resend_after: Duration) -> bool {
    message.last_sent.map_or(true, |sent| now.saturating_duration_since(sent) > resend_after)
}
