//! Incoming side of a connection: ack processing and in-order release.

use std::time::Instant;

use ackwire_protocol::{DecodedPacket, Message, PacketHeader};
use tracing::trace;

use super::Connection;
use crate::reliable_window::ReceiveRejection;

impl Connection {
    /// Processes a decoded packet from the peer and returns the messages ready for the
    /// application, in the order they must be applied.
    ///
    /// The packet's ack is recorded before any message is looked at, so unreliable sequenced
    /// messages are judged against the newest packet including this one.
    pub fn receive(
        &mut self,
        packet: DecodedPacket,
        datagram_len: usize,
        now: Instant,
    ) -> Vec<Message> {
        self.last_received = now;
        self.statistics.packets_received += 1;
        self.statistics.bytes_received += datagram_len as u64;
        self.statistics.invalid_messages += u64::from(packet.invalid_messages);

        self.received_acks.record(packet.header.packet_ack);
        self.process_acks(&packet.header, now);
        if !packet.messages.is_empty() {
            self.ack_report_pending = true;
        }

        let newest_ack = self.received_acks.most_recent();
        let mut ready = Vec::with_capacity(packet.messages.len());
        for message in packet.messages {
            let kind = message.kind();
            if kind.is_reliable() {
                match self.receive_window.mark_received(message.reliable_id) {
                    Ok(()) => {}
                    Err(ReceiveRejection::Duplicate) => {
                        trace!("duplicate reliable {} from {}", message.reliable_id, self.address);
                        self.statistics.duplicate_messages += 1;
                        continue;
                    }
                    Err(ReceiveRejection::OutOfWindow) => {
                        trace!(
                            "reliable {} from {} outside the window",
                            message.reliable_id, self.address
                        );
                        self.statistics.invalid_messages += 1;
                        continue;
                    }
                }
                if kind.is_sequenced() {
                    ready.extend(self.channels[kind.channel() as usize].accept(message));
                } else {
                    ready.push(message);
                }
            } else if kind.is_sequenced()
                && (!message.ack_id.is_valid() || message.ack_id.is_older_than(newest_ack))
            {
                self.statistics.stale_messages += 1;
            } else {
                ready.push(message);
            }
        }

        self.statistics.messages_received += ready.len() as u64;
        ready
    }

    /// Confirms every bundle the header reports and retires confirmed reliables.
    fn process_acks(&mut self, header: &PacketHeader, now: Instant) {
        let mut confirmed_any = false;
        for ack in header.reported_acks() {
            let Some(confirmation) = self.bundles.confirm(ack, now) else {
                continue;
            };
            self.rtt.update(confirmation.round_trip);
            for id in confirmation.reliable_ids {
                confirmed_any |= self.send_window.confirm(id);
            }
        }
        if confirmed_any {
            let window = &self.send_window;
            self.sent_reliable.retain(|message| !window.is_confirmed(message.reliable_id));
        }
    }
}
