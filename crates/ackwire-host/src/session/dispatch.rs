//! Receive pump, message dispatch and the per-tick send cycle.

use std::{io, mem, net::SocketAddr, time::Instant};

use ackwire_core::transport::Socket;
use ackwire_protocol::{
    core_messages::decode_ping, decode_packet, CoreMessage, Message, MessageContext, MessageTarget,
    OutgoingMessage,
};
use tracing::{error, trace, warn};

use super::Session;
use crate::{event_types::SessionEvent, hooks::Outbox};

impl<S: Socket> Session<S> {
    /// Reads every pending datagram, through the network simulation when enabled.
    pub(super) fn pump_socket(&mut self, now: Instant) {
        let mut buffer = mem::take(&mut self.receive_buffer);
        loop {
            match self.socket.receive_packet(&mut buffer) {
                Ok((payload, address)) => {
                    let payload = payload.to_vec();
                    match self.simulator.as_mut() {
                        Some(simulator) => simulator.submit(address, payload, now),
                        None => self.handle_datagram(address, &payload, now),
                    }
                }
                Err(e) => {
                    if e.kind() != io::ErrorKind::WouldBlock {
                        error!("Encountered an error receiving data: {:?}", e);
                    }
                    break;
                }
            }
            if self.socket.is_blocking_mode() {
                break;
            }
        }
        self.receive_buffer = buffer;

        if let Some(simulator) = self.simulator.as_mut() {
            let due = simulator.release(now);
            for (address, payload) in due {
                self.handle_datagram(address, &payload, now);
            }
        }
    }

    fn handle_datagram(&mut self, address: SocketAddr, datagram: &[u8], now: Instant) {
        let packet = match decode_packet(datagram, &self.registry) {
            Ok(packet) => packet,
            Err(err) => {
                self.invalid_packets += 1;
                trace!("Dropping datagram from {}: {}", address, err);
                return;
            }
        };

        let Some(slot) = self.slot_by_address(address) else {
            // Only connectionless messages make sense from strangers.
            for message in packet.messages {
                if message.kind().is_connectionless() {
                    self.dispatch(message, address, None, now);
                } else {
                    self.unknown_sender_messages += 1;
                    trace!(
                        "Dropping message of type {} from unknown sender {}",
                        message.message_type(),
                        address
                    );
                }
            }
            return;
        };
        let Some(connection) = self.connections[slot].as_mut() else {
            return;
        };
        let ready = connection.receive(packet, datagram.len(), now);
        for message in ready {
            // A join accept earlier in the packet may have moved the connection.
            let sender = self.sender_index(address);
            self.dispatch(message, address, sender, now);
        }
    }

    /// Delivers messages we sent to our own index.
    pub(super) fn deliver_loopback(&mut self, now: Instant) {
        let pending: Vec<Message> = self.loopback.drain(..).collect();
        let address = self.local_address();
        for message in pending {
            let sender = self.local_index;
            self.dispatch(message, address, sender, now);
        }
    }

    fn dispatch(
        &mut self,
        message: Message,
        address: SocketAddr,
        sender: Option<u8>,
        now: Instant,
    ) {
        match CoreMessage::from_type(message.message_type()) {
            Some(CoreMessage::Ping) => {
                let text = decode_ping(message.payload()).unwrap_or_default();
                trace!("ping from {}: {:?}", address, text);
                let pong = self.send_connectionless(address, CoreMessage::Pong.kind(), Vec::new());
                if let Err(err) = pong {
                    warn!("Error answering ping from {}: {}", address, err);
                }
            }
            Some(CoreMessage::Pong) => self.emit(SessionEvent::Pong(address)),
            Some(CoreMessage::JoinRequest) => self.on_join_request(address, message.payload(), now),
            Some(CoreMessage::JoinDeny) => self.on_join_deny(address, message.payload()),
            Some(CoreMessage::JoinAccept) => self.on_join_accept(address, message.payload(), now),
            Some(CoreMessage::Leave) => self.on_leave(sender),
            None => self.dispatch_to_handler(message, address, sender, now),
        }
    }

    /// Runs the definition's handler, or reports the message as an event when it has none.
    fn dispatch_to_handler(
        &mut self,
        message: Message,
        address: SocketAddr,
        sender: Option<u8>,
        now: Instant,
    ) {
        let message_type = message.message_type();
        let has_handler =
            self.registry.get(message_type).is_some_and(|definition| definition.has_handler());
        if !has_handler {
            self.emit(SessionEvent::Message { sender, address, message });
            return;
        }
        let local_index = self.local_index;
        let mut outgoing = Vec::new();
        if let Some(handler) = self.registry.handler_mut(message_type) {
            let mut context = MessageContext::new(address, sender, local_index, now, &mut outgoing);
            handler(&message, &mut context);
        }
        self.send_outgoing(outgoing, address, sender);
    }

    /// Sends what a handler queued.
    fn send_outgoing(
        &mut self,
        outgoing: Vec<OutgoingMessage>,
        address: SocketAddr,
        sender: Option<u8>,
    ) {
        for OutgoingMessage { target, message_type, payload } in outgoing {
            let connectionless =
                self.registry.kind(message_type).is_some_and(|kind| kind.is_connectionless());
            let result = match target {
                MessageTarget::Reply => match sender {
                    Some(index) if !connectionless => self.send_to(index, message_type, payload),
                    _ => self.send_to_address(address, message_type, payload),
                },
                MessageTarget::Connection(index) => self.send_to(index, message_type, payload),
                MessageTarget::Broadcast => self.broadcast(message_type, payload).map(|_| ()),
                MessageTarget::Address(target) => {
                    self.send_to_address(target, message_type, payload)
                }
            };
            if let Err(err) = result {
                warn!("Dropping message of type {} queued by a handler: {}", message_type, err);
            }
        }
    }

    /// Gives the hooks a chance to add messages, then flushes every remote connection.
    pub(super) fn flush_connections(&mut self, now: Instant) {
        let Some(local_index) = self.local_index else {
            return;
        };
        for index in self.remote_indexes() {
            let mut outbox = Outbox::new();
            self.hooks.prepare_packet(index, &mut outbox);
            for (message_type, payload) in outbox.into_messages() {
                if let Err(err) = self.send_to(index, message_type, payload) {
                    warn!(
                        "Dropping message of type {} queued for connection {}: {}",
                        message_type, index, err
                    );
                }
            }
            self.flush_connection(index, local_index, now);
        }
    }

    pub(super) fn flush_connection(&mut self, index: u8, local_index: u8, now: Instant) {
        let Some(connection) =
            self.connections.get_mut(usize::from(index)).and_then(Option::as_mut)
        else {
            return;
        };
        let address = connection.address();
        for datagram in connection.flush(local_index, now) {
            if let Err(err) = self.socket.send_packet(&address, &datagram) {
                error!("Error occured sending a packet (to {}): {}", address, err);
            }
        }
    }
}
