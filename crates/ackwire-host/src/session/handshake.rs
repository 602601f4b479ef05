//! Host, join and leave.

use std::{net::SocketAddr, time::Instant};

use ackwire_core::{
    constants::{HOST_CONNECTION_INDEX, MAX_CONNECTIONS},
    error::{ErrorKind, Result},
    transport::Socket,
};
use ackwire_peer::Connection;
use ackwire_protocol::{
    core_messages::password_hash, CoreMessage, JoinAccept, JoinDeny, JoinDenyReason, JoinRequest,
};
use rand::Rng;
use tracing::{debug, info, trace, warn};

use super::{JoinAttempt, Session, SessionState};
use crate::event_types::{DisconnectReason, SessionErrorCode, SessionEvent};

impl<S: Socket> Session<S> {
    /// Becomes the host of a new session at index 0.
    pub fn host(&mut self, now: Instant) -> Result<()> {
        self.require_state(SessionState::Disconnected)?;
        self.set_state(SessionState::Hosting);
        let mut local = Connection::new(self.local_address(), &self.config, now);
        local.set_index(HOST_CONNECTION_INDEX);
        local.set_username(self.config.username.clone());
        self.connections[usize::from(HOST_CONNECTION_INDEX)] = Some(local);
        self.local_index = Some(HOST_CONNECTION_INDEX);
        self.last_error = SessionErrorCode::None;
        self.set_state(SessionState::Connected);
        info!("hosting on {}", self.local_address());
        Ok(())
    }

    /// Asks the host at `host_address` to let us in.
    ///
    /// The request is repeated every `join_retry_interval` until the host answers or
    /// `join_timeout` passes.
    pub fn join(&mut self, host_address: SocketAddr, now: Instant) -> Result<()> {
        self.require_state(SessionState::Disconnected)?;
        let host = Connection::new(host_address, &self.config, now);
        self.connections[usize::from(HOST_CONNECTION_INDEX)] = Some(host);
        self.last_error = SessionErrorCode::None;
        self.set_state(SessionState::Joining);
        let nuonce = self.rng.random::<u32>();
        self.join = Some(JoinAttempt { host_address, nuonce, started: now, last_sent: now });
        debug!("joining {} with nuonce {:#010x}", host_address, nuonce);
        self.send_join_request(now);
        Ok(())
    }

    /// Tells every other connection we are leaving and drops them all.
    ///
    /// Does nothing while disconnected.
    pub fn leave(&mut self, now: Instant) -> Result<()> {
        match self.state {
            SessionState::Disconnected => return Ok(()),
            SessionState::Setup | SessionState::Invalid => {
                return Err(ErrorKind::InvalidSessionState(self.state.name()));
            }
            _ => {}
        }
        let remote = self.remote_indexes();
        if let Some(local_index) = self.local_index {
            for &index in &remote {
                // Only the LEAVE itself goes out; anything still queued is abandoned.
                if let Some(connection) =
                    self.connections.get_mut(usize::from(index)).and_then(Option::as_mut)
                {
                    connection.clear();
                }
                let leave = self.send_to(index, CoreMessage::Leave.message_type(), Vec::new());
                if let Err(err) = leave {
                    warn!("Could not queue leave for connection {}: {}", index, err);
                }
                self.flush_connection(index, local_index, now);
            }
        }
        for index in remote {
            if let Some(address) = self.connection(index).map(Connection::address) {
                let reason = DisconnectReason::Closed;
                self.hooks.on_connection_left(index, address, reason);
                self.emit(SessionEvent::Disconnected { index, address, reason });
            }
        }
        info!("left the session");
        self.reset_to_disconnected();
        Ok(())
    }

    fn send_join_request(&mut self, now: Instant) {
        let Some(join) = self.join.as_mut() else {
            return;
        };
        join.last_sent = now;
        let host_address = join.host_address;
        let request = JoinRequest {
            version: self.version,
            nuonce: join.nuonce,
            username: self.config.username.clone(),
            password_hash: password_hash(&self.config.password),
        };
        let kind = CoreMessage::JoinRequest.kind();
        if let Err(err) = self.send_connectionless(host_address, kind, request.encode()) {
            warn!("Error sending join request to {}: {}", host_address, err);
        }
    }

    /// Repeats or abandons the outstanding join request.
    pub(super) fn update_join(&mut self, now: Instant) {
        let Some(join) = self.join else {
            return;
        };
        if self.state != SessionState::Joining {
            return;
        }
        if now.saturating_duration_since(join.started) >= self.config.join_timeout {
            warn!("join to {} timed out", join.host_address);
            self.fail_join(SessionErrorCode::JoinTimedOut);
        } else if now.saturating_duration_since(join.last_sent) >= self.config.join_retry_interval {
            trace!("repeating join request to {}", join.host_address);
            self.send_join_request(now);
        }
    }

    fn fail_join(&mut self, code: SessionErrorCode) {
        self.reset_to_disconnected();
        self.last_error = code;
        self.emit(SessionEvent::JoinFailed(code));
    }

    pub(super) fn on_join_request(&mut self, address: SocketAddr, payload: &[u8], now: Instant) {
        let request = match JoinRequest::decode(payload) {
            Ok(request) => request,
            Err(err) => {
                warn!("Dropping malformed join request from {}: {}", address, err);
                return;
            }
        };
        let guid = address.to_string();
        let repeated = self
            .connections
            .iter()
            .flatten()
            .any(|connection| {
                connection.index().is_some()
                    && connection.guid() == guid
                    && connection.nuonce() == request.nuonce
            });
        if repeated {
            trace!("ignoring repeated join request from {}", address);
            return;
        }
        match self.check_join(&request, address, &guid) {
            Ok(index) => self.accept_join(index, request, address, now),
            Err(reason) => {
                warn!("denying join from {}: {:?}", address, reason);
                let deny = JoinDeny { nuonce: request.nuonce, reason };
                let kind = CoreMessage::JoinDeny.kind();
                if let Err(err) = self.send_connectionless(address, kind, deny.encode()) {
                    warn!("Error sending join deny to {}: {}", address, err);
                }
            }
        }
    }

    /// Runs the join checks in order and returns the index to assign.
    fn check_join(
        &mut self,
        request: &JoinRequest,
        address: SocketAddr,
        guid: &str,
    ) -> std::result::Result<u8, JoinDenyReason> {
        if request.version != self.version {
            return Err(JoinDenyReason::WrongVersion);
        }
        if !self.is_host() {
            return Err(JoinDenyReason::NotHost);
        }
        if !self.accepting_joins {
            return Err(JoinDenyReason::NotAcceptingNewConnections);
        }
        let index = self.free_index().ok_or(JoinDenyReason::Full)?;
        if self.connections.iter().flatten().any(|connection| connection.guid() == guid) {
            return Err(JoinDenyReason::DuplicateGuid);
        }
        let password = &self.config.password;
        if !password.is_empty() && request.password_hash != password_hash(password) {
            return Err(JoinDenyReason::Rejected);
        }
        self.hooks.validate_join(request, address)?;
        Ok(index)
    }

    /// Lowest free non-host index.
    fn free_index(&self) -> Option<u8> {
        (1..MAX_CONNECTIONS)
            .find(|&slot| self.connections[slot].is_none())
            .and_then(|slot| u8::try_from(slot).ok())
    }

    fn accept_join(&mut self, index: u8, request: JoinRequest, address: SocketAddr, now: Instant) {
        let mut connection = Connection::new(address, &self.config, now);
        connection.set_index(index);
        connection.set_username(request.username.clone());
        connection.set_password_hash(request.password_hash);
        connection.set_nuonce(request.nuonce);
        self.connections[usize::from(index)] = Some(connection);

        let accept = JoinAccept {
            nuonce: request.nuonce,
            host_index: HOST_CONNECTION_INDEX,
            host_username: self.config.username.clone(),
            assigned_index: index,
        };
        let queued = self.send_to(index, CoreMessage::JoinAccept.message_type(), accept.encode());
        if let Err(err) = queued {
            warn!("Error queueing join accept for {}: {}", address, err);
        }
        info!("{} ({}) joined as connection {}", request.username, address, index);
        self.hooks.on_connection_joined(index, address, &request.username);
        self.emit(SessionEvent::Connected { index, address });
    }

    pub(super) fn on_join_accept(&mut self, address: SocketAddr, payload: &[u8], now: Instant) {
        let Some(join) = self.join.filter(|join| join.host_address == address) else {
            trace!("ignoring join accept from {}", address);
            return;
        };
        if self.state != SessionState::Joining {
            return;
        }
        let accept = match JoinAccept::decode(payload) {
            Ok(accept) => accept,
            Err(err) => {
                warn!("Dropping malformed join accept from {}: {}", address, err);
                return;
            }
        };
        if accept.nuonce != join.nuonce {
            debug!("ignoring join accept for another request");
            return;
        }
        let host_slot = usize::from(accept.host_index);
        let local_slot = usize::from(accept.assigned_index);
        let out_of_range = host_slot >= MAX_CONNECTIONS || local_slot >= MAX_CONNECTIONS;
        if out_of_range || host_slot == local_slot {
            warn!(
                "Dropping join accept with invalid indexes {} and {}",
                accept.host_index, accept.assigned_index
            );
            return;
        }
        let Some(mut host) = self.connections[usize::from(HOST_CONNECTION_INDEX)].take() else {
            return;
        };
        host.set_index(accept.host_index);
        host.set_username(accept.host_username.clone());
        self.connections[host_slot] = Some(host);

        let mut local = Connection::new(self.local_address(), &self.config, now);
        local.set_index(accept.assigned_index);
        local.set_username(self.config.username.clone());
        local.set_nuonce(join.nuonce);
        self.connections[local_slot] = Some(local);

        self.local_index = Some(accept.assigned_index);
        self.join = None;
        self.set_state(SessionState::Connected);
        info!("joined {} as connection {}", address, accept.assigned_index);
        self.hooks.on_connection_joined(accept.host_index, address, &accept.host_username);
        self.emit(SessionEvent::Connected { index: accept.host_index, address });
    }

    pub(super) fn on_join_deny(&mut self, address: SocketAddr, payload: &[u8]) {
        let Some(join) = self.join.filter(|join| join.host_address == address) else {
            return;
        };
        let deny = match JoinDeny::decode(payload) {
            Ok(deny) => deny,
            Err(err) => {
                warn!("Dropping malformed join deny from {}: {}", address, err);
                return;
            }
        };
        if deny.nuonce != join.nuonce {
            debug!("ignoring join deny for another request");
            return;
        }
        warn!("join refused by {}: {:?}", address, deny.reason);
        self.fail_join(SessionErrorCode::JoinDenied(deny.reason));
    }

    pub(super) fn on_leave(&mut self, sender: Option<u8>) {
        let Some(index) = sender else {
            return;
        };
        if Some(index) == self.local_index {
            return;
        }
        if index == HOST_CONNECTION_INDEX && !self.is_host() {
            info!("the host left the session");
            self.drop_host(SessionErrorCode::HostLeft, DisconnectReason::Left);
        } else {
            self.remove_connection(index, DisconnectReason::Left);
        }
    }

    /// Removes connections that stayed silent past the disconnect timeout.
    pub(super) fn check_timeouts(&mut self, now: Instant) {
        if !self.config.timeouts_enabled || self.state != SessionState::Connected {
            return;
        }
        let timed_out: Vec<u8> = self
            .remote_indexes()
            .into_iter()
            .filter(|&index| {
                self.connection(index).is_some_and(|connection| connection.is_timed_out(now))
            })
            .collect();
        for index in timed_out {
            if index == HOST_CONNECTION_INDEX && !self.is_host() {
                warn!("the host timed out");
                self.drop_host(SessionErrorCode::HostTimedOut, DisconnectReason::TimedOut);
                return;
            }
            warn!("connection {} timed out", index);
            self.remove_connection(index, DisconnectReason::TimedOut);
        }
    }

    /// Ends a joined session because the host went away.
    fn drop_host(&mut self, code: SessionErrorCode, reason: DisconnectReason) {
        if let Some(address) = self.connection(HOST_CONNECTION_INDEX).map(Connection::address) {
            self.hooks.on_connection_left(HOST_CONNECTION_INDEX, address, reason);
            self.emit(SessionEvent::Disconnected { index: HOST_CONNECTION_INDEX, address, reason });
        }
        self.reset_to_disconnected();
        self.last_error = code;
    }

    fn remove_connection(&mut self, index: u8, reason: DisconnectReason) {
        let Some(connection) = self.connections.get_mut(usize::from(index)).and_then(Option::take)
        else {
            return;
        };
        let address = connection.address();
        info!("connection {} ({}) removed: {:?}", index, address, reason);
        self.hooks.on_connection_left(index, address, reason);
        self.emit(SessionEvent::Disconnected { index, address, reason });
    }

    /// Drops every connection and pending message and returns to `Disconnected`.
    fn reset_to_disconnected(&mut self) {
        self.connections.iter_mut().for_each(|connection| *connection = None);
        self.local_index = None;
        self.join = None;
        self.loopback.clear();
        if self.state != SessionState::Disconnected {
            self.set_state(SessionState::Disconnected);
        }
    }
}
