//! Observer hooks invoked synchronously by the session.
//!
//! Every method has a default, so implementors only override what they need.

use std::net::SocketAddr;

use ackwire_protocol::{JoinDenyReason, JoinRequest};

use crate::event_types::DisconnectReason;

/// Messages a hook queues for one connection.
#[derive(Debug, Default)]
pub struct Outbox {
    messages: Vec<(u8, Vec<u8>)>,
}

impl Outbox {
    /// Creates an empty outbox.
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues a message of a registered type.
    pub fn push(&mut self, message_type: u8, payload: Vec<u8>) {
        self.messages.push((message_type, payload));
    }

    /// Number of queued messages.
    pub fn len(&self) -> usize {
        self.messages.len()
    }

    /// Returns true when nothing is queued.
    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub(crate) fn into_messages(self) -> Vec<(u8, Vec<u8>)> {
        self.messages
    }
}

/// Trait for observing and steering a session.
///
/// # Examples
/// ```
/// use std::net::SocketAddr;
/// use ackwire_host::{hooks::SessionHooks, JoinDenyReason, JoinRequest};
///
/// struct Whitelist(Vec<String>);
///
/// impl SessionHooks for Whitelist {
///     fn validate_join(
///         &mut self,
///         request: &JoinRequest,
///         _address: SocketAddr,
///     ) -> Result<(), JoinDenyReason> {
///         if self.0.contains(&request.username) {
///             Ok(())
///         } else {
///             Err(JoinDenyReason::Rejected)
///         }
///     }
/// }
/// ```
pub trait SessionHooks {
    /// Called for every remote connection right before its send cycle, so state updates can
    /// be queued into the packet about to be built.
    fn prepare_packet(&mut self, _index: u8, _outbox: &mut Outbox) {}

    /// Called on the host after the built-in join checks passed. Returning an error refuses
    /// the join with that reason.
    fn validate_join(
        &mut self,
        _request: &JoinRequest,
        _address: SocketAddr,
    ) -> Result<(), JoinDenyReason> {
        Ok(())
    }

    /// Called when a connection is established.
    fn on_connection_joined(&mut self, _index: u8, _address: SocketAddr, _username: &str) {}

    /// Called once when a connection goes away.
    fn on_connection_left(&mut self, _index: u8, _address: SocketAddr, _reason: DisconnectReason) {}
}

/// Hooks that do nothing.
///
/// This is the default when none are specified.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoOpHooks;

impl SessionHooks for NoOpHooks {}
