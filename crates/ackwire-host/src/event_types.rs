//! Events the session reports to the application.
//!
//! Events are pushed into a `crossbeam-channel` queue owned by the session and read through
//! `Session::recv` or a cloned receiver.

use std::net::SocketAddr;

use ackwire_protocol::{JoinDenyReason, Message};

/// Last failure recorded by a session.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Default)]
pub enum SessionErrorCode {
    /// Nothing went wrong.
    #[default]
    None,
    /// The socket could not be bound in `Session::start`.
    SocketCreationFailed,
    /// The host refused our join request.
    JoinDenied(JoinDenyReason),
    /// The host never answered our join request.
    JoinTimedOut,
    /// The host announced it is leaving.
    HostLeft,
    /// The host went silent for longer than the disconnect timeout.
    HostTimedOut,
}

/// Why a connection went away.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum DisconnectReason {
    /// The peer sent a leave message.
    Left,
    /// The peer was silent for longer than the disconnect timeout.
    TimedOut,
    /// We left the session ourselves.
    Closed,
}

/// Events that can occur and are pushed through the event channel.
#[derive(Debug, PartialEq)]
pub enum SessionEvent {
    /// A message of a type without handler was delivered.
    Message {
        /// Connection index of the sender, `None` for unconnected senders.
        sender: Option<u8>,
        /// Address the message came from.
        address: SocketAddr,
        /// The delivered message.
        message: Message,
    },
    /// A connection was established: a joiner on the host, the host on a joiner.
    Connected {
        /// Connection index of the new peer.
        index: u8,
        /// Its address.
        address: SocketAddr,
    },
    /// A connection was removed.
    Disconnected {
        /// Connection index of the peer.
        index: u8,
        /// Its address.
        address: SocketAddr,
        /// Why it went away.
        reason: DisconnectReason,
    },
    /// Our join attempt failed.
    JoinFailed(SessionErrorCode),
    /// An answer to `Session::ping` arrived.
    Pong(SocketAddr),
}
