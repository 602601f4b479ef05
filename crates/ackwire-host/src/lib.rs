#![warn(missing_docs)]

//! ackwire-host: the session over a datagram socket.
//!
//! Holds the connection table, drives the host/join/leave handshake, dispatches received
//! messages to handlers and runs every connection's send cycle once per tick.

/// Event types (SessionEvent, SessionErrorCode).
pub mod event_types;
/// Observer hooks.
pub mod hooks;
/// The session and its handshake.
pub mod session;
/// Incoming loss and latency simulation.
pub mod simulation;
/// Default UDP socket.
pub mod socket;
/// Time sources for the tick loop.
pub mod time;

pub use ackwire_protocol::{JoinDenyReason, JoinRequest};
pub use event_types::{DisconnectReason, SessionErrorCode, SessionEvent};
pub use hooks::{NoOpHooks, Outbox, SessionHooks};
pub use session::{Session, SessionState};
pub use socket::UdpSocket;
pub use time::{Clock, SteppingClock, SystemClock};
