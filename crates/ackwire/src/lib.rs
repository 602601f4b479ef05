#![warn(missing_docs)]

//! ackwire: reliable, sequenced messaging over UDP for real-time multiplayer games.
//!
//! This crate re-exports the surface most games need:
//!
//! - The session and its events (`Session`, `SessionEvent`, `SessionState`)
//! - Message definitions (`MessageDefinition`, `MessageKind`) and handler context
//! - Payload helpers (`PayloadReader`, `PayloadWriter`)
//! - Configuration (`Config`) and the default `UdpSocket`
//!
//! Example
//! ```no_run
//! use std::time::Instant;
//! use ackwire::{Config, MessageDefinition, MessageKind, Session, SessionEvent, UdpSocket};
//!
//! let config = Config::default();
//! let mut session = Session::new(UdpSocket::new(&config), config);
//! let chat = MessageKind::new(32).reliable().sequenced(1);
//! session.register(MessageDefinition::new("chat", chat)).unwrap();
//! session.start("0.0.0.0:7777".parse().unwrap()).unwrap();
//! session.host(Instant::now()).unwrap();
//!
//! loop {
//!     session.update(Instant::now());
//!     while let Some(event) = session.recv() {
//!         if let SessionEvent::Message { sender, message, .. } = event {
//!             println!("{:?} says {:?}", sender, message.payload());
//!         }
//!     }
//!     # break;
//! }
//! ```

// Core config and errors
pub use ackwire_core::{
    config::Config,
    error::{ErrorKind, Result},
};
// Session: connection table, handshake and events
pub use ackwire_host::{
    Clock, DisconnectReason, NoOpHooks, Outbox, Session, SessionErrorCode, SessionEvent,
    SessionHooks, SessionState, SteppingClock, SystemClock, UdpSocket,
};
// Protocol: definitions, messages and payloads
pub use ackwire_protocol::{
    JoinDenyReason, JoinRequest, Message, MessageContext, MessageDefinition, MessageKind,
    PayloadReader, PayloadWriter,
};

/// Convenience prelude with the most commonly used items.
pub mod prelude {
    pub use crate::{
        Config, Message, MessageContext, MessageDefinition, MessageKind, PayloadReader,
        PayloadWriter, Session, SessionEvent, SessionHooks, SessionState, UdpSocket,
    };
}
