#![warn(missing_docs)]

//! ackwire-peer: per-connection delivery state machine.

/// Per-channel ordering of reliable sequenced messages.
pub mod channel_state;
mod connection;
/// Reliable id windows for both directions.
pub mod reliable_window;
/// Connection counters.
pub mod statistics;

pub use connection::Connection;
pub use statistics::ConnectionStatistics;
