//! Transport abstraction for pluggable I/O.

use std::{io::Result, net::SocketAddr};

/// Low-level datagram socket abstraction.
///
/// This trait allows various transports (UDP, in-memory test networks, etc.) to be plugged
/// into the session without coupling to a concrete implementation. The session owns its
/// socket and binds it in `Session::start`.
pub trait Socket {
    /// Binds the socket to the given address.
    fn bind(&mut self, addr: SocketAddr) -> Result<()>;

    /// Returns whether `bind` has succeeded.
    fn is_bound(&self) -> bool;

    /// Sends a single packet to the socket.
    fn send_packet(&mut self, addr: &SocketAddr, payload: &[u8]) -> Result<usize>;

    /// Receives a single packet from the socket.
    ///
    /// A non-blocking socket with nothing to read returns `io::ErrorKind::WouldBlock`.
    fn receive_packet<'a>(&mut self, buffer: &'a mut [u8]) -> Result<(&'a [u8], SocketAddr)>;

    /// Returns the socket address that this socket is bound to.
    fn local_addr(&self) -> Result<SocketAddr>;

    /// Returns whether socket operates in blocking or non-blocking mode.
    fn is_blocking_mode(&self) -> bool;
}
