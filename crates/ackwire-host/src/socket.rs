//! Default UDP transport.

use std::{
    io,
    net::{SocketAddr, UdpSocket as StdUdpSocket},
};

use ackwire_core::{config::Config, transport::Socket};
use socket2::Socket as Socket2;
use tracing::debug;

/// Applies buffer sizes to a freshly bound socket.
fn apply_socket_options(socket: &StdUdpSocket, options: &SocketOptions) -> io::Result<()> {
    // Create socket2::Socket from UdpSocket for advanced options
    let socket2 = Socket2::from(socket.try_clone()?);

    if let Some(size) = options.recv_buffer_size {
        socket2.set_recv_buffer_size(size)?;
    }
    if let Some(size) = options.send_buffer_size {
        socket2.set_send_buffer_size(size)?;
    }
    Ok(())
}

#[derive(Debug, Clone, Copy)]
struct SocketOptions {
    blocking_mode: bool,
    port_range: u16,
    recv_buffer_size: Option<usize>,
    send_buffer_size: Option<usize>,
}

/// UDP socket bound lazily by `Session::start`.
///
/// When the requested port is taken, the next `port_range - 1` ports are tried in turn.
#[derive(Debug)]
pub struct UdpSocket {
    options: SocketOptions,
    socket: Option<StdUdpSocket>,
}

impl UdpSocket {
    /// Creates an unbound socket configured from `config`.
    pub fn new(config: &Config) -> Self {
        Self {
            options: SocketOptions {
                blocking_mode: config.blocking_mode,
                port_range: config.port_range.max(1),
                recv_buffer_size: config.socket_recv_buffer_size,
                send_buffer_size: config.socket_send_buffer_size,
            },
            socket: None,
        }
    }

    fn bound(&self) -> io::Result<&StdUdpSocket> {
        self.socket
            .as_ref()
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotConnected, "socket is not bound"))
    }
}

impl Socket for UdpSocket {
    fn bind(&mut self, addr: SocketAddr) -> io::Result<()> {
        // An ephemeral port request gets exactly one attempt.
        let attempts = if addr.port() == 0 { 1 } else { self.options.port_range };
        let mut last_error = io::Error::new(io::ErrorKind::AddrInUse, "no port available");
        for offset in 0..attempts {
            let Some(port) = addr.port().checked_add(offset) else {
                break;
            };
            let mut candidate = addr;
            candidate.set_port(port);
            match StdUdpSocket::bind(candidate) {
                Ok(socket) => {
                    apply_socket_options(&socket, &self.options)?;
                    socket.set_nonblocking(!self.options.blocking_mode)?;
                    debug!("bound udp socket to {}", candidate);
                    self.socket = Some(socket);
                    return Ok(());
                }
                Err(error) if error.kind() == io::ErrorKind::AddrInUse => {
                    debug!("port {} is taken, trying the next one", port);
                    last_error = error;
                }
                Err(error) => return Err(error),
            }
        }
        Err(last_error)
    }

    fn is_bound(&self) -> bool {
        self.socket.is_some()
    }

    fn send_packet(&mut self, addr: &SocketAddr, payload: &[u8]) -> io::Result<usize> {
        self.bound()?.send_to(payload, addr)
    }

    fn receive_packet<'a>(&mut self, buffer: &'a mut [u8]) -> io::Result<(&'a [u8], SocketAddr)> {
        self.bound()?
            .recv_from(buffer)
            .map(move |(recv_len, address)| (&buffer[..recv_len], address))
    }

    fn local_addr(&self) -> io::Result<SocketAddr> {
        self.bound()?.local_addr()
    }

    fn is_blocking_mode(&self) -> bool {
        self.options.blocking_mode
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn loopback(port: u16) -> SocketAddr {
        SocketAddr::from(([127, 0, 0, 1], port))
    }

    #[test]
    fn test_unbound_socket_reports_errors() {
        let mut socket = UdpSocket::new(&Config::default());
        assert!(!socket.is_bound());
        assert!(socket.local_addr().is_err());
        assert!(socket.send_packet(&loopback(9), &[1]).is_err());
    }

    #[test]
    fn test_send_and_receive_on_loopback() {
        let mut socket = UdpSocket::new(&Config::default());
        socket.bind(loopback(0)).unwrap();
        let address = socket.local_addr().unwrap();

        socket.send_packet(&address, &[1, 2, 3]).unwrap();
        let mut buffer = [0u8; 64];
        let mut received = None;
        for _ in 0..100 {
            match socket.receive_packet(&mut buffer) {
                Ok((data, from)) => {
                    received = Some((data.to_vec(), from));
                    break;
                }
                Err(error) if error.kind() == io::ErrorKind::WouldBlock => {
                    std::thread::sleep(std::time::Duration::from_millis(5));
                }
                Err(error) => panic!("receive failed: {}", error),
            }
        }
        assert_eq!(received, Some((vec![1, 2, 3], address)));
    }

    #[test]
    fn test_taken_port_falls_through_the_range() {
        let blocker = StdUdpSocket::bind(loopback(0)).unwrap();
        let taken = blocker.local_addr().unwrap().port();
        if taken > u16::MAX - 8 {
            return;
        }

        let mut socket = UdpSocket::new(&Config::default());
        socket.bind(loopback(taken)).unwrap();
        let port = socket.local_addr().unwrap().port();
        assert!(port > taken && port < taken + 8, "bound to {}", port);
    }

    #[test]
    fn test_empty_receive_would_block() {
        let mut socket = UdpSocket::new(&Config::default());
        socket.bind(loopback(0)).unwrap();
        let mut buffer = [0u8; 16];
        let error = socket.receive_packet(&mut buffer).unwrap_err();
        assert_eq!(error.kind(), io::ErrorKind::WouldBlock);
    }
}
