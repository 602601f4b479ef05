//! In-memory datagram network shared by the host integration tests.
#![allow(dead_code)]

use std::{
    cell::RefCell,
    collections::{HashMap, HashSet, VecDeque},
    io,
    net::SocketAddr,
    rc::Rc,
    time::{Duration, Instant},
};

use ackwire_core::{config::Config, transport::Socket};
use ackwire_host::{DisconnectReason, Session, SessionEvent};
use ackwire_protocol::{CoreMessage, DefinitionRegistry};

#[derive(Default)]
struct NetworkState {
    inboxes: HashMap<SocketAddr, VecDeque<(SocketAddr, Vec<u8>)>>,
    blocked: HashSet<(SocketAddr, SocketAddr)>,
    /// Destinations whose sends fail with an I/O error
    unreachable: HashSet<SocketAddr>,
    /// Every datagram ever addressed to a destination, delivered or not
    sent: HashMap<SocketAddr, Vec<Vec<u8>>>,
}

/// A lossless network; links can be cut per direction.
#[derive(Clone, Default)]
pub struct Network {
    state: Rc<RefCell<NetworkState>>,
}

impl Network {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn socket(&self) -> MemorySocket {
        MemorySocket { network: self.clone(), address: None }
    }

    /// Silently drops everything `from` sends to `to`.
    pub fn block(&self, from: SocketAddr, to: SocketAddr) {
        self.state.borrow_mut().blocked.insert((from, to));
    }

    pub fn unblock(&self, from: SocketAddr, to: SocketAddr) {
        self.state.borrow_mut().blocked.remove(&(from, to));
    }

    /// Makes every send to `to` fail, as an unreachable host would.
    pub fn make_unreachable(&self, to: SocketAddr) {
        self.state.borrow_mut().unreachable.insert(to);
    }

    /// Datagrams addressed to `to` so far.
    pub fn sent_to(&self, to: SocketAddr) -> Vec<Vec<u8>> {
        self.state.borrow().sent.get(&to).cloned().unwrap_or_default()
    }
}

/// Socket bound into a [`Network`].
pub struct MemorySocket {
    network: Network,
    address: Option<SocketAddr>,
}

impl MemorySocket {
    fn bound_address(&self) -> io::Result<SocketAddr> {
        self.address
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotConnected, "socket is not bound"))
    }
}

impl Socket for MemorySocket {
    fn bind(&mut self, addr: SocketAddr) -> io::Result<()> {
        let mut state = self.network.state.borrow_mut();
        if state.inboxes.contains_key(&addr) {
            return Err(io::Error::new(io::ErrorKind::AddrInUse, "address in use"));
        }
        state.inboxes.insert(addr, VecDeque::new());
        self.address = Some(addr);
        Ok(())
    }

    fn is_bound(&self) -> bool {
        self.address.is_some()
    }

    fn send_packet(&mut self, addr: &SocketAddr, payload: &[u8]) -> io::Result<usize> {
        let from = self.bound_address()?;
        let mut state = self.network.state.borrow_mut();
        if state.unreachable.contains(addr) {
            return Err(io::Error::new(io::ErrorKind::ConnectionRefused, "host unreachable"));
        }
        state.sent.entry(*addr).or_default().push(payload.to_vec());
        if !state.blocked.contains(&(from, *addr)) {
            if let Some(inbox) = state.inboxes.get_mut(addr) {
                inbox.push_back((from, payload.to_vec()));
            }
        }
        Ok(payload.len())
    }

    fn receive_packet<'a>(&mut self, buffer: &'a mut [u8]) -> io::Result<(&'a [u8], SocketAddr)> {
        let address = self.bound_address()?;
        let next =
            self.network.state.borrow_mut().inboxes.get_mut(&address).and_then(VecDeque::pop_front);
        match next {
            Some((from, data)) => {
                let len = data.len().min(buffer.len());
                buffer[..len].copy_from_slice(&data[..len]);
                Ok((&buffer[..len], from))
            }
            None => Err(io::Error::new(io::ErrorKind::WouldBlock, "no datagram")),
        }
    }

    fn local_addr(&self) -> io::Result<SocketAddr> {
        self.bound_address()
    }

    fn is_blocking_mode(&self) -> bool {
        false
    }
}

impl Drop for MemorySocket {
    fn drop(&mut self) {
        if let Some(address) = self.address {
            self.network.state.borrow_mut().inboxes.remove(&address);
        }
    }
}

pub fn addr(port: u16) -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], port))
}

pub fn config(username: &str) -> Config {
    Config { username: username.to_owned(), ..Config::default() }
}

/// A session bound to `port`, ready to host or join.
pub fn started(network: &Network, config: Config, port: u16) -> Session<MemorySocket> {
    let mut session = Session::new(network.socket(), config);
    session.start(addr(port)).unwrap();
    session
}

/// Ticks every session each `step` for `duration`; returns the final time.
pub fn run_for(
    sessions: &mut [&mut Session<MemorySocket>],
    start: Instant,
    duration: Duration,
    step: Duration,
) -> Instant {
    let mut now = start;
    let ticks = duration.as_nanos() / step.as_nanos();
    for _ in 0..ticks {
        now += step;
        for session in sessions.iter_mut() {
            session.update(now);
        }
    }
    now
}

pub fn events(session: &Session<MemorySocket>) -> Vec<SessionEvent> {
    std::iter::from_fn(|| session.recv()).collect()
}

/// The event reported when the connection at `index`, bound to `port`, goes away.
pub fn disconnected(index: u8, port: u16, reason: DisconnectReason) -> SessionEvent {
    SessionEvent::Disconnected { index, address: addr(port), reason }
}

/// Registry with only the built-in types, for inspecting captured datagrams.
pub fn core_registry() -> DefinitionRegistry {
    let mut registry = DefinitionRegistry::new();
    for core in CoreMessage::ALL {
        registry.register(core.definition()).unwrap();
    }
    registry
}

/// A host, a client and the time the two finished connecting.
pub type Pair = (Session<MemorySocket>, Session<MemorySocket>, Instant);

/// Host on 9000 and one joined client on 9001.
pub fn connected_pair(
    network: &Network,
    host_config: Config,
    client_config: Config,
    now: Instant,
) -> Pair {
    let mut host = started(network, host_config, 9000);
    let mut client = started(network, client_config, 9001);
    host.host(now).unwrap();
    client.join(addr(9000), now).unwrap();
    let step = Duration::from_millis(10);
    let now = run_for(&mut [&mut host, &mut client], now, Duration::from_millis(200), step);
    assert!(client.local_index().is_some(), "client did not join: {:?}", client.last_error());
    (host, client, now)
}
