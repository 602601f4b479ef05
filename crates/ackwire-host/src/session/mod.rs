use std::{
    collections::VecDeque,
    fmt,
    net::SocketAddr,
    thread::{sleep, yield_now},
    time::{Duration, Instant},
};

use ackwire_core::{
    config::Config,
    constants::{
        FIRST_USER_MESSAGE_TYPE, HOST_CONNECTION_INDEX, INVALID_CONNECTION_INDEX, MAX_CONNECTIONS,
        MAX_ENCODED_MESSAGE_SIZE, PACKET_HEADER_SIZE,
    },
    error::{ErrorKind, Result},
    transport::Socket,
};
use ackwire_peer::Connection;
use ackwire_protocol::{
    core_messages::{compatibility_version, encode_ping},
    AckId, CoreMessage, DefinitionRegistry, Message, MessageDefinition, MessageKind, PacketBuilder,
    PacketHeader,
};
use crossbeam_channel::{unbounded, Receiver, Sender};
use rand::{rngs::StdRng, SeedableRng};
use tracing::{debug, error, info, warn};

use crate::{
    event_types::{SessionErrorCode, SessionEvent},
    hooks::{NoOpHooks, SessionHooks},
    simulation::NetworkSimulator,
    time::Clock,
};

mod dispatch;
mod handshake;

/// Lifecycle of a session.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum SessionState {
    /// The socket could not be bound; the session is unusable.
    Invalid,
    /// Definitions may still be registered.
    Setup,
    /// Bound, neither hosting nor joined.
    Disconnected,
    /// Becoming the host.
    Hosting,
    /// Waiting for the host to answer our join request.
    Joining,
    /// Part of a session, as host or joiner.
    Connected,
}

impl SessionState {
    /// Lower-case name used in error messages.
    pub fn name(self) -> &'static str {
        match self {
            SessionState::Invalid => "invalid",
            SessionState::Setup => "setup",
            SessionState::Disconnected => "disconnected",
            SessionState::Hosting => "hosting",
            SessionState::Joining => "joining",
            SessionState::Connected => "connected",
        }
    }
}

/// Outstanding join request.
#[derive(Copy, Clone, Debug)]
struct JoinAttempt {
    host_address: SocketAddr,
    nuonce: u32,
    started: Instant,
    last_sent: Instant,
}

/// A game session over a datagram socket.
///
/// Owns the connection table (slot = connection index), the message registry and the
/// handshake state. Nothing happens on its own: the application calls [`Session::update`]
/// once per tick, or hands control to [`Session::run`].
pub struct Session<S: Socket> {
    socket: S,
    config: Config,
    state: SessionState,
    last_error: SessionErrorCode,
    registry: DefinitionRegistry,
    /// Compatibility version, fixed by `start`
    version: u64,
    connections: Vec<Option<Connection>>,
    local_index: Option<u8>,
    join: Option<JoinAttempt>,
    accepting_joins: bool,
    /// Messages we sent to our own index, dispatched on the next update
    loopback: VecDeque<Message>,
    hooks: Box<dyn SessionHooks>,
    simulator: Option<NetworkSimulator>,
    rng: StdRng,
    receive_buffer: Vec<u8>,
    event_sender: Sender<SessionEvent>,
    event_receiver: Receiver<SessionEvent>,
    invalid_packets: u64,
    unknown_sender_messages: u64,
}

impl<S: Socket> Session<S> {
    /// Creates a session in the `Setup` state with the built-in definitions registered.
    pub fn new(socket: S, config: Config) -> Self {
        Self::with_hooks(socket, config, Box::new(NoOpHooks))
    }

    /// Creates a session that reports to `hooks`.
    pub fn with_hooks(socket: S, config: Config, hooks: Box<dyn SessionHooks>) -> Self {
        let mut registry = DefinitionRegistry::new();
        for core in CoreMessage::ALL {
            let registered = registry.register(core.definition());
            debug_assert!(registered.is_ok());
        }
        let simulator = config.simulation_enabled().then(|| NetworkSimulator::new(&config));
        let (event_sender, event_receiver) = unbounded();
        Self {
            socket,
            receive_buffer: vec![0; config.receive_buffer_max_size],
            state: SessionState::Setup,
            last_error: SessionErrorCode::None,
            registry,
            version: 0,
            connections: (0..MAX_CONNECTIONS).map(|_| None).collect(),
            local_index: None,
            join: None,
            accepting_joins: true,
            loopback: VecDeque::new(),
            hooks,
            simulator,
            rng: StdRng::from_os_rng(),
            event_sender,
            event_receiver,
            invalid_packets: 0,
            unknown_sender_messages: 0,
            config,
        }
    }

    /// Adds an application message definition. Only allowed during `Setup`.
    pub fn register(&mut self, definition: MessageDefinition) -> Result<()> {
        if self.state != SessionState::Setup {
            return Err(ErrorKind::RegistrationClosed);
        }
        if definition.kind().message_type() < FIRST_USER_MESSAGE_TYPE {
            return Err(ErrorKind::InvalidDefinition("message types below 32 are reserved"));
        }
        self.registry.register(definition)
    }

    /// Freezes the registry and binds the socket to `address`.
    pub fn start(&mut self, address: SocketAddr) -> Result<()> {
        self.require_state(SessionState::Setup)?;
        self.registry.lock();
        self.version =
            compatibility_version(self.config.game_version, self.registry.definition_hash());
        match self.socket.bind(address) {
            Ok(()) => {
                info!("session started on {}", self.local_address());
                self.set_state(SessionState::Disconnected);
                Ok(())
            }
            Err(err) => {
                error!("Failed to bind the session socket to {}: {}", address, err);
                self.last_error = SessionErrorCode::SocketCreationFailed;
                self.set_state(SessionState::Invalid);
                Err(err.into())
            }
        }
    }

    /// Runs one tick: receive, loopback, join retry, timeouts, then the send cycle of every
    /// remote connection.
    pub fn update(&mut self, now: Instant) {
        if matches!(self.state, SessionState::Setup | SessionState::Invalid) {
            return;
        }
        self.pump_socket(now);
        self.deliver_loopback(now);
        self.update_join(now);
        self.check_timeouts(now);
        self.flush_connections(now);
    }

    /// Calls `update` with the time of `clock` until `keep_running` returns false, sleeping
    /// `interval` between ticks (yielding when `None`).
    pub fn run<C: Clock>(
        &mut self,
        clock: &C,
        interval: Option<Duration>,
        mut keep_running: impl FnMut(&mut Self) -> bool,
    ) {
        while keep_running(self) {
            self.update(clock.now());
            match interval {
                None => yield_now(),
                Some(duration) => sleep(duration),
            }
        }
    }

    /// Queues a message for the connection at `index`.
    ///
    /// Sending to our own index delivers the message locally on the next update.
    pub fn send_to(&mut self, index: u8, message_type: u8, payload: Vec<u8>) -> Result<()> {
        let kind = self.registry.require_kind(message_type)?;
        let local_index =
            self.local_index.ok_or(ErrorKind::InvalidSessionState(self.state.name()))?;
        if index == local_index {
            let mut message = Message::new(kind, payload);
            message.sender_index = local_index;
            self.loopback.push_back(message);
            return Ok(());
        }
        let connection = self
            .connections
            .get_mut(usize::from(index))
            .and_then(Option::as_mut)
            .filter(|connection| connection.index() == Some(index))
            .ok_or(ErrorKind::UnknownConnection(index))?;
        if kind.is_connectionless() {
            let address = connection.address();
            return self.send_connectionless(address, kind, payload);
        }
        let mut message = Message::new(kind, payload);
        message.sender_index = local_index;
        connection.send(message)
    }

    /// Queues a message for every remote connection. Returns how many were addressed.
    ///
    /// A connection that refuses the message does not stop the others; the first error is
    /// returned once every connection was tried.
    pub fn broadcast(&mut self, message_type: u8, payload: Vec<u8>) -> Result<usize> {
        let indexes = self.remote_indexes();
        let mut first_error = None;
        for &index in &indexes {
            if let Err(err) = self.send_to(index, message_type, payload.clone()) {
                warn!("broadcast to connection {} failed: {}", index, err);
                first_error.get_or_insert(err);
            }
        }
        first_error.map_or(Ok(indexes.len()), Err)
    }

    /// Sends a connectionless message straight to `address`.
    pub fn send_to_address(
        &mut self,
        address: SocketAddr,
        message_type: u8,
        payload: Vec<u8>,
    ) -> Result<()> {
        let kind = self.registry.require_kind(message_type)?;
        if !kind.is_connectionless() {
            return Err(ErrorKind::ConnectionRequired(message_type));
        }
        if !self.socket.is_bound() {
            return Err(ErrorKind::InvalidSessionState(self.state.name()));
        }
        self.send_connectionless(address, kind, payload)
    }

    /// Sends a built-in PING to `address`; the answer arrives as `SessionEvent::Pong`.
    pub fn ping(&mut self, address: SocketAddr, text: &str) -> Result<()> {
        self.send_to_address(address, CoreMessage::Ping.message_type(), encode_ping(text))
    }

    /// Takes the next pending event, if any.
    pub fn recv(&self) -> Option<SessionEvent> {
        self.event_receiver.try_recv().ok()
    }

    /// Returns a receiver for session events.
    pub fn event_receiver(&self) -> Receiver<SessionEvent> {
        self.event_receiver.clone()
    }

    /// Current state.
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Last recorded failure.
    pub fn last_error(&self) -> SessionErrorCode {
        self.last_error
    }

    /// Our connection index, `None` until hosting or joined.
    pub fn local_index(&self) -> Option<u8> {
        self.local_index
    }

    /// Returns true while we are the connected host.
    pub fn is_host(&self) -> bool {
        self.state == SessionState::Connected && self.local_index == Some(HOST_CONNECTION_INDEX)
    }

    /// Connection with an assigned `index`, including our own.
    pub fn connection(&self, index: u8) -> Option<&Connection> {
        self.connections
            .get(usize::from(index))
            .and_then(Option::as_ref)
            .filter(|connection| connection.index() == Some(index))
    }

    /// Every connection with an assigned index, including our own.
    pub fn connections(&self) -> impl Iterator<Item = &Connection> {
        self.connections.iter().flatten().filter(|connection| connection.index().is_some())
    }

    /// Number of connections other than our own.
    pub fn remote_connection_count(&self) -> usize {
        self.remote_indexes().len()
    }

    /// Compatibility version exchanged during joins. Zero before `start`.
    pub fn version(&self) -> u64 {
        self.version
    }

    /// Registered message definitions.
    pub fn registry(&self) -> &DefinitionRegistry {
        &self.registry
    }

    /// Session configuration.
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Whether join requests are considered.
    pub fn is_accepting_joins(&self) -> bool {
        self.accepting_joins
    }

    /// Toggles whether the host accepts new joins.
    pub fn set_accepting_joins(&mut self, accepting: bool) {
        self.accepting_joins = accepting;
    }

    /// Local address of the bound socket.
    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.socket.local_addr()?)
    }

    /// Datagrams that failed to decode.
    pub fn invalid_packets(&self) -> u64 {
        self.invalid_packets
    }

    /// Connection-bound messages received from addresses without a connection.
    pub fn unknown_sender_messages(&self) -> u64 {
        self.unknown_sender_messages
    }

    /// Returns a reference to the underlying socket.
    pub fn socket(&self) -> &S {
        &self.socket
    }

    /// Changes state. Transitioning to the current state is a bug in the caller.
    fn set_state(&mut self, state: SessionState) {
        assert_ne!(self.state, state, "session is already {}", state.name());
        debug!("session {} -> {}", self.state.name(), state.name());
        self.state = state;
    }

    fn require_state(&self, state: SessionState) -> Result<()> {
        if self.state == state {
            Ok(())
        } else {
            Err(ErrorKind::InvalidSessionState(self.state.name()))
        }
    }

    fn local_address(&self) -> SocketAddr {
        self.socket.local_addr().unwrap_or_else(|_| SocketAddr::from(([0, 0, 0, 0], 0)))
    }

    /// Assigned indexes other than ours, ascending.
    fn remote_indexes(&self) -> Vec<u8> {
        self.connections
            .iter()
            .flatten()
            .filter_map(Connection::index)
            .filter(|&index| Some(index) != self.local_index)
            .collect()
    }

    /// Slot of the remote connection at `address`, assigned or not.
    fn slot_by_address(&self, address: SocketAddr) -> Option<usize> {
        self.connections.iter().enumerate().find_map(|(slot, connection)| {
            let connection = connection.as_ref()?;
            let is_local = self.local_index.is_some() && connection.index() == self.local_index;
            (connection.address() == address && !is_local).then_some(slot)
        })
    }

    fn sender_index(&self, address: SocketAddr) -> Option<u8> {
        self.slot_by_address(address)
            .and_then(|slot| self.connections[slot].as_ref())
            .and_then(Connection::index)
    }

    /// Sends one message in a packet of its own, outside of any connection.
    fn send_connectionless(
        &mut self,
        address: SocketAddr,
        kind: MessageKind,
        payload: Vec<u8>,
    ) -> Result<()> {
        let message = Message::new(kind, payload);
        let mut builder = PacketBuilder::new(self.config.max_packet_size);
        if !builder.push(&message) {
            return Err(ErrorKind::PayloadTooLarge {
                size: message.encoded_size(),
                max: self
                    .config
                    .max_packet_size
                    .saturating_sub(PACKET_HEADER_SIZE)
                    .min(MAX_ENCODED_MESSAGE_SIZE),
            });
        }
        let from_index = self.local_index.unwrap_or(INVALID_CONNECTION_INDEX);
        let datagram = builder.finish(PacketHeader::new(from_index, AckId::INVALID));
        self.socket.send_packet(&address, &datagram)?;
        Ok(())
    }

    fn emit(&self, event: SessionEvent) {
        // The session holds a receiver, so the channel never disconnects.
        let _ = self.event_sender.send(event);
    }
}

impl<S: Socket> fmt::Debug for Session<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("state", &self.state)
            .field("last_error", &self.last_error)
            .field("local_index", &self.local_index)
            .field("connections", &self.connections.iter().flatten().collect::<Vec<_>>())
            .field("registry", &self.registry)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::io;

    use super::*;

    /// Socket that accepts everything and never receives.
    struct NullSocket {
        bound: bool,
    }

    impl Socket for NullSocket {
        fn bind(&mut self, _addr: SocketAddr) -> io::Result<()> {
            self.bound = true;
            Ok(())
        }

        fn is_bound(&self) -> bool {
            self.bound
        }

        fn send_packet(&mut self, _addr: &SocketAddr, payload: &[u8]) -> io::Result<usize> {
            Ok(payload.len())
        }

        fn receive_packet<'a>(
            &mut self,
            _buffer: &'a mut [u8],
        ) -> io::Result<(&'a [u8], SocketAddr)> {
            Err(io::Error::new(io::ErrorKind::WouldBlock, "empty"))
        }

        fn local_addr(&self) -> io::Result<SocketAddr> {
            Ok(SocketAddr::from(([127, 0, 0, 1], 4000)))
        }

        fn is_blocking_mode(&self) -> bool {
            false
        }
    }

    fn session() -> Session<NullSocket> {
        Session::new(NullSocket { bound: false }, Config::default())
    }

    #[test]
    fn test_new_session_knows_the_core_types() {
        let session = session();
        assert_eq!(session.state(), SessionState::Setup);
        assert_eq!(session.registry().len(), CoreMessage::ALL.len());
        assert_eq!(session.version(), 0);
        assert!(!session.registry().is_locked());
    }

    #[test]
    fn test_start_locks_the_registry() {
        let mut session = session();
        session.start(SocketAddr::from(([127, 0, 0, 1], 4000))).unwrap();
        assert_eq!(session.state(), SessionState::Disconnected);
        assert!(session.registry().is_locked());
        assert_eq!(session.version() >> 48, 1);
    }

    #[test]
    fn test_definitions_change_the_version() {
        let address = SocketAddr::from(([127, 0, 0, 1], 4000));
        let mut plain = session();
        plain.start(address).unwrap();
        let mut extended = session();
        extended.register(MessageDefinition::new("chat", MessageKind::new(40).reliable())).unwrap();
        extended.start(address).unwrap();
        assert_ne!(plain.version(), extended.version());
    }

    #[test]
    #[should_panic(expected = "already")]
    fn test_transition_to_the_current_state_panics() {
        let mut session = session();
        session.set_state(SessionState::Setup);
    }

    #[test]
    fn test_update_before_start_does_nothing() {
        let mut session = session();
        session.update(Instant::now());
        assert_eq!(session.state(), SessionState::Setup);
        assert!(session.recv().is_none());
    }
}
