//! Application messages between sessions, including under simulated loss.

mod common;

use std::{
    cell::Cell,
    rc::Rc,
    time::{Duration, Instant},
};

use ackwire_core::{
    config::Config,
    constants::{DEFAULT_MTU, INVALID_CONNECTION_INDEX},
    error::ErrorKind,
    transport::Socket,
};
use ackwire_host::{hooks::Outbox, DisconnectReason, Session, SessionEvent, SessionHooks};
use ackwire_protocol::{
    AckId, Message, MessageDefinition, MessageKind, PacketBuilder, PacketHeader, ReliableId,
};
use common::{
    addr, config, disconnected, events, run_for, started, MemorySocket, Network, Pair,
};

const EVENT: MessageKind = MessageKind::new(40).reliable();
const ORDERED: MessageKind = MessageKind::new(41).reliable().sequenced(1);
const ECHO: MessageKind = MessageKind::new(42).reliable();
const ECHOED: MessageKind = MessageKind::new(43).reliable();
const STATE: MessageKind = MessageKind::new(44);
const ANNOUNCE: MessageKind = MessageKind::connectionless(45);

const TICK: Duration = Duration::from_millis(10);

fn register_game(session: &mut Session<MemorySocket>, with_echo_handler: bool) {
    let kinds = [
        ("event", EVENT),
        ("ordered", ORDERED),
        ("echoed", ECHOED),
        ("state", STATE),
        ("announce", ANNOUNCE),
    ];
    for (name, kind) in kinds {
        session.register(MessageDefinition::new(name, kind)).unwrap();
    }
    let echo = MessageDefinition::new("echo", ECHO);
    let echo = if with_echo_handler {
        echo.with_handler(|message, context| {
            context.reply(ECHOED.message_type(), message.payload().to_vec())
        })
    } else {
        echo
    };
    session.register(echo).unwrap();
}

fn game_session(
    network: &Network,
    config: Config,
    port: u16,
    with_echo_handler: bool,
) -> Session<MemorySocket> {
    let mut session = Session::new(network.socket(), config);
    register_game(&mut session, with_echo_handler);
    session.start(addr(port)).unwrap();
    session
}

fn game_pair(network: &Network, host_config: Config, client_config: Config, now: Instant) -> Pair {
    let mut host = game_session(network, host_config, 9000, true);
    let mut client = game_session(network, client_config, 9001, false);
    host.host(now).unwrap();
    client.join(addr(9000), now).unwrap();
    let now = run_for(&mut [&mut host, &mut client], now, Duration::from_millis(2_000), TICK);
    assert_eq!(client.local_index(), Some(1), "client did not join: {:?}", client.last_error());
    events(&host);
    events(&client);
    (host, client, now)
}

fn lossy(username: &str, seed: u64) -> Config {
    Config { simulated_loss: 0.2, simulation_seed: Some(seed), ..config(username) }
}

fn payloads_of(events: Vec<SessionEvent>, message_type: u8) -> Vec<u8> {
    events
        .into_iter()
        .filter_map(|event| match event {
            SessionEvent::Message { message, .. } if message.message_type() == message_type => {
                Some(message.payload()[0])
            }
            _ => None,
        })
        .collect()
}

#[test]
fn test_reliables_arrive_exactly_once_under_loss() {
    let network = Network::new();
    let (mut host, mut client, now) =
        game_pair(&network, lossy("host", 7), lossy("client", 11), Instant::now());

    for value in 0..10u8 {
        client.send_to(0, EVENT.message_type(), vec![value]).unwrap();
    }
    run_for(&mut [&mut host, &mut client], now, Duration::from_secs(5), TICK);

    let mut received = payloads_of(events(&host), EVENT.message_type());
    received.sort_unstable();
    assert_eq!(received, (0..10).collect::<Vec<u8>>());
    let connection = host.connection(1).unwrap();
    let window = connection.receive_window();
    assert_eq!(window.oldest_unreceived(), window.next_unreceived());
    assert_eq!(client.connection(0).unwrap().unconfirmed_reliable_count(), 0);
}

#[test]
fn test_sequenced_reliables_arrive_in_order_under_loss() {
    let network = Network::new();
    let (mut host, mut client, now) =
        game_pair(&network, lossy("host", 3), lossy("client", 5), Instant::now());

    for value in 0..40u8 {
        host.send_to(1, ORDERED.message_type(), vec![value]).unwrap();
    }
    run_for(&mut [&mut host, &mut client], now, Duration::from_secs(5), TICK);

    assert_eq!(payloads_of(events(&client), ORDERED.message_type()), (0..40).collect::<Vec<u8>>());
    assert_eq!(client.connection(0).unwrap().buffered_count(1), 0);
}

#[test]
fn test_handler_replies_reach_the_sender() {
    let network = Network::new();
    let (mut host, mut client, now) =
        game_pair(&network, config("host"), config("client"), Instant::now());

    client.send_to(0, ECHO.message_type(), vec![42]).unwrap();
    run_for(&mut [&mut host, &mut client], now, Duration::from_millis(100), TICK);

    // Handled messages are not reported as events.
    assert!(events(&host).is_empty());
    let echoed = events(&client);
    assert_eq!(payloads_of(echoed, ECHOED.message_type()), vec![42]);
}

#[test]
fn test_messages_to_our_own_index_loop_back() {
    let network = Network::new();
    let (mut host, mut client, now) =
        game_pair(&network, config("host"), config("client"), Instant::now());

    host.send_to(0, EVENT.message_type(), vec![9]).unwrap();
    assert!(events(&host).is_empty());
    run_for(&mut [&mut host, &mut client], now, TICK, TICK);

    let delivered = events(&host);
    assert_eq!(delivered.len(), 1);
    match &delivered[0] {
        SessionEvent::Message { sender, address, message } => {
            assert_eq!(*sender, Some(0));
            assert_eq!(*address, addr(9000));
            assert_eq!(message.payload(), &[9]);
        }
        other => panic!("unexpected event {:?}", other),
    }
    assert!(events(&client).is_empty());
}

#[test]
fn test_broadcast_reaches_every_client() {
    let network = Network::new();
    let now = Instant::now();
    let mut host = game_session(&network, config("host"), 9000, true);
    let mut first = game_session(&network, config("first"), 9001, false);
    let mut second = game_session(&network, config("second"), 9002, false);
    host.host(now).unwrap();
    first.join(addr(9000), now).unwrap();
    second.join(addr(9000), now).unwrap();
    let now = run_for(
        &mut [&mut host, &mut first, &mut second],
        now,
        Duration::from_millis(200),
        TICK,
    );
    events(&host);
    events(&first);
    events(&second);

    assert_eq!(host.broadcast(EVENT.message_type(), vec![5]).unwrap(), 2);
    run_for(&mut [&mut host, &mut first, &mut second], now, Duration::from_millis(100), TICK);
    assert_eq!(payloads_of(events(&first), EVENT.message_type()), vec![5]);
    assert_eq!(payloads_of(events(&second), EVENT.message_type()), vec![5]);
    assert!(events(&host).is_empty());
}

#[test]
fn test_broadcast_reaches_the_rest_when_one_client_fails() {
    let network = Network::new();
    let now = Instant::now();
    let mut host = game_session(&network, config("host"), 9000, true);
    let mut first = game_session(&network, config("first"), 9001, false);
    let mut second = game_session(&network, config("second"), 9002, false);
    host.host(now).unwrap();
    first.join(addr(9000), now).unwrap();
    second.join(addr(9000), now).unwrap();
    let now = run_for(
        &mut [&mut host, &mut first, &mut second],
        now,
        Duration::from_millis(200),
        TICK,
    );
    events(&first);
    events(&second);

    network.make_unreachable(addr(9001));
    let result = host.broadcast(ANNOUNCE.message_type(), vec![6]);
    assert!(matches!(result, Err(ErrorKind::IOError(_))));
    run_for(&mut [&mut host, &mut first, &mut second], now, TICK, TICK);
    assert!(payloads_of(events(&first), ANNOUNCE.message_type()).is_empty());
    assert_eq!(payloads_of(events(&second), ANNOUNCE.message_type()), vec![6]);
}

#[test]
fn test_leave_abandons_queued_messages() {
    let network = Network::new();
    let (mut host, mut client, now) =
        game_pair(&network, config("host"), config("client"), Instant::now());
    let before = network.sent_to(addr(9000)).len();

    client.send_to(0, EVENT.message_type(), vec![1]).unwrap();
    client.leave(now).unwrap();
    let sent = network.sent_to(addr(9000));
    assert_eq!(sent.len(), before + 1);
    // a single message: the leave
    assert_eq!(sent[before][7], 1);

    run_for(&mut [&mut host], now, TICK, TICK);
    assert_eq!(events(&host), vec![disconnected(1, 9001, DisconnectReason::Left)]);
}

struct StateSync {
    remaining: Rc<Cell<u8>>,
}

impl SessionHooks for StateSync {
    fn prepare_packet(&mut self, index: u8, outbox: &mut Outbox) {
        let remaining = self.remaining.get();
        if index == 1 && remaining > 0 {
            outbox.push(STATE.message_type(), vec![remaining]);
            self.remaining.set(remaining - 1);
        }
    }
}

#[test]
fn test_prepare_packet_hook_feeds_the_send_cycle() {
    let network = Network::new();
    let now = Instant::now();
    let remaining = Rc::new(Cell::new(0));
    let hooks = Box::new(StateSync { remaining: remaining.clone() });
    let mut host = Session::with_hooks(network.socket(), config("host"), hooks);
    register_game(&mut host, true);
    host.start(addr(9000)).unwrap();
    let mut client = game_session(&network, config("client"), 9001, false);
    host.host(now).unwrap();
    client.join(addr(9000), now).unwrap();
    let now = run_for(&mut [&mut host, &mut client], now, Duration::from_millis(100), TICK);
    events(&client);

    remaining.set(3);
    run_for(&mut [&mut host, &mut client], now, Duration::from_millis(100), TICK);
    assert_eq!(payloads_of(events(&client), STATE.message_type()), vec![3, 2, 1]);
}

#[test]
fn test_connection_bound_messages_from_strangers_are_dropped() {
    let network = Network::new();
    let now = Instant::now();
    let mut host = game_session(&network, config("host"), 9000, true);
    let mut stranger = game_session(&network, config("stranger"), 9001, false);
    host.host(now).unwrap();

    stranger.send_to_address(addr(9000), ANNOUNCE.message_type(), vec![1]).unwrap();
    assert!(matches!(
        stranger.send_to_address(addr(9000), EVENT.message_type(), vec![1]),
        Err(ErrorKind::ConnectionRequired(40))
    ));
    run_for(&mut [&mut host, &mut stranger], now, TICK, TICK);

    let received = events(&host);
    assert_eq!(received.len(), 1);
    assert!(matches!(
        &received[0],
        SessionEvent::Message { sender: None, message, .. } if message.message_type() == 45
    ));

    let mut raw = network.socket();
    raw.bind(addr(9002)).unwrap();
    let mut message = Message::new(EVENT, vec![7]);
    message.reliable_id = ReliableId::first();
    let mut builder = PacketBuilder::new(DEFAULT_MTU);
    assert!(builder.push(&message));
    let datagram = builder.finish(PacketHeader::new(INVALID_CONNECTION_INDEX, AckId::first()));
    raw.send_packet(&addr(9000), &datagram).unwrap();
    raw.send_packet(&addr(9000), &[1, 2]).unwrap();
    run_for(&mut [&mut host], now, TICK, TICK);
    assert!(events(&host).is_empty());
    assert_eq!(host.unknown_sender_messages(), 1);
    assert_eq!(host.invalid_packets(), 1);
}

#[test]
fn test_api_misuse_is_reported() {
    let network = Network::new();
    let now = Instant::now();
    let mut session = started(&network, config("idle"), 9000);
    assert!(matches!(
        session.register(MessageDefinition::new("late", EVENT)),
        Err(ErrorKind::RegistrationClosed)
    ));
    assert!(matches!(
        session.send_to(1, EVENT.message_type(), Vec::new()),
        Err(ErrorKind::UnregisteredMessageType(40))
    ));

    let mut fresh = Session::new(network.socket(), config("fresh"));
    assert!(matches!(
        fresh.register(MessageDefinition::new("reserved", MessageKind::new(7))),
        Err(ErrorKind::InvalidDefinition(_))
    ));
    register_game(&mut fresh, false);
    fresh.start(addr(9001)).unwrap();
    fresh.host(now).unwrap();
    assert!(matches!(
        fresh.send_to(5, EVENT.message_type(), Vec::new()),
        Err(ErrorKind::UnknownConnection(5))
    ));
}
