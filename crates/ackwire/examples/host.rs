//! Chat host: relays every line it receives to all other players.
//!
//! Run:
//! - cargo run -p ackwire --example host
//! - cargo run -p ackwire --example host -- 0.0.0.0:7777

use std::{env, net::SocketAddr, time::Duration};

use ackwire::{prelude::*, SystemClock};

const CHAT: MessageKind = MessageKind::new(32).reliable().sequenced(1);

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    let bind_addr: SocketAddr =
        env::args().nth(1).unwrap_or_else(|| "127.0.0.1:7777".into()).parse()?;
    let config = Config { username: "host".into(), ..Config::default() };
    let mut session = Session::new(UdpSocket::new(&config), config);
    session.register(MessageDefinition::new("chat", CHAT).with_handler(|message, context| {
        let text = message.reader().read_string().unwrap_or_default();
        println!("[chat] {:?}: {}", context.sender_index(), text);
        context.broadcast(CHAT.message_type(), message.payload().to_vec());
    }))?;
    session.start(bind_addr)?;
    session.host(std::time::Instant::now())?;
    println!("hosting chat on {}", session.local_addr()?);

    let events = session.event_receiver();
    session.run(&SystemClock, Some(Duration::from_millis(10)), |_| {
        while let Ok(event) = events.try_recv() {
            match event {
                SessionEvent::Connected { index, address } => {
                    println!("[join] {} from {}", index, address)
                }
                SessionEvent::Disconnected { index, reason, .. } => {
                    println!("[leave] {} ({:?})", index, reason)
                }
                other => println!("[event] {:?}", other),
            }
        }
        true
    });
    Ok(())
}
