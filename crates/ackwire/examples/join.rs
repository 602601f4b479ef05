//! Chat client: joins a host and sends a few lines.
//!
//! Run the host first:
//! - cargo run -p ackwire --example host -- 127.0.0.1:7777
//!
//! Then join:
//! - cargo run -p ackwire --example join -- 127.0.0.1:7777 alice

use std::{
    env,
    net::SocketAddr,
    thread,
    time::{Duration, Instant},
};

use ackwire::prelude::*;

const CHAT: MessageKind = MessageKind::new(32).reliable().sequenced(1);

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    let mut args = env::args().skip(1);
    let host_addr: SocketAddr = args.next().unwrap_or_else(|| "127.0.0.1:7777".into()).parse()?;
    let username = args.next().unwrap_or_else(|| "player".into());

    let config = Config { username: username.clone(), ..Config::default() };
    let mut session = Session::new(UdpSocket::new(&config), config);
    session.register(MessageDefinition::new("chat", CHAT))?;
    session.start("0.0.0.0:0".parse()?)?;
    session.join(host_addr, Instant::now())?;

    let mut sent = 0;
    while session.state() != SessionState::Disconnected && sent < 5 {
        session.update(Instant::now());
        while let Some(event) = session.recv() {
            match event {
                SessionEvent::Message { message, .. } => {
                    let text = message.reader().read_string().unwrap_or_default();
                    println!("[chat] {}", text);
                }
                other => println!("[event] {:?}", other),
            }
        }
        if session.state() == SessionState::Connected {
            let mut line = PayloadWriter::new();
            line.write_str(&format!("{} says hello #{}", username, sent));
            session.send_to(0, CHAT.message_type(), line.into_bytes())?;
            sent += 1;
            thread::sleep(Duration::from_millis(300));
        } else {
            thread::sleep(Duration::from_millis(10));
        }
    }

    if session.state() == SessionState::Disconnected {
        println!("could not join: {:?}", session.last_error());
    } else {
        session.leave(Instant::now())?;
    }
    Ok(())
}
