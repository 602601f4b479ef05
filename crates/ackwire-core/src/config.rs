use std::{default::Default, time::Duration};

use crate::constants::DEFAULT_MTU;

#[derive(Clone, Debug)]
/// Configuration options to tune protocol and session behavior.
pub struct Config {
    /// Make the underlying UDP socket block when true, otherwise non-blocking.
    pub blocking_mode: bool,
    /// Send an empty keep-alive packet when nothing has been sent for this long.
    pub heartbeat_interval: Duration,
    /// Stop sending to a connection that has been silent for this long.
    pub bad_connection_interval: Duration,
    /// Disconnect a connection that has been silent for this long.
    pub disconnect_timeout: Duration,
    /// Enables the forced disconnect after `disconnect_timeout`.
    pub timeouts_enabled: bool,
    /// Max packets flushed to a single connection per tick.
    pub max_packets_per_tick: usize,
    /// Max total packet size in bytes.
    pub max_packet_size: usize,
    /// Max receive buffer size in bytes.
    pub receive_buffer_max_size: usize,
    /// Round-trip estimate used before the first confirmation arrives.
    pub initial_rtt: Duration,
    /// Smoothing factor (0..1) for RTT measurements.
    pub rtt_smoothing_factor: f32,
    /// An unconfirmed reliable is re-sent once it is older than this multiple of the RTT.
    pub resend_rtt_factor: f32,
    /// How often an unanswered join request is repeated.
    pub join_retry_interval: Duration,
    /// Give up joining after this long without an answer.
    pub join_timeout: Duration,
    /// Name announced to the host when joining, or to joiners when hosting.
    pub username: String,
    /// Password sent (hashed) with join requests.
    pub password: String,
    /// Application version folded into the join compatibility check.
    pub game_version: u16,
    /// Number of consecutive ports tried when the requested port is taken.
    pub port_range: u16,
    /// Socket receive buffer size in bytes (None = use system default).
    /// Corresponds to SO_RCVBUF socket option.
    pub socket_recv_buffer_size: Option<usize>,
    /// Socket send buffer size in bytes (None = use system default).
    /// Corresponds to SO_SNDBUF socket option.
    pub socket_send_buffer_size: Option<usize>,
    /// Fraction (0..1) of incoming datagrams dropped on purpose, for testing.
    pub simulated_loss: f32,
    /// Lower bound of the artificial delay added to incoming datagrams.
    pub simulated_latency_min: Duration,
    /// Upper bound of the artificial delay added to incoming datagrams.
    pub simulated_latency_max: Duration,
    /// Seed for the simulation random generator (None = seeded from entropy).
    pub simulation_seed: Option<u64>,
}

impl Config {
    /// Returns true when any network simulation is configured.
    pub fn simulation_enabled(&self) -> bool {
        self.simulated_loss > 0.0 || !self.simulated_latency_max.is_zero()
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            blocking_mode: false,
            heartbeat_interval: Duration::from_secs(1),
            bad_connection_interval: Duration::from_secs(5),
            disconnect_timeout: Duration::from_secs(15),
            timeouts_enabled: true,
            max_packets_per_tick: 4,
            max_packet_size: DEFAULT_MTU,
            receive_buffer_max_size: 2048,
            initial_rtt: Duration::from_millis(100),
            rtt_smoothing_factor: 0.10,
            resend_rtt_factor: 1.1,
            join_retry_interval: Duration::from_millis(250),
            join_timeout: Duration::from_secs(10),
            username: String::from("player"),
            password: String::new(),
            game_version: 1,
            port_range: 8,
            socket_recv_buffer_size: None, // Use system default
            socket_send_buffer_size: None, // Use system default
            simulated_loss: 0.0,
            simulated_latency_min: Duration::ZERO,
            simulated_latency_max: Duration::ZERO,
            simulation_seed: None,
        }
    }
}
