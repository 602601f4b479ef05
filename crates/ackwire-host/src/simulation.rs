//! Artificial loss and latency for incoming datagrams.

use std::{net::SocketAddr, time::{Duration, Instant}};

use ackwire_core::config::Config;
use rand::{rngs::StdRng, Rng, SeedableRng};
use tracing::trace;

/// Drops a fraction of incoming datagrams and delays the rest.
#[derive(Debug)]
pub struct NetworkSimulator {
    loss: f32,
    latency_min: Duration,
    latency_max: Duration,
    rng: StdRng,
    /// Datagrams waiting for their release time, in arrival order
    queue: Vec<(Instant, SocketAddr, Vec<u8>)>,
    dropped: u64,
}

impl NetworkSimulator {
    /// Creates a simulator from the `simulated_*` settings of `config`.
    pub fn new(config: &Config) -> Self {
        let rng = match config.simulation_seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        };
        let latency_min = config.simulated_latency_min.min(config.simulated_latency_max);
        Self {
            loss: config.simulated_loss.clamp(0.0, 1.0),
            latency_min,
            latency_max: config.simulated_latency_max,
            rng,
            queue: Vec::new(),
            dropped: 0,
        }
    }

    /// Takes in a datagram that just arrived.
    pub fn submit(&mut self, address: SocketAddr, data: Vec<u8>, now: Instant) {
        if self.loss > 0.0 && self.rng.random::<f32>() < self.loss {
            trace!("simulation dropped {} bytes from {}", data.len(), address);
            self.dropped += 1;
            return;
        }
        let delay = if self.latency_max > self.latency_min {
            let min = self.latency_min.as_nanos() as u64;
            let max = self.latency_max.as_nanos() as u64;
            Duration::from_nanos(self.rng.random_range(min..=max))
        } else {
            self.latency_min
        };
        self.queue.push((now + delay, address, data));
    }

    /// Removes and returns every datagram whose release time has come, earliest first.
    pub fn release(&mut self, now: Instant) -> Vec<(SocketAddr, Vec<u8>)> {
        let (mut due, pending): (Vec<_>, Vec<_>) =
            self.queue.drain(..).partition(|(release_at, _, _)| *release_at <= now);
        self.queue = pending;
        due.sort_by_key(|(release_at, _, _)| *release_at);
        due.into_iter().map(|(_, address, data)| (address, data)).collect()
    }

    /// Number of datagrams dropped so far.
    pub fn dropped(&self) -> u64 {
        self.dropped
    }

    /// Number of datagrams waiting to be released.
    pub fn pending(&self) -> usize {
        self.queue.len()
    }
}
