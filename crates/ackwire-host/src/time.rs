use std::{
    cell::Cell,
    time::{Duration, Instant},
};

/// Time source for [`Session::run`](crate::Session::run).
///
/// The session itself never reads the time; `update` takes it as an argument.
pub trait Clock {
    /// Returns the time of the next tick.
    fn now(&self) -> Instant;
}

/// Wall clock.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    #[inline]
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// Clock that moves a fixed step every time it is read.
///
/// Lets `Session::run` simulate minutes of session time without sleeping.
#[derive(Debug)]
pub struct SteppingClock {
    current: Cell<Instant>,
    step: Duration,
}

impl SteppingClock {
    /// Starts at `start` and advances by `step` per reading.
    pub fn new(start: Instant, step: Duration) -> Self {
        Self { current: Cell::new(start), step }
    }

    /// Time the next reading will return.
    pub fn peek(&self) -> Instant {
        self.current.get()
    }
}

impl Clock for SteppingClock {
    fn now(&self) -> Instant {
        let now = self.current.get();
        self.current.set(now + self.step);
        now
    }
}
