//! Sliding windows over reliable ids.
//!
//! The sending side hands out ids and remembers which ones the peer confirmed; the receiving
//! side remembers which ids arrived so every reliable message is processed exactly once.
//! Both keep at most `MAX_RELIABLE_RANGE` ids in play, stored in rings indexed by id slot.

use ackwire_core::constants::MAX_RELIABLE_RANGE;
use ackwire_protocol::ReliableId;

/// Reliable ids we sent and which of them were confirmed.
#[derive(Debug)]
pub struct SendWindow {
    /// Id given to the next new reliable message
    next_to_send: ReliableId,
    /// One past the newest confirmed id
    next_unconfirmed: ReliableId,
    /// Oldest id not yet confirmed; everything before it is settled
    oldest_unconfirmed: ReliableId,
    confirmed: Vec<Option<ReliableId>>,
}

impl SendWindow {
    /// Creates a window with every cursor at the first id.
    pub fn new() -> Self {
        Self {
            next_to_send: ReliableId::first(),
            next_unconfirmed: ReliableId::first(),
            oldest_unconfirmed: ReliableId::first(),
            confirmed: vec![None; MAX_RELIABLE_RANGE as usize],
        }
    }

    /// Id the next new reliable message will get.
    pub fn next_to_send(&self) -> ReliableId {
        self.next_to_send
    }

    /// One past the newest confirmed id.
    pub fn next_unconfirmed(&self) -> ReliableId {
        self.next_unconfirmed
    }

    /// Oldest id still waiting for confirmation.
    pub fn oldest_unconfirmed(&self) -> ReliableId {
        self.oldest_unconfirmed
    }

    /// Number of ids sent but not settled.
    pub fn in_flight(&self) -> u32 {
        self.oldest_unconfirmed.distance_to(self.next_to_send)
    }

    /// Returns false once `MAX_RELIABLE_RANGE` ids are unsettled.
    pub fn can_send_new(&self) -> bool {
        self.in_flight() < u32::from(MAX_RELIABLE_RANGE)
    }

    /// Hands out the next id.
    pub fn assign(&mut self) -> ReliableId {
        debug_assert!(self.can_send_new());
        self.next_to_send.increment()
    }

    fn is_in_flight(&self, id: ReliableId) -> bool {
        id.is_valid() && self.oldest_unconfirmed.distance_to(id) < self.in_flight()
    }

    /// Marks `id` confirmed. Returns false for ids that were never sent or are already
    /// confirmed.
    pub fn confirm(&mut self, id: ReliableId) -> bool {
        if !self.is_in_flight(id) {
            return false;
        }
        let slot = id.slot(MAX_RELIABLE_RANGE);
        if self.confirmed[slot] == Some(id) {
            return false;
        }
        self.confirmed[slot] = Some(id);
        if !id.is_older_than(self.next_unconfirmed) {
            self.next_unconfirmed = id.next();
        }
        while self.oldest_unconfirmed != self.next_to_send {
            let slot = self.oldest_unconfirmed.slot(MAX_RELIABLE_RANGE);
            if self.confirmed[slot] != Some(self.oldest_unconfirmed) {
                break;
            }
            self.confirmed[slot] = None;
            self.oldest_unconfirmed = self.oldest_unconfirmed.next();
        }
        true
    }

    /// Returns true when `id` was sent and the peer confirmed it.
    pub fn is_confirmed(&self, id: ReliableId) -> bool {
        if !id.is_valid() {
            return false;
        }
        if self.is_in_flight(id) {
            return self.confirmed[id.slot(MAX_RELIABLE_RANGE)] == Some(id);
        }
        id.is_older_than(self.oldest_unconfirmed)
    }
}

impl Default for SendWindow {
    fn default() -> Self {
        Self::new()
    }
}

/// Why a received reliable id was not accepted.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ReceiveRejection {
    /// Too far from the ids we expect.
    OutOfWindow,
    /// Already received.
    Duplicate,
}

/// Reliable ids we received.
#[derive(Debug)]
pub struct ReceiveWindow {
    /// One past the newest received id
    next_unreceived: ReliableId,
    /// Oldest id not yet received; everything before it arrived
    oldest_unreceived: ReliableId,
    received: Vec<Option<ReliableId>>,
}

impl ReceiveWindow {
    /// Creates a window expecting the first id.
    pub fn new() -> Self {
        Self {
            next_unreceived: ReliableId::first(),
            oldest_unreceived: ReliableId::first(),
            received: vec![None; MAX_RELIABLE_RANGE as usize],
        }
    }

    /// One past the newest received id.
    pub fn next_unreceived(&self) -> ReliableId {
        self.next_unreceived
    }

    /// Oldest id not yet received.
    pub fn oldest_unreceived(&self) -> ReliableId {
        self.oldest_unreceived
    }

    /// Records `id`. Only an accepted id may be processed.
    pub fn mark_received(&mut self, id: ReliableId) -> Result<(), ReceiveRejection> {
        if !id.is_valid() {
            return Err(ReceiveRejection::OutOfWindow);
        }
        let range = u32::from(MAX_RELIABLE_RANGE);
        let ahead = self.next_unreceived.distance_to(id);
        let behind = id.distance_to(self.next_unreceived);
        if ahead > range && behind > range {
            return Err(ReceiveRejection::OutOfWindow);
        }
        if id.is_older_than(self.oldest_unreceived) {
            return Err(ReceiveRejection::Duplicate);
        }
        // A sender keeps fewer than `range` ids unsettled, so anything that far ahead of the
        // oldest gap cannot be genuine and would alias its slot.
        if self.oldest_unreceived.distance_to(id) >= range {
            return Err(ReceiveRejection::OutOfWindow);
        }
        let slot = id.slot(MAX_RELIABLE_RANGE);
        if self.received[slot] == Some(id) {
            return Err(ReceiveRejection::Duplicate);
        }
        self.received[slot] = Some(id);
        if !id.is_older_than(self.next_unreceived) {
            self.next_unreceived = id.next();
        }
        while self.oldest_unreceived != self.next_unreceived {
            let slot = self.oldest_unreceived.slot(MAX_RELIABLE_RANGE);
            if self.received[slot] != Some(self.oldest_unreceived) {
                break;
            }
            self.received[slot] = None;
            self.oldest_unreceived = self.oldest_unreceived.next();
        }
        Ok(())
    }
}

impl Default for ReceiveWindow {
    fn default() -> Self {
        Self::new()
    }
}
