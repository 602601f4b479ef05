//! Acknowledgment tracking.
//!
//! Outgoing side: every packet gets an ack id and an [`AckBundle`] listing the reliable ids it
//! carried. When the peer reports the ack back, those reliable ids are confirmed.
//!
//! Incoming side: [`AckHistory`] remembers the highest ack received from the peer together
//! with a 16 bit history, which is written into every outgoing header.

use std::time::{Duration, Instant};

use ackwire_core::constants::{ACK_BUNDLE_RING_SIZE, ACK_HISTORY_BITS, MAX_RELIABLES_PER_PACKET};

use crate::cyclic::{AckId, ReliableId};

/// Which reliable ids a single outgoing packet carried.
#[derive(Clone, Debug)]
pub struct AckBundle {
    ack_id: AckId,
    sent_at: Instant,
    confirmed: bool,
    reliable_ids: Vec<ReliableId>,
}

impl AckBundle {
    /// Creates an unconfirmed bundle.
    pub fn new(ack_id: AckId, sent_at: Instant, reliable_ids: Vec<ReliableId>) -> Self {
        debug_assert!(reliable_ids.len() <= MAX_RELIABLES_PER_PACKET);
        Self { ack_id, sent_at, confirmed: false, reliable_ids }
    }

    /// Ack id of the packet.
    pub fn ack_id(&self) -> AckId {
        self.ack_id
    }

    /// When the packet was sent.
    pub fn sent_at(&self) -> Instant {
        self.sent_at
    }

    /// Returns true once the peer reported the packet.
    pub fn is_confirmed(&self) -> bool {
        self.confirmed
    }

    /// Reliable ids carried by the packet.
    pub fn reliable_ids(&self) -> &[ReliableId] {
        &self.reliable_ids
    }
}

/// Outcome of confirming a bundle for the first time.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Confirmation {
    /// Time between sending the packet and learning it arrived.
    pub round_trip: Duration,
    /// Reliable ids the packet carried.
    pub reliable_ids: Vec<ReliableId>,
}

/// Fixed ring of bundles, slot = ack ordinal mod ring size.
#[derive(Debug)]
pub struct AckBundleRing {
    slots: Vec<Option<AckBundle>>,
}

impl AckBundleRing {
    /// Creates an empty ring of `ACK_BUNDLE_RING_SIZE` slots.
    pub fn new() -> Self {
        Self { slots: vec![None; ACK_BUNDLE_RING_SIZE as usize] }
    }

    /// Stores a bundle. Returns true when an unconfirmed bundle was overwritten, meaning its
    /// packet is presumed lost.
    pub fn record(&mut self, bundle: AckBundle) -> bool {
        let slot = &mut self.slots[bundle.ack_id.slot(ACK_BUNDLE_RING_SIZE)];
        let lost = matches!(slot, Some(previous) if !previous.confirmed);
        *slot = Some(bundle);
        lost
    }

    /// Confirms the bundle of `ack_id`.
    ///
    /// Returns `None` when the slot holds a different ack (already overwritten) or the bundle
    /// was confirmed before, so repeated reports are harmless.
    pub fn confirm(&mut self, ack_id: AckId, now: Instant) -> Option<Confirmation> {
        if !ack_id.is_valid() {
            return None;
        }
        let bundle = self.slots[ack_id.slot(ACK_BUNDLE_RING_SIZE)].as_mut()?;
        if bundle.ack_id != ack_id || bundle.confirmed {
            return None;
        }
        bundle.confirmed = true;
        Some(Confirmation {
            round_trip: now.saturating_duration_since(bundle.sent_at),
            reliable_ids: bundle.reliable_ids.clone(),
        })
    }

    /// Returns the bundle stored for `ack_id`, if the slot still holds it.
    pub fn get(&self, ack_id: AckId) -> Option<&AckBundle> {
        if !ack_id.is_valid() {
            return None;
        }
        self.slots[ack_id.slot(ACK_BUNDLE_RING_SIZE)].as_ref().filter(|b| b.ack_id == ack_id)
    }

    /// Forgets every bundle.
    pub fn clear(&mut self) {
        self.slots.iter_mut().for_each(|slot| *slot = None);
    }
}

impl Default for AckBundleRing {
    fn default() -> Self {
        Self::new()
    }
}

/// The highest ack received from the peer plus which of the 16 before it arrived too.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct AckHistory {
    most_recent: AckId,
    bitfield: u16,
}

impl AckHistory {
    /// Creates an empty history.
    pub fn new() -> Self {
        Self::default()
    }

    /// Highest ack received so far, `AckId::INVALID` before the first packet.
    pub fn most_recent(&self) -> AckId {
        self.most_recent
    }

    /// Bit `i` set means `most_recent - i - 1` was received.
    pub fn bitfield(&self) -> u16 {
        self.bitfield
    }

    /// Records a received packet ack.
    pub fn record(&mut self, ack: AckId) {
        if !ack.is_valid() {
            return;
        }
        if !self.most_recent.is_valid() {
            self.most_recent = ack;
            self.bitfield = 0;
            return;
        }
        if ack.is_newer_than(self.most_recent) {
            let gap = self.most_recent.distance_to(ack);
            // Shift in a wide integer: a gap of 16 or more clears the whole history.
            let shifted = if gap >= 64 {
                0
            } else {
                (u64::from(self.bitfield) << gap) | (1 << (gap - 1))
            };
            self.bitfield = (shifted & 0xFFFF) as u16;
            self.most_recent = ack;
        } else if ack.is_older_than(self.most_recent) {
            let distance = ack.distance_to(self.most_recent);
            if distance <= u32::from(ACK_HISTORY_BITS) {
                self.bitfield |= 1 << (distance - 1);
            }
        }
    }

    /// Returns true when `ack` was recorded and is still covered by the history.
    pub fn contains(&self, ack: AckId) -> bool {
        if !ack.is_valid() || !self.most_recent.is_valid() {
            return false;
        }
        if ack == self.most_recent {
            return true;
        }
        if !ack.is_older_than(self.most_recent) {
            return false;
        }
        let distance = ack.distance_to(self.most_recent);
        distance <= u32::from(ACK_HISTORY_BITS) && self.bitfield & (1 << (distance - 1)) != 0
    }
}

/// Exponentially weighted round-trip estimate.
#[derive(Copy, Clone, Debug)]
pub struct RoundTripEstimator {
    rtt: Duration,
    smoothing: f32,
}

impl RoundTripEstimator {
    /// Starts at `initial` and blends in samples with weight `smoothing`.
    pub fn new(initial: Duration, smoothing: f32) -> Self {
        Self { rtt: initial, smoothing: smoothing.clamp(0.0, 1.0) }
    }

    /// Current estimate.
    pub fn rtt(&self) -> Duration {
        self.rtt
    }

    /// `rtt = (1 - a) * rtt + a * sample`.
    pub fn update(&mut self, sample: Duration) {
        let blended =
            self.rtt.as_secs_f32() * (1.0 - self.smoothing) + sample.as_secs_f32() * self.smoothing;
        self.rtt = Duration::from_secs_f32(blended.max(0.0));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_confirmation_is_idempotent() {
        let now = Instant::now();
        let mut ring = AckBundleRing::new();
        let carried = vec![ReliableId::new(1), ReliableId::new(2)];
        ring.record(AckBundle::new(AckId::new(5), now, carried));

        let later = now + Duration::from_millis(40);
        let confirmation = ring.confirm(AckId::new(5), later).unwrap();
        assert_eq!(confirmation.round_trip, Duration::from_millis(40));
        assert_eq!(confirmation.reliable_ids, vec![ReliableId::new(1), ReliableId::new(2)]);
        assert!(ring.confirm(AckId::new(5), later).is_none());
        assert!(ring.get(AckId::new(5)).unwrap().is_confirmed());
    }

    #[test]
    fn test_overwritten_slot_is_not_confirmed() {
        let now = Instant::now();
        let mut ring = AckBundleRing::new();
        let old = AckId::new(5);
        let new = old.offset(ACK_BUNDLE_RING_SIZE as i32);
        assert!(!ring.record(AckBundle::new(old, now, vec![ReliableId::new(1)])));
        assert!(ring.record(AckBundle::new(new, now, vec![ReliableId::new(2)])));

        assert!(ring.confirm(old, now).is_none());
        assert_eq!(ring.confirm(new, now).unwrap().reliable_ids, vec![ReliableId::new(2)]);
    }

    #[test]
    fn test_cleared_ring_forgets_unsettled_bundles() {
        let now = Instant::now();
        let mut ring = AckBundleRing::new();
        ring.record(AckBundle::new(AckId::new(9), now, vec![ReliableId::new(3)]));
        ring.clear();

        assert!(ring.get(AckId::new(9)).is_none());
        assert!(ring.confirm(AckId::new(9), now).is_none());
        assert!(!ring.record(AckBundle::new(AckId::new(9), now, Vec::new())));
    }

    #[test]
    fn test_history_tracks_newer_and_older_acks() {
        let mut history = AckHistory::new();
        history.record(AckId::new(10));
        history.record(AckId::new(12));
        assert_eq!(history.most_recent(), AckId::new(12));
        // 10 is two behind 12
        assert_eq!(history.bitfield(), 0b10);

        history.record(AckId::new(11));
        assert_eq!(history.bitfield(), 0b11);
        history.record(AckId::new(12));
        assert_eq!(history.bitfield(), 0b11);
        assert!(history.contains(AckId::new(10)));
        assert!(!history.contains(AckId::new(9)));
    }

    #[test]
    fn test_large_gap_clears_history() {
        let mut history = AckHistory::new();
        history.record(AckId::new(100));
        history.record(AckId::new(99));
        history.record(AckId::new(117));
        assert_eq!(history.bitfield(), 0);
        history.record(AckId::new(1000));
        assert_eq!(history.bitfield(), 0);

        let mut history = AckHistory::new();
        history.record(AckId::new(100));
        history.record(AckId::new(116));
        assert_eq!(history.bitfield(), 1 << 15);
    }

    #[test]
    fn test_history_survives_the_wrap() {
        let mut history = AckHistory::new();
        history.record(AckId::new(65535));
        history.record(AckId::new(1));
        assert_eq!(history.most_recent(), AckId::new(1));
        assert_eq!(history.bitfield(), 0b1);
        history.record(AckId::new(65534));
        assert_eq!(history.bitfield(), 0b11);
    }

    #[test]
    fn test_too_old_acks_are_ignored() {
        let mut history = AckHistory::new();
        history.record(AckId::new(50));
        history.record(AckId::new(30));
        assert_eq!(history.bitfield(), 0);
        assert_eq!(history.most_recent(), AckId::new(50));
    }

    #[test]
    fn test_round_trip_estimate_converges() {
        let mut estimator = RoundTripEstimator::new(Duration::from_millis(100), 0.1);
        estimator.update(Duration::from_millis(200));
        assert!((estimator.rtt().as_secs_f32() - 0.110).abs() < 1e-4);
        for _ in 0..200 {
            estimator.update(Duration::from_millis(40));
        }
        assert!((estimator.rtt().as_secs_f32() - 0.040).abs() < 1e-3);
    }
}
