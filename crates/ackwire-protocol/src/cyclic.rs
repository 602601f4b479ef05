//! Wrapping 16-bit identifiers.
//!
//! Every id in the protocol is a 16-bit counter that rolls over forever, so ordering must be
//! decided on the circle, not on the integer line: `a` is newer than `b` when walking forward
//! from `b` reaches `a` in fewer than half a cycle.
//!
//! Two flavours exist:
//! - sentinel ids (`SKIP_INVALID = true`): 0 is reserved as "no id", the counter cycles
//!   through `1..=65535` and skips 0 on wrap, so the modulus is 65535;
//! - plain ids (`SKIP_INVALID = false`): every value is valid and the modulus is 65536.

use std::fmt;

/// Forward distance below which an id counts as newer.
const HALF_RANGE: u32 = 32768;

/// A cyclic 16-bit identifier. See the module docs for the modulus semantics.
#[derive(Copy, Clone, PartialEq, Eq, Hash, Default)]
pub struct CyclicId<const SKIP_INVALID: bool>(u16);

/// Id assigned to each reliable message. 0 is invalid.
pub type ReliableId = CyclicId<true>;
/// Id assigned to each outgoing packet. 0 is invalid.
pub type AckId = CyclicId<true>;
/// Per-channel ordering id. Every value is valid.
pub type SequenceId = CyclicId<false>;

impl<const SKIP_INVALID: bool> CyclicId<SKIP_INVALID> {
    const MODULUS: u32 = if SKIP_INVALID { 65535 } else { 65536 };

    /// The reserved "no id" value. Only meaningful for sentinel ids.
    pub const INVALID: Self = Self(0);

    /// Wraps a raw wire value.
    pub const fn new(raw: u16) -> Self {
        Self(raw)
    }

    /// The first id a fresh counter hands out.
    pub const fn first() -> Self {
        if SKIP_INVALID {
            Self(1)
        } else {
            Self(0)
        }
    }

    /// Returns the raw wire value.
    pub const fn raw(self) -> u16 {
        self.0
    }

    /// Returns false only for the sentinel of sentinel ids.
    pub const fn is_valid(self) -> bool {
        !SKIP_INVALID || self.0 != 0
    }

    /// Position of the id on its cycle, `0..MODULUS`. The sentinel shares the first position.
    fn ordinal(self) -> u32 {
        if SKIP_INVALID {
            u32::from(self.0.saturating_sub(1))
        } else {
            u32::from(self.0)
        }
    }

    fn from_ordinal(ordinal: u32) -> Self {
        let ordinal = ordinal % Self::MODULUS;
        if SKIP_INVALID {
            Self((ordinal + 1) as u16)
        } else {
            Self(ordinal as u16)
        }
    }

    /// The id that follows this one, skipping the sentinel.
    pub fn next(self) -> Self {
        self.offset(1)
    }

    /// Moves `steps` positions along the cycle (negative moves backwards).
    pub fn offset(self, steps: i32) -> Self {
        let modulus = i64::from(Self::MODULUS);
        let ordinal = (i64::from(self.ordinal()) + i64::from(steps)).rem_euclid(modulus);
        Self::from_ordinal(ordinal as u32)
    }

    /// Number of forward steps needed to get from `self` to `other`.
    pub fn distance_to(self, other: Self) -> u32 {
        (other.ordinal() + Self::MODULUS - self.ordinal()) % Self::MODULUS
    }

    /// Wraparound-aware "greater than".
    pub fn is_newer_than(self, other: Self) -> bool {
        let distance = other.distance_to(self);
        distance != 0 && distance < HALF_RANGE
    }

    /// Wraparound-aware "less than".
    pub fn is_older_than(self, other: Self) -> bool {
        other.is_newer_than(self)
    }

    /// Index into a ring of `ring_size` slots.
    ///
    /// For sentinel ids the ring size must divide 65535 to keep neighbouring ids in distinct
    /// slots across the wrap.
    pub fn slot(self, ring_size: u16) -> usize {
        (self.ordinal() % u32::from(ring_size)) as usize
    }

    /// Returns the current value and advances the counter.
    pub fn increment(&mut self) -> Self {
        let current = *self;
        *self = self.next();
        current
    }
}

impl<const SKIP_INVALID: bool> fmt::Debug for CyclicId<SKIP_INVALID> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

impl<const SKIP_INVALID: bool> fmt::Display for CyclicId<SKIP_INVALID> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sentinel_ids_skip_zero_on_wrap() {
        let mut id = ReliableId::new(65534);
        assert_eq!(id.increment().raw(), 65534);
        assert_eq!(id.increment().raw(), 65535);
        assert_eq!(id.raw(), 1);
        assert!(id.is_valid());
        assert!(!ReliableId::INVALID.is_valid());
    }

    #[test]
    fn test_plain_ids_use_every_value() {
        let id = SequenceId::new(65535);
        assert_eq!(id.next().raw(), 0);
        assert!(SequenceId::new(0).is_valid());
        assert_eq!(SequenceId::first().raw(), 0);
        assert_eq!(ReliableId::first().raw(), 1);
    }

    #[test]
    fn test_comparisons_survive_wraparound() {
        let before = AckId::new(65530);
        let after = AckId::new(3);
        assert!(after.is_newer_than(before));
        assert!(before.is_older_than(after));
        assert_eq!(before.distance_to(after), 8);

        let before = SequenceId::new(65530);
        let after = SequenceId::new(3);
        assert!(after.is_newer_than(before));
        assert_eq!(before.distance_to(after), 9);
    }

    #[test]
    fn test_equal_ids_are_neither_newer_nor_older() {
        let id = ReliableId::new(42);
        assert!(!id.is_newer_than(id));
        assert!(!id.is_older_than(id));
    }

    #[test]
    fn test_half_range_decides_direction() {
        let base = SequenceId::new(0);
        assert!(SequenceId::new(32767).is_newer_than(base));
        assert!(!SequenceId::new(32768).is_newer_than(base));
        assert!(SequenceId::new(40000).is_older_than(base));
    }

    #[test]
    fn test_offset_moves_backwards_across_the_sentinel() {
        assert_eq!(ReliableId::new(1).offset(-1).raw(), 65535);
        assert_eq!(ReliableId::new(3).offset(-255).raw(), 65283);
        assert_eq!(SequenceId::new(1).offset(-2).raw(), 65535);
    }

    #[test]
    fn test_slots_stay_distinct_across_the_wrap() {
        // 255 consecutive sentinel ids straddling the wrap map to 255 distinct slots
        let start = ReliableId::new(65400);
        let mut seen = vec![false; 255];
        for step in 0..255 {
            let slot = start.offset(step).slot(255);
            assert!(!seen[slot], "slot {} reused at step {}", slot, step);
            seen[slot] = true;
        }
    }
}
