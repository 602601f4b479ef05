//! Per-channel ordering for reliable sequenced messages.
//!
//! Each channel hands out sequence ids on the sending side and, on the receiving side,
//! releases messages strictly in sequence order. Early arrivals wait in a buffer kept sorted
//! in cyclic order so the next expected message is always at the front.

use ackwire_protocol::{Message, SequenceId};

/// Tracks one sequence channel of a connection.
#[derive(Debug, Default)]
pub struct ChannelState {
    /// Sequence id given to the next outgoing message
    next_outgoing: SequenceId,
    /// Sequence id the next delivered message must carry
    expected: SequenceId,
    /// Early arrivals, sorted oldest first
    buffered: Vec<Message>,
}

impl ChannelState {
    /// Creates a channel with both cursors at the first sequence id.
    pub fn new() -> Self {
        Self {
            next_outgoing: SequenceId::first(),
            expected: SequenceId::first(),
            buffered: Vec::new(),
        }
    }

    /// Returns the sequence id for the next outgoing message and advances the cursor.
    pub fn next_outgoing(&mut self) -> SequenceId {
        self.next_outgoing.increment()
    }

    /// Sequence id the next delivered message must carry.
    pub fn expected(&self) -> SequenceId {
        self.expected
    }

    /// Number of messages waiting for a gap to be filled.
    pub fn buffered_len(&self) -> usize {
        self.buffered.len()
    }

    /// Accepts an arrived message and returns every message that is now deliverable, in
    /// order. Messages older than the expected id are dropped.
    pub fn accept(&mut self, message: Message) -> Vec<Message> {
        let sequence = message.sequence_id;
        if sequence == self.expected {
            let mut ready = vec![message];
            self.expected = self.expected.next();
            while self.buffered.first().is_some_and(|m| m.sequence_id == self.expected) {
                ready.push(self.buffered.remove(0));
                self.expected = self.expected.next();
            }
            return ready;
        }

        if sequence.is_newer_than(self.expected) {
            match self.buffered.binary_search_by(|m| compare(m.sequence_id, sequence)) {
                Ok(_) => {}
                Err(position) => self.buffered.insert(position, message),
            }
        }
        Vec::new()
    }

    /// Drops buffered messages and resets both cursors.
    pub fn reset(&mut self) {
        *self = Self::new();
    }
}

fn compare(a: SequenceId, b: SequenceId) -> std::cmp::Ordering {
    if a == b {
        std::cmp::Ordering::Equal
    } else if a.is_older_than(b) {
        std::cmp::Ordering::Less
    } else {
        std::cmp::Ordering::Greater
    }
}
