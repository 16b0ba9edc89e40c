//! Priority heap holding pending messages

use crate::identity::AgentIdentity;
use crate::message::Message;
use std::cmp::Ordering;
use std::collections::BinaryHeap;

#[derive(Debug)]
struct Entry {
    seq: u64,
    message: Message,
}

impl Ord for Entry {
    // BinaryHeap pops the greatest entry, so both keys are reversed:
    // lowest priority value first, then earliest insertion.
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .message
            .priority()
            .cmp(&self.message.priority())
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

impl PartialOrd for Entry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for Entry {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Entry {}

/// Unbounded priority-ordered multiset of messages, partitioned by
/// recipient only when read.
///
/// Messages with equal priority come out in insertion order.
#[derive(Debug, Default)]
pub struct PriorityMailbox {
    heap: BinaryHeap<Entry>,
    next_seq: u64,
}

impl PriorityMailbox {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, message: Message) {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.heap.push(Entry { seq, message });
    }

    /// Remove and return the most urgent message addressed to `recipient`.
    ///
    /// Entries popped on the way are put back with their original
    /// sequence numbers, so the relative order of everything left behind
    /// is unchanged.
    pub fn pop_for(&mut self, recipient: AgentIdentity) -> Option<Message> {
        let mut skipped = Vec::new();
        let mut found = None;

        while let Some(entry) = self.heap.pop() {
            if entry.message.recipient() == recipient {
                found = Some(entry.message);
                break;
            }
            skipped.push(entry);
        }

        self.heap.extend(skipped);
        found
    }

    pub fn len(&self) -> usize {
        self.heap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }

    /// Number of pending messages addressed to `recipient`
    pub fn count_for(&self, recipient: AgentIdentity) -> usize {
        self.heap
            .iter()
            .filter(|entry| entry.message.recipient() == recipient)
            .count()
    }

    /// Drop every pending message, returning how many were discarded
    pub fn clear(&mut self) -> usize {
        let discarded = self.heap.len();
        self.heap.clear();
        discarded
    }
}
