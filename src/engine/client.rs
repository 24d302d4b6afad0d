//! Per-client reply ordering
//!
//! Each command reserves a slot when it arrives. Replies fill slots in any
//! order and leave in arrival order.

use std::collections::VecDeque;
use std::fmt;

use bytes::Bytes;

use crate::buffer::MessageBuffer;

/// Identifier of one client connection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ClientId(pub u64);

impl fmt::Display for ClientId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "client-{}", self.0)
    }
}

/// Position of a command in its client's reply order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ReplySlot(pub u64);

/// Reply queue and inbound buffer of one client
#[derive(Debug, Default)]
pub struct ClientQueue {
    pub(crate) inbound: MessageBuffer,
    next_seq: u64,
    pending: VecDeque<(ReplySlot, Option<Bytes>)>,
}

impl ClientQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reserve the slot for the next command's reply
    pub fn reserve(&mut self) -> ReplySlot {
        let slot = ReplySlot(self.next_seq);
        self.next_seq += 1;
        self.pending.push_back((slot, None));
        slot
    }

    /// Store the reply for `slot`
    ///
    /// Returns false if the slot is unknown or already filled.
    pub fn fill(&mut self, slot: ReplySlot, reply: Bytes) -> bool {
        match self.pending.iter_mut().find(|(s, _)| *s == slot) {
            Some((_, entry)) if entry.is_none() => {
                *entry = Some(reply);
                true
            }
            _ => false,
        }
    }

    /// Pop every reply that is next in line
    pub fn drain_ready(&mut self) -> Vec<Bytes> {
        let mut ready = Vec::new();
        while let Some((_, Some(_))) = self.pending.front() {
            if let Some((_, Some(reply))) = self.pending.pop_front() {
                ready.push(reply);
            }
        }
        ready
    }

    /// Commands still waiting for a reply
    pub fn outstanding(&self) -> usize {
        self.pending.len()
    }
}
