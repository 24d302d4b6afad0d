//! Fragment Coordinator
//!
//! Tracks client commands that fan out into several backend or cache
//! sub-requests and hands back the combined result exactly once, when the
//! last one arrives. Counts are summed as they come in; member sets are
//! parked per slot and left for the caller to combine at completion.
//!
//! ## Lifecycle
//! ```text
//! open ──► Pending(total, done, acc) ──contribute×total──► Completed (removed)
//!                   │
//!                   └── abandon_client ──► dropped, later contributions ignored
//! ```

use std::collections::HashMap;

use bytes::Bytes;
use tracing::{trace, warn};

use crate::engine::ClientId;

/// Identifier of one fragment group
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct GroupId(pub u64);

/// Running result of a group
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Accumulator {
    /// Integer sum
    Count(i64),
    /// One member set per slot, filled as fetches complete
    Sets(Vec<Option<Vec<Bytes>>>),
}

impl Accumulator {
    /// Count accumulator starting at `initial`
    pub fn count(initial: i64) -> Self {
        Accumulator::Count(initial)
    }

    /// Set accumulator with `slots` empty slots
    pub fn sets(slots: usize) -> Self {
        Accumulator::Sets(vec![None; slots])
    }

    /// Member sets in slot order, unfilled slots as empty sets
    pub fn into_sets(self) -> Vec<Vec<Bytes>> {
        match self {
            Accumulator::Sets(slots) => slots.into_iter().map(Option::unwrap_or_default).collect(),
            Accumulator::Count(_) => Vec::new(),
        }
    }

    pub fn as_count(&self) -> Option<i64> {
        match self {
            Accumulator::Count(n) => Some(*n),
            Accumulator::Sets(_) => None,
        }
    }
}

/// One sub-response folded into a group
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Contribution {
    Count(i64),
    Set { slot: usize, members: Vec<Bytes> },
    /// The fragment failed; it counts as done and leaves the accumulator alone
    Failed,
}

/// A group whose every sub-response has arrived
#[derive(Debug)]
pub struct Completed<T> {
    pub client: ClientId,
    pub accumulator: Accumulator,
    /// Fragments that reported failure
    pub failures: usize,
    pub context: T,
}

#[derive(Debug)]
struct FragmentGroup<T> {
    client: ClientId,
    total: usize,
    done: usize,
    failures: usize,
    accumulator: Accumulator,
    context: T,
}

/// All open groups of one worker; `T` is the caller's continuation state
#[derive(Debug)]
pub struct FragmentCoordinator<T> {
    groups: HashMap<GroupId, FragmentGroup<T>>,
    next_id: u64,
}

impl<T> Default for FragmentCoordinator<T> {
    fn default() -> Self {
        Self {
            groups: HashMap::new(),
            next_id: 1,
        }
    }
}

impl<T> FragmentCoordinator<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a group expecting `total` sub-responses
    ///
    /// A group with `total == 0` is complete immediately; collect it with
    /// [`poll`](Self::poll).
    pub fn open(&mut self, client: ClientId, total: usize, accumulator: Accumulator, context: T) -> GroupId {
        let id = GroupId(self.next_id);
        self.next_id += 1;
        self.groups.insert(
            id,
            FragmentGroup {
                client,
                total,
                done: 0,
                failures: 0,
                accumulator,
                context,
            },
        );
        trace!("fragment group {:?} opened with {} fragments", id, total);
        id
    }

    /// Fold one sub-response into its group
    ///
    /// Returns the completed group when this was the last fragment. Unknown
    /// groups (abandoned or already complete) yield `None`, as does a second
    /// result for a slot that is already filled.
    pub fn contribute(&mut self, id: GroupId, contribution: Contribution) -> Option<Completed<T>> {
        let group = self.groups.get_mut(&id)?;

        match (&mut group.accumulator, contribution) {
            (Accumulator::Count(sum), Contribution::Count(n)) => *sum += n,
            (Accumulator::Sets(slots), Contribution::Set { slot, members }) => {
                match slots.get_mut(slot) {
                    Some(entry) if entry.is_none() => *entry = Some(members),
                    _ => return None,
                }
            }
            (_, Contribution::Failed) => group.failures += 1,
            (acc, other) => {
                warn!("fragment group {:?}: {:?} does not fit {:?}", id, other, acc);
                return None;
            }
        }
        group.done += 1;

        self.poll(id)
    }

    /// Take the group out if all of its fragments are in
    pub fn poll(&mut self, id: GroupId) -> Option<Completed<T>> {
        let group = self.groups.get(&id)?;
        if group.done < group.total {
            return None;
        }
        let group = self.groups.remove(&id)?;
        trace!("fragment group {:?} complete", id);
        Some(Completed {
            client: group.client,
            accumulator: group.accumulator,
            failures: group.failures,
            context: group.context,
        })
    }

    /// Drop every group belonging to `client`
    pub fn abandon_client(&mut self, client: ClientId) -> usize {
        let before = self.groups.len();
        self.groups.retain(|_, g| g.client != client);
        before - self.groups.len()
    }

    /// Open groups
    pub fn len(&self) -> usize {
        self.groups.len()
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }
}
