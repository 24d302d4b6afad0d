//! Pending operations
//!
//! One entry per outstanding cache or backend request. Server connections
//! only hold operation ids in FIFO order; the entry itself lives in the
//! engine's table, so an abandoned operation is simply absent when its
//! response turns up.

use bytes::Bytes;

use super::client::{ClientId, ReplySlot};
use crate::failover::{ResendQueue, ServerId};
use crate::fragment::GroupId;
use crate::frontend::SetAlgebra;
use crate::translate::{RoutedKey, SetQuery};
use crate::wire::{BackendRequest, RequestKind};

/// Identifier of one pending operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct OpId(pub u64);

/// Where the result of an operation goes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Target {
    /// Straight to a client reply slot
    Client(ReplySlot),
    /// Into one fragment of a group
    Fragment { group: GroupId, slot: usize },
}

/// What a set read answers
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SetRead {
    /// A client SMEMBERS / SISMEMBER / SCARD
    Query(SetQuery),
    /// One source set of a set-algebra command
    Slot,
}

/// A read that goes to the cache first
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReadIntent {
    Value { key: RoutedKey },
    Set { key: RoutedKey, read: SetRead },
}

impl ReadIntent {
    pub fn key(&self) -> &RoutedKey {
        match self {
            ReadIntent::Value { key } | ReadIntent::Set { key, .. } => key,
        }
    }
}

/// A backend write and what to do once it is acknowledged
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriteIntent {
    /// SET: reply OK, then write the value through to the cache
    Put { key: RoutedKey, value: Bytes },
    /// SADD / SREM: reply with the member count given
    SetUpdate { key: RoutedKey, count: usize },
    /// INCR family: reply with the new value
    Counter { key: RoutedKey },
    /// One key of a DEL
    Delete { key: RoutedKey },
    /// Rewrite of a STORE destination to the algebra result
    Store { dest: RoutedKey, members: Vec<Bytes> },
}

impl WriteIntent {
    pub fn key(&self) -> &RoutedKey {
        match self {
            WriteIntent::Put { key, .. }
            | WriteIntent::SetUpdate { key, .. }
            | WriteIntent::Counter { key }
            | WriteIntent::Delete { key } => key,
            WriteIntent::Store { dest, .. } => dest,
        }
    }
}

/// Step an operation is waiting on
#[derive(Debug, Clone, PartialEq)]
pub enum Stage {
    CacheRead(ReadIntent),
    BackendRead(ReadIntent),
    /// Read-before-write: a Get is out, the Put waits for its vclock
    AwaitingVclock {
        key: RoutedKey,
        value: Bytes,
        deferred: BackendRequest,
    },
    /// STORE: the destination's current members are being fetched
    StoreFetch { dest: RoutedKey, members: Vec<Bytes> },
    BackendWrite(WriteIntent),
}

impl Stage {
    pub fn name(&self) -> &'static str {
        match self {
            Stage::CacheRead(_) => "cache-read",
            Stage::BackendRead(_) => "backend-read",
            Stage::AwaitingVclock { .. } => "awaiting-vclock",
            Stage::StoreFetch { .. } => "store-fetch",
            Stage::BackendWrite(_) => "backend-write",
        }
    }
}

/// One outstanding request and its continuation
#[derive(Debug)]
pub struct PendingOperation {
    pub client: ClientId,
    pub target: Target,
    pub stage: Stage,

    /// Kind of the backend request in flight
    pub kind: Option<RequestKind>,

    /// Encoded backend frame, kept so a resend needs no re-encode
    pub frame: Option<Bytes>,

    /// Replica the backend request first went to
    pub primary: Option<ServerId>,

    pub resend: ResendQueue,
}

impl PendingOperation {
    pub fn new(client: ClientId, target: Target, stage: Stage) -> Self {
        Self {
            client,
            target,
            stage,
            kind: None,
            frame: None,
            primary: None,
            resend: ResendQueue::new(),
        }
    }

    /// Only client-facing backend reads may move to another replica
    pub fn is_resendable(&self) -> bool {
        let read = self.kind.is_some_and(RequestKind::is_idempotent_read);
        read && matches!(
            (&self.target, &self.stage),
            (Target::Client(_), Stage::BackendRead(_))
        )
    }
}

/// Continuation of a fragment group
#[derive(Debug, Clone)]
pub enum FragmentContext {
    /// Multi-key DEL
    Del { slot: ReplySlot },
    /// SDIFF / SINTER / SUNION and their STORE variants
    Algebra {
        slot: ReplySlot,
        op: SetAlgebra,
        dest: Option<RoutedKey>,
    },
}
