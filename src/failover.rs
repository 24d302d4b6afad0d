//! Failover Router
//!
//! Chooses the backend replica a request goes to and, for idempotent reads
//! that fail transiently, the next untried replica within the resend budget.
//!
//! Server placement and eject/cooldown state belong to the [`ServerPool`];
//! the router only reads them.

use std::collections::VecDeque;
use std::fmt;

use tracing::debug;

/// Which set of servers a lookup refers to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Tier {
    /// Servers speaking the frontend text protocol
    Cache,
    /// Source-of-truth servers speaking the binary protocol
    Backend,
}

/// Index of a server within its tier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ServerId(pub usize);

impl fmt::Display for ServerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Ring and eject state of a server pool
pub trait ServerPool: Send + Sync {
    /// Server owning `key` in `tier`
    fn pick_server(&self, tier: Tier, key: &[u8]) -> Option<ServerId>;

    /// Servers of `tier` not currently in cooldown, in pool order
    fn live_replicas(&self, tier: Tier) -> Vec<ServerId>;
}

/// Untried replicas for one operation, built on its first failure
#[derive(Debug, Clone, Default)]
pub struct ResendQueue {
    servers: VecDeque<ServerId>,
    built: bool,
}

impl ResendQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_built(&self) -> bool {
        self.built
    }

    /// Replicas still available
    pub fn remaining(&self) -> usize {
        self.servers.len()
    }

    fn build(&mut self, primary: ServerId, live: Vec<ServerId>, max_resend: usize) {
        self.servers = live
            .into_iter()
            .filter(|&s| s != primary)
            .take(max_resend.saturating_sub(1))
            .collect();
        self.built = true;
    }

    fn pop(&mut self) -> Option<ServerId> {
        self.servers.pop_front()
    }
}

/// Primary selection and bounded resend
#[derive(Debug, Clone, Copy)]
pub struct FailoverRouter {
    max_resend: usize,
}

impl FailoverRouter {
    /// `max_resend` counts every replica tried, the primary included;
    /// values below 1 behave as 1.
    pub fn new(max_resend: usize) -> Self {
        Self {
            max_resend: max_resend.max(1),
        }
    }

    pub fn max_resend(&self) -> usize {
        self.max_resend
    }

    /// Backend replica owning `key`
    pub fn primary(&self, pool: &dyn ServerPool, key: &[u8]) -> Option<ServerId> {
        pool.pick_server(Tier::Backend, key)
    }

    /// Next replica to resend to after `failed` could not serve the read
    ///
    /// The first call builds the queue from the replicas that are live at
    /// that moment. `None` means the budget is spent.
    pub fn next_replica(
        &self,
        pool: &dyn ServerPool,
        primary: ServerId,
        queue: &mut ResendQueue,
    ) -> Option<ServerId> {
        if !queue.is_built() {
            queue.build(primary, pool.live_replicas(Tier::Backend), self.max_resend);
            debug!(
                "resend queue built for primary {}: {} replicas",
                primary,
                queue.remaining()
            );
        }
        queue.pop()
    }
}
