//! Static server pool
//!
//! A fixed list of cache and backend servers with FNV-1a modulo placement
//! and per-server eject state. Placement skips ejected servers until their
//! retry time passes.

use std::time::{Duration, Instant};

use parking_lot::RwLock;
use tracing::warn;

use crate::failover::{ServerId, ServerPool, Tier};

const FNV_OFFSET: u32 = 0x811c_9dc5;
const FNV_PRIME: u32 = 0x0100_0193;

/// 32-bit FNV-1a
pub fn fnv1a(key: &[u8]) -> u32 {
    key.iter().fold(FNV_OFFSET, |hash, &b| {
        (hash ^ u32::from(b)).wrapping_mul(FNV_PRIME)
    })
}

#[derive(Debug)]
struct ServerState {
    name: String,
    next_retry: Option<Instant>,
    failures: u32,
}

impl ServerState {
    fn new(name: String) -> Self {
        Self {
            name,
            next_retry: None,
            failures: 0,
        }
    }

    fn is_live(&self, now: Instant) -> bool {
        self.next_retry.map_or(true, |at| at <= now)
    }
}

/// Fixed pool of servers for both tiers
#[derive(Debug)]
pub struct StaticPool {
    cache: RwLock<Vec<ServerState>>,
    backend: RwLock<Vec<ServerState>>,
}

impl StaticPool {
    pub fn new<S: Into<String>>(
        cache: impl IntoIterator<Item = S>,
        backend: impl IntoIterator<Item = S>,
    ) -> Self {
        Self {
            cache: RwLock::new(cache.into_iter().map(|s| ServerState::new(s.into())).collect()),
            backend: RwLock::new(
                backend
                    .into_iter()
                    .map(|s| ServerState::new(s.into()))
                    .collect(),
            ),
        }
    }

    fn tier(&self, tier: Tier) -> &RwLock<Vec<ServerState>> {
        match tier {
            Tier::Cache => &self.cache,
            Tier::Backend => &self.backend,
        }
    }

    pub fn len(&self, tier: Tier) -> usize {
        self.tier(tier).read().len()
    }

    pub fn is_empty(&self, tier: Tier) -> bool {
        self.len(tier) == 0
    }

    pub fn server_name(&self, tier: Tier, id: ServerId) -> Option<String> {
        self.tier(tier).read().get(id.0).map(|s| s.name.clone())
    }

    /// Put a server in cooldown for `cooldown`
    pub fn eject(&self, tier: Tier, id: ServerId, cooldown: Duration) {
        if let Some(server) = self.tier(tier).write().get_mut(id.0) {
            server.failures += 1;
            server.next_retry = Some(Instant::now() + cooldown);
            warn!(
                "ejecting {:?} server {} after {} failures",
                tier, server.name, server.failures
            );
        }
    }

    /// Clear a server's cooldown
    pub fn restore(&self, tier: Tier, id: ServerId) {
        if let Some(server) = self.tier(tier).write().get_mut(id.0) {
            server.failures = 0;
            server.next_retry = None;
        }
    }
}

impl ServerPool for StaticPool {
    fn pick_server(&self, tier: Tier, key: &[u8]) -> Option<ServerId> {
        let live = self.live_replicas(tier);
        if live.is_empty() {
            return None;
        }
        let index = fnv1a(key) as usize % live.len();
        Some(live[index])
    }

    fn live_replicas(&self, tier: Tier) -> Vec<ServerId> {
        let now = Instant::now();
        self.tier(tier)
            .read()
            .iter()
            .enumerate()
            .filter(|(_, s)| s.is_live(now))
            .map(|(i, _)| ServerId(i))
            .collect()
    }
}
