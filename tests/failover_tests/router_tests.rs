//! Failover Router Tests
//!
//! Tests for primary selection and the bounded replica resend queue.

use std::time::Duration;

use parking_lot::Mutex;
use tierproxy::failover::{FailoverRouter, ResendQueue, ServerId, ServerPool, Tier};
use tierproxy::ring::StaticPool;

// =============================================================================
// Helper Functions
// =============================================================================

/// Pool whose backend liveness can be changed between calls
struct ScriptedPool {
    primary: ServerId,
    live: Mutex<Vec<ServerId>>,
}

impl ScriptedPool {
    fn new(primary: usize, live: &[usize]) -> Self {
        Self {
            primary: ServerId(primary),
            live: Mutex::new(live.iter().copied().map(ServerId).collect()),
        }
    }

    fn set_live(&self, live: &[usize]) {
        *self.live.lock() = live.iter().copied().map(ServerId).collect();
    }
}

impl ServerPool for ScriptedPool {
    fn pick_server(&self, tier: Tier, _key: &[u8]) -> Option<ServerId> {
        match tier {
            Tier::Backend => Some(self.primary),
            Tier::Cache => None,
        }
    }

    fn live_replicas(&self, tier: Tier) -> Vec<ServerId> {
        match tier {
            Tier::Backend => self.live.lock().clone(),
            Tier::Cache => Vec::new(),
        }
    }
}

// =============================================================================
// Resend Queue Tests
// =============================================================================

#[test]
fn test_budget_of_one_never_resends() {
    let pool = ScriptedPool::new(0, &[0, 1, 2]);
    let router = FailoverRouter::new(1);
    let mut queue = ResendQueue::new();

    assert_eq!(router.next_replica(&pool, ServerId(0), &mut queue), None);
    assert!(queue.is_built());
}

#[test]
fn test_zero_budget_behaves_as_one() {
    let router = FailoverRouter::new(0);
    assert_eq!(router.max_resend(), 1);
}

#[test]
fn test_resend_visits_distinct_replicas_within_budget() {
    let pool = ScriptedPool::new(0, &[0, 1, 2, 3, 4]);
    let router = FailoverRouter::new(3);
    let mut queue = ResendQueue::new();

    let first = router.next_replica(&pool, ServerId(0), &mut queue).unwrap();
    let second = router.next_replica(&pool, ServerId(0), &mut queue).unwrap();

    assert_ne!(first, ServerId(0));
    assert_ne!(second, ServerId(0));
    assert_ne!(first, second);

    // primary plus two resends spends a budget of three
    assert_eq!(router.next_replica(&pool, ServerId(0), &mut queue), None);
}

#[test]
fn test_queue_is_built_from_replicas_live_at_first_failure() {
    let pool = ScriptedPool::new(0, &[0, 1, 2, 3]);
    let router = FailoverRouter::new(4);
    let mut queue = ResendQueue::new();

    pool.set_live(&[0, 2]);
    assert_eq!(router.next_replica(&pool, ServerId(0), &mut queue), Some(ServerId(2)));

    // replicas coming back later do not join an existing queue
    pool.set_live(&[0, 1, 2, 3]);
    assert_eq!(router.next_replica(&pool, ServerId(0), &mut queue), None);
}

#[test]
fn test_no_live_replicas_exhausts_immediately() {
    let pool = ScriptedPool::new(0, &[0]);
    let router = FailoverRouter::new(5);
    let mut queue = ResendQueue::new();

    assert_eq!(router.next_replica(&pool, ServerId(0), &mut queue), None);
    assert_eq!(queue.remaining(), 0);
}

#[test]
fn test_primary_comes_from_pool() {
    let pool = ScriptedPool::new(3, &[0, 1, 2, 3]);
    let router = FailoverRouter::new(2);
    assert_eq!(router.primary(&pool, b"any"), Some(ServerId(3)));
}

// =============================================================================
// Static Pool Tests
// =============================================================================

#[test]
fn test_static_pool_placement_is_stable() {
    let pool = StaticPool::new(vec!["c0", "c1", "c2"], vec!["b0", "b1", "b2"]);
    for key in [&b"a:1"[..], b"a:2", b"users:99"] {
        let first = pool.pick_server(Tier::Cache, key);
        assert!(first.is_some());
        assert_eq!(pool.pick_server(Tier::Cache, key), first);
    }
    assert_eq!(pool.server_name(Tier::Backend, ServerId(1)).as_deref(), Some("b1"));
}

#[test]
fn test_static_pool_ejected_server_leaves_resend_queue() {
    let pool = StaticPool::new(Vec::<&str>::new(), vec!["b0", "b1", "b2"]);
    pool.eject(Tier::Backend, ServerId(1), Duration::from_secs(30));

    let router = FailoverRouter::new(3);
    let mut queue = ResendQueue::new();
    assert_eq!(router.next_replica(&pool, ServerId(0), &mut queue), Some(ServerId(2)));
    assert_eq!(router.next_replica(&pool, ServerId(0), &mut queue), None);
}

#[test]
fn test_empty_tier_has_no_primary() {
    let pool = StaticPool::new(Vec::<&str>::new(), vec!["b0"]);
    assert!(pool.is_empty(Tier::Cache));
    assert_eq!(pool.pick_server(Tier::Cache, b"k"), None);
}
