//! Bucket TTL policy
//!
//! Per-bucket cache TTLs, refreshed by a background poller. The poller
//! publishes immutable snapshots; each worker holds a [`PolicyReceiver`] and
//! swaps to the newest snapshot at the start of a client command.

use std::collections::HashMap;
use std::sync::Arc;

use bytes::Bytes;
use crossbeam::channel::{self, Receiver, Sender, TryRecvError};
use parking_lot::Mutex;
use tracing::debug;

use crate::key::{Key, DEFAULT_NAMESPACE};

/// Cache TTL of a bucket
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ttl {
    /// Cached copies never expire
    Never,
    Millis(u64),
}

/// Immutable snapshot of the bucket TTL table
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BucketPolicy {
    buckets: HashMap<Bytes, HashMap<Bytes, Ttl>>,
}

impl BucketPolicy {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an entry, builder style
    pub fn with_ttl(mut self, namespace: &[u8], bucket: &[u8], ttl: Ttl) -> Self {
        self.set_ttl(namespace, bucket, ttl);
        self
    }

    pub fn set_ttl(&mut self, namespace: &[u8], bucket: &[u8], ttl: Ttl) {
        self.buckets
            .entry(Bytes::copy_from_slice(namespace))
            .or_default()
            .insert(Bytes::copy_from_slice(bucket), ttl);
    }

    /// TTL configured for a bucket, if any
    pub fn bucket_ttl(&self, namespace: &[u8], bucket: &[u8]) -> Option<Ttl> {
        self.buckets.get(namespace)?.get(bucket).copied()
    }

    /// Expiry to attach to a cache write of `key`, `None` for no expiry
    ///
    /// The bucket entry wins; otherwise the pool default applies, where 0
    /// means never.
    pub fn resolve_ttl(&self, key: &Key, server_ttl_ms: u64) -> Option<u64> {
        let namespace = key.namespace.as_deref().unwrap_or(DEFAULT_NAMESPACE);
        match self.bucket_ttl(namespace, &key.bucket) {
            Some(Ttl::Never) => None,
            Some(Ttl::Millis(ms)) => Some(ms),
            None if server_ttl_ms == 0 => None,
            None => Some(server_ttl_ms),
        }
    }

    pub fn len(&self) -> usize {
        self.buckets.values().map(HashMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Publishing side, owned by the poller
#[derive(Debug)]
pub struct PolicyPublisher {
    current: Mutex<Arc<BucketPolicy>>,
    subscribers: Mutex<Vec<Sender<Arc<BucketPolicy>>>>,
}

impl PolicyPublisher {
    pub fn new(initial: BucketPolicy) -> Self {
        Self {
            current: Mutex::new(Arc::new(initial)),
            subscribers: Mutex::new(Vec::new()),
        }
    }

    /// Register a worker; it starts on the current snapshot
    pub fn subscribe(&self) -> PolicyReceiver {
        let (tx, rx) = channel::unbounded();
        let current = self.current.lock().clone();
        self.subscribers.lock().push(tx);
        PolicyReceiver { rx, current }
    }

    /// Hand a new snapshot to every live worker
    pub fn publish(&self, policy: BucketPolicy) {
        let snapshot = Arc::new(policy);
        *self.current.lock() = snapshot.clone();

        let mut subscribers = self.subscribers.lock();
        subscribers.retain(|tx| tx.send(snapshot.clone()).is_ok());
        debug!(
            "published bucket policy with {} entries to {} workers",
            snapshot.len(),
            subscribers.len()
        );
    }

    pub fn current(&self) -> Arc<BucketPolicy> {
        self.current.lock().clone()
    }
}

/// Worker side of the policy handoff
#[derive(Debug)]
pub struct PolicyReceiver {
    rx: Receiver<Arc<BucketPolicy>>,
    current: Arc<BucketPolicy>,
}

impl PolicyReceiver {
    /// A receiver that never sees updates
    pub fn fixed(policy: BucketPolicy) -> Self {
        let (_tx, rx) = channel::bounded(0);
        Self {
            rx,
            current: Arc::new(policy),
        }
    }

    /// Swap to the newest published snapshot; never blocks
    ///
    /// Returns true if the snapshot changed.
    pub fn refresh(&mut self) -> bool {
        let mut changed = false;
        loop {
            match self.rx.try_recv() {
                Ok(snapshot) => {
                    self.current = snapshot;
                    changed = true;
                }
                Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => break,
            }
        }
        changed
    }

    pub fn current(&self) -> &Arc<BucketPolicy> {
        &self.current
    }
}
