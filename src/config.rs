//! Configuration for tierproxy
//!
//! Pool-level options with sensible defaults. [`PoolConfig::validate`]
//! rejects settings no backend request could be built from.

use crate::error::{ProxyError, Result};
use crate::wire::HEADER_SIZE;

/// Quorum and consistency parameters copied into every backend request.
///
/// `None` means the option is unset and the field is left off the wire.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QuorumPolicy {
    /// Read quorum
    pub r: Option<u32>,

    /// Primary read quorum
    pub pr: Option<u32>,

    /// Write quorum
    pub w: Option<u32>,

    /// Primary write quorum
    pub pw: Option<u32>,

    /// Replica count
    pub n: Option<u32>,

    pub basic_quorum: Option<bool>,
    pub sloppy_quorum: Option<bool>,
    pub notfound_ok: Option<bool>,

    /// Return the tombstone vclock for deleted keys
    pub deleted_vclock: Option<bool>,

    /// Backend-side request timeout hint (milliseconds)
    pub timeout_ms: Option<u32>,
}

impl QuorumPolicy {
    pub fn r(mut self, value: u32) -> Self {
        self.r = Some(value);
        self
    }

    pub fn pr(mut self, value: u32) -> Self {
        self.pr = Some(value);
        self
    }

    pub fn w(mut self, value: u32) -> Self {
        self.w = Some(value);
        self
    }

    pub fn pw(mut self, value: u32) -> Self {
        self.pw = Some(value);
        self
    }

    pub fn n(mut self, value: u32) -> Self {
        self.n = Some(value);
        self
    }

    pub fn basic_quorum(mut self, value: bool) -> Self {
        self.basic_quorum = Some(value);
        self
    }

    pub fn sloppy_quorum(mut self, value: bool) -> Self {
        self.sloppy_quorum = Some(value);
        self
    }

    pub fn notfound_ok(mut self, value: bool) -> Self {
        self.notfound_ok = Some(value);
        self
    }

    pub fn deleted_vclock(mut self, value: bool) -> Self {
        self.deleted_vclock = Some(value);
        self
    }

    pub fn timeout_ms(mut self, value: u32) -> Self {
        self.timeout_ms = Some(value);
        self
    }
}

/// Main configuration for one server pool
#[derive(Debug, Clone)]
pub struct PoolConfig {
    // -------------------------------------------------------------------------
    // Identity
    // -------------------------------------------------------------------------
    /// Pool name, used in log lines
    pub name: String,

    // -------------------------------------------------------------------------
    // Backend Configuration
    // -------------------------------------------------------------------------
    /// Consistency parameters attached to every backend request
    pub quorum: QuorumPolicy,

    /// Maximum number of backend replicas one idempotent read may be sent to
    /// (the primary included). Values below 1 behave as 1.
    pub max_resend: u32,

    /// Bucket type used for set CRDT messages when the key has no namespace
    pub set_bucket_type: String,

    /// Largest frame (length prefix included) we are willing to encode
    pub max_frame_size: usize,

    // -------------------------------------------------------------------------
    // Cache Tier Configuration
    // -------------------------------------------------------------------------
    /// Default TTL for values written into the cache tier (ms, 0 = never)
    pub server_ttl_ms: u64,

    /// Number of vclocks remembered per worker (0 disables the cache)
    pub vclock_cache_capacity: usize,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            name: "default".to_string(),
            quorum: QuorumPolicy::default(),
            max_resend: 1,
            set_bucket_type: "sets".to_string(),
            max_frame_size: 16 * 1024 * 1024, // 16 MB
            server_ttl_ms: 0,
            vclock_cache_capacity: 1024,
        }
    }
}

impl PoolConfig {
    /// Create a new config builder
    pub fn builder() -> PoolConfigBuilder {
        PoolConfigBuilder::default()
    }

    /// Check the settings are usable
    pub fn validate(&self) -> Result<()> {
        if self.set_bucket_type.is_empty() {
            return Err(ProxyError::Config("set bucket type must not be empty".to_string()));
        }
        if self.max_frame_size <= HEADER_SIZE {
            return Err(ProxyError::Config(format!(
                "max frame size {} leaves no room for a payload",
                self.max_frame_size
            )));
        }
        Ok(())
    }

    /// Resend budget with the minimum of one attempt applied
    pub fn effective_max_resend(&self) -> usize {
        self.max_resend.max(1) as usize
    }
}

/// Builder for PoolConfig
#[derive(Default)]
pub struct PoolConfigBuilder {
    config: PoolConfig,
}

impl PoolConfigBuilder {
    /// Set the pool name
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.config.name = name.into();
        self
    }

    /// Set the quorum policy
    pub fn quorum(mut self, quorum: QuorumPolicy) -> Self {
        self.config.quorum = quorum;
        self
    }

    /// Set the resend budget for idempotent reads
    pub fn max_resend(mut self, count: u32) -> Self {
        self.config.max_resend = count;
        self
    }

    /// Set the bucket type used for set messages
    pub fn set_bucket_type(mut self, bucket_type: impl Into<String>) -> Self {
        self.config.set_bucket_type = bucket_type.into();
        self
    }

    /// Set the maximum encoded frame size (in bytes)
    pub fn max_frame_size(mut self, size: usize) -> Self {
        self.config.max_frame_size = size;
        self
    }

    /// Set the pool default cache TTL (in milliseconds, 0 = never)
    pub fn server_ttl_ms(mut self, ms: u64) -> Self {
        self.config.server_ttl_ms = ms;
        self
    }

    /// Set the vclock cache capacity
    pub fn vclock_cache_capacity(mut self, count: usize) -> Self {
        self.config.vclock_cache_capacity = count;
        self
    }

    pub fn build(self) -> PoolConfig {
        self.config
    }
}
