//! Request translation
//!
//! Turns client keys and values into typed backend requests, stamping each
//! with the pool's quorum policy as it stands at that moment.

use std::collections::HashSet;

use bytes::Bytes;
use tracing::debug;

use crate::config::PoolConfig;
use crate::error::{ProxyError, Result};
use crate::key::{self, Key};
use crate::wire::{self, BackendRequest, RequestBody, SetAction};

pub const CONTENT_TYPE_JSON: &str = "application/json";
pub const CONTENT_TYPE_XML: &str = "application/xml";
pub const CONTENT_TYPE_TEXT: &str = "text/plain";

/// Infer a content type from the shape of a value
///
/// `{...}` is JSON, `<...>` is XML, anything else is plain text.
pub fn content_type_for(value: &[u8]) -> &'static str {
    match (value.first(), value.last()) {
        (Some(b'{'), Some(b'}')) => CONTENT_TYPE_JSON,
        (Some(b'<'), Some(b'>')) => CONTENT_TYPE_XML,
        _ => CONTENT_TYPE_TEXT,
    }
}

/// A client key with its split backend location
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoutedKey {
    /// Key as the client sent it, used for cache commands and hashing
    pub raw: Bytes,
    pub key: Key,
}

impl RoutedKey {
    pub fn parse(raw: &Bytes) -> Result<Self> {
        Ok(Self {
            raw: raw.clone(),
            key: key::split(raw)?,
        })
    }

    pub fn has_bucket(&self) -> bool {
        self.key.has_bucket()
    }
}

/// Keys of a DEL, partitioned by tier
#[derive(Debug, Clone, Default)]
pub struct DelPlan {
    /// Keys with a bucket, deleted at the backend
    pub backend: Vec<RoutedKey>,

    /// Bucket-less keys, expired in the cache tier only
    pub local: Vec<RoutedKey>,
}

/// Partition the keys of a DEL
pub fn plan_del(keys: &[Bytes]) -> Result<DelPlan> {
    let mut plan = DelPlan::default();
    for raw in keys {
        let routed = RoutedKey::parse(raw)?;
        if routed.has_bucket() {
            plan.backend.push(routed);
        } else {
            plan.local.push(routed);
        }
    }
    debug!(
        "DEL plan: {} backend keys, {} local keys",
        plan.backend.len(),
        plan.local.len()
    );
    Ok(plan)
}

/// Builds backend requests for one pool
#[derive(Debug, Clone)]
pub struct RequestTranslator {
    config: PoolConfig,
}

impl RequestTranslator {
    pub fn new(config: PoolConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &PoolConfig {
        &self.config
    }

    fn request(&self, key: &Key, body: RequestBody) -> Result<BackendRequest> {
        let key = key.clone().require_bucket()?;
        Ok(BackendRequest::new(key, self.config.quorum, body))
    }

    /// Bucket type for set messages: the key's namespace, else the pool's
    fn set_bucket_type(&self, key: &Key) -> Bytes {
        key.namespace
            .clone()
            .unwrap_or_else(|| Bytes::copy_from_slice(self.config.set_bucket_type.as_bytes()))
    }

    pub fn get(&self, key: &Key) -> Result<BackendRequest> {
        self.request(key, RequestBody::Get)
    }

    pub fn put(&self, key: &Key, value: Bytes, vclock: Option<Bytes>) -> Result<BackendRequest> {
        let content_type = content_type_for(&value);
        self.request(
            key,
            RequestBody::Put {
                value,
                content_type,
                vclock,
            },
        )
    }

    pub fn delete(&self, key: &Key) -> Result<BackendRequest> {
        self.request(key, RequestBody::Delete)
    }

    /// One update carrying every member
    pub fn set_update(
        &self,
        key: &Key,
        action: SetAction,
        members: Vec<Bytes>,
    ) -> Result<BackendRequest> {
        if members.is_empty() {
            return Err(ProxyError::BadRequest(
                "set update needs at least one member".to_string(),
            ));
        }
        let bucket_type = self.set_bucket_type(key);
        self.request(
            key,
            RequestBody::SetUpdate {
                bucket_type,
                action,
                members,
            },
        )
    }

    /// Update turning the set's `current` members into exactly `wanted`
    ///
    /// Returns `None` when the two already agree.
    pub fn set_replace(
        &self,
        key: &Key,
        current: &[Bytes],
        context: Option<Bytes>,
        wanted: &[Bytes],
    ) -> Result<Option<BackendRequest>> {
        let keep: HashSet<&Bytes> = wanted.iter().collect();
        let have: HashSet<&Bytes> = current.iter().collect();
        let adds: Vec<Bytes> = wanted.iter().filter(|m| !have.contains(m)).cloned().collect();
        let removes: Vec<Bytes> = current.iter().filter(|m| !keep.contains(m)).cloned().collect();
        if adds.is_empty() && removes.is_empty() {
            return Ok(None);
        }

        let bucket_type = self.set_bucket_type(key);
        let request = self.request(
            key,
            RequestBody::SetReplace {
                bucket_type,
                adds,
                removes,
                context,
            },
        )?;
        Ok(Some(request))
    }

    /// Fetch serving SMEMBERS, SISMEMBER, SCARD and set algebra alike
    pub fn set_fetch(&self, key: &Key) -> Result<BackendRequest> {
        let bucket_type = self.set_bucket_type(key);
        self.request(key, RequestBody::SetFetch { bucket_type })
    }

    pub fn counter_update(&self, key: &Key, amount: i64) -> Result<BackendRequest> {
        self.request(key, RequestBody::CounterUpdate { amount })
    }

    /// Encode a request, enforcing the pool's frame size limit
    pub fn encode(&self, request: &BackendRequest) -> Result<Bytes> {
        wire::encode_request(request, self.config.max_frame_size)
    }
}
