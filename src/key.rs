//! Key Codec
//!
//! Frontend keys carry their backend location inline:
//!
//! ```text
//! key                      -> namespace = none, bucket = "",  key
//! bucket:key               -> namespace = none, bucket,       key
//! namespace:bucket:key     -> namespace,        bucket,       key (may contain ':')
//! ```
//!
//! When the most specific component comes out empty (`bucket:` or
//! `ns:bucket:`) every component shifts one level down until a non-empty key
//! is found. Keys without a bucket never reach the backend tier.

use bytes::{BufMut, Bytes, BytesMut};

use crate::error::{ProxyError, Result};

/// Namespace used for policy lookups when a key carries none
pub const DEFAULT_NAMESPACE: &[u8] = b"default";

/// Separator between key components
pub const SEPARATOR: u8 = b':';

/// A frontend key split into its backend location
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Key {
    /// Namespace (backend bucket type), if given
    pub namespace: Option<Bytes>,

    /// Bucket; empty means the key lives in the cache tier only
    pub bucket: Bytes,

    /// Key within the bucket
    pub key: Bytes,
}

impl Key {
    pub fn new(namespace: Option<&[u8]>, bucket: &[u8], key: &[u8]) -> Self {
        Self {
            namespace: namespace
                .filter(|ns| !ns.is_empty())
                .map(Bytes::copy_from_slice),
            bucket: Bytes::copy_from_slice(bucket),
            key: Bytes::copy_from_slice(key),
        }
    }

    /// Whether this key can be routed to the backend tier
    pub fn has_bucket(&self) -> bool {
        !self.bucket.is_empty()
    }

    /// Namespace for policy lookups, `default` when absent
    pub fn namespace_or_default(&self) -> &[u8] {
        self.namespace.as_deref().unwrap_or(DEFAULT_NAMESPACE)
    }

    /// Canonical frontend form of this key
    pub fn join(&self) -> Bytes {
        join(self.namespace.as_deref(), &self.bucket, &self.key)
    }

    /// Require a bucket, as every backend write does
    pub fn require_bucket(self) -> Result<Self> {
        if self.has_bucket() {
            Ok(self)
        } else {
            Err(ProxyError::BadRequest(format!(
                "key '{}' has no bucket",
                String::from_utf8_lossy(&self.key)
            )))
        }
    }
}

/// Split a raw frontend key into (namespace, bucket, key)
pub fn split(raw: &[u8]) -> Result<Key> {
    if raw.iter().all(u8::is_ascii_whitespace) {
        return Err(ProxyError::Malformed("empty key".to_string()));
    }

    let (mut namespace, mut bucket, mut key): (&[u8], &[u8], &[u8]) =
        match raw.iter().position(|&b| b == SEPARATOR) {
            None => (raw, &[], &[]),
            Some(first) => {
                let rest = &raw[first + 1..];
                match rest.iter().position(|&b| b == SEPARATOR) {
                    None => (&raw[..first], rest, &[]),
                    Some(second) => (&raw[..first], &rest[..second], &rest[second + 1..]),
                }
            }
        };

    // looser interpretation: shift components down while the key is empty
    while key.is_empty() && !(bucket.is_empty() && namespace.is_empty()) {
        key = bucket;
        bucket = namespace;
        namespace = &[];
    }

    if key.is_empty() {
        return Err(ProxyError::Malformed(format!(
            "key '{}' has no usable key component",
            String::from_utf8_lossy(raw)
        )));
    }

    Ok(Key::new(Some(namespace), bucket, key))
}

/// Join components back into the frontend form
///
/// Emits `namespace:bucket:key` when a namespace is present, `bucket:key`
/// when only a bucket is, and the bare key otherwise.
pub fn join(namespace: Option<&[u8]>, bucket: &[u8], key: &[u8]) -> Bytes {
    let namespace = namespace.filter(|ns| !ns.is_empty());
    let mut out = BytesMut::with_capacity(
        namespace.map_or(0, |ns| ns.len() + 1) + bucket.len() + 1 + key.len(),
    );

    if let Some(ns) = namespace {
        out.put_slice(ns);
        out.put_u8(SEPARATOR);
    }
    if !bucket.is_empty() || namespace.is_some() {
        out.put_slice(bucket);
        out.put_u8(SEPARATOR);
    }
    out.put_slice(key);

    out.freeze()
}
