//! Backend response definitions
//!
//! Decoded, typed backend replies. A response is consumed once by the
//! response translator and then dropped.

use bytes::Bytes;

/// One stored value as returned by a Get
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sibling {
    pub value: Bytes,

    pub content_type: Option<Bytes>,

    /// (seconds, microseconds), when the backend reported both
    pub last_modified: Option<(u32, u32)>,

    /// Tombstone marker
    pub deleted: bool,
}

impl Sibling {
    pub fn new(value: impl Into<Bytes>) -> Self {
        Self {
            value: value.into(),
            content_type: None,
            last_modified: None,
            deleted: false,
        }
    }

    pub fn with_last_modified(mut self, secs: u32, usecs: u32) -> Self {
        self.last_modified = Some((secs, usecs));
        self
    }

    pub fn tombstone(mut self) -> Self {
        self.deleted = true;
        self
    }

    /// Last-modified time in microseconds
    pub fn modified_micros(&self) -> Option<u64> {
        self.last_modified
            .map(|(secs, usecs)| u64::from(secs) * 1_000_000 + u64::from(usecs))
    }
}

/// A typed reply from the backend tier
#[derive(Debug, Clone, PartialEq)]
pub enum BackendResponse {
    /// Get result; no siblings means not found
    GetResult {
        siblings: Vec<Sibling>,
        vclock: Option<Bytes>,
    },

    /// Put acknowledged
    PutAck { vclock: Option<Bytes> },

    /// Delete acknowledged
    DeleteAck,

    /// Set contents, duplicates removed, backend order kept
    SetFetchResult {
        members: Vec<Bytes>,
        context: Option<Bytes>,
    },

    /// Counter value (fetch or update)
    CounterValue(i64),

    /// Set update acknowledged
    UpdateAck,

    /// Backend-reported failure
    Error { message: String, code: u32 },
}

impl BackendResponse {
    pub fn is_error(&self) -> bool {
        matches!(self, BackendResponse::Error { .. })
    }

    /// Whether this is a not-found outcome of a read
    pub fn is_not_found(&self) -> bool {
        match self {
            BackendResponse::GetResult { siblings, .. } => siblings.iter().all(|s| s.deleted),
            BackendResponse::SetFetchResult { members, .. } => members.is_empty(),
            _ => false,
        }
    }
}
