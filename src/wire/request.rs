//! Backend request definitions
//!
//! Typed requests produced by the request translator. A request owns a copy
//! of the quorum policy taken when it was built, never a reference to the
//! pool's live settings.

use bytes::Bytes;

use crate::config::QuorumPolicy;
use crate::key::Key;

/// Backend message codes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum MessageCode {
    ErrorResp = 0,
    GetReq = 9,
    GetResp = 10,
    PutReq = 11,
    PutResp = 12,
    DelReq = 13,
    DelResp = 14,
    CounterUpdateReq = 50,
    CounterUpdateResp = 51,
    CounterGetReq = 52,
    CounterGetResp = 53,
    DtFetchReq = 80,
    DtFetchResp = 81,
    DtUpdateReq = 82,
    DtUpdateResp = 83,
}

impl MessageCode {
    pub fn from_u8(code: u8) -> Option<Self> {
        let code = match code {
            0 => MessageCode::ErrorResp,
            9 => MessageCode::GetReq,
            10 => MessageCode::GetResp,
            11 => MessageCode::PutReq,
            12 => MessageCode::PutResp,
            13 => MessageCode::DelReq,
            14 => MessageCode::DelResp,
            50 => MessageCode::CounterUpdateReq,
            51 => MessageCode::CounterUpdateResp,
            52 => MessageCode::CounterGetReq,
            53 => MessageCode::CounterGetResp,
            80 => MessageCode::DtFetchReq,
            81 => MessageCode::DtFetchResp,
            82 => MessageCode::DtUpdateReq,
            83 => MessageCode::DtUpdateResp,
            _ => return None,
        };
        Some(code)
    }
}

/// Set CRDT operation direction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SetAction {
    Add,
    Remove,
}

/// Kind of a backend request, used to pair it with its response
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestKind {
    Get,
    Put,
    Delete,
    SetUpdate,
    SetFetch,
    CounterFetch,
    CounterUpdate,
}

impl RequestKind {
    pub fn request_code(self) -> MessageCode {
        match self {
            RequestKind::Get => MessageCode::GetReq,
            RequestKind::Put => MessageCode::PutReq,
            RequestKind::Delete => MessageCode::DelReq,
            RequestKind::SetUpdate => MessageCode::DtUpdateReq,
            RequestKind::SetFetch => MessageCode::DtFetchReq,
            RequestKind::CounterFetch => MessageCode::CounterGetReq,
            RequestKind::CounterUpdate => MessageCode::CounterUpdateReq,
        }
    }

    /// The response code a successful reply carries
    pub fn response_code(self) -> MessageCode {
        match self {
            RequestKind::Get => MessageCode::GetResp,
            RequestKind::Put => MessageCode::PutResp,
            RequestKind::Delete => MessageCode::DelResp,
            RequestKind::SetUpdate => MessageCode::DtUpdateResp,
            RequestKind::SetFetch => MessageCode::DtFetchResp,
            RequestKind::CounterFetch => MessageCode::CounterGetResp,
            RequestKind::CounterUpdate => MessageCode::CounterUpdateResp,
        }
    }

    /// Whether a bodiless code-0 frame acknowledges this request
    pub fn has_bare_ack(self) -> bool {
        matches!(
            self,
            RequestKind::Put | RequestKind::Delete | RequestKind::SetUpdate
        )
    }

    /// Reads are the only requests that may be resent to another replica
    pub fn is_idempotent_read(self) -> bool {
        matches!(
            self,
            RequestKind::Get | RequestKind::SetFetch | RequestKind::CounterFetch
        )
    }
}

/// Operation-specific part of a backend request
#[derive(Debug, Clone, PartialEq)]
pub enum RequestBody {
    /// Fetch a value (and its vclock)
    Get,

    /// Store a value
    Put {
        value: Bytes,
        content_type: &'static str,
        vclock: Option<Bytes>,
    },

    /// Delete a key
    Delete,

    /// Add or remove set members in one call
    SetUpdate {
        bucket_type: Bytes,
        action: SetAction,
        members: Vec<Bytes>,
    },

    /// Rewrite a set in one update; removes need the fetched context
    SetReplace {
        bucket_type: Bytes,
        adds: Vec<Bytes>,
        removes: Vec<Bytes>,
        context: Option<Bytes>,
    },

    /// Fetch a whole set
    SetFetch { bucket_type: Bytes },

    /// Read a legacy counter
    CounterFetch,

    /// Increment a legacy counter, returning the new value
    CounterUpdate { amount: i64 },
}

/// A typed request bound for the backend tier
#[derive(Debug, Clone, PartialEq)]
pub struct BackendRequest {
    pub key: Key,
    pub quorum: QuorumPolicy,
    pub body: RequestBody,
}

impl BackendRequest {
    pub fn new(key: Key, quorum: QuorumPolicy, body: RequestBody) -> Self {
        Self { key, quorum, body }
    }

    pub fn kind(&self) -> RequestKind {
        match &self.body {
            RequestBody::Get => RequestKind::Get,
            RequestBody::Put { .. } => RequestKind::Put,
            RequestBody::Delete => RequestKind::Delete,
            RequestBody::SetUpdate { .. } | RequestBody::SetReplace { .. } => RequestKind::SetUpdate,
            RequestBody::SetFetch { .. } => RequestKind::SetFetch,
            RequestBody::CounterFetch => RequestKind::CounterFetch,
            RequestBody::CounterUpdate { .. } => RequestKind::CounterUpdate,
        }
    }
}
