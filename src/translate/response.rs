//! Response translation
//!
//! Repacks decoded backend responses and cache-tier replies into client
//! replies, and builds the side-effect commands that keep the cache tier
//! in step with the backend.

use std::collections::HashSet;

use bytes::Bytes;
use rand::Rng;

use super::sibling;
use crate::error::ProxyError;
use crate::frontend::{reply, RespValue, SetAlgebra};
use crate::wire::BackendResponse;

/// What a client read over a set wants to know
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SetQuery {
    Members,
    IsMember(Bytes),
    Card,
}

/// Outcome of a backend Get for a client read
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GetOutcome {
    NotFound { vclock: Option<Bytes> },
    Found { value: Bytes, vclock: Option<Bytes> },
}

/// Resolve a Get result to the value to reply with
///
/// Returns `None` if the response is not a Get result.
pub fn get_outcome<R: Rng + ?Sized>(response: &BackendResponse, rng: &mut R) -> Option<GetOutcome> {
    let BackendResponse::GetResult { siblings, vclock } = response else {
        return None;
    };
    let outcome = match sibling::resolve(siblings, rng) {
        Some(chosen) => GetOutcome::Found {
            value: strip_quotes(&chosen.value),
            vclock: vclock.clone(),
        },
        None => GetOutcome::NotFound {
            vclock: vclock.clone(),
        },
    };
    Some(outcome)
}

/// Drop the surrounding quotes some writers store values with
pub fn strip_quotes(value: &Bytes) -> Bytes {
    if value.len() > 1 && value[0] == b'"' {
        value.slice(1..value.len() - 1)
    } else {
        value.clone()
    }
}

/// Error message fragments the backend uses for conditions another replica
/// may not share
const TRANSIENT_BACKEND_ERRORS: &[&str] = &["timeout", "overload", "insufficient_vnodes", "unavailable"];

/// Classify a backend-reported error
///
/// Overload, timeouts and missing vnodes are transient; anything else is
/// the backend's final answer.
pub fn classify_backend_error(message: &str) -> ProxyError {
    let lower = message.to_ascii_lowercase();
    if TRANSIENT_BACKEND_ERRORS.iter().any(|m| lower.contains(m)) {
        ProxyError::Transient(message.to_string())
    } else {
        ProxyError::Upstream(message.to_string())
    }
}

/// Reply to a backend error
pub fn backend_error_reply(response: &BackendResponse) -> Option<Bytes> {
    match response {
        BackendResponse::Error { message, .. } => Some(reply::error(message)),
        _ => None,
    }
}

/// Reply to a set read computed from the whole member set
pub fn set_query_reply(query: &SetQuery, members: &[Bytes]) -> Bytes {
    match query {
        SetQuery::Members => reply::members(members),
        SetQuery::IsMember(member) => reply::integer(members.contains(member) as i64),
        SetQuery::Card => reply::integer(members.len() as i64),
    }
}

/// Whether a cache reply to a set read means the cache does not hold the set
pub fn is_set_cache_miss(query: &SetQuery, cached: &RespValue) -> bool {
    match (query, cached) {
        (_, RespValue::Error(_)) => true,
        (SetQuery::Members, RespValue::Array(None)) => true,
        (SetQuery::Members, RespValue::Array(Some(items))) => items.is_empty(),
        (SetQuery::IsMember(_) | SetQuery::Card, RespValue::Integer(n)) => *n == 0,
        (_, value) => value.is_nil(),
    }
}

/// Members of a cached SMEMBERS reply, `None` on a miss
pub fn cached_members(cached: &RespValue) -> Option<Vec<Bytes>> {
    match cached {
        RespValue::Array(Some(items)) if !items.is_empty() => Some(
            items
                .iter()
                .filter_map(|item| item.as_bytes().cloned())
                .collect(),
        ),
        _ => None,
    }
}

// =============================================================================
// Set Algebra
// =============================================================================

/// Compute the set operation over member sets, in key order
///
/// Results keep first-seen order of their members.
pub fn set_algebra(op: SetAlgebra, sets: &[Vec<Bytes>]) -> Vec<Bytes> {
    let Some((first, rest)) = sets.split_first() else {
        return Vec::new();
    };

    match op {
        SetAlgebra::Union => {
            let mut seen = HashSet::new();
            sets.iter()
                .flatten()
                .filter(|m| seen.insert(*m))
                .cloned()
                .collect()
        }
        SetAlgebra::Inter => {
            let others: Vec<HashSet<&Bytes>> = rest.iter().map(|s| s.iter().collect()).collect();
            let mut seen = HashSet::new();
            first
                .iter()
                .filter(|m| others.iter().all(|o| o.contains(m)))
                .filter(|m| seen.insert(*m))
                .cloned()
                .collect()
        }
        SetAlgebra::Diff => {
            let removed: HashSet<&Bytes> = rest.iter().flatten().collect();
            let mut seen = HashSet::new();
            first
                .iter()
                .filter(|m| !removed.contains(m))
                .filter(|m| seen.insert(*m))
                .cloned()
                .collect()
        }
    }
}

// =============================================================================
// Cache Synchronization
// =============================================================================

/// Read-through populate of a plain value
pub fn populate_value(raw_key: &[u8], value: &[u8], ttl_ms: Option<u64>) -> Bytes {
    reply::cache_set(raw_key, value, ttl_ms)
}

/// Read-through populate of a whole set: one SADD plus its expiry
///
/// Empty sets produce nothing.
pub fn populate_set(raw_key: &[u8], members: &[Bytes], ttl_ms: Option<u64>) -> Vec<Bytes> {
    if members.is_empty() {
        return Vec::new();
    }
    let mut commands = vec![reply::cache_sadd(raw_key, members)];
    if let Some(ttl) = ttl_ms {
        commands.push(reply::cache_pexpire(raw_key, ttl));
    }
    commands
}

/// Write-through of a stored set: the old copy goes, the new one replaces it
pub fn replace_set(raw_key: &[u8], members: &[Bytes], ttl_ms: Option<u64>) -> Vec<Bytes> {
    let mut commands = vec![reply::cache_del(raw_key)];
    commands.extend(populate_set(raw_key, members, ttl_ms));
    commands
}

/// Drop the cached copy of a key
pub fn invalidate(raw_key: &[u8]) -> Bytes {
    reply::cache_pexpire(raw_key, 0)
}
