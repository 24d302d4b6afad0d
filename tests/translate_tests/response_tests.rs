//! Response Translator Tests
//!
//! Tests for turning backend responses and cache replies into client
//! replies, set algebra, and cache side-effect commands.

use bytes::Bytes;
use rand::rngs::StdRng;
use rand::SeedableRng;
use tierproxy::frontend::{RespValue, SetAlgebra};
use tierproxy::translate::{
    backend_error_reply, cached_members, classify_backend_error, get_outcome, invalidate,
    is_set_cache_miss, populate_set, populate_value, replace_set, set_algebra, set_query_reply,
    strip_quotes, GetOutcome, SetQuery,
};
use tierproxy::wire::{BackendResponse, Sibling};

// =============================================================================
// Helper Functions
// =============================================================================

fn set(items: &[&'static str]) -> Vec<Bytes> {
    items.iter().map(|m| Bytes::from_static(m.as_bytes())).collect()
}

fn rng() -> StdRng {
    StdRng::seed_from_u64(42)
}

// =============================================================================
// Get Outcome Tests
// =============================================================================

#[test]
fn test_get_outcome_picks_newest_sibling() {
    let resp = BackendResponse::GetResult {
        siblings: vec![
            Sibling::new("older").with_last_modified(100, 5),
            Sibling::new("newer").with_last_modified(100, 6),
        ],
        vclock: Some(Bytes::from_static(b"vc")),
    };
    assert_eq!(
        get_outcome(&resp, &mut rng()),
        Some(GetOutcome::Found {
            value: Bytes::from_static(b"newer"),
            vclock: Some(Bytes::from_static(b"vc")),
        })
    );
}

#[test]
fn test_get_outcome_untimed_siblings_pick_one_of_them() {
    let resp = BackendResponse::GetResult {
        siblings: vec![Sibling::new("a"), Sibling::new("b"), Sibling::new("c")],
        vclock: None,
    };
    for seed in 0..16 {
        let mut rng = StdRng::seed_from_u64(seed);
        match get_outcome(&resp, &mut rng) {
            Some(GetOutcome::Found { value, .. }) => assert!(set(&["a", "b", "c"]).contains(&value)),
            other => panic!("expected a value, got {:?}", other),
        }
    }
}

#[test]
fn test_get_outcome_tombstones_are_not_found() {
    let resp = BackendResponse::GetResult {
        siblings: vec![Sibling::new("x").tombstone()],
        vclock: Some(Bytes::from_static(b"vc")),
    };
    assert_eq!(
        get_outcome(&resp, &mut rng()),
        Some(GetOutcome::NotFound {
            vclock: Some(Bytes::from_static(b"vc"))
        })
    );
    assert_eq!(get_outcome(&BackendResponse::DeleteAck, &mut rng()), None);
}

#[test]
fn test_strip_quotes() {
    assert_eq!(&strip_quotes(&Bytes::from_static(b"\"hello\""))[..], b"hello");
    assert_eq!(&strip_quotes(&Bytes::from_static(b"hello"))[..], b"hello");
    assert_eq!(&strip_quotes(&Bytes::from_static(b"\""))[..], b"\"");
    assert_eq!(&strip_quotes(&Bytes::from_static(b"\"\""))[..], b"");
}

#[test]
fn test_backend_error_reply() {
    let resp = BackendResponse::Error {
        message: "no such bucket type".to_string(),
        code: 0,
    };
    assert_eq!(
        backend_error_reply(&resp).unwrap(),
        Bytes::from_static(b"-ERR no such bucket type\r\n")
    );
    assert!(backend_error_reply(&BackendResponse::UpdateAck).is_none());
}

#[test]
fn test_classify_backend_error() {
    for transient in ["timeout", "Overload", "{error,{insufficient_vnodes,0,need,2}}"] {
        assert!(classify_backend_error(transient).is_retryable(), "{}", transient);
    }
    for final_error in ["no such bucket type", "notfound", "modified"] {
        assert!(!classify_backend_error(final_error).is_retryable(), "{}", final_error);
    }
}

// =============================================================================
// Set Reply Tests
// =============================================================================

#[test]
fn test_set_query_replies() {
    let members = set(&["a", "b"]);
    assert_eq!(
        set_query_reply(&SetQuery::Members, &members),
        Bytes::from_static(b"*2\r\n$1\r\na\r\n$1\r\nb\r\n")
    );
    assert_eq!(
        set_query_reply(&SetQuery::IsMember(Bytes::from_static(b"b")), &members),
        Bytes::from_static(b":1\r\n")
    );
    assert_eq!(
        set_query_reply(&SetQuery::IsMember(Bytes::from_static(b"z")), &members),
        Bytes::from_static(b":0\r\n")
    );
    assert_eq!(
        set_query_reply(&SetQuery::Card, &members),
        Bytes::from_static(b":2\r\n")
    );
    assert_eq!(
        set_query_reply(&SetQuery::Members, &[]),
        Bytes::from_static(b"*0\r\n")
    );
}

#[test]
fn test_set_cache_miss_detection() {
    let empty = RespValue::Array(Some(Vec::new()));
    let full = RespValue::Array(Some(vec![RespValue::bulk("a")]));

    assert!(is_set_cache_miss(&SetQuery::Members, &empty));
    assert!(!is_set_cache_miss(&SetQuery::Members, &full));
    assert!(is_set_cache_miss(&SetQuery::Card, &RespValue::Integer(0)));
    assert!(!is_set_cache_miss(&SetQuery::Card, &RespValue::Integer(3)));
    assert!(is_set_cache_miss(
        &SetQuery::Members,
        &RespValue::Error(Bytes::from_static(b"WRONGTYPE"))
    ));
}

#[test]
fn test_cached_members() {
    let full = RespValue::Array(Some(vec![RespValue::bulk("a"), RespValue::bulk("b")]));
    assert_eq!(cached_members(&full), Some(set(&["a", "b"])));
    assert_eq!(cached_members(&RespValue::Array(Some(Vec::new()))), None);
    assert_eq!(cached_members(&RespValue::nil()), None);
}

// =============================================================================
// Set Algebra Tests
// =============================================================================

#[test]
fn test_set_algebra_inter() {
    let sets = vec![set(&["a", "b", "c"]), set(&["b", "c", "d"])];
    assert_eq!(set_algebra(SetAlgebra::Inter, &sets), set(&["b", "c"]));
}

#[test]
fn test_set_algebra_union_keeps_first_seen_order() {
    let sets = vec![set(&["c", "a"]), set(&["b", "a", "d"])];
    assert_eq!(set_algebra(SetAlgebra::Union, &sets), set(&["c", "a", "b", "d"]));
}

#[test]
fn test_set_algebra_diff() {
    let sets = vec![set(&["a", "b", "c", "d"]), set(&["b"]), set(&["d", "x"])];
    assert_eq!(set_algebra(SetAlgebra::Diff, &sets), set(&["a", "c"]));
}

#[test]
fn test_set_algebra_with_empty_operand() {
    let sets = vec![set(&["a"]), Vec::new()];
    assert!(set_algebra(SetAlgebra::Inter, &sets).is_empty());
    assert_eq!(set_algebra(SetAlgebra::Diff, &sets), set(&["a"]));
    assert!(set_algebra(SetAlgebra::Union, &[]).is_empty());
}

// =============================================================================
// Cache Side-effect Tests
// =============================================================================

#[test]
fn test_populate_value_with_and_without_ttl() {
    assert_eq!(
        populate_value(b"b:k", b"v", None),
        Bytes::from_static(b"*3\r\n$3\r\nset\r\n$3\r\nb:k\r\n$1\r\nv\r\n")
    );
    assert!(populate_value(b"b:k", b"v", Some(60_000))
        .ends_with(b"$2\r\npx\r\n$5\r\n60000\r\n"));
}

#[test]
fn test_populate_set_adds_expiry() {
    let commands = populate_set(b"b:s", &set(&["x", "y"]), Some(500));
    assert_eq!(commands.len(), 2);
    assert_eq!(
        commands[0],
        Bytes::from_static(b"*4\r\n$4\r\nsadd\r\n$3\r\nb:s\r\n$1\r\nx\r\n$1\r\ny\r\n")
    );
    assert_eq!(
        commands[1],
        Bytes::from_static(b"*3\r\n$7\r\npexpire\r\n$3\r\nb:s\r\n$3\r\n500\r\n")
    );

    assert_eq!(populate_set(b"b:s", &set(&["x"]), None).len(), 1);
    assert!(populate_set(b"b:s", &[], Some(500)).is_empty());
}

#[test]
fn test_replace_set_drops_old_copy_first() {
    let commands = replace_set(b"b:d", &set(&["x"]), Some(500));
    assert_eq!(
        commands,
        vec![
            Bytes::from_static(b"*2\r\n$3\r\ndel\r\n$3\r\nb:d\r\n"),
            Bytes::from_static(b"*3\r\n$4\r\nsadd\r\n$3\r\nb:d\r\n$1\r\nx\r\n"),
            Bytes::from_static(b"*3\r\n$7\r\npexpire\r\n$3\r\nb:d\r\n$3\r\n500\r\n"),
        ]
    );
    assert_eq!(replace_set(b"b:d", &[], Some(500)).len(), 1);
}

#[test]
fn test_invalidate_expires_immediately() {
    assert_eq!(
        invalidate(b"b:k"),
        Bytes::from_static(b"*3\r\n$7\r\npexpire\r\n$3\r\nb:k\r\n$1\r\n0\r\n")
    );
}
