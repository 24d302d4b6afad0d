//! Key Codec Tests
//!
//! Tests for splitting frontend keys into backend locations and joining
//! them back.

use tierproxy::key::{join, split, Key};
use tierproxy::ProxyError;

// =============================================================================
// Split Tests
// =============================================================================

#[test]
fn test_split_bare_key() {
    let key = split(b"session").unwrap();
    assert_eq!(key.namespace, None);
    assert!(!key.has_bucket());
    assert_eq!(&key.key[..], b"session");
}

#[test]
fn test_split_bucket_and_key() {
    let key = split(b"users:42").unwrap();
    assert_eq!(key, Key::new(None, b"users", b"42"));
    assert_eq!(key.namespace_or_default(), b"default");
}

#[test]
fn test_split_namespace_bucket_key() {
    let key = split(b"maps:users:42").unwrap();
    assert_eq!(key, Key::new(Some(b"maps"), b"users", b"42"));
}

#[test]
fn test_split_key_keeps_extra_separators() {
    let key = split(b"ns:bucket:a:b:c").unwrap();
    assert_eq!(key.namespace.as_deref(), Some(&b"ns"[..]));
    assert_eq!(&key.bucket[..], b"bucket");
    assert_eq!(&key.key[..], b"a:b:c");
}

#[test]
fn test_split_trailing_separator_shifts_down() {
    assert_eq!(split(b"bucket:").unwrap(), Key::new(None, b"", b"bucket"));
    assert_eq!(split(b"ns:bucket:").unwrap(), Key::new(None, b"ns", b"bucket"));
}

#[test]
fn test_split_leading_separator() {
    assert_eq!(split(b":key").unwrap(), Key::new(None, b"", b"key"));
}

#[test]
fn test_split_rejects_empty_keys() {
    for raw in [&b""[..], b"   ", b"::", b":"] {
        match split(raw) {
            Err(ProxyError::Malformed(_)) => {}
            other => panic!("expected Malformed for {:?}, got {:?}", raw, other),
        }
    }
}

// =============================================================================
// Join Tests
// =============================================================================

#[test]
fn test_join_forms() {
    assert_eq!(&join(None, b"", b"k")[..], b"k");
    assert_eq!(&join(None, b"b", b"k")[..], b"b:k");
    assert_eq!(&join(Some(b"ns"), b"b", b"k")[..], b"ns:b:k");
    assert_eq!(&join(Some(b""), b"b", b"k")[..], b"b:k");
}

#[test]
fn test_join_inverts_split() {
    for raw in [&b"k"[..], b"b:k", b"ns:b:k", b"ns:b:k:with:colons"] {
        let key = split(raw).unwrap();
        assert_eq!(&key.join()[..], raw);
    }
}

#[test]
fn test_require_bucket() {
    assert!(split(b"b:k").unwrap().require_bucket().is_ok());
    match split(b"k").unwrap().require_bucket() {
        Err(ProxyError::BadRequest(_)) => {}
        other => panic!("expected BadRequest, got {:?}", other),
    }
}
