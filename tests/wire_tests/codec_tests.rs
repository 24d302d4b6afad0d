//! Codec Tests
//!
//! Tests for backend frame encoding/decoding and request/response pairing.

use bytes::Bytes;
use prost::Message;
use tierproxy::config::QuorumPolicy;
use tierproxy::key::Key;
use tierproxy::wire::messages::{
    DtFetchReq, DtFetchResp, DtUpdateReq, RpbCounterUpdateReq, RpbErrorResp, RpbGetReq,
    RpbPutReq,
};
use tierproxy::wire::{
    decode_frame, decode_response, encode_frame, encode_payload, encode_request,
    encode_response, BackendRequest, BackendResponse, MessageCode, RequestBody, RequestKind,
    SetAction, Sibling, HEADER_SIZE, MAX_PAYLOAD_SIZE,
};
use tierproxy::ProxyError;

// =============================================================================
// Helper Functions
// =============================================================================

fn request(key: Key, body: RequestBody) -> BackendRequest {
    BackendRequest::new(key, QuorumPolicy::default().r(2).w(3).n(5), body)
}

fn payload_of(frame: &[u8]) -> &[u8] {
    &frame[HEADER_SIZE..]
}

// =============================================================================
// Framing Tests
// =============================================================================

#[test]
fn test_frame_layout() {
    let frame = encode_frame(MessageCode::GetReq, b"abc");
    assert_eq!(&frame[..], &[0, 0, 0, 4, 9, b'a', b'b', b'c']);
}

#[test]
fn test_decode_frame_waits_for_complete_frame() {
    let frame = encode_frame(MessageCode::GetResp, b"payload");

    assert!(decode_frame(&frame[..3]).unwrap().is_none());
    assert!(decode_frame(&frame[..HEADER_SIZE]).unwrap().is_none());
    assert!(decode_frame(&frame[..frame.len() - 1]).unwrap().is_none());

    let raw = decode_frame(&frame).unwrap().unwrap();
    assert_eq!(raw.code, 10);
    assert_eq!(raw.payload, b"payload");
    assert_eq!(raw.wire_len(), frame.len());
}

#[test]
fn test_decode_frame_leaves_trailing_bytes() {
    let mut data = encode_frame(MessageCode::DelResp, &[]).to_vec();
    data.extend_from_slice(&encode_frame(MessageCode::PutResp, b"x"));

    let first = decode_frame(&data).unwrap().unwrap();
    assert_eq!(first.code, 14);
    assert_eq!(first.wire_len(), HEADER_SIZE);

    let second = decode_frame(&data[first.wire_len()..]).unwrap().unwrap();
    assert_eq!(second.code, 12);
}

#[test]
fn test_decode_frame_rejects_zero_length() {
    let data = [0u8, 0, 0, 0, 9];
    assert!(matches!(decode_frame(&data), Err(ProxyError::Protocol(_))));
}

#[test]
fn test_decode_frame_rejects_oversized_length() {
    let mut data = (MAX_PAYLOAD_SIZE + 1).to_be_bytes().to_vec();
    data.push(10);
    assert!(matches!(decode_frame(&data), Err(ProxyError::Protocol(_))));
}

// =============================================================================
// Request Encoding Tests
// =============================================================================

#[test]
fn test_get_request_carries_quorum_and_namespace() {
    let req = request(Key::new(Some(b"maps"), b"users", b"42"), RequestBody::Get);
    let frame = encode_request(&req, 1 << 20).unwrap();
    assert_eq!(frame[4], MessageCode::GetReq as u8);

    let msg = RpbGetReq::decode(payload_of(&frame)).unwrap();
    assert_eq!(msg.bucket, b"users");
    assert_eq!(msg.key, b"42");
    assert_eq!(msg.bucket_type.as_deref(), Some(&b"maps"[..]));
    assert_eq!(msg.r, Some(2));
    assert_eq!(msg.n_val, Some(5));
    assert_eq!(msg.pr, None);
}

#[test]
fn test_put_request_carries_vclock_and_content_type() {
    let req = request(
        Key::new(None, b"b", b"k"),
        RequestBody::Put {
            value: Bytes::from_static(b"{\"a\":1}"),
            content_type: "application/json",
            vclock: Some(Bytes::from_static(b"vc1")),
        },
    );
    let msg = RpbPutReq::decode(&encode_payload(&req)[..]).unwrap();
    assert_eq!(msg.key.as_deref(), Some(&b"k"[..]));
    assert_eq!(msg.vclock.as_deref(), Some(&b"vc1"[..]));
    assert_eq!(msg.content.value, b"{\"a\":1}");
    assert_eq!(msg.content.content_type.as_deref(), Some(&b"application/json"[..]));
    assert_eq!(msg.w, Some(3));
    assert_eq!(msg.bucket_type, None);
}

#[test]
fn test_set_update_puts_members_in_one_op() {
    let req = request(
        Key::new(None, b"b", b"s"),
        RequestBody::SetUpdate {
            bucket_type: Bytes::from_static(b"sets"),
            action: SetAction::Remove,
            members: vec![Bytes::from_static(b"x"), Bytes::from_static(b"y")],
        },
    );
    let frame = encode_request(&req, 1 << 20).unwrap();
    assert_eq!(frame[4], MessageCode::DtUpdateReq as u8);

    let msg = DtUpdateReq::decode(payload_of(&frame)).unwrap();
    assert_eq!(msg.bucket_type, b"sets");
    let set_op = msg.op.set_op.unwrap();
    assert!(set_op.adds.is_empty());
    assert_eq!(set_op.removes, vec![b"x".to_vec(), b"y".to_vec()]);
}

#[test]
fn test_set_replace_carries_context_and_both_sides() {
    let req = request(
        Key::new(None, b"b", b"dst"),
        RequestBody::SetReplace {
            bucket_type: Bytes::from_static(b"sets"),
            adds: vec![Bytes::from_static(b"new")],
            removes: vec![Bytes::from_static(b"old")],
            context: Some(Bytes::from_static(b"ctx")),
        },
    );
    assert_eq!(req.kind(), RequestKind::SetUpdate);
    let frame = encode_request(&req, 1 << 20).unwrap();
    assert_eq!(frame[4], MessageCode::DtUpdateReq as u8);

    let msg = DtUpdateReq::decode(payload_of(&frame)).unwrap();
    assert_eq!(msg.key.as_deref(), Some(&b"dst"[..]));
    assert_eq!(msg.context.as_deref(), Some(&b"ctx"[..]));
    assert_eq!(msg.w, Some(3));
    let set_op = msg.op.set_op.unwrap();
    assert_eq!(set_op.adds, vec![b"new".to_vec()]);
    assert_eq!(set_op.removes, vec![b"old".to_vec()]);
}

#[test]
fn test_set_fetch_request() {
    let req = request(
        Key::new(Some(b"ns"), b"b", b"s"),
        RequestBody::SetFetch {
            bucket_type: Bytes::from_static(b"ns"),
        },
    );
    let msg = DtFetchReq::decode(&encode_payload(&req)[..]).unwrap();
    assert_eq!(msg.bucket_type, b"ns");
    assert_eq!(msg.key, b"s");
    assert_eq!(msg.r, Some(2));
}

#[test]
fn test_counter_update_asks_for_value() {
    let req = request(Key::new(None, b"b", b"c"), RequestBody::CounterUpdate { amount: -4 });
    let msg = RpbCounterUpdateReq::decode(&encode_payload(&req)[..]).unwrap();
    assert_eq!(msg.amount, -4);
    assert_eq!(msg.returnvalue, Some(true));
}

#[test]
fn test_oversized_request_is_refused() {
    let req = request(
        Key::new(None, b"b", b"k"),
        RequestBody::Put {
            value: Bytes::from(vec![b'x'; 256]),
            content_type: "text/plain",
            vclock: None,
        },
    );
    assert!(matches!(
        encode_request(&req, 64),
        Err(ProxyError::ResourceExhausted(_))
    ));
}

// =============================================================================
// Response Decoding Tests
// =============================================================================

#[test]
fn test_bare_ack_for_writes() {
    assert_eq!(
        decode_response(0, &[], RequestKind::Delete).unwrap(),
        BackendResponse::DeleteAck
    );
    assert_eq!(
        decode_response(0, &[], RequestKind::SetUpdate).unwrap(),
        BackendResponse::UpdateAck
    );
    assert_eq!(
        decode_response(0, &[], RequestKind::Put).unwrap(),
        BackendResponse::PutAck { vclock: None }
    );
}

#[test]
fn test_error_response_decodes_message() {
    let payload = RpbErrorResp {
        errmsg: b"overload".to_vec(),
        errcode: 7,
    }
    .encode_to_vec();

    let resp = decode_response(0, &payload, RequestKind::Get).unwrap();
    assert_eq!(
        resp,
        BackendResponse::Error {
            message: "overload".to_string(),
            code: 7
        }
    );
    assert!(resp.is_error());
}

#[test]
fn test_unknown_code_is_backend_error() {
    let resp = decode_response(200, b"junk", RequestKind::Get).unwrap();
    assert!(resp.is_error());
}

#[test]
fn test_mismatched_code_is_protocol_error() {
    assert!(matches!(
        decode_response(MessageCode::PutResp as u8, &[], RequestKind::Get),
        Err(ProxyError::Protocol(_))
    ));
}

#[test]
fn test_get_response_siblings() {
    let resp = BackendResponse::GetResult {
        siblings: vec![
            Sibling::new(Bytes::from_static(b"old")).with_last_modified(10, 0),
            Sibling::new(Bytes::from_static(b"gone")).tombstone(),
        ],
        vclock: Some(Bytes::from_static(b"vc")),
    };
    let frame = encode_response(&resp, RequestKind::Get);
    let raw = decode_frame(&frame).unwrap().unwrap();

    let decoded = decode_response(raw.code, raw.payload, RequestKind::Get).unwrap();
    let BackendResponse::GetResult { siblings, vclock } = decoded else {
        panic!("expected a get result");
    };
    assert_eq!(vclock.as_deref(), Some(&b"vc"[..]));
    assert_eq!(siblings.len(), 2);
    assert_eq!(siblings[0].last_modified, Some((10, 0)));
    assert!(siblings[1].deleted);
}

#[test]
fn test_empty_get_response_is_not_found() {
    let resp = decode_response(MessageCode::GetResp as u8, &[], RequestKind::Get).unwrap();
    assert!(resp.is_not_found());
}

#[test]
fn test_set_fetch_dedups_members_in_order() {
    let payload = DtFetchResp {
        context: None,
        data_type: 2,
        value: Some(tierproxy::wire::messages::DtValue {
            counter_value: None,
            set_value: vec![b"b".to_vec(), b"a".to_vec(), b"b".to_vec()],
        }),
    }
    .encode_to_vec();

    let resp = decode_response(81, &payload, RequestKind::SetFetch).unwrap();
    assert_eq!(
        resp,
        BackendResponse::SetFetchResult {
            members: vec![Bytes::from_static(b"b"), Bytes::from_static(b"a")],
            context: None,
        }
    );
}

#[test]
fn test_set_fetch_rejects_other_data_types() {
    let payload = DtFetchResp {
        context: None,
        data_type: 1,
        value: Some(Default::default()),
    }
    .encode_to_vec();
    assert!(matches!(
        decode_response(81, &payload, RequestKind::SetFetch),
        Err(ProxyError::Protocol(_))
    ));
}

#[test]
fn test_counter_responses() {
    for kind in [RequestKind::CounterFetch, RequestKind::CounterUpdate] {
        let frame = encode_response(&BackendResponse::CounterValue(-12), kind);
        let raw = decode_frame(&frame).unwrap().unwrap();
        assert_eq!(
            decode_response(raw.code, raw.payload, kind).unwrap(),
            BackendResponse::CounterValue(-12)
        );
    }
}

#[test]
fn test_truncated_payload_is_decode_error() {
    // field 1 (bytes) claiming 10 bytes with only 2 present
    let payload = [0x0a, 10, b'a', b'b'];
    assert!(matches!(
        decode_response(MessageCode::GetResp as u8, &payload, RequestKind::Get),
        Err(ProxyError::Decode(_))
    ));
}
