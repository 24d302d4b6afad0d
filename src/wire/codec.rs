//! Wire codec
//!
//! Encoding and decoding functions for the backend wire protocol.
//!
//! ## Frame Format
//! ```text
//! ┌──────────┬──────────┬─────────────────────────────┐
//! │ Len (4)  │ Code (1) │      Protobuf payload       │
//! └──────────┴──────────┴─────────────────────────────┘
//! ```
//!
//! `Len` is big-endian and counts the code byte plus the payload, not
//! itself. A frame whose payload is empty is a bare acknowledgement.

use std::collections::HashSet;

use bytes::{BufMut, Bytes, BytesMut};
use prost::Message;

use super::messages::{
    DtFetchReq, DtFetchResp, DtOp, DtValue, DtUpdateReq, DtUpdateResp, RpbContent, RpbCounterGetReq,
    RpbCounterResp, RpbCounterUpdateReq, RpbDelReq, RpbErrorResp, RpbGetReq, RpbGetResp,
    RpbPutReq, RpbPutResp, SetOp, DT_TYPE_SET,
};
use super::{BackendRequest, BackendResponse, MessageCode, RequestBody, RequestKind, SetAction, Sibling};
use crate::error::{ProxyError, Result};

/// Header size: 4 bytes length + 1 byte message code
pub const HEADER_SIZE: usize = 5;

/// Maximum payload size (16 MB)
pub const MAX_PAYLOAD_SIZE: u32 = 16 * 1024 * 1024;

/// A complete frame borrowed from a receive buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RawFrame<'a> {
    pub code: u8,
    pub payload: &'a [u8],
}

impl RawFrame<'_> {
    /// Bytes the frame occupies on the wire, header included
    pub fn wire_len(&self) -> usize {
        HEADER_SIZE + self.payload.len()
    }
}

// =============================================================================
// Framing
// =============================================================================

/// Wrap a payload in a frame
pub fn encode_frame(code: MessageCode, payload: &[u8]) -> Bytes {
    let mut frame = BytesMut::with_capacity(HEADER_SIZE + payload.len());
    frame.put_u32(payload.len() as u32 + 1);
    frame.put_u8(code as u8);
    frame.put_slice(payload);
    frame.freeze()
}

/// Try to take one frame off the front of `bytes`
///
/// Returns `Ok(None)` when more data is needed. A zero length prefix or one
/// above [`MAX_PAYLOAD_SIZE`] means the stream is desynchronised.
pub fn decode_frame(bytes: &[u8]) -> Result<Option<RawFrame<'_>>> {
    if bytes.len() < HEADER_SIZE {
        return Ok(None);
    }

    let length = u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);
    if length == 0 {
        return Err(ProxyError::Protocol(
            "frame length 0 has no message code".to_string(),
        ));
    }
    if length > MAX_PAYLOAD_SIZE {
        return Err(ProxyError::Protocol(format!(
            "Payload too large: {} bytes (max {})",
            length, MAX_PAYLOAD_SIZE
        )));
    }

    let total_len = 4 + length as usize;
    if bytes.len() < total_len {
        return Ok(None);
    }

    Ok(Some(RawFrame {
        code: bytes[4],
        payload: &bytes[HEADER_SIZE..total_len],
    }))
}

// =============================================================================
// Request Encoding
// =============================================================================

/// Encode a request into a complete frame
///
/// Frames larger than `max_frame_size` are refused with `ResourceExhausted`.
pub fn encode_request(request: &BackendRequest, max_frame_size: usize) -> Result<Bytes> {
    let code = request.kind().request_code();
    let payload = encode_payload(request);

    let frame_len = HEADER_SIZE + payload.len();
    if frame_len > max_frame_size || payload.len() >= MAX_PAYLOAD_SIZE as usize {
        return Err(ProxyError::ResourceExhausted(format!(
            "{:?} frame of {} bytes exceeds limit of {}",
            code, frame_len, max_frame_size
        )));
    }

    Ok(encode_frame(code, &payload))
}

/// Encode just the protobuf payload of a request
pub fn encode_payload(request: &BackendRequest) -> Vec<u8> {
    let key = &request.key;
    let q = &request.quorum;
    let bucket = key.bucket.to_vec();
    let bucket_type = key.namespace.as_ref().map(|ns| ns.to_vec());

    match &request.body {
        RequestBody::Get => RpbGetReq {
            bucket,
            key: key.key.to_vec(),
            r: q.r,
            pr: q.pr,
            basic_quorum: q.basic_quorum,
            notfound_ok: q.notfound_ok,
            deletedvclock: q.deleted_vclock,
            timeout: q.timeout_ms,
            sloppy_quorum: q.sloppy_quorum,
            n_val: q.n,
            bucket_type,
        }
        .encode_to_vec(),

        RequestBody::Put {
            value,
            content_type,
            vclock,
        } => RpbPutReq {
            bucket,
            key: Some(key.key.to_vec()),
            vclock: vclock.as_ref().map(|v| v.to_vec()),
            content: RpbContent {
                value: value.to_vec(),
                content_type: Some(content_type.as_bytes().to_vec()),
                ..Default::default()
            },
            w: q.w,
            return_body: None,
            pw: q.pw,
            timeout: q.timeout_ms,
            sloppy_quorum: q.sloppy_quorum,
            n_val: q.n,
            bucket_type,
        }
        .encode_to_vec(),

        RequestBody::Delete => RpbDelReq {
            bucket,
            key: key.key.to_vec(),
            vclock: None,
            w: q.w,
            pw: q.pw,
            timeout: q.timeout_ms,
            sloppy_quorum: q.sloppy_quorum,
            n_val: q.n,
            bucket_type,
        }
        .encode_to_vec(),

        RequestBody::SetUpdate {
            bucket_type,
            action,
            members,
        } => {
            let members = to_vecs(members);
            let set_op = match action {
                SetAction::Add => SetOp {
                    adds: members,
                    removes: Vec::new(),
                },
                SetAction::Remove => SetOp {
                    adds: Vec::new(),
                    removes: members,
                },
            };
            dt_update(request, bucket_type, None, set_op)
        }

        RequestBody::SetReplace {
            bucket_type,
            adds,
            removes,
            context,
        } => {
            let set_op = SetOp {
                adds: to_vecs(adds),
                removes: to_vecs(removes),
            };
            dt_update(request, bucket_type, context.as_ref(), set_op)
        }

        RequestBody::SetFetch { bucket_type } => DtFetchReq {
            bucket,
            key: key.key.to_vec(),
            bucket_type: bucket_type.to_vec(),
            r: q.r,
            pr: q.pr,
            basic_quorum: q.basic_quorum,
            notfound_ok: q.notfound_ok,
            timeout: q.timeout_ms,
            sloppy_quorum: q.sloppy_quorum,
            n_val: q.n,
            include_context: None,
        }
        .encode_to_vec(),

        RequestBody::CounterFetch => RpbCounterGetReq {
            bucket,
            key: key.key.to_vec(),
            r: q.r,
            pr: q.pr,
            basic_quorum: q.basic_quorum,
            notfound_ok: q.notfound_ok,
        }
        .encode_to_vec(),

        RequestBody::CounterUpdate { amount } => RpbCounterUpdateReq {
            bucket,
            key: key.key.to_vec(),
            amount: *amount,
            w: q.w,
            pw: q.pw,
            returnvalue: Some(true),
        }
        .encode_to_vec(),
    }
}

fn to_vecs(members: &[Bytes]) -> Vec<Vec<u8>> {
    members.iter().map(|m| m.to_vec()).collect()
}

fn dt_update(
    request: &BackendRequest,
    bucket_type: &Bytes,
    context: Option<&Bytes>,
    set_op: SetOp,
) -> Vec<u8> {
    let q = &request.quorum;
    DtUpdateReq {
        bucket: request.key.bucket.to_vec(),
        key: Some(request.key.key.to_vec()),
        bucket_type: bucket_type.to_vec(),
        context: context.map(|c| c.to_vec()),
        op: DtOp {
            set_op: Some(set_op),
        },
        w: q.w,
        pw: q.pw,
        return_body: None,
        timeout: q.timeout_ms,
        sloppy_quorum: q.sloppy_quorum,
        n_val: q.n,
    }
    .encode_to_vec()
}

// =============================================================================
// Response Decoding
// =============================================================================

/// Decode a response frame paired with the request it answers
///
/// Unknown codes become [`BackendResponse::Error`]. A known code that does
/// not answer `expected` is a protocol error.
pub fn decode_response(code: u8, payload: &[u8], expected: RequestKind) -> Result<BackendResponse> {
    let Some(message_code) = MessageCode::from_u8(code) else {
        return Ok(BackendResponse::Error {
            message: format!("unknown message code {}", code),
            code: 0,
        });
    };

    if message_code == MessageCode::ErrorResp {
        if payload.is_empty() && expected.has_bare_ack() {
            return Ok(bare_ack(expected));
        }
        let err = RpbErrorResp::decode(payload)?;
        return Ok(BackendResponse::Error {
            message: String::from_utf8_lossy(&err.errmsg).into_owned(),
            code: err.errcode,
        });
    }

    if message_code != expected.response_code() {
        return Err(ProxyError::Protocol(format!(
            "{:?} received while awaiting {:?}",
            message_code,
            expected.response_code()
        )));
    }

    let response = match expected {
        RequestKind::Get => {
            let resp = RpbGetResp::decode(payload)?;
            BackendResponse::GetResult {
                siblings: resp.content.into_iter().map(to_sibling).collect(),
                vclock: resp.vclock.map(Bytes::from),
            }
        }
        RequestKind::Put => {
            let resp = RpbPutResp::decode(payload)?;
            BackendResponse::PutAck {
                vclock: resp.vclock.map(Bytes::from),
            }
        }
        RequestKind::Delete => BackendResponse::DeleteAck,
        RequestKind::SetUpdate => {
            DtUpdateResp::decode(payload)?;
            BackendResponse::UpdateAck
        }
        RequestKind::SetFetch => {
            let resp = DtFetchResp::decode(payload)?;
            if resp.value.is_some() && resp.data_type != DT_TYPE_SET {
                return Err(ProxyError::Protocol(format!(
                    "set fetch returned data type {}",
                    resp.data_type
                )));
            }
            BackendResponse::SetFetchResult {
                members: dedup_members(resp.value.map(|v| v.set_value).unwrap_or_default()),
                context: resp.context.map(Bytes::from),
            }
        }
        RequestKind::CounterFetch | RequestKind::CounterUpdate => {
            let resp = RpbCounterResp::decode(payload)?;
            BackendResponse::CounterValue(resp.value.unwrap_or(0))
        }
    };

    Ok(response)
}

fn bare_ack(kind: RequestKind) -> BackendResponse {
    match kind {
        RequestKind::Put => BackendResponse::PutAck { vclock: None },
        RequestKind::SetUpdate => BackendResponse::UpdateAck,
        _ => BackendResponse::DeleteAck,
    }
}

fn to_sibling(content: RpbContent) -> Sibling {
    let last_modified = match (content.last_mod, content.last_mod_usecs) {
        (Some(secs), Some(usecs)) => Some((secs, usecs)),
        _ => None,
    };
    Sibling {
        value: Bytes::from(content.value),
        content_type: content.content_type.map(Bytes::from),
        last_modified,
        deleted: content.deleted.unwrap_or(false),
    }
}

fn dedup_members(members: Vec<Vec<u8>>) -> Vec<Bytes> {
    let mut seen = HashSet::with_capacity(members.len());
    members
        .into_iter()
        .map(Bytes::from)
        .filter(|m| seen.insert(m.clone()))
        .collect()
}

// =============================================================================
// Response Encoding
// =============================================================================

/// Encode a backend response frame
///
/// The proxy never sends responses; this is used by the CLI and tests to
/// stand in for a backend.
pub fn encode_response(response: &BackendResponse, kind: RequestKind) -> Bytes {
    match response {
        BackendResponse::GetResult { siblings, vclock } => {
            let resp = RpbGetResp {
                content: siblings
                    .iter()
                    .map(|s| RpbContent {
                        value: s.value.to_vec(),
                        content_type: s.content_type.as_ref().map(|c| c.to_vec()),
                        last_mod: s.last_modified.map(|(secs, _)| secs),
                        last_mod_usecs: s.last_modified.map(|(_, usecs)| usecs),
                        deleted: s.deleted.then_some(true),
                        ..Default::default()
                    })
                    .collect(),
                vclock: vclock.as_ref().map(|v| v.to_vec()),
                unchanged: None,
            };
            encode_frame(MessageCode::GetResp, &resp.encode_to_vec())
        }
        BackendResponse::PutAck { vclock } => {
            let resp = RpbPutResp {
                vclock: vclock.as_ref().map(|v| v.to_vec()),
                ..Default::default()
            };
            encode_frame(MessageCode::PutResp, &resp.encode_to_vec())
        }
        BackendResponse::DeleteAck => encode_frame(MessageCode::DelResp, &[]),
        BackendResponse::UpdateAck => encode_frame(MessageCode::DtUpdateResp, &[]),
        BackendResponse::SetFetchResult { members, context } => {
            let resp = DtFetchResp {
                context: context.as_ref().map(|c| c.to_vec()),
                data_type: DT_TYPE_SET,
                value: Some(DtValue {
                    counter_value: None,
                    set_value: members.iter().map(|m| m.to_vec()).collect(),
                }),
            };
            encode_frame(MessageCode::DtFetchResp, &resp.encode_to_vec())
        }
        BackendResponse::CounterValue(value) => {
            let resp = RpbCounterResp { value: Some(*value) };
            let code = match kind {
                RequestKind::CounterFetch => MessageCode::CounterGetResp,
                _ => MessageCode::CounterUpdateResp,
            };
            encode_frame(code, &resp.encode_to_vec())
        }
        BackendResponse::Error { message, code } => {
            let resp = RpbErrorResp {
                errmsg: message.as_bytes().to_vec(),
                errcode: *code,
            };
            encode_frame(MessageCode::ErrorResp, &resp.encode_to_vec())
        }
    }
}
