//! Backend Wire Module
//!
//! Length-prefixed protobuf protocol spoken by the source-of-truth tier.
//!
//! ### Message Codes
//! - 0:  ErrorResp (empty payload: bare ack for Delete / SetUpdate)
//! - 9 / 10:  Get
//! - 11 / 12: Put
//! - 13 / 14: Delete
//! - 50 / 51: CounterUpdate
//! - 52 / 53: CounterGet
//! - 80 / 81: DtFetch (sets)
//! - 82 / 83: DtUpdate (sets)

mod codec;
pub mod messages;
mod request;
mod response;

pub use codec::{
    decode_frame, decode_response, encode_frame, encode_payload, encode_request,
    encode_response, RawFrame, HEADER_SIZE, MAX_PAYLOAD_SIZE,
};
pub use request::{BackendRequest, MessageCode, RequestBody, RequestKind, SetAction};
pub use response::{BackendResponse, Sibling};
