//! Protobuf payloads of the backend protocol.
//!
//! Manual `prost::Message` implementations of the Riak PBC key/value, set
//! CRDT and legacy counter messages the proxy speaks. Field numbers follow
//! `riak_kv.proto` / `riak_dt.proto`; fields we never use are skipped on
//! decode and never written.

use prost::bytes::{Buf, BufMut};
use prost::encoding::{self, DecodeContext, WireType};
use prost::{DecodeError, Message};

/// DtFetchResp data type: set
pub const DT_TYPE_SET: i32 = 2;

fn opt_u32_len(tag: u32, value: &Option<u32>) -> usize {
    value.as_ref().map_or(0, |v| encoding::uint32::encoded_len(tag, v))
}

fn opt_bool_len(tag: u32, value: &Option<bool>) -> usize {
    value.as_ref().map_or(0, |v| encoding::bool::encoded_len(tag, v))
}

fn opt_bytes_len(tag: u32, value: &Option<Vec<u8>>) -> usize {
    value.as_ref().map_or(0, |v| encoding::bytes::encoded_len(tag, v))
}

fn put_opt_u32(tag: u32, value: &Option<u32>, buf: &mut impl BufMut) {
    if let Some(v) = value {
        encoding::uint32::encode(tag, v, buf);
    }
}

fn put_opt_bool(tag: u32, value: &Option<bool>, buf: &mut impl BufMut) {
    if let Some(v) = value {
        encoding::bool::encode(tag, v, buf);
    }
}

fn put_opt_bytes(tag: u32, value: &Option<Vec<u8>>, buf: &mut impl BufMut) {
    if let Some(v) = value {
        encoding::bytes::encode(tag, v, buf);
    }
}

// ============================================================================
// RpbErrorResp (code 0)
// ============================================================================

#[derive(Clone, Default, Debug, PartialEq)]
pub struct RpbErrorResp {
    pub errmsg: Vec<u8>, // field 1
    pub errcode: u32,    // field 2
}

impl Message for RpbErrorResp {
    fn encode_raw(&self, buf: &mut impl BufMut)
    where
        Self: Sized,
    {
        encoding::bytes::encode(1, &self.errmsg, buf);
        encoding::uint32::encode(2, &self.errcode, buf);
    }

    fn merge_field(
        &mut self,
        tag: u32,
        wire_type: WireType,
        buf: &mut impl Buf,
        ctx: DecodeContext,
    ) -> Result<(), DecodeError>
    where
        Self: Sized,
    {
        match tag {
            1 => encoding::bytes::merge(wire_type, &mut self.errmsg, buf, ctx),
            2 => encoding::uint32::merge(wire_type, &mut self.errcode, buf, ctx),
            _ => encoding::skip_field(wire_type, tag, buf, ctx),
        }
    }

    fn encoded_len(&self) -> usize {
        encoding::bytes::encoded_len(1, &self.errmsg) + encoding::uint32::encoded_len(2, &self.errcode)
    }

    fn clear(&mut self) {
        *self = Self::default();
    }
}

// ============================================================================
// RpbContent
// ============================================================================

/// One stored value (a sibling, when there are several)
#[derive(Clone, Default, Debug, PartialEq)]
pub struct RpbContent {
    pub value: Vec<u8>,                    // field 1
    pub content_type: Option<Vec<u8>>,     // field 2
    pub charset: Option<Vec<u8>>,          // field 3
    pub content_encoding: Option<Vec<u8>>, // field 4
    pub vtag: Option<Vec<u8>>,             // field 5
    pub last_mod: Option<u32>,             // field 7
    pub last_mod_usecs: Option<u32>,       // field 8
    pub deleted: Option<bool>,             // field 11
}

impl Message for RpbContent {
    fn encode_raw(&self, buf: &mut impl BufMut)
    where
        Self: Sized,
    {
        encoding::bytes::encode(1, &self.value, buf);
        put_opt_bytes(2, &self.content_type, buf);
        put_opt_bytes(3, &self.charset, buf);
        put_opt_bytes(4, &self.content_encoding, buf);
        put_opt_bytes(5, &self.vtag, buf);
        put_opt_u32(7, &self.last_mod, buf);
        put_opt_u32(8, &self.last_mod_usecs, buf);
        put_opt_bool(11, &self.deleted, buf);
    }

    fn merge_field(
        &mut self,
        tag: u32,
        wire_type: WireType,
        buf: &mut impl Buf,
        ctx: DecodeContext,
    ) -> Result<(), DecodeError>
    where
        Self: Sized,
    {
        match tag {
            1 => encoding::bytes::merge(wire_type, &mut self.value, buf, ctx),
            2 => encoding::bytes::merge(wire_type, self.content_type.get_or_insert_with(Vec::new), buf, ctx),
            3 => encoding::bytes::merge(wire_type, self.charset.get_or_insert_with(Vec::new), buf, ctx),
            4 => encoding::bytes::merge(wire_type, self.content_encoding.get_or_insert_with(Vec::new), buf, ctx),
            5 => encoding::bytes::merge(wire_type, self.vtag.get_or_insert_with(Vec::new), buf, ctx),
            7 => encoding::uint32::merge(wire_type, self.last_mod.get_or_insert(0), buf, ctx),
            8 => encoding::uint32::merge(wire_type, self.last_mod_usecs.get_or_insert(0), buf, ctx),
            11 => encoding::bool::merge(wire_type, self.deleted.get_or_insert(false), buf, ctx),
            _ => encoding::skip_field(wire_type, tag, buf, ctx),
        }
    }

    fn encoded_len(&self) -> usize {
        encoding::bytes::encoded_len(1, &self.value)
            + opt_bytes_len(2, &self.content_type)
            + opt_bytes_len(3, &self.charset)
            + opt_bytes_len(4, &self.content_encoding)
            + opt_bytes_len(5, &self.vtag)
            + opt_u32_len(7, &self.last_mod)
            + opt_u32_len(8, &self.last_mod_usecs)
            + opt_bool_len(11, &self.deleted)
    }

    fn clear(&mut self) {
        *self = Self::default();
    }
}

// ============================================================================
// RpbGetReq (code 9) / RpbGetResp (code 10)
// ============================================================================

#[derive(Clone, Default, Debug, PartialEq)]
pub struct RpbGetReq {
    pub bucket: Vec<u8>,              // field 1
    pub key: Vec<u8>,                 // field 2
    pub r: Option<u32>,               // field 3
    pub pr: Option<u32>,              // field 4
    pub basic_quorum: Option<bool>,   // field 5
    pub notfound_ok: Option<bool>,    // field 6
    pub deletedvclock: Option<bool>,  // field 9
    pub timeout: Option<u32>,         // field 10
    pub sloppy_quorum: Option<bool>,  // field 11
    pub n_val: Option<u32>,           // field 12
    pub bucket_type: Option<Vec<u8>>, // field 13
}

impl Message for RpbGetReq {
    fn encode_raw(&self, buf: &mut impl BufMut)
    where
        Self: Sized,
    {
        encoding::bytes::encode(1, &self.bucket, buf);
        encoding::bytes::encode(2, &self.key, buf);
        put_opt_u32(3, &self.r, buf);
        put_opt_u32(4, &self.pr, buf);
        put_opt_bool(5, &self.basic_quorum, buf);
        put_opt_bool(6, &self.notfound_ok, buf);
        put_opt_bool(9, &self.deletedvclock, buf);
        put_opt_u32(10, &self.timeout, buf);
        put_opt_bool(11, &self.sloppy_quorum, buf);
        put_opt_u32(12, &self.n_val, buf);
        put_opt_bytes(13, &self.bucket_type, buf);
    }

    fn merge_field(
        &mut self,
        tag: u32,
        wire_type: WireType,
        buf: &mut impl Buf,
        ctx: DecodeContext,
    ) -> Result<(), DecodeError>
    where
        Self: Sized,
    {
        match tag {
            1 => encoding::bytes::merge(wire_type, &mut self.bucket, buf, ctx),
            2 => encoding::bytes::merge(wire_type, &mut self.key, buf, ctx),
            3 => encoding::uint32::merge(wire_type, self.r.get_or_insert(0), buf, ctx),
            4 => encoding::uint32::merge(wire_type, self.pr.get_or_insert(0), buf, ctx),
            5 => encoding::bool::merge(wire_type, self.basic_quorum.get_or_insert(false), buf, ctx),
            6 => encoding::bool::merge(wire_type, self.notfound_ok.get_or_insert(false), buf, ctx),
            9 => encoding::bool::merge(wire_type, self.deletedvclock.get_or_insert(false), buf, ctx),
            10 => encoding::uint32::merge(wire_type, self.timeout.get_or_insert(0), buf, ctx),
            11 => encoding::bool::merge(wire_type, self.sloppy_quorum.get_or_insert(false), buf, ctx),
            12 => encoding::uint32::merge(wire_type, self.n_val.get_or_insert(0), buf, ctx),
            13 => encoding::bytes::merge(wire_type, self.bucket_type.get_or_insert_with(Vec::new), buf, ctx),
            _ => encoding::skip_field(wire_type, tag, buf, ctx),
        }
    }

    fn encoded_len(&self) -> usize {
        encoding::bytes::encoded_len(1, &self.bucket)
            + encoding::bytes::encoded_len(2, &self.key)
            + opt_u32_len(3, &self.r)
            + opt_u32_len(4, &self.pr)
            + opt_bool_len(5, &self.basic_quorum)
            + opt_bool_len(6, &self.notfound_ok)
            + opt_bool_len(9, &self.deletedvclock)
            + opt_u32_len(10, &self.timeout)
            + opt_bool_len(11, &self.sloppy_quorum)
            + opt_u32_len(12, &self.n_val)
            + opt_bytes_len(13, &self.bucket_type)
    }

    fn clear(&mut self) {
        *self = Self::default();
    }
}

#[derive(Clone, Default, Debug, PartialEq)]
pub struct RpbGetResp {
    pub content: Vec<RpbContent>, // field 1
    pub vclock: Option<Vec<u8>>,  // field 2
    pub unchanged: Option<bool>,  // field 3
}

impl Message for RpbGetResp {
    fn encode_raw(&self, buf: &mut impl BufMut)
    where
        Self: Sized,
    {
        encoding::message::encode_repeated(1, &self.content, buf);
        put_opt_bytes(2, &self.vclock, buf);
        put_opt_bool(3, &self.unchanged, buf);
    }

    fn merge_field(
        &mut self,
        tag: u32,
        wire_type: WireType,
        buf: &mut impl Buf,
        ctx: DecodeContext,
    ) -> Result<(), DecodeError>
    where
        Self: Sized,
    {
        match tag {
            1 => encoding::message::merge_repeated(wire_type, &mut self.content, buf, ctx),
            2 => encoding::bytes::merge(wire_type, self.vclock.get_or_insert_with(Vec::new), buf, ctx),
            3 => encoding::bool::merge(wire_type, self.unchanged.get_or_insert(false), buf, ctx),
            _ => encoding::skip_field(wire_type, tag, buf, ctx),
        }
    }

    fn encoded_len(&self) -> usize {
        encoding::message::encoded_len_repeated(1, &self.content)
            + opt_bytes_len(2, &self.vclock)
            + opt_bool_len(3, &self.unchanged)
    }

    fn clear(&mut self) {
        *self = Self::default();
    }
}

// ============================================================================
// RpbPutReq (code 11) / RpbPutResp (code 12)
// ============================================================================

#[derive(Clone, Default, Debug, PartialEq)]
pub struct RpbPutReq {
    pub bucket: Vec<u8>,              // field 1
    pub key: Option<Vec<u8>>,         // field 2
    pub vclock: Option<Vec<u8>>,      // field 3
    pub content: RpbContent,          // field 4
    pub w: Option<u32>,               // field 5
    pub return_body: Option<bool>,    // field 7
    pub pw: Option<u32>,              // field 8
    pub timeout: Option<u32>,         // field 12
    pub sloppy_quorum: Option<bool>,  // field 14
    pub n_val: Option<u32>,           // field 15
    pub bucket_type: Option<Vec<u8>>, // field 16
}

impl Message for RpbPutReq {
    fn encode_raw(&self, buf: &mut impl BufMut)
    where
        Self: Sized,
    {
        encoding::bytes::encode(1, &self.bucket, buf);
        put_opt_bytes(2, &self.key, buf);
        put_opt_bytes(3, &self.vclock, buf);
        encoding::message::encode(4, &self.content, buf);
        put_opt_u32(5, &self.w, buf);
        put_opt_bool(7, &self.return_body, buf);
        put_opt_u32(8, &self.pw, buf);
        put_opt_u32(12, &self.timeout, buf);
        put_opt_bool(14, &self.sloppy_quorum, buf);
        put_opt_u32(15, &self.n_val, buf);
        put_opt_bytes(16, &self.bucket_type, buf);
    }

    fn merge_field(
        &mut self,
        tag: u32,
        wire_type: WireType,
        buf: &mut impl Buf,
        ctx: DecodeContext,
    ) -> Result<(), DecodeError>
    where
        Self: Sized,
    {
        match tag {
            1 => encoding::bytes::merge(wire_type, &mut self.bucket, buf, ctx),
            2 => encoding::bytes::merge(wire_type, self.key.get_or_insert_with(Vec::new), buf, ctx),
            3 => encoding::bytes::merge(wire_type, self.vclock.get_or_insert_with(Vec::new), buf, ctx),
            4 => encoding::message::merge(wire_type, &mut self.content, buf, ctx),
            5 => encoding::uint32::merge(wire_type, self.w.get_or_insert(0), buf, ctx),
            7 => encoding::bool::merge(wire_type, self.return_body.get_or_insert(false), buf, ctx),
            8 => encoding::uint32::merge(wire_type, self.pw.get_or_insert(0), buf, ctx),
            12 => encoding::uint32::merge(wire_type, self.timeout.get_or_insert(0), buf, ctx),
            14 => encoding::bool::merge(wire_type, self.sloppy_quorum.get_or_insert(false), buf, ctx),
            15 => encoding::uint32::merge(wire_type, self.n_val.get_or_insert(0), buf, ctx),
            16 => encoding::bytes::merge(wire_type, self.bucket_type.get_or_insert_with(Vec::new), buf, ctx),
            _ => encoding::skip_field(wire_type, tag, buf, ctx),
        }
    }

    fn encoded_len(&self) -> usize {
        encoding::bytes::encoded_len(1, &self.bucket)
            + opt_bytes_len(2, &self.key)
            + opt_bytes_len(3, &self.vclock)
            + encoding::message::encoded_len(4, &self.content)
            + opt_u32_len(5, &self.w)
            + opt_bool_len(7, &self.return_body)
            + opt_u32_len(8, &self.pw)
            + opt_u32_len(12, &self.timeout)
            + opt_bool_len(14, &self.sloppy_quorum)
            + opt_u32_len(15, &self.n_val)
            + opt_bytes_len(16, &self.bucket_type)
    }

    fn clear(&mut self) {
        *self = Self::default();
    }
}

#[derive(Clone, Default, Debug, PartialEq)]
pub struct RpbPutResp {
    pub content: Vec<RpbContent>, // field 1
    pub vclock: Option<Vec<u8>>,  // field 2
    pub key: Option<Vec<u8>>,     // field 3
}

impl Message for RpbPutResp {
    fn encode_raw(&self, buf: &mut impl BufMut)
    where
        Self: Sized,
    {
        encoding::message::encode_repeated(1, &self.content, buf);
        put_opt_bytes(2, &self.vclock, buf);
        put_opt_bytes(3, &self.key, buf);
    }

    fn merge_field(
        &mut self,
        tag: u32,
        wire_type: WireType,
        buf: &mut impl Buf,
        ctx: DecodeContext,
    ) -> Result<(), DecodeError>
    where
        Self: Sized,
    {
        match tag {
            1 => encoding::message::merge_repeated(wire_type, &mut self.content, buf, ctx),
            2 => encoding::bytes::merge(wire_type, self.vclock.get_or_insert_with(Vec::new), buf, ctx),
            3 => encoding::bytes::merge(wire_type, self.key.get_or_insert_with(Vec::new), buf, ctx),
            _ => encoding::skip_field(wire_type, tag, buf, ctx),
        }
    }

    fn encoded_len(&self) -> usize {
        encoding::message::encoded_len_repeated(1, &self.content)
            + opt_bytes_len(2, &self.vclock)
            + opt_bytes_len(3, &self.key)
    }

    fn clear(&mut self) {
        *self = Self::default();
    }
}

// ============================================================================
// RpbDelReq (code 13); the response (code 14) has no body
// ============================================================================

#[derive(Clone, Default, Debug, PartialEq)]
pub struct RpbDelReq {
    pub bucket: Vec<u8>,              // field 1
    pub key: Vec<u8>,                 // field 2
    pub vclock: Option<Vec<u8>>,      // field 4
    pub w: Option<u32>,               // field 6
    pub pw: Option<u32>,              // field 8
    pub timeout: Option<u32>,         // field 10
    pub sloppy_quorum: Option<bool>,  // field 11
    pub n_val: Option<u32>,           // field 12
    pub bucket_type: Option<Vec<u8>>, // field 13
}

impl Message for RpbDelReq {
    fn encode_raw(&self, buf: &mut impl BufMut)
    where
        Self: Sized,
    {
        encoding::bytes::encode(1, &self.bucket, buf);
        encoding::bytes::encode(2, &self.key, buf);
        put_opt_bytes(4, &self.vclock, buf);
        put_opt_u32(6, &self.w, buf);
        put_opt_u32(8, &self.pw, buf);
        put_opt_u32(10, &self.timeout, buf);
        put_opt_bool(11, &self.sloppy_quorum, buf);
        put_opt_u32(12, &self.n_val, buf);
        put_opt_bytes(13, &self.bucket_type, buf);
    }

    fn merge_field(
        &mut self,
        tag: u32,
        wire_type: WireType,
        buf: &mut impl Buf,
        ctx: DecodeContext,
    ) -> Result<(), DecodeError>
    where
        Self: Sized,
    {
        match tag {
            1 => encoding::bytes::merge(wire_type, &mut self.bucket, buf, ctx),
            2 => encoding::bytes::merge(wire_type, &mut self.key, buf, ctx),
            4 => encoding::bytes::merge(wire_type, self.vclock.get_or_insert_with(Vec::new), buf, ctx),
            6 => encoding::uint32::merge(wire_type, self.w.get_or_insert(0), buf, ctx),
            8 => encoding::uint32::merge(wire_type, self.pw.get_or_insert(0), buf, ctx),
            10 => encoding::uint32::merge(wire_type, self.timeout.get_or_insert(0), buf, ctx),
            11 => encoding::bool::merge(wire_type, self.sloppy_quorum.get_or_insert(false), buf, ctx),
            12 => encoding::uint32::merge(wire_type, self.n_val.get_or_insert(0), buf, ctx),
            13 => encoding::bytes::merge(wire_type, self.bucket_type.get_or_insert_with(Vec::new), buf, ctx),
            _ => encoding::skip_field(wire_type, tag, buf, ctx),
        }
    }

    fn encoded_len(&self) -> usize {
        encoding::bytes::encoded_len(1, &self.bucket)
            + encoding::bytes::encoded_len(2, &self.key)
            + opt_bytes_len(4, &self.vclock)
            + opt_u32_len(6, &self.w)
            + opt_u32_len(8, &self.pw)
            + opt_u32_len(10, &self.timeout)
            + opt_bool_len(11, &self.sloppy_quorum)
            + opt_u32_len(12, &self.n_val)
            + opt_bytes_len(13, &self.bucket_type)
    }

    fn clear(&mut self) {
        *self = Self::default();
    }
}

// ============================================================================
// DtFetchReq (code 80) / DtFetchResp (code 81)
// ============================================================================

#[derive(Clone, Default, Debug, PartialEq)]
pub struct DtFetchReq {
    pub bucket: Vec<u8>,               // field 1
    pub key: Vec<u8>,                  // field 2
    pub bucket_type: Vec<u8>,          // field 3
    pub r: Option<u32>,                // field 4
    pub pr: Option<u32>,               // field 5
    pub basic_quorum: Option<bool>,    // field 6
    pub notfound_ok: Option<bool>,     // field 7
    pub timeout: Option<u32>,          // field 8
    pub sloppy_quorum: Option<bool>,   // field 9
    pub n_val: Option<u32>,            // field 10
    pub include_context: Option<bool>, // field 11
}

impl Message for DtFetchReq {
    fn encode_raw(&self, buf: &mut impl BufMut)
    where
        Self: Sized,
    {
        encoding::bytes::encode(1, &self.bucket, buf);
        encoding::bytes::encode(2, &self.key, buf);
        encoding::bytes::encode(3, &self.bucket_type, buf);
        put_opt_u32(4, &self.r, buf);
        put_opt_u32(5, &self.pr, buf);
        put_opt_bool(6, &self.basic_quorum, buf);
        put_opt_bool(7, &self.notfound_ok, buf);
        put_opt_u32(8, &self.timeout, buf);
        put_opt_bool(9, &self.sloppy_quorum, buf);
        put_opt_u32(10, &self.n_val, buf);
        put_opt_bool(11, &self.include_context, buf);
    }

    fn merge_field(
        &mut self,
        tag: u32,
        wire_type: WireType,
        buf: &mut impl Buf,
        ctx: DecodeContext,
    ) -> Result<(), DecodeError>
    where
        Self: Sized,
    {
        match tag {
            1 => encoding::bytes::merge(wire_type, &mut self.bucket, buf, ctx),
            2 => encoding::bytes::merge(wire_type, &mut self.key, buf, ctx),
            3 => encoding::bytes::merge(wire_type, &mut self.bucket_type, buf, ctx),
            4 => encoding::uint32::merge(wire_type, self.r.get_or_insert(0), buf, ctx),
            5 => encoding::uint32::merge(wire_type, self.pr.get_or_insert(0), buf, ctx),
            6 => encoding::bool::merge(wire_type, self.basic_quorum.get_or_insert(false), buf, ctx),
            7 => encoding::bool::merge(wire_type, self.notfound_ok.get_or_insert(false), buf, ctx),
            8 => encoding::uint32::merge(wire_type, self.timeout.get_or_insert(0), buf, ctx),
            9 => encoding::bool::merge(wire_type, self.sloppy_quorum.get_or_insert(false), buf, ctx),
            10 => encoding::uint32::merge(wire_type, self.n_val.get_or_insert(0), buf, ctx),
            11 => encoding::bool::merge(wire_type, self.include_context.get_or_insert(false), buf, ctx),
            _ => encoding::skip_field(wire_type, tag, buf, ctx),
        }
    }

    fn encoded_len(&self) -> usize {
        encoding::bytes::encoded_len(1, &self.bucket)
            + encoding::bytes::encoded_len(2, &self.key)
            + encoding::bytes::encoded_len(3, &self.bucket_type)
            + opt_u32_len(4, &self.r)
            + opt_u32_len(5, &self.pr)
            + opt_bool_len(6, &self.basic_quorum)
            + opt_bool_len(7, &self.notfound_ok)
            + opt_u32_len(8, &self.timeout)
            + opt_bool_len(9, &self.sloppy_quorum)
            + opt_u32_len(10, &self.n_val)
            + opt_bool_len(11, &self.include_context)
    }

    fn clear(&mut self) {
        *self = Self::default();
    }
}

/// Data type value; only counters and sets are understood
#[derive(Clone, Default, Debug, PartialEq)]
pub struct DtValue {
    pub counter_value: Option<i64>, // field 1
    pub set_value: Vec<Vec<u8>>,    // field 2
}

impl Message for DtValue {
    fn encode_raw(&self, buf: &mut impl BufMut)
    where
        Self: Sized,
    {
        if let Some(v) = &self.counter_value {
            encoding::sint64::encode(1, v, buf);
        }
        encoding::bytes::encode_repeated(2, &self.set_value, buf);
    }

    fn merge_field(
        &mut self,
        tag: u32,
        wire_type: WireType,
        buf: &mut impl Buf,
        ctx: DecodeContext,
    ) -> Result<(), DecodeError>
    where
        Self: Sized,
    {
        match tag {
            1 => encoding::sint64::merge(wire_type, self.counter_value.get_or_insert(0), buf, ctx),
            2 => encoding::bytes::merge_repeated(wire_type, &mut self.set_value, buf, ctx),
            _ => encoding::skip_field(wire_type, tag, buf, ctx),
        }
    }

    fn encoded_len(&self) -> usize {
        self.counter_value
            .as_ref()
            .map_or(0, |v| encoding::sint64::encoded_len(1, v))
            + encoding::bytes::encoded_len_repeated(2, &self.set_value)
    }

    fn clear(&mut self) {
        *self = Self::default();
    }
}

#[derive(Clone, Default, Debug, PartialEq)]
pub struct DtFetchResp {
    pub context: Option<Vec<u8>>, // field 1
    pub data_type: i32,           // field 2
    pub value: Option<DtValue>,   // field 3
}

impl Message for DtFetchResp {
    fn encode_raw(&self, buf: &mut impl BufMut)
    where
        Self: Sized,
    {
        put_opt_bytes(1, &self.context, buf);
        encoding::int32::encode(2, &self.data_type, buf);
        if let Some(value) = &self.value {
            encoding::message::encode(3, value, buf);
        }
    }

    fn merge_field(
        &mut self,
        tag: u32,
        wire_type: WireType,
        buf: &mut impl Buf,
        ctx: DecodeContext,
    ) -> Result<(), DecodeError>
    where
        Self: Sized,
    {
        match tag {
            1 => encoding::bytes::merge(wire_type, self.context.get_or_insert_with(Vec::new), buf, ctx),
            2 => encoding::int32::merge(wire_type, &mut self.data_type, buf, ctx),
            3 => encoding::message::merge(wire_type, self.value.get_or_insert_with(DtValue::default), buf, ctx),
            _ => encoding::skip_field(wire_type, tag, buf, ctx),
        }
    }

    fn encoded_len(&self) -> usize {
        opt_bytes_len(1, &self.context)
            + encoding::int32::encoded_len(2, &self.data_type)
            + self
                .value
                .as_ref()
                .map_or(0, |v| encoding::message::encoded_len(3, v))
    }

    fn clear(&mut self) {
        *self = Self::default();
    }
}

// ============================================================================
// DtUpdateReq (code 82) / DtUpdateResp (code 83)
// ============================================================================

#[derive(Clone, Default, Debug, PartialEq)]
pub struct SetOp {
    pub adds: Vec<Vec<u8>>,    // field 1
    pub removes: Vec<Vec<u8>>, // field 2
}

impl Message for SetOp {
    fn encode_raw(&self, buf: &mut impl BufMut)
    where
        Self: Sized,
    {
        encoding::bytes::encode_repeated(1, &self.adds, buf);
        encoding::bytes::encode_repeated(2, &self.removes, buf);
    }

    fn merge_field(
        &mut self,
        tag: u32,
        wire_type: WireType,
        buf: &mut impl Buf,
        ctx: DecodeContext,
    ) -> Result<(), DecodeError>
    where
        Self: Sized,
    {
        match tag {
            1 => encoding::bytes::merge_repeated(wire_type, &mut self.adds, buf, ctx),
            2 => encoding::bytes::merge_repeated(wire_type, &mut self.removes, buf, ctx),
            _ => encoding::skip_field(wire_type, tag, buf, ctx),
        }
    }

    fn encoded_len(&self) -> usize {
        encoding::bytes::encoded_len_repeated(1, &self.adds)
            + encoding::bytes::encoded_len_repeated(2, &self.removes)
    }

    fn clear(&mut self) {
        *self = Self::default();
    }
}

/// Operation wrapper; only the set operation is ever populated
#[derive(Clone, Default, Debug, PartialEq)]
pub struct DtOp {
    pub set_op: Option<SetOp>, // field 2
}

impl Message for DtOp {
    fn encode_raw(&self, buf: &mut impl BufMut)
    where
        Self: Sized,
    {
        if let Some(op) = &self.set_op {
            encoding::message::encode(2, op, buf);
        }
    }

    fn merge_field(
        &mut self,
        tag: u32,
        wire_type: WireType,
        buf: &mut impl Buf,
        ctx: DecodeContext,
    ) -> Result<(), DecodeError>
    where
        Self: Sized,
    {
        match tag {
            2 => encoding::message::merge(wire_type, self.set_op.get_or_insert_with(SetOp::default), buf, ctx),
            _ => encoding::skip_field(wire_type, tag, buf, ctx),
        }
    }

    fn encoded_len(&self) -> usize {
        self.set_op
            .as_ref()
            .map_or(0, |op| encoding::message::encoded_len(2, op))
    }

    fn clear(&mut self) {
        *self = Self::default();
    }
}

#[derive(Clone, Default, Debug, PartialEq)]
pub struct DtUpdateReq {
    pub bucket: Vec<u8>,              // field 1
    pub key: Option<Vec<u8>>,         // field 2
    pub bucket_type: Vec<u8>,         // field 3
    pub context: Option<Vec<u8>>,     // field 4
    pub op: DtOp,                     // field 5
    pub w: Option<u32>,               // field 6
    pub pw: Option<u32>,              // field 8
    pub return_body: Option<bool>,    // field 9
    pub timeout: Option<u32>,         // field 10
    pub sloppy_quorum: Option<bool>,  // field 11
    pub n_val: Option<u32>,           // field 12
}

impl Message for DtUpdateReq {
    fn encode_raw(&self, buf: &mut impl BufMut)
    where
        Self: Sized,
    {
        encoding::bytes::encode(1, &self.bucket, buf);
        put_opt_bytes(2, &self.key, buf);
        encoding::bytes::encode(3, &self.bucket_type, buf);
        put_opt_bytes(4, &self.context, buf);
        encoding::message::encode(5, &self.op, buf);
        put_opt_u32(6, &self.w, buf);
        put_opt_u32(8, &self.pw, buf);
        put_opt_bool(9, &self.return_body, buf);
        put_opt_u32(10, &self.timeout, buf);
        put_opt_bool(11, &self.sloppy_quorum, buf);
        put_opt_u32(12, &self.n_val, buf);
    }

    fn merge_field(
        &mut self,
        tag: u32,
        wire_type: WireType,
        buf: &mut impl Buf,
        ctx: DecodeContext,
    ) -> Result<(), DecodeError>
    where
        Self: Sized,
    {
        match tag {
            1 => encoding::bytes::merge(wire_type, &mut self.bucket, buf, ctx),
            2 => encoding::bytes::merge(wire_type, self.key.get_or_insert_with(Vec::new), buf, ctx),
            3 => encoding::bytes::merge(wire_type, &mut self.bucket_type, buf, ctx),
            4 => encoding::bytes::merge(wire_type, self.context.get_or_insert_with(Vec::new), buf, ctx),
            5 => encoding::message::merge(wire_type, &mut self.op, buf, ctx),
            6 => encoding::uint32::merge(wire_type, self.w.get_or_insert(0), buf, ctx),
            8 => encoding::uint32::merge(wire_type, self.pw.get_or_insert(0), buf, ctx),
            9 => encoding::bool::merge(wire_type, self.return_body.get_or_insert(false), buf, ctx),
            10 => encoding::uint32::merge(wire_type, self.timeout.get_or_insert(0), buf, ctx),
            11 => encoding::bool::merge(wire_type, self.sloppy_quorum.get_or_insert(false), buf, ctx),
            12 => encoding::uint32::merge(wire_type, self.n_val.get_or_insert(0), buf, ctx),
            _ => encoding::skip_field(wire_type, tag, buf, ctx),
        }
    }

    fn encoded_len(&self) -> usize {
        encoding::bytes::encoded_len(1, &self.bucket)
            + opt_bytes_len(2, &self.key)
            + encoding::bytes::encoded_len(3, &self.bucket_type)
            + opt_bytes_len(4, &self.context)
            + encoding::message::encoded_len(5, &self.op)
            + opt_u32_len(6, &self.w)
            + opt_u32_len(8, &self.pw)
            + opt_bool_len(9, &self.return_body)
            + opt_u32_len(10, &self.timeout)
            + opt_bool_len(11, &self.sloppy_quorum)
            + opt_u32_len(12, &self.n_val)
    }

    fn clear(&mut self) {
        *self = Self::default();
    }
}

#[derive(Clone, Default, Debug, PartialEq)]
pub struct DtUpdateResp {
    pub key: Option<Vec<u8>>,       // field 1
    pub context: Option<Vec<u8>>,   // field 2
    pub counter_value: Option<i64>, // field 3
    pub set_value: Vec<Vec<u8>>,    // field 4
}

impl Message for DtUpdateResp {
    fn encode_raw(&self, buf: &mut impl BufMut)
    where
        Self: Sized,
    {
        put_opt_bytes(1, &self.key, buf);
        put_opt_bytes(2, &self.context, buf);
        if let Some(v) = &self.counter_value {
            encoding::sint64::encode(3, v, buf);
        }
        encoding::bytes::encode_repeated(4, &self.set_value, buf);
    }

    fn merge_field(
        &mut self,
        tag: u32,
        wire_type: WireType,
        buf: &mut impl Buf,
        ctx: DecodeContext,
    ) -> Result<(), DecodeError>
    where
        Self: Sized,
    {
        match tag {
            1 => encoding::bytes::merge(wire_type, self.key.get_or_insert_with(Vec::new), buf, ctx),
            2 => encoding::bytes::merge(wire_type, self.context.get_or_insert_with(Vec::new), buf, ctx),
            3 => encoding::sint64::merge(wire_type, self.counter_value.get_or_insert(0), buf, ctx),
            4 => encoding::bytes::merge_repeated(wire_type, &mut self.set_value, buf, ctx),
            _ => encoding::skip_field(wire_type, tag, buf, ctx),
        }
    }

    fn encoded_len(&self) -> usize {
        opt_bytes_len(1, &self.key)
            + opt_bytes_len(2, &self.context)
            + self
                .counter_value
                .as_ref()
                .map_or(0, |v| encoding::sint64::encoded_len(3, v))
            + encoding::bytes::encoded_len_repeated(4, &self.set_value)
    }

    fn clear(&mut self) {
        *self = Self::default();
    }
}

// ============================================================================
// Legacy counters: RpbCounterUpdateReq/Resp (50/51), RpbCounterGetReq/Resp (52/53)
// ============================================================================

#[derive(Clone, Default, Debug, PartialEq)]
pub struct RpbCounterUpdateReq {
    pub bucket: Vec<u8>,            // field 1
    pub key: Vec<u8>,               // field 2
    pub amount: i64,                // field 3
    pub w: Option<u32>,             // field 4
    pub pw: Option<u32>,            // field 6
    pub returnvalue: Option<bool>,  // field 7
}

impl Message for RpbCounterUpdateReq {
    fn encode_raw(&self, buf: &mut impl BufMut)
    where
        Self: Sized,
    {
        encoding::bytes::encode(1, &self.bucket, buf);
        encoding::bytes::encode(2, &self.key, buf);
        encoding::sint64::encode(3, &self.amount, buf);
        put_opt_u32(4, &self.w, buf);
        put_opt_u32(6, &self.pw, buf);
        put_opt_bool(7, &self.returnvalue, buf);
    }

    fn merge_field(
        &mut self,
        tag: u32,
        wire_type: WireType,
        buf: &mut impl Buf,
        ctx: DecodeContext,
    ) -> Result<(), DecodeError>
    where
        Self: Sized,
    {
        match tag {
            1 => encoding::bytes::merge(wire_type, &mut self.bucket, buf, ctx),
            2 => encoding::bytes::merge(wire_type, &mut self.key, buf, ctx),
            3 => encoding::sint64::merge(wire_type, &mut self.amount, buf, ctx),
            4 => encoding::uint32::merge(wire_type, self.w.get_or_insert(0), buf, ctx),
            6 => encoding::uint32::merge(wire_type, self.pw.get_or_insert(0), buf, ctx),
            7 => encoding::bool::merge(wire_type, self.returnvalue.get_or_insert(false), buf, ctx),
            _ => encoding::skip_field(wire_type, tag, buf, ctx),
        }
    }

    fn encoded_len(&self) -> usize {
        encoding::bytes::encoded_len(1, &self.bucket)
            + encoding::bytes::encoded_len(2, &self.key)
            + encoding::sint64::encoded_len(3, &self.amount)
            + opt_u32_len(4, &self.w)
            + opt_u32_len(6, &self.pw)
            + opt_bool_len(7, &self.returnvalue)
    }

    fn clear(&mut self) {
        *self = Self::default();
    }
}

#[derive(Clone, Default, Debug, PartialEq)]
pub struct RpbCounterGetReq {
    pub bucket: Vec<u8>,            // field 1
    pub key: Vec<u8>,               // field 2
    pub r: Option<u32>,             // field 3
    pub pr: Option<u32>,            // field 4
    pub basic_quorum: Option<bool>, // field 5
    pub notfound_ok: Option<bool>,  // field 6
}

impl Message for RpbCounterGetReq {
    fn encode_raw(&self, buf: &mut impl BufMut)
    where
        Self: Sized,
    {
        encoding::bytes::encode(1, &self.bucket, buf);
        encoding::bytes::encode(2, &self.key, buf);
        put_opt_u32(3, &self.r, buf);
        put_opt_u32(4, &self.pr, buf);
        put_opt_bool(5, &self.basic_quorum, buf);
        put_opt_bool(6, &self.notfound_ok, buf);
    }

    fn merge_field(
        &mut self,
        tag: u32,
        wire_type: WireType,
        buf: &mut impl Buf,
        ctx: DecodeContext,
    ) -> Result<(), DecodeError>
    where
        Self: Sized,
    {
        match tag {
            1 => encoding::bytes::merge(wire_type, &mut self.bucket, buf, ctx),
            2 => encoding::bytes::merge(wire_type, &mut self.key, buf, ctx),
            3 => encoding::uint32::merge(wire_type, self.r.get_or_insert(0), buf, ctx),
            4 => encoding::uint32::merge(wire_type, self.pr.get_or_insert(0), buf, ctx),
            5 => encoding::bool::merge(wire_type, self.basic_quorum.get_or_insert(false), buf, ctx),
            6 => encoding::bool::merge(wire_type, self.notfound_ok.get_or_insert(false), buf, ctx),
            _ => encoding::skip_field(wire_type, tag, buf, ctx),
        }
    }

    fn encoded_len(&self) -> usize {
        encoding::bytes::encoded_len(1, &self.bucket)
            + encoding::bytes::encoded_len(2, &self.key)
            + opt_u32_len(3, &self.r)
            + opt_u32_len(4, &self.pr)
            + opt_bool_len(5, &self.basic_quorum)
            + opt_bool_len(6, &self.notfound_ok)
    }

    fn clear(&mut self) {
        *self = Self::default();
    }
}

/// Shared shape of RpbCounterUpdateResp and RpbCounterGetResp
#[derive(Clone, Default, Debug, PartialEq)]
pub struct RpbCounterResp {
    pub value: Option<i64>, // field 1
}

impl Message for RpbCounterResp {
    fn encode_raw(&self, buf: &mut impl BufMut)
    where
        Self: Sized,
    {
        if let Some(v) = &self.value {
            encoding::sint64::encode(1, v, buf);
        }
    }

    fn merge_field(
        &mut self,
        tag: u32,
        wire_type: WireType,
        buf: &mut impl Buf,
        ctx: DecodeContext,
    ) -> Result<(), DecodeError>
    where
        Self: Sized,
    {
        match tag {
            1 => encoding::sint64::merge(wire_type, self.value.get_or_insert(0), buf, ctx),
            _ => encoding::skip_field(wire_type, tag, buf, ctx),
        }
    }

    fn encoded_len(&self) -> usize {
        self.value
            .as_ref()
            .map_or(0, |v| encoding::sint64::encoded_len(1, v))
    }

    fn clear(&mut self) {
        *self = Self::default();
    }
}
