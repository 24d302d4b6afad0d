//! Reply and cache-command builders
//!
//! Client replies plus the side-effect commands the engine injects into the
//! cache tier (read-through populate, write-through, expiry).

use bytes::{BufMut, Bytes, BytesMut};

use super::{write_frontend_reply, RespValue};

fn encode(value: RespValue) -> Bytes {
    let mut out = BytesMut::new();
    write_frontend_reply(&value, &mut out);
    out.freeze()
}

// =============================================================================
// Client Replies
// =============================================================================

pub fn ok() -> Bytes {
    Bytes::from_static(b"+OK\r\n")
}

pub fn nil() -> Bytes {
    Bytes::from_static(b"$-1\r\n")
}

pub fn integer(value: i64) -> Bytes {
    encode(RespValue::Integer(value))
}

pub fn bulk(data: &[u8]) -> Bytes {
    encode(RespValue::bulk(Bytes::copy_from_slice(data)))
}

/// Multi-bulk reply of set members
pub fn members(items: &[Bytes]) -> Bytes {
    encode(RespValue::Array(Some(
        items.iter().cloned().map(RespValue::bulk).collect(),
    )))
}

pub fn error(message: &str) -> Bytes {
    let mut out = BytesMut::with_capacity(message.len() + 7);
    out.put_slice(b"-ERR ");
    out.put_slice(message.replace(['\r', '\n'], " ").as_bytes());
    out.put_slice(b"\r\n");
    out.freeze()
}

// =============================================================================
// Cache-tier Commands
// =============================================================================

/// Encode a command array of bulk strings
pub fn encode_frontend_command(args: &[&[u8]]) -> Bytes {
    let mut out = BytesMut::new();
    out.put_slice(format!("*{}\r\n", args.len()).as_bytes());
    for arg in args {
        out.put_slice(format!("${}\r\n", arg.len()).as_bytes());
        out.put_slice(arg);
        out.put_slice(b"\r\n");
    }
    out.freeze()
}

/// `set key value [px ttl]`
pub fn cache_set(key: &[u8], value: &[u8], ttl_ms: Option<u64>) -> Bytes {
    match ttl_ms {
        Some(ttl) => {
            let ttl = ttl.to_string();
            encode_frontend_command(&[b"set", key, value, b"px", ttl.as_bytes()])
        }
        None => encode_frontend_command(&[b"set", key, value]),
    }
}

/// `sadd key member...`
pub fn cache_sadd(key: &[u8], members: &[Bytes]) -> Bytes {
    let mut args: Vec<&[u8]> = Vec::with_capacity(members.len() + 2);
    args.push(b"sadd");
    args.push(key);
    args.extend(members.iter().map(|m| m.as_ref()));
    encode_frontend_command(&args)
}

/// `pexpire key ms`; 0 drops the cached copy at once
pub fn cache_pexpire(key: &[u8], ttl_ms: u64) -> Bytes {
    let ttl = ttl_ms.to_string();
    encode_frontend_command(&[b"pexpire", key, ttl.as_bytes()])
}

pub fn cache_del(key: &[u8]) -> Bytes {
    encode_frontend_command(&[b"del", key])
}

pub fn cache_get(key: &[u8]) -> Bytes {
    encode_frontend_command(&[b"get", key])
}

pub fn cache_smembers(key: &[u8]) -> Bytes {
    encode_frontend_command(&[b"smembers", key])
}

pub fn cache_sismember(key: &[u8], member: &[u8]) -> Bytes {
    encode_frontend_command(&[b"sismember", key, member])
}

pub fn cache_scard(key: &[u8]) -> Bytes {
    encode_frontend_command(&[b"scard", key])
}
