//! RESP parser and encoder.
//!
//! Enough of RESP2 to read client commands and cache-tier replies:
//! simple strings, errors, integers, bulk strings and arrays, with the
//! `$-1` / `*-1` nil forms.

use bytes::{BufMut, Bytes, BytesMut};

use crate::error::{ProxyError, Result};

/// Maximum bulk string size (512 MB, the Redis limit)
const MAX_BULK_SIZE: usize = 512 * 1024 * 1024;

/// Maximum elements in one array
const MAX_ELEMENTS: usize = 1024 * 1024;

/// Maximum array nesting depth
const MAX_NESTING_DEPTH: usize = 8;

/// One RESP value
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RespValue {
    Simple(Bytes),
    Error(Bytes),
    Integer(i64),
    /// `None` is the nil bulk string
    Bulk(Option<Bytes>),
    /// `None` is the nil array
    Array(Option<Vec<RespValue>>),
}

impl RespValue {
    pub fn bulk(data: impl Into<Bytes>) -> Self {
        RespValue::Bulk(Some(data.into()))
    }

    pub fn nil() -> Self {
        RespValue::Bulk(None)
    }

    /// Nil bulk or nil array
    pub fn is_nil(&self) -> bool {
        matches!(self, RespValue::Bulk(None) | RespValue::Array(None))
    }

    pub fn is_error(&self) -> bool {
        matches!(self, RespValue::Error(_))
    }

    /// Bytes of a simple or bulk string
    pub fn as_bytes(&self) -> Option<&Bytes> {
        match self {
            RespValue::Simple(b) | RespValue::Bulk(Some(b)) => Some(b),
            _ => None,
        }
    }

    /// Append the wire form of this value
    pub fn encode_into(&self, out: &mut BytesMut) {
        match self {
            RespValue::Simple(s) => {
                out.put_u8(b'+');
                out.put_slice(s);
                out.put_slice(b"\r\n");
            }
            RespValue::Error(e) => {
                out.put_u8(b'-');
                out.put_slice(e);
                out.put_slice(b"\r\n");
            }
            RespValue::Integer(n) => {
                out.put_slice(format!(":{}\r\n", n).as_bytes());
            }
            RespValue::Bulk(None) => out.put_slice(b"$-1\r\n"),
            RespValue::Bulk(Some(data)) => {
                out.put_slice(format!("${}\r\n", data.len()).as_bytes());
                out.put_slice(data);
                out.put_slice(b"\r\n");
            }
            RespValue::Array(None) => out.put_slice(b"*-1\r\n"),
            RespValue::Array(Some(items)) => {
                out.put_slice(format!("*{}\r\n", items.len()).as_bytes());
                for item in items {
                    item.encode_into(out);
                }
            }
        }
    }

    pub fn encode(&self) -> Bytes {
        let mut out = BytesMut::new();
        self.encode_into(&mut out);
        out.freeze()
    }
}

/// Parse one value off the front of `data`
///
/// Returns the value and the number of bytes it occupied, or `Ok(None)` if
/// the value is not complete yet.
pub fn parse_frontend_message(data: &[u8]) -> Result<Option<(RespValue, usize)>> {
    parse_value(data, 0)
}

/// Encode a reply for a client or cache connection
pub fn write_frontend_reply(value: &RespValue, out: &mut BytesMut) {
    value.encode_into(out);
}

fn parse_value(data: &[u8], depth: usize) -> Result<Option<(RespValue, usize)>> {
    if data.is_empty() {
        return Ok(None);
    }
    if depth > MAX_NESTING_DEPTH {
        return Err(ProxyError::Malformed(
            "maximum nesting depth exceeded".to_string(),
        ));
    }

    let body = &data[1..];
    match data[0] {
        b'+' => Ok(parse_line(body)
            .map(|(line, used)| (RespValue::Simple(Bytes::copy_from_slice(line)), used + 1))),
        b'-' => Ok(parse_line(body)
            .map(|(line, used)| (RespValue::Error(Bytes::copy_from_slice(line)), used + 1))),
        b':' => match parse_line(body) {
            Some((line, used)) => Ok(Some((RespValue::Integer(parse_int(line)?), used + 1))),
            None => Ok(None),
        },
        b'$' => parse_bulk(body),
        b'*' => parse_array(body, depth),
        other => Err(ProxyError::Malformed(format!(
            "unexpected type byte 0x{:02x}",
            other
        ))),
    }
}

fn parse_bulk(data: &[u8]) -> Result<Option<(RespValue, usize)>> {
    let Some((line, header)) = parse_line(data) else {
        return Ok(None);
    };

    let len = parse_int(line)?;
    if len == -1 {
        return Ok(Some((RespValue::Bulk(None), header + 1)));
    }
    if len < 0 || len as usize > MAX_BULK_SIZE {
        return Err(ProxyError::Malformed(format!(
            "invalid bulk length {}",
            len
        )));
    }

    let start = header;
    let end = start + len as usize;
    if data.len() < end + 2 {
        return Ok(None);
    }
    if &data[end..end + 2] != b"\r\n" {
        return Err(ProxyError::Malformed(
            "missing CRLF after bulk string".to_string(),
        ));
    }

    Ok(Some((
        RespValue::Bulk(Some(Bytes::copy_from_slice(&data[start..end]))),
        end + 2 + 1,
    )))
}

fn parse_array(data: &[u8], depth: usize) -> Result<Option<(RespValue, usize)>> {
    let Some((line, header)) = parse_line(data) else {
        return Ok(None);
    };

    let count = parse_int(line)?;
    if count == -1 {
        return Ok(Some((RespValue::Array(None), header + 1)));
    }
    if count < 0 || count as usize > MAX_ELEMENTS {
        return Err(ProxyError::Malformed(format!(
            "invalid array length {}",
            count
        )));
    }

    // the declared count is untrusted until the elements arrive
    let mut items = Vec::with_capacity((count as usize).min(64));
    let mut pos = header;
    for _ in 0..count {
        match parse_value(&data[pos..], depth + 1)? {
            Some((item, used)) => {
                items.push(item);
                pos += used;
            }
            None => return Ok(None),
        }
    }

    Ok(Some((RespValue::Array(Some(items)), pos + 1)))
}

/// Line up to CRLF and the bytes consumed including the CRLF
fn parse_line(data: &[u8]) -> Option<(&[u8], usize)> {
    find_crlf(data).map(|pos| (&data[..pos], pos + 2))
}

fn find_crlf(data: &[u8]) -> Option<usize> {
    data.windows(2).position(|w| w == b"\r\n")
}

fn parse_int(line: &[u8]) -> Result<i64> {
    std::str::from_utf8(line)
        .ok()
        .and_then(|s| s.parse::<i64>().ok())
        .ok_or_else(|| ProxyError::Malformed("invalid integer".to_string()))
}
