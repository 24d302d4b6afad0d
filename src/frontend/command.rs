//! Command definitions
//!
//! Client commands handled by the translation engine, parsed from a RESP
//! command array. Keys stay raw here; splitting happens in the translator.

use bytes::Bytes;

use super::RespValue;
use crate::error::{ProxyError, Result};

/// Set algebra variants
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SetAlgebra {
    Diff,
    Inter,
    Union,
}

impl SetAlgebra {
    pub fn name(self) -> &'static str {
        match self {
            SetAlgebra::Diff => "SDIFF",
            SetAlgebra::Inter => "SINTER",
            SetAlgebra::Union => "SUNION",
        }
    }
}

/// A parsed client command
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Get { key: Bytes },

    Set { key: Bytes, value: Bytes },

    /// Delete one or more keys
    Del { keys: Vec<Bytes> },

    SAdd { key: Bytes, members: Vec<Bytes> },

    SRem { key: Bytes, members: Vec<Bytes> },

    SMembers { key: Bytes },

    SIsMember { key: Bytes, member: Bytes },

    SCard { key: Bytes },

    /// SDIFF / SINTER / SUNION, or the STORE variant when `dest` is set
    SetOp {
        op: SetAlgebra,
        dest: Option<Bytes>,
        keys: Vec<Bytes>,
    },

    /// INCR / DECR / INCRBY / DECRBY
    Incr { key: Bytes, amount: i64 },
}

impl Command {
    /// Command name as a client would write it
    pub fn name(&self) -> &'static str {
        match self {
            Command::Get { .. } => "GET",
            Command::Set { .. } => "SET",
            Command::Del { .. } => "DEL",
            Command::SAdd { .. } => "SADD",
            Command::SRem { .. } => "SREM",
            Command::SMembers { .. } => "SMEMBERS",
            Command::SIsMember { .. } => "SISMEMBER",
            Command::SCard { .. } => "SCARD",
            Command::SetOp { op, dest: None, .. } => op.name(),
            Command::SetOp { op, .. } => match op {
                SetAlgebra::Diff => "SDIFFSTORE",
                SetAlgebra::Inter => "SINTERSTORE",
                SetAlgebra::Union => "SUNIONSTORE",
            },
            Command::Incr { .. } => "INCRBY",
        }
    }

    /// Build a command from a RESP array of bulk strings
    pub fn from_resp(value: RespValue) -> Result<Self> {
        let RespValue::Array(Some(items)) = value else {
            return Err(ProxyError::Malformed(
                "command must be an array of bulk strings".to_string(),
            ));
        };

        let mut args = Vec::with_capacity(items.len());
        for item in items {
            match item {
                RespValue::Bulk(Some(arg)) | RespValue::Simple(arg) => args.push(arg),
                _ => {
                    return Err(ProxyError::Malformed(
                        "command arguments must be bulk strings".to_string(),
                    ))
                }
            }
        }

        Self::from_args(args)
    }

    /// Build a command from its arguments, name first
    pub fn from_args(mut args: Vec<Bytes>) -> Result<Self> {
        if args.is_empty() {
            return Err(ProxyError::Malformed("empty command".to_string()));
        }
        let name = String::from_utf8_lossy(&args.remove(0)).to_ascii_uppercase();

        let command = match name.as_str() {
            "GET" => {
                let [key] = exact::<1>(&name, args)?;
                Command::Get { key }
            }
            "SET" => {
                let [key, value] = exact::<2>(&name, args)?;
                Command::Set { key, value }
            }
            "DEL" => Command::Del {
                keys: at_least(&name, args, 1)?,
            },
            "SADD" | "SREM" => {
                let mut args = at_least(&name, args, 2)?;
                let key = args.remove(0);
                if name == "SADD" {
                    Command::SAdd { key, members: args }
                } else {
                    Command::SRem { key, members: args }
                }
            }
            "SMEMBERS" => {
                let [key] = exact::<1>(&name, args)?;
                Command::SMembers { key }
            }
            "SISMEMBER" => {
                let [key, member] = exact::<2>(&name, args)?;
                Command::SIsMember { key, member }
            }
            "SCARD" => {
                let [key] = exact::<1>(&name, args)?;
                Command::SCard { key }
            }
            "SDIFF" | "SINTER" | "SUNION" => Command::SetOp {
                op: algebra(&name),
                dest: None,
                keys: at_least(&name, args, 1)?,
            },
            "SDIFFSTORE" | "SINTERSTORE" | "SUNIONSTORE" => {
                let mut args = at_least(&name, args, 2)?;
                let dest = args.remove(0);
                Command::SetOp {
                    op: algebra(&name),
                    dest: Some(dest),
                    keys: args,
                }
            }
            "INCR" | "DECR" => {
                let [key] = exact::<1>(&name, args)?;
                let amount = if name == "INCR" { 1 } else { -1 };
                Command::Incr { key, amount }
            }
            "INCRBY" | "DECRBY" => {
                let [key, amount] = exact::<2>(&name, args)?;
                let amount = parse_amount(&amount)?;
                let amount = if name == "INCRBY" {
                    amount
                } else {
                    amount.checked_neg().ok_or_else(|| {
                        ProxyError::BadRequest("increment out of range".to_string())
                    })?
                };
                Command::Incr { key, amount }
            }
            other => {
                return Err(ProxyError::BadRequest(format!(
                    "unsupported command '{}'",
                    other
                )))
            }
        };

        Ok(command)
    }
}

fn algebra(name: &str) -> SetAlgebra {
    if name.starts_with("SDIFF") {
        SetAlgebra::Diff
    } else if name.starts_with("SINTER") {
        SetAlgebra::Inter
    } else {
        SetAlgebra::Union
    }
}

fn exact<const N: usize>(name: &str, args: Vec<Bytes>) -> Result<[Bytes; N]> {
    args.try_into().map_err(|_| wrong_arity(name))
}

fn at_least(name: &str, args: Vec<Bytes>, min: usize) -> Result<Vec<Bytes>> {
    if args.len() < min {
        return Err(wrong_arity(name));
    }
    Ok(args)
}

fn wrong_arity(name: &str) -> ProxyError {
    ProxyError::Malformed(format!(
        "wrong number of arguments for '{}' command",
        name.to_ascii_lowercase()
    ))
}

fn parse_amount(raw: &[u8]) -> Result<i64> {
    std::str::from_utf8(raw)
        .ok()
        .and_then(|s| s.parse::<i64>().ok())
        .ok_or_else(|| {
            ProxyError::BadRequest("value is not an integer or out of range".to_string())
        })
}
