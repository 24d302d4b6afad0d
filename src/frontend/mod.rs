//! Frontend Protocol Module
//!
//! The RESP text protocol spoken by clients and by the cache tier.

mod command;
pub mod reply;
mod resp;

pub use command::{Command, SetAlgebra};
pub use resp::{parse_frontend_message, write_frontend_reply, RespValue};
