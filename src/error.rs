//! Error types for tierproxy
//!
//! Provides a unified error type for all operations.

use bytes::Bytes;
use thiserror::Error;

/// Result type alias using ProxyError
pub type Result<T> = std::result::Result<T, ProxyError>;

/// Unified error type for tierproxy operations
#[derive(Debug, Error)]
pub enum ProxyError {
    // -------------------------------------------------------------------------
    // Client Errors (never reach the backend)
    // -------------------------------------------------------------------------
    #[error("malformed request: {0}")]
    Malformed(String),

    #[error("bad request: {0}")]
    BadRequest(String),

    // -------------------------------------------------------------------------
    // Per-operation Errors
    // -------------------------------------------------------------------------
    #[error("resource exhausted: {0}")]
    ResourceExhausted(String),

    #[error("transient backend failure: {0}")]
    Transient(String),

    #[error("upstream error: {0}")]
    Upstream(String),

    // -------------------------------------------------------------------------
    // Connection Errors
    // -------------------------------------------------------------------------
    #[error("protocol error: {0}")]
    Protocol(String),

    #[error("protobuf decode error: {0}")]
    Decode(#[from] prost::DecodeError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // -------------------------------------------------------------------------
    // Configuration Errors
    // -------------------------------------------------------------------------
    #[error("configuration error: {0}")]
    Config(String),
}

impl ProxyError {
    /// Only transient failures are eligible for a resend to another replica
    pub fn is_retryable(&self) -> bool {
        matches!(self, ProxyError::Transient(_))
    }

    /// Errors that poison the connection they were observed on
    pub fn is_fatal_to_connection(&self) -> bool {
        matches!(self, ProxyError::Protocol(_) | ProxyError::Decode(_))
    }

    /// Render the error as a frontend error reply line
    pub fn to_reply(&self) -> Bytes {
        let message = self.to_string().replace(['\r', '\n'], " ");
        Bytes::from(format!("-ERR {}\r\n", message))
    }
}
