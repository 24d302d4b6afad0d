//! # tierproxy
//!
//! Protocol core of a two-tier caching proxy:
//! - Redis-style clients in front
//! - A Redis cache tier kept warm by read-through and write-through
//! - A Riak PBC source-of-truth tier behind it
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     Client Connections                       │
//! │                (RESP commands, ordered replies)              │
//! └─────────────────────┬───────────────────────────────────────┘
//!                       │
//! ┌─────────────────────▼───────────────────────────────────────┐
//! │                         Engine                               │
//! │   RequestTranslator · ResponseTranslator · FragmentCoordinator│
//! └──────────┬───────────────────────────────────┬──────────────┘
//!            │                                   │
//!            ▼                                   ▼
//!   ┌─────────────────┐                 ┌─────────────────┐
//!   │   Cache Tier    │                 │  Backend Tier   │
//!   │     (RESP)      │                 │ (PBC frames via │
//!   │                 │                 │ FailoverRouter) │
//!   └─────────────────┘                 └─────────────────┘
//! ```
//!
//! The engine is sans-IO: an event loop feeds it bytes and close events and
//! writes out whatever it queues. See [`engine`].

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod config;

pub mod key;
pub mod buffer;
pub mod wire;
pub mod frontend;
pub mod translate;
pub mod failover;
pub mod ring;
pub mod fragment;
pub mod policy;
pub mod engine;

// =============================================================================
// Public API Re-exports
// =============================================================================

pub use error::{ProxyError, Result};
pub use config::{PoolConfig, QuorumPolicy};
pub use engine::{ClientId, Engine, Outbound};
pub use failover::{ServerId, ServerPool, Tier};
pub use key::Key;

// =============================================================================
// Version Info
// =============================================================================

/// Current version of tierproxy
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
