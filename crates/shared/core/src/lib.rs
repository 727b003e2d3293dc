//! Shardline Core Domain
//!
//! Pure domain types shared by the rate limiter, the shard lifecycle and the
//! event consistency buffer. This crate contains no async and no I/O.

pub mod entities;
pub mod values;

// Re-export commonly used types at crate root
pub use entities::{
    // Inbound events
    EventKind,
    GatewayEvent,
    // Shard lifecycle
    ConnectOutcome,
    SessionState,
    ShardInfo,
    // Event names and payload fields
    fields,
    raw,
};
pub use values::{ObjectId, Timestamp, epoch_millis, from_epoch_millis};
