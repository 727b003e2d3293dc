//! Shardline Gateway
//!
//! Shard connection lifecycle for the gateway protocol. Provides:
//! - Outbound command throttles (fixed window per identity)
//! - Wire payloads and opcodes
//! - The per-shard session actor (heartbeat, identify/resume, dispatch)
//! - A transport abstraction with a WebSocket implementation
//! - The shard manager: single-flight, gated, sequential bring-up
//!
//! ## Architecture
//!
//! ```text
//!   add_to_connect_queue(id)
//!            │
//!     ┌──────▼───────┐   gating conditions    ┌──────────────┐
//!     │ ShardManager │ ─────────────────────► │ ShardLauncher│
//!     │ (worker task)│ ◄── ConnectOutcome ─── └──────┬───────┘
//!     └──────┬───────┘                               │ spawns
//!            │ LifecycleEvent                 ┌──────▼───────┐  frames   ┌──────────┐
//!            └─────────────────────────────── │ ShardSession │ ◄───────► │ Connector│
//!                                             │  (actor)     │           └──────────┘
//!                                             └──────┬───────┘
//!                                                    │ dispatches
//!                                                    ▼
//!                                               EventIngest
//! ```
//!
//! ## Transport
//!
//! Sessions never touch sockets directly. A [`GatewayConnector`] yields a
//! pair of channels per connection, so tests can drive a session with an
//! in-memory socket and production uses [`WsConnector`].

pub mod error;
pub mod manager;
pub mod messages;
pub mod session;
pub mod store;
pub mod throttle;
pub mod transport;

// Re-export commonly used types
pub use error::{ControlError, LaunchError, TransportError};
pub use manager::{
    LaunchContext, ManagerStatus, SessionLauncher, ShardConnectQueue, ShardLauncher, ShardManager,
    ShardManagerConfig, ShardRegistry,
};
pub use messages::{GatewayOp, GatewayPayload};
pub use session::{
    ControlMessage, LifecycleEvent, LifecycleKind, SessionConfig, SessionContext, ShardSession,
    ShardSessionHandle,
};
pub use store::MemorySessionStore;
pub use throttle::{CommandThrottle, ThrottleConfig, WindowRegistry};
pub use transport::{GatewayConnector, SocketCommand, SocketFrame, SocketHandle, WsConnector};
