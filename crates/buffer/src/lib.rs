//! Shardline Buffer
//!
//! Per-shard consistency buffering between the gateway sessions and the
//! dispatch sink. By the time a subscriber sees an event that mentions an
//! object, the cache already reflects that object and, for large objects,
//! every member page the gateway promised for it.
//!
//! ```text
//!  ShardSession ──ingest──► EventConsistencyBuffer ──emit──► DispatchSink
//!                               │      │
//!                 apply_event ◄─┘      └─► request_membership_page
//!                 (CacheWorker)            (GatewayCommands)
//! ```
//!
//! ## Lifecycle of a shard's state
//!
//! 1. READY installs a [`BufferState`] awaiting every object it lists
//! 2. Each object's detail payload resolves it, or registers a chunk counter
//!    when the object is large
//! 3. Events for awaited objects, and key-less events while anything is
//!    awaited, are held and replayed in arrival order on resolution
//! 4. The state is dropped once nothing is awaited or held
//!
//! The buffer never blocks: holding an event only appends it to a queue.

pub mod buffer;
pub mod config;
pub mod state;

pub use buffer::EventConsistencyBuffer;
pub use config::{BufferConfig, ReplayMode};
pub use state::{BufferState, ChunkProgress, PendingSnapshot};
