//! Shardline Ports
//!
//! Port definitions (traits) for the shardline gateway client.
//! These define the boundaries between the three core subsystems and the
//! collaborators they deliberately do not implement: the entity cache, the
//! downstream dispatch, the per-shard transport and external readiness gates.

mod cache;
mod clock;
mod condition;
mod dispatch;
mod error;
mod gateway;
mod session;

pub use cache::CacheWorker;
pub use clock::Clock;
pub use condition::ShardCondition;
pub use dispatch::{DispatchSink, EventIngest};
pub use error::{CacheError, CacheResult, ConditionError};
pub use gateway::GatewayCommands;
pub use session::SessionStore;
