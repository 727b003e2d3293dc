mod connect_outcome;
mod event;
mod session_state;
mod shard;

pub use connect_outcome::ConnectOutcome;
pub use event::{EventKind, GatewayEvent, fields, raw};
pub use session_state::SessionState;
pub use shard::ShardInfo;
