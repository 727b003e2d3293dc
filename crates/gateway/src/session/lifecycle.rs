use serde::{Deserialize, Serialize};
use shardline_core::ShardInfo;
use uuid::Uuid;

/// Observable milestones of a shard session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LifecycleKind {
    /// Socket being opened
    Connecting,
    /// Gateway said hello
    Connected,
    /// Fresh session established
    Identified,
    /// Previous session resumed
    Resumed,
    /// Connection lost, resume in progress
    Disconnected,
    /// Session is finished; the shard must be queued again
    Closed,
}

/// A lifecycle milestone tagged with the deployment it happened to
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LifecycleEvent {
    pub shard: ShardInfo,
    pub handle_id: Uuid,
    pub kind: LifecycleKind,
}

impl LifecycleEvent {
    pub fn new(shard: ShardInfo, handle_id: Uuid, kind: LifecycleKind) -> Self {
        LifecycleEvent {
            shard,
            handle_id,
            kind,
        }
    }
}
