use serde::{Deserialize, Serialize};
use std::fmt;

/// Identity of one gateway connection within the sharded whole
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ShardInfo {
    pub id: u32,
    /// Total number of shards the workload is partitioned into
    pub count: u32,
}

impl ShardInfo {
    pub fn new(id: u32, count: u32) -> Self {
        ShardInfo { id, count }
    }
}

impl fmt::Display for ShardInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.id, self.count)
    }
}
