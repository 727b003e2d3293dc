//! Shard bring-up
//!
//! Shards connect one at a time: the [`ShardManager`] pops an id from its
//! [`ShardConnectQueue`], waits for every gating condition, deploys a fresh
//! session through a [`ShardLauncher`] and only moves on once that session
//! reports a terminal outcome.

mod launcher;
mod queue;
mod registry;
mod worker;

use std::time::Duration;

pub use launcher::{LaunchContext, SessionLauncher, ShardLauncher};
pub use queue::ShardConnectQueue;
pub use registry::ShardRegistry;
pub use worker::{ManagerStatus, ShardManager};

/// Configuration for the shard manager
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShardManagerConfig {
    /// Total shards the workload is split into
    pub shard_count: u32,
    /// Pause after a fresh identify before the next shard may start
    pub identify_spacing: Duration,
    /// Pause before gating conditions are evaluated again
    pub condition_retry: Duration,
    /// Buffer of the lifecycle broadcast channel
    pub lifecycle_capacity: usize,
}

impl Default for ShardManagerConfig {
    fn default() -> Self {
        Self {
            shard_count: 1,
            identify_spacing: Duration::from_millis(5_500),
            condition_retry: Duration::from_secs(1),
            lifecycle_capacity: 256,
        }
    }
}

impl ShardManagerConfig {
    pub fn with_shard_count(mut self, count: u32) -> Self {
        self.shard_count = count;
        self
    }

    pub fn with_identify_spacing(mut self, spacing: Duration) -> Self {
        self.identify_spacing = spacing;
        self
    }

    pub fn with_condition_retry(mut self, retry: Duration) -> Self {
        self.condition_retry = retry;
        self
    }

    pub fn with_lifecycle_capacity(mut self, capacity: usize) -> Self {
        self.lifecycle_capacity = capacity;
        self
    }
}
