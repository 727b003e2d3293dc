//! Outbound command throttling
//!
//! Gateways allow far fewer commands than the REST API and disconnect
//! clients that exceed the quota, so every shard owns one throttle per
//! command class, all backed by a shared [`WindowRegistry`].

mod command;
mod window;

use std::time::Duration;

pub use command::CommandThrottle;
pub use window::WindowRegistry;

/// Quotas for a shard's outbound throttles
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ThrottleConfig {
    /// Generic commands per window
    pub send_limit: u32,
    pub send_period: Duration,
    /// Presence updates per window
    pub presence_limit: u32,
    pub presence_period: Duration,
    /// Delay before an exhausted throttle checks its window again
    pub recheck: Duration,
}

impl Default for ThrottleConfig {
    fn default() -> Self {
        Self {
            send_limit: 110,
            send_period: Duration::from_secs(60),
            presence_limit: 5,
            presence_period: Duration::from_secs(60),
            recheck: Duration::from_secs(1),
        }
    }
}

impl ThrottleConfig {
    /// Builder: set the generic command quota
    pub fn with_send_limit(mut self, limit: u32, period: Duration) -> Self {
        self.send_limit = limit;
        self.send_period = period;
        self
    }

    /// Builder: set the presence update quota
    pub fn with_presence_limit(mut self, limit: u32, period: Duration) -> Self {
        self.presence_limit = limit;
        self.presence_period = period;
        self
    }

    /// Builder: set the re-check interval
    pub fn with_recheck(mut self, recheck: Duration) -> Self {
        self.recheck = recheck;
        self
    }
}

/// Identity of a shard's generic command window
pub fn send_identity(shard_id: u32) -> String {
    format!("shard:{}:send", shard_id)
}

/// Identity of a shard's presence update window
pub fn presence_identity(shard_id: u32) -> String {
    format!("shard:{}:presence", shard_id)
}
