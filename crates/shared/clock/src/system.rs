use chrono::Utc;
use shardline_core::Timestamp;
use shardline_ports::Clock;

/// Wall clock
///
/// Servers report `X-RateLimit-Reset` and global cooldowns as epoch
/// timestamps, so admission in production is judged against this clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl SystemClock {
    pub fn new() -> Self {
        SystemClock
    }
}

impl Clock for SystemClock {
    fn now(&self) -> Timestamp {
        Utc::now()
    }

    fn now_millis(&self) -> i64 {
        Utc::now().timestamp_millis()
    }

    fn name(&self) -> &str {
        "system"
    }
}
