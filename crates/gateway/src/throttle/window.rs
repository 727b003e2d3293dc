use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use shardline_ports::Clock;

struct FixedWindow {
    started_at: i64,
    count: u32,
}

/// Fixed-window counters keyed by identity
///
/// Windows are created on first use and start at that instant. Sessions
/// recreated for the same shard share the shard's windows, so a redeploy
/// cannot be used to burst past the quota.
pub struct WindowRegistry {
    windows: DashMap<String, FixedWindow>,
    clock: Arc<dyn Clock>,
}

impl WindowRegistry {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        WindowRegistry {
            windows: DashMap::new(),
            clock,
        }
    }

    /// Count one use of `identity` against `limit` per `period`
    ///
    /// Returns how long until the window resets when it is exhausted.
    pub fn try_acquire(&self, identity: &str, period: Duration, limit: u32) -> Result<(), Duration> {
        let now = self.clock.now_millis();
        let period_ms = period.as_millis() as i64;

        let mut window = self
            .windows
            .entry(identity.to_string())
            .or_insert_with(|| FixedWindow {
                started_at: now,
                count: 0,
            });

        if now - window.started_at >= period_ms {
            window.started_at = now;
            window.count = 0;
        }

        if window.count < limit {
            window.count += 1;
            Ok(())
        } else {
            let wait = (window.started_at + period_ms - now).max(0) as u64;
            Err(Duration::from_millis(wait))
        }
    }
}
