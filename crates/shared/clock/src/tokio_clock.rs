use chrono::{Duration, Utc};
use shardline_core::Timestamp;
use shardline_ports::Clock;
use tokio::time::Instant;

/// Wall clock driven by the tokio runtime's monotonic clock
///
/// Captures the wall-clock time once at construction and from then on adds
/// the elapsed `tokio::time::Instant`. Under a paused runtime the clock only
/// moves when the runtime's time does, which keeps timer-driven tests
/// deterministic. In production it behaves like [`crate::SystemClock`]
/// without ever running backwards.
pub struct TokioClock {
    anchor_wall: Timestamp,
    anchor_instant: Instant,
}

impl TokioClock {
    /// Create a clock anchored at the current time.
    ///
    /// Must be called from within a tokio runtime when time is paused,
    /// otherwise the anchor is taken from the real clock.
    pub fn new() -> Self {
        Self {
            anchor_wall: Utc::now(),
            anchor_instant: Instant::now(),
        }
    }
}

impl Default for TokioClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for TokioClock {
    fn now(&self) -> Timestamp {
        let elapsed = Instant::now().saturating_duration_since(self.anchor_instant);
        let elapsed = Duration::from_std(elapsed).unwrap_or(Duration::zero());
        self.anchor_wall + elapsed
    }

    fn name(&self) -> &str {
        "tokio"
    }
}
