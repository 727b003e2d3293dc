use shardline_core::{Timestamp, epoch_millis};

/// Port for time abstraction
///
/// This allows the system to use different time sources:
/// - Real system time for production
/// - Time anchored to the async runtime's clock for deterministic tests
pub trait Clock: Send + Sync {
    /// Get the current time according to this clock
    fn now(&self) -> Timestamp;

    /// Current time as milliseconds since the Unix epoch
    fn now_millis(&self) -> i64 {
        epoch_millis(self.now())
    }

    /// Get the clock's name/identifier for debugging
    fn name(&self) -> &str {
        "Clock"
    }
}
