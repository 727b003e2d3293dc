//! Shardline Clock Infrastructure
//!
//! Time sources for the rate limiters and timers:
//!
//! - [`SystemClock`]: plain wall-clock time for production
//! - [`TokioClock`]: wall-clock time that advances with the tokio runtime's
//!   clock, so `tokio::time::pause()` / `advance()` move it too
//!
//! ## Usage
//!
//! ```ignore
//! use shardline_clock::{Clock, TokioClock};
//!
//! #[tokio::test(start_paused = true)]
//! async fn resets_after_window() {
//!     let clock = TokioClock::new();
//!     let before = clock.now_millis();
//!     tokio::time::advance(std::time::Duration::from_secs(5)).await;
//!     assert_eq!(clock.now_millis() - before, 5_000);
//! }
//! ```

mod system;
mod tokio_clock;

pub use system::SystemClock;
pub use tokio_clock::TokioClock;

// Re-export the Clock trait for convenience
pub use shardline_ports::Clock;
