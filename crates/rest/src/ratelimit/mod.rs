//! Per-route token buckets and the limiter that owns them

mod bucket;
mod limiter;

pub use bucket::{BucketSnapshot, RouteBucket};
pub use limiter::RateLimiter;
