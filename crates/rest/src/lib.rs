//! Shardline REST
//!
//! Admission control for the REST API. Every outbound call first waits on
//! [`RateLimiter::request_execution`] for its route's bucket, then feeds the
//! server-declared quota from the response headers back into the limiter.
//!
//! ```text
//!  caller ──► request_execution(key) ──► HTTP call ──► RateLimitHeaders::apply
//!                   │ (may suspend)                          │
//!                   ▼                                        ▼
//!          ┌─────────────────┐     update_limit / update_remaining /
//!          │   RouteBucket   │◄─── update_reset / update_global_rate_limit
//!          │ limit/remaining │     then update_done (releases waiters)
//!          │ reset / waiters │
//!          └─────────────────┘
//! ```
//!
//! Admission never fails: an exhausted bucket or an active global window
//! only delays the caller.

pub mod client;
pub mod error;
pub mod headers;
pub mod ratelimit;
pub mod route;

pub use client::{GatewayBot, RestClient};
pub use error::RestError;
pub use headers::RateLimitHeaders;
pub use ratelimit::{BucketSnapshot, RateLimiter, RouteBucket};
pub use route::{Method, Route};
