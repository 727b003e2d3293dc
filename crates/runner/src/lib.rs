//! Shardline Runner
//!
//! Process-level wiring for the gateway client:
//!
//! - **Config**: JSON configuration with embedded defaults
//! - **Logging**: `env_logger` bootstrap
//! - **Orchestrator**: builds the rate limiter, shard manager and event
//!   buffer and exposes the public async API
//! - **Sink / Cache**: default dispatch and cache collaborators
//!
//! ## Architecture
//!
//! ```text
//!                ┌──────────────────────┐
//!                │     ClientConfig     │
//!                └──────────┬───────────┘
//!                           ▼
//! ┌───────────────────────────────────────────────────────────┐
//! │                      Orchestrator                         │
//! │                                                           │
//! │  ┌──────────────┐   ┌───────────────┐   ┌──────────────┐  │
//! │  │ ShardManager │──►│ ShardSessions │──►│ Consistency  │  │
//! │  │ (connect Q)  │   │ (throttled)   │   │ Buffer       │  │
//! │  └──────────────┘   └───────────────┘   └──────┬───────┘  │
//! │                                                │          │
//! │  ┌──────────────┐                              ▼          │
//! │  │ RestClient + │                       BroadcastSink     │
//! │  │ RateLimiter  │                                         │
//! │  └──────────────┘                                         │
//! └───────────────────────────────────────────────────────────┘
//! ```

pub mod cache;
pub mod config;
pub mod logging;
pub mod orchestrator;
pub mod sink;

// Re-export main types
pub use cache::NullCache;
pub use config::{ClientConfig, ConfigError, TOKEN_ENV, load_config, load_config_from_str, load_default_config};
pub use logging::{init_logging, init_logging_with};
pub use orchestrator::{Collaborators, Orchestrator, StartError};
pub use sink::BroadcastSink;
