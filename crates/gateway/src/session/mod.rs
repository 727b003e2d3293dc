//! Per-shard session
//!
//! A [`ShardSession`] is an actor task owning one shard's connection, its
//! heartbeat and its outbound throttles. Everything else talks to it through
//! a [`ShardSessionHandle`].

mod actor;
mod control;
mod lifecycle;

use std::sync::Arc;

use serde_json::Value;
use shardline_core::ShardInfo;
use shardline_ports::{CacheWorker, EventIngest, SessionStore};
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::throttle::{ThrottleConfig, WindowRegistry};
use crate::transport::GatewayConnector;

pub use actor::ShardSession;
pub use control::{ControlMessage, ShardSessionHandle};
pub use lifecycle::{LifecycleEvent, LifecycleKind};

/// Settings shared by every shard session
#[derive(Debug, Clone, PartialEq)]
pub struct SessionConfig {
    /// Credential sent in IDENTIFY and RESUME
    pub token: String,
    /// Member count above which the gateway treats an object as large
    pub large_threshold: u32,
    /// Presence announced in IDENTIFY
    pub initial_presence: Option<Value>,
    pub throttle: ThrottleConfig,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            token: String::new(),
            large_threshold: 250,
            initial_presence: None,
            throttle: ThrottleConfig::default(),
        }
    }
}

impl SessionConfig {
    /// Builder: set the credential
    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = token.into();
        self
    }

    /// Builder: set the large object threshold
    pub fn with_large_threshold(mut self, threshold: u32) -> Self {
        self.large_threshold = threshold;
        self
    }

    /// Builder: set the presence sent on identify
    pub fn with_initial_presence(mut self, presence: Value) -> Self {
        self.initial_presence = Some(presence);
        self
    }

    /// Builder: set outbound quotas
    pub fn with_throttle(mut self, throttle: ThrottleConfig) -> Self {
        self.throttle = throttle;
        self
    }
}

/// Everything a session needs from the rest of the client
#[derive(Clone)]
pub struct SessionContext {
    pub shard: ShardInfo,
    /// Identity of this deployment; replies carrying an older one are stale
    pub handle_id: Uuid,
    pub config: SessionConfig,
    pub connector: Arc<dyn GatewayConnector>,
    pub store: Arc<dyn SessionStore>,
    pub ingest: Arc<dyn EventIngest>,
    pub cache: Arc<dyn CacheWorker>,
    pub windows: Arc<WindowRegistry>,
    pub lifecycle: mpsc::UnboundedSender<LifecycleEvent>,
}
