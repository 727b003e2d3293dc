//! Orchestrator
//!
//! Builds the three subsystems from a [`ClientConfig`] and wires them:
//!
//! ```text
//!   ShardManager ──launch──► ShardSession ──ingest──► EventConsistencyBuffer
//!        ▲                        ▲                          │
//!        │ lifecycle              │ commands (throttled)     ▼
//!        └──────────── ShardRegistry ◄─ membership ──  BroadcastSink ──► subscribers
//!
//!   RestClient ──► RateLimiter (shared across every REST caller)
//! ```

use std::sync::Arc;
use std::time::Duration;

use log::info;
use serde_json::Value;
use shardline_buffer::{EventConsistencyBuffer, PendingSnapshot};
use shardline_clock::SystemClock;
use shardline_core::GatewayEvent;
use shardline_gateway::{
    GatewayConnector, LifecycleEvent, ManagerStatus, MemorySessionStore, SessionLauncher,
    ShardManager, ShardRegistry, WindowRegistry, WsConnector,
};
use shardline_ports::{CacheWorker, Clock, GatewayCommands, ShardCondition};
use shardline_rest::{RateLimiter, RestClient, RestError};
use thiserror::Error;
use tokio::sync::broadcast;

use crate::cache::NullCache;
use crate::config::{ClientConfig, ConfigError};
use crate::sink::BroadcastSink;

#[derive(Error, Debug)]
pub enum StartError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("Failed to discover the gateway: {0}")]
    Gateway(#[from] RestError),
}

/// Pluggable collaborators the orchestrator does not build itself
pub struct Collaborators {
    pub connector: Arc<dyn GatewayConnector>,
    pub cache: Arc<dyn CacheWorker>,
    pub clock: Arc<dyn Clock>,
    pub conditions: Vec<Arc<dyn ShardCondition>>,
}

impl Collaborators {
    /// No cache, wall clock, no gating conditions
    pub fn new(connector: Arc<dyn GatewayConnector>) -> Self {
        Self {
            connector,
            cache: Arc::new(NullCache),
            clock: Arc::new(SystemClock::new()),
            conditions: Vec::new(),
        }
    }

    pub fn with_cache(mut self, cache: Arc<dyn CacheWorker>) -> Self {
        self.cache = cache;
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_condition(mut self, condition: Arc<dyn ShardCondition>) -> Self {
        self.conditions.push(condition);
        self
    }
}

pub struct Orchestrator {
    config: ClientConfig,
    rest: RestClient,
    store: Arc<MemorySessionStore>,
    registry: Arc<ShardRegistry>,
    buffer: Arc<EventConsistencyBuffer>,
    sink: Arc<BroadcastSink>,
    manager: ShardManager,
}

impl Orchestrator {
    /// Start over websocket connections to the configured gateway
    pub async fn connect(config: ClientConfig) -> Result<Self, StartError> {
        config.validate()?;
        let clock: Arc<dyn Clock> = Arc::new(SystemClock::new());
        let rest = Self::rest_client(&config, Arc::clone(&clock));
        let config = Self::resolve(config, &rest).await?;

        let connector = WsConnector::new(&config.gateway_url)
            .map_err(|e| ConfigError::Invalid(format!("gateway_url: {}", e)))?;
        let parts = Collaborators::new(Arc::new(connector)).with_clock(clock);
        Ok(Self::assemble(config, rest, parts))
    }

    /// Wire every subsystem and queue the configured shards
    ///
    /// Must be called from within a tokio runtime. Subscribe right after this
    /// returns, before yielding, to observe every event.
    pub async fn start(config: ClientConfig, parts: Collaborators) -> Result<Self, StartError> {
        config.validate()?;
        let rest = Self::rest_client(&config, Arc::clone(&parts.clock));
        let config = Self::resolve(config, &rest).await?;
        Ok(Self::assemble(config, rest, parts))
    }

    fn rest_client(config: &ClientConfig, clock: Arc<dyn Clock>) -> RestClient {
        let limiter = RateLimiter::new(clock);
        RestClient::with_limiter(config.rest_url.clone(), config.token.clone(), limiter)
    }

    /// Fill in the shard count and gateway URL when they come from the API
    async fn resolve(config: ClientConfig, rest: &RestClient) -> Result<ClientConfig, StartError> {
        if !config.is_automatic() {
            return Ok(config);
        }
        let bot = rest.get_gateway_bot().await?;
        info!("Loaded shard count {} and gateway {} from the API", bot.shards, bot.url);
        let config = config.with_gateway_bot(&bot)?;
        config.validate()?;
        Ok(config)
    }

    fn assemble(config: ClientConfig, rest: RestClient, parts: Collaborators) -> Self {
        info!("Admission judged against the {} clock", parts.clock.name());

        let store = Arc::new(MemorySessionStore::new());
        let registry = Arc::new(ShardRegistry::new());
        let sink = Arc::new(BroadcastSink::new(config.event_capacity));
        let buffer = Arc::new(EventConsistencyBuffer::new(
            config.buffer_config(),
            Arc::clone(&parts.cache),
            sink.clone(),
            registry.clone(),
        ));

        let launcher = SessionLauncher::new(
            config.session_config(),
            parts.connector,
            store.clone(),
            buffer.clone(),
            parts.cache,
            Arc::new(WindowRegistry::new(parts.clock)),
        );
        let manager = ShardManager::start(
            config.manager_config(),
            Arc::new(launcher),
            parts.conditions,
            Arc::clone(&registry),
        );

        let shard_ids = config.shard_ids();
        info!(
            "Starting {} of {} shards: {:?}",
            shard_ids.len(),
            config.shard_count,
            shard_ids
        );
        for shard_id in shard_ids {
            manager.add_to_connect_queue(shard_id);
        }

        Orchestrator {
            config,
            rest,
            store,
            registry,
            buffer,
            sink,
            manager,
        }
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Events in their final, post-buffering order
    pub fn subscribe(&self) -> broadcast::Receiver<GatewayEvent> {
        self.sink.subscribe()
    }

    pub fn subscribe_lifecycle(&self) -> broadcast::Receiver<LifecycleEvent> {
        self.manager.subscribe_lifecycle()
    }

    /// REST client sharing the process-wide rate limiter
    pub fn rest(&self) -> &RestClient {
        &self.rest
    }

    pub fn limiter(&self) -> &RateLimiter {
        self.rest.limiter()
    }

    pub fn session_store(&self) -> &Arc<MemorySessionStore> {
        &self.store
    }

    /// Queue a raw command on a shard behind its send throttle
    pub fn send_command(&self, shard_id: u32, payload: Value) {
        self.registry.send_command(shard_id, payload);
    }

    /// Page an object's membership to the shard that owns it
    pub fn request_members(&self, shard_id: u32, object_id: &str, query: &str, limit: u32) {
        self.registry
            .request_membership_page(shard_id, &object_id.into(), query, limit);
    }

    pub fn update_presence(&self, shard_id: u32, presence: Value) -> bool {
        match self.registry.get(shard_id) {
            Some(handle) => handle.update_presence(presence).is_ok(),
            None => false,
        }
    }

    pub async fn is_connected(&self, shard_id: u32) -> bool {
        self.manager.is_connected(shard_id).await
    }

    pub async fn latency(&self, shard_id: u32) -> Option<Duration> {
        self.manager.latency(shard_id).await
    }

    pub async fn trace(&self, shard_id: u32) -> Vec<String> {
        self.manager.trace(shard_id).await
    }

    pub fn restart_shard(&self, shard_id: u32) {
        self.manager.restart_shard(shard_id);
    }

    pub async fn status(&self) -> Option<ManagerStatus> {
        self.manager.status().await
    }

    pub fn pending(&self, shard_id: u32) -> PendingSnapshot {
        self.buffer.pending(shard_id)
    }

    /// Stop connecting and shut every session down
    pub async fn shutdown(&self) {
        info!("Shutting down");
        self.manager.shutdown().await;
    }
}
