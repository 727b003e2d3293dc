//! Client configuration
//!
//! JSON file format for the runner. Every key is optional; missing keys take
//! the values of the embedded `default_config.json`.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use shardline_buffer::{BufferConfig, ReplayMode};
use shardline_gateway::{SessionConfig, ShardManagerConfig, ThrottleConfig};
use shardline_rest::GatewayBot;
use thiserror::Error;
use url::Url;

/// Environment variable overriding the configured token
pub const TOKEN_ENV: &str = "SHARDLINE_TOKEN";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("Invalid config: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Credential for IDENTIFY, RESUME and the REST `Authorization` header
    pub token: String,
    pub gateway_url: String,
    pub rest_url: String,
    /// `0` asks `GET /gateway/bot` for the recommended count at startup
    pub shard_count: u32,
    /// Shards run by this process; all of `0..shard_count` when absent
    #[serde(skip_serializing_if = "Option::is_none")]
    pub shard_ids: Option<Vec<u32>>,
    pub large_threshold: u32,
    pub chunk_page_size: u64,
    pub chunk_members: bool,
    pub replay_mode: ReplayMode,
    pub identify_spacing_ms: u64,
    pub condition_retry_ms: u64,
    pub send_limit: u32,
    pub send_period_ms: u64,
    pub presence_limit: u32,
    pub presence_period_ms: u64,
    pub throttle_recheck_ms: u64,
    /// Post-buffering events a slow subscriber may lag behind
    pub event_capacity: usize,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            token: String::new(),
            gateway_url: "wss://gateway.example.invalid/?v=10&encoding=json".to_string(),
            rest_url: "https://api.example.invalid/v10".to_string(),
            shard_count: 1,
            shard_ids: None,
            large_threshold: 250,
            chunk_page_size: 1000,
            chunk_members: true,
            replay_mode: ReplayMode::PerObject,
            identify_spacing_ms: 5500,
            condition_retry_ms: 1000,
            send_limit: 110,
            send_period_ms: 60_000,
            presence_limit: 5,
            presence_period_ms: 60_000,
            throttle_recheck_ms: 1000,
            event_capacity: 1024,
        }
    }
}

/// Load configuration from a JSON file
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<ClientConfig, ConfigError> {
    let content = std::fs::read_to_string(path)?;
    load_config_from_str(&content)
}

/// Load configuration from a JSON string
pub fn load_config_from_str(json: &str) -> Result<ClientConfig, ConfigError> {
    let config: ClientConfig = serde_json::from_str(json)?;
    Ok(config)
}

/// Load the default embedded configuration
pub fn load_default_config() -> Result<ClientConfig, ConfigError> {
    let default_config = include_str!("default_config.json");
    load_config_from_str(default_config)
}

impl ClientConfig {
    /// Replace the token when an override is present and non-empty
    pub fn with_token_override(mut self, token: Option<String>) -> Self {
        if let Some(token) = token.filter(|t| !t.is_empty()) {
            self.token = token;
        }
        self
    }

    /// Shards this process runs, in connect order
    pub fn shard_ids(&self) -> Vec<u32> {
        match &self.shard_ids {
            Some(ids) => ids.clone(),
            None => (0..self.shard_count).collect(),
        }
    }

    /// Whether the shard count comes from the API
    pub fn is_automatic(&self) -> bool {
        self.shard_count == 0
    }

    /// Adopt the shard count and gateway URL the API recommends
    ///
    /// The discovered URL carries no version or encoding, so the configured
    /// query is kept when the discovered one has none.
    pub fn with_gateway_bot(mut self, bot: &GatewayBot) -> Result<Self, ConfigError> {
        if bot.shards == 0 {
            return Err(ConfigError::Invalid("API recommended 0 shards".into()));
        }
        let mut url = Url::parse(&bot.url)
            .map_err(|e| ConfigError::Invalid(format!("discovered gateway url: {}", e)))?;
        if url.query().is_none() {
            let configured = Url::parse(&self.gateway_url)
                .map_err(|e| ConfigError::Invalid(format!("gateway_url: {}", e)))?;
            url.set_query(configured.query());
        }
        self.gateway_url = url.to_string();
        self.shard_count = bot.shards;
        Ok(self)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.is_automatic() {
            if self.shard_ids.is_some() {
                return Err(ConfigError::Invalid(
                    "shard_ids needs an explicit shard_count".into(),
                ));
            }
        } else if let Some(id) = self.shard_ids().into_iter().find(|id| *id >= self.shard_count) {
            return Err(ConfigError::Invalid(format!(
                "shard id {} out of range for {} shards",
                id, self.shard_count
            )));
        }
        if self.chunk_page_size == 0 {
            return Err(ConfigError::Invalid("chunk_page_size must be at least 1".into()));
        }
        if self.send_limit == 0 || self.presence_limit == 0 {
            return Err(ConfigError::Invalid("throttle limits must be at least 1".into()));
        }
        if self.send_period_ms == 0 || self.presence_period_ms == 0 || self.throttle_recheck_ms == 0 {
            return Err(ConfigError::Invalid("throttle periods must be positive".into()));
        }
        if self.event_capacity == 0 {
            return Err(ConfigError::Invalid("event_capacity must be at least 1".into()));
        }
        for (key, value) in [("gateway_url", &self.gateway_url), ("rest_url", &self.rest_url)] {
            Url::parse(value).map_err(|e| ConfigError::Invalid(format!("{}: {}", key, e)))?;
        }
        Ok(())
    }

    pub fn throttle_config(&self) -> ThrottleConfig {
        ThrottleConfig::default()
            .with_send_limit(self.send_limit, Duration::from_millis(self.send_period_ms))
            .with_presence_limit(self.presence_limit, Duration::from_millis(self.presence_period_ms))
            .with_recheck(Duration::from_millis(self.throttle_recheck_ms))
    }

    pub fn session_config(&self) -> SessionConfig {
        SessionConfig::default()
            .with_token(self.token.clone())
            .with_large_threshold(self.large_threshold)
            .with_throttle(self.throttle_config())
    }

    pub fn manager_config(&self) -> ShardManagerConfig {
        ShardManagerConfig::default()
            .with_shard_count(self.shard_count)
            .with_identify_spacing(Duration::from_millis(self.identify_spacing_ms))
            .with_condition_retry(Duration::from_millis(self.condition_retry_ms))
    }

    pub fn buffer_config(&self) -> BufferConfig {
        BufferConfig::default()
            .with_large_threshold(u64::from(self.large_threshold))
            .with_chunk_page_size(self.chunk_page_size)
            .with_chunk_members(self.chunk_members)
            .with_replay_mode(self.replay_mode)
    }
}
