use serde::{Deserialize, Serialize};
use serde_json::Value;
use shardline_core::fields;

/// Order in which held events are released
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReplayMode {
    /// Release an object's events as soon as that object resolves; key-less
    /// events wait for every object
    #[default]
    PerObject,
    /// Hold everything after READY until the last awaited object resolves,
    /// then release in exact arrival order
    ArrivalOrder,
}

/// Buffer configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BufferConfig {
    /// Member count above which an object is large
    pub large_threshold: u64,
    /// Members delivered per membership chunk
    pub chunk_page_size: u64,
    /// Request and await membership chunks for large objects
    pub chunk_members: bool,
    /// `limit` sent with membership requests (0 = every member)
    pub member_request_limit: u32,
    pub replay_mode: ReplayMode,
}

impl Default for BufferConfig {
    fn default() -> Self {
        Self {
            large_threshold: 250,
            chunk_page_size: 1000,
            chunk_members: true,
            member_request_limit: 0,
            replay_mode: ReplayMode::PerObject,
        }
    }
}

impl BufferConfig {
    pub fn with_large_threshold(mut self, threshold: u64) -> Self {
        self.large_threshold = threshold;
        self
    }

    pub fn with_chunk_page_size(mut self, page_size: u64) -> Self {
        self.chunk_page_size = page_size;
        self
    }

    pub fn with_chunk_members(mut self, enabled: bool) -> Self {
        self.chunk_members = enabled;
        self
    }

    pub fn with_member_request_limit(mut self, limit: u32) -> Self {
        self.member_request_limit = limit;
        self
    }

    pub fn with_replay_mode(mut self, mode: ReplayMode) -> Self {
        self.replay_mode = mode;
        self
    }

    /// Whether an object's detail payload calls for membership chunking
    pub fn is_large(&self, detail: &Value) -> bool {
        if !self.chunk_members {
            return false;
        }
        let flagged = detail
            .get(fields::LARGE)
            .and_then(Value::as_bool)
            .unwrap_or(false);
        flagged || member_count(detail) > self.large_threshold
    }

    /// Number of chunk deliveries the gateway sends for `member_count` members
    pub fn expected_chunks(&self, member_count: u64) -> u64 {
        member_count.div_ceil(self.chunk_page_size.max(1))
    }
}

/// `member_count` of a detail payload, 0 when absent or malformed
pub fn member_count(detail: &Value) -> u64 {
    detail
        .get(fields::MEMBER_COUNT)
        .and_then(Value::as_u64)
        .unwrap_or(0)
}
