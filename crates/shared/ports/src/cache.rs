use serde_json::Value;

use crate::error::CacheResult;

/// Port to the shared entity cache
///
/// Application of a typed payload must be idempotent: the consistency buffer
/// may apply a payload on arrival and dispatch it later.
pub trait CacheWorker: Send + Sync {
    /// Apply one event payload received on `shard_id` to the cache
    fn apply_event(&self, event_type: &str, shard_id: u32, payload: &Value) -> CacheResult<()>;

    /// Forget everything the cache learned from a shard whose session was invalidated
    fn invalidate_shard(&self, shard_id: u32) {
        let _ = shard_id;
    }
}
