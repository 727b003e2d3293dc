use log::trace;
use serde_json::Value;
use shardline_ports::{CacheResult, CacheWorker};

/// Cache that keeps nothing
///
/// Used when the client only forwards events. Every write succeeds so the
/// buffer's ordering still applies unchanged.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullCache;

impl CacheWorker for NullCache {
    fn apply_event(&self, event_type: &str, shard_id: u32, _payload: &Value) -> CacheResult<()> {
        trace!("Shard {}: {} not cached", shard_id, event_type);
        Ok(())
    }
}
