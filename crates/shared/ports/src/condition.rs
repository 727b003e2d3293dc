use async_trait::async_trait;
use shardline_core::ConnectOutcome;

use crate::error::ConditionError;

/// External readiness gate evaluated before every shard connect attempt
///
/// A gate that errors or answers `false` delays the attempt; it never drops
/// the shard.
#[async_trait]
pub trait ShardCondition: Send + Sync {
    /// Decide whether `shard_id` may start connecting now
    async fn pre_check(&self, shard_id: u32) -> Result<bool, ConditionError>;

    /// Observe the terminal outcome of a connect attempt
    fn on_result(&self, shard_id: u32, outcome: &ConnectOutcome) {
        let _ = (shard_id, outcome);
    }
}
