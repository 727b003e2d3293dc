use serde_json::Value;
use shardline_core::ObjectId;

/// Port for outbound gateway commands addressed to a shard
///
/// Commands are queued behind the shard's outbound throttle; delivery is
/// best-effort and silently dropped for shards without a live session.
pub trait GatewayCommands: Send + Sync {
    /// Queue an arbitrary command payload on a shard
    fn send_command(&self, shard_id: u32, payload: Value);

    /// Ask the gateway to page an object's membership to this shard
    ///
    /// A `limit` of 0 requests every member.
    fn request_membership_page(&self, shard_id: u32, object_id: &ObjectId, query: &str, limit: u32);
}
