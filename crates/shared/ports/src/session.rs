/// Long-lived resume bookkeeping, keyed by shard id
///
/// Outlives individual shard sessions so that a replacement session can
/// resume where its predecessor stopped.
pub trait SessionStore: Send + Sync {
    fn session(&self, shard_id: u32) -> Option<String>;

    fn set_session(&self, shard_id: u32, session_id: String);

    fn clear_session(&self, shard_id: u32);

    /// Last sequence number seen, 0 when unknown
    fn sequence(&self, shard_id: u32) -> u64;

    fn set_sequence(&self, shard_id: u32, sequence: u64);

    fn clear_sequence(&self, shard_id: u32);

    /// Whether enough state is stored to attempt a resume
    fn can_resume(&self, shard_id: u32) -> bool {
        self.session(shard_id).is_some() && self.sequence(shard_id) > 0
    }
}
