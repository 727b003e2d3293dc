use dashmap::DashMap;
use shardline_ports::SessionStore;

#[derive(Debug, Default, Clone)]
struct StoredSession {
    session_id: Option<String>,
    sequence: u64,
}

/// In-process [`SessionStore`]
///
/// Lives as long as the client, so a recreated shard session can still
/// resume from where the previous one stopped.
#[derive(Default)]
pub struct MemorySessionStore {
    sessions: DashMap<u32, StoredSession>,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SessionStore for MemorySessionStore {
    fn session(&self, shard_id: u32) -> Option<String> {
        self.sessions.get(&shard_id).and_then(|s| s.session_id.clone())
    }

    fn set_session(&self, shard_id: u32, session_id: String) {
        self.sessions.entry(shard_id).or_default().session_id = Some(session_id);
    }

    fn clear_session(&self, shard_id: u32) {
        if let Some(mut stored) = self.sessions.get_mut(&shard_id) {
            stored.session_id = None;
        }
    }

    fn sequence(&self, shard_id: u32) -> u64 {
        self.sessions.get(&shard_id).map(|s| s.sequence).unwrap_or(0)
    }

    fn set_sequence(&self, shard_id: u32, sequence: u64) {
        self.sessions.entry(shard_id).or_default().sequence = sequence;
    }

    fn clear_sequence(&self, shard_id: u32) {
        if let Some(mut stored) = self.sessions.get_mut(&shard_id) {
            stored.sequence = 0;
        }
    }
}
