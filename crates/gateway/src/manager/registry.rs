use dashmap::DashMap;
use log::debug;
use serde_json::Value;
use shardline_core::ObjectId;
use shardline_ports::GatewayCommands;
use uuid::Uuid;

use crate::session::ShardSessionHandle;

/// Current session handle per shard id
///
/// Written only by the shard manager's deploy and undeploy steps. Everyone
/// else reads it to route commands and to recognise stale replies.
#[derive(Default)]
pub struct ShardRegistry {
    sessions: DashMap<u32, ShardSessionHandle>,
}

impl ShardRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `handle` as the shard's current session, returning the previous one
    pub fn insert(&self, handle: ShardSessionHandle) -> Option<ShardSessionHandle> {
        self.sessions.insert(handle.shard().id, handle)
    }

    pub fn remove(&self, shard_id: u32) -> Option<ShardSessionHandle> {
        self.sessions.remove(&shard_id).map(|(_, handle)| handle)
    }

    pub fn get(&self, shard_id: u32) -> Option<ShardSessionHandle> {
        self.sessions.get(&shard_id).map(|h| h.value().clone())
    }

    /// Whether `handle_id` is still the deployed session for the shard
    pub fn is_current(&self, shard_id: u32, handle_id: Uuid) -> bool {
        self.sessions
            .get(&shard_id)
            .is_some_and(|h| h.id() == handle_id)
    }

    pub fn shard_ids(&self) -> Vec<u32> {
        let mut ids: Vec<u32> = self.sessions.iter().map(|e| *e.key()).collect();
        ids.sort_unstable();
        ids
    }

    /// Remove and return every handle
    pub fn drain(&self) -> Vec<ShardSessionHandle> {
        let ids = self.shard_ids();
        ids.into_iter().filter_map(|id| self.remove(id)).collect()
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

impl GatewayCommands for ShardRegistry {
    fn send_command(&self, shard_id: u32, payload: Value) {
        match self.get(shard_id) {
            Some(handle) => {
                if handle.send(payload).is_err() {
                    debug!("Shard {}: session gone, command dropped", shard_id);
                }
            }
            None => debug!("Shard {}: not deployed, command dropped", shard_id),
        }
    }

    fn request_membership_page(&self, shard_id: u32, object_id: &ObjectId, query: &str, limit: u32) {
        match self.get(shard_id) {
            Some(handle) => {
                if handle
                    .request_members(object_id.clone(), query.to_string(), limit)
                    .is_err()
                {
                    debug!("Shard {}: session gone, member request for {} dropped", shard_id, object_id);
                }
            }
            None => debug!("Shard {}: not deployed, member request dropped", shard_id),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::ControlMessage;
    use shardline_core::ShardInfo;
    use tokio::sync::mpsc;

    #[test]
    fn test_routes_member_requests_to_current_session() {
        let registry = ShardRegistry::new();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let handle = ShardSessionHandle::new(Uuid::new_v4(), ShardInfo::new(1, 2), tx);
        let id = handle.id();
        registry.insert(handle);

        assert!(registry.is_current(1, id));
        assert!(!registry.is_current(1, Uuid::new_v4()));
        assert!(!registry.is_current(0, id));

        registry.request_membership_page(1, &ObjectId::from("99"), "", 0);
        match rx.try_recv() {
            Ok(ControlMessage::RequestMembers { object_id, query, limit }) => {
                assert_eq!(object_id, ObjectId::from("99"));
                assert_eq!(query, "");
                assert_eq!(limit, 0);
            }
            other => panic!("unexpected {:?}", other),
        }

        // Unknown shard is a silent drop
        registry.send_command(7, Value::Null);
    }

    #[test]
    fn test_replacing_returns_previous() {
        let registry = ShardRegistry::new();
        let (tx, _rx) = mpsc::unbounded_channel();
        let first = ShardSessionHandle::new(Uuid::new_v4(), ShardInfo::new(0, 1), tx.clone());
        let second = ShardSessionHandle::new(Uuid::new_v4(), ShardInfo::new(0, 1), tx);
        let first_id = first.id();

        assert!(registry.insert(first).is_none());
        let replaced = registry.insert(second).unwrap();
        assert_eq!(replaced.id(), first_id);
        assert_eq!(registry.drain().len(), 1);
        assert!(registry.is_empty());
    }
}
