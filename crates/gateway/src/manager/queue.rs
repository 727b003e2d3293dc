use std::collections::VecDeque;

use log::debug;

/// FIFO of shard ids waiting to connect
///
/// An id is queued at most once.
#[derive(Debug, Default)]
pub struct ShardConnectQueue {
    pending: VecDeque<u32>,
}

impl ShardConnectQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue `shard_id` unless it is already waiting
    ///
    /// Returns whether the id was newly added.
    pub fn offer(&mut self, shard_id: u32) -> bool {
        if self.pending.contains(&shard_id) {
            debug!("Shard {} already queued, ignoring offer", shard_id);
            return false;
        }
        self.pending.push_back(shard_id);
        true
    }

    pub fn pop(&mut self) -> Option<u32> {
        self.pending.pop_front()
    }

    pub fn contains(&self, shard_id: u32) -> bool {
        self.pending.contains(&shard_id)
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    pub fn snapshot(&self) -> Vec<u32> {
        self.pending.iter().copied().collect()
    }
}
