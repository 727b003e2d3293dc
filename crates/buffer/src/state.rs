//! Per-shard buffering state
//!
//! A [`BufferState`] is owned by one shard's event stream. It is plain data:
//! the buffer decides what to hold and when to release, the state only keeps
//! the queues and counters in arrival order.

use std::collections::{HashMap, HashSet, VecDeque};

use serde_json::Value;
use shardline_core::{GatewayEvent, ObjectId, fields};

/// An event withheld from dispatch
#[derive(Debug, Clone, PartialEq)]
pub struct Held {
    /// Position in the shard's stream since READY
    pub arrival: u64,
    pub event: GatewayEvent,
    /// Already applied to the cache when it arrived
    pub cached: bool,
}

impl Held {
    /// An event passing straight through, never queued
    pub fn direct(event: GatewayEvent) -> Self {
        Held {
            arrival: 0,
            event,
            cached: false,
        }
    }
}

/// Outstanding membership pages for one large object
#[derive(Debug, Clone)]
struct ChunkCounter {
    remaining: u64,
    /// Detail payload released once the last page lands
    trigger: Option<Held>,
}

/// Result of counting one membership page
#[derive(Debug, Clone, PartialEq)]
pub enum ChunkProgress {
    /// No counter registered for the object
    Untracked,
    /// Pages still outstanding
    Remaining(u64),
    /// Last page counted; carries the held detail payload, if any
    Done(Option<Held>),
}

/// Observability view of a shard's buffer
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PendingSnapshot {
    /// Objects listed at READY whose state is not complete yet
    pub awaited: usize,
    /// Events held against a specific object, including detail payloads
    /// waiting on their chunks
    pub buffered_per_object: usize,
    /// Events held until every object resolves
    pub buffered_global: usize,
}

#[derive(Debug)]
pub struct BufferState {
    shard_id: u32,
    awaited: HashSet<ObjectId>,
    per_object: HashMap<ObjectId, VecDeque<Held>>,
    chunk_counters: HashMap<ObjectId, ChunkCounter>,
    global: VecDeque<Held>,
    next_arrival: u64,
}

impl BufferState {
    pub fn new(shard_id: u32, awaited: impl IntoIterator<Item = ObjectId>) -> Self {
        BufferState {
            shard_id,
            awaited: awaited.into_iter().collect(),
            per_object: HashMap::new(),
            chunk_counters: HashMap::new(),
            global: VecDeque::new(),
            next_arrival: 1,
        }
    }

    /// State awaiting every object listed in a READY payload
    pub fn from_ready(shard_id: u32, ready: &Value) -> Self {
        let awaited = ready
            .get(fields::GUILDS)
            .and_then(Value::as_array)
            .into_iter()
            .flatten()
            .filter_map(|object| object.get(fields::ID).and_then(Value::as_str))
            .map(ObjectId::from);
        Self::new(shard_id, awaited)
    }

    pub fn shard_id(&self) -> u32 {
        self.shard_id
    }

    pub fn is_awaiting(&self, object_id: &ObjectId) -> bool {
        self.awaited.contains(object_id)
    }

    pub fn has_awaited(&self) -> bool {
        !self.awaited.is_empty()
    }

    pub fn is_chunking(&self, object_id: &ObjectId) -> bool {
        self.chunk_counters.contains_key(object_id)
    }

    /// Nothing awaited and nothing held
    pub fn is_drained(&self) -> bool {
        self.awaited.is_empty()
            && self.global.is_empty()
            && self.chunk_counters.is_empty()
            && self.per_object.values().all(VecDeque::is_empty)
    }

    fn hold(&mut self, event: GatewayEvent, cached: bool) -> Held {
        let arrival = self.next_arrival;
        self.next_arrival += 1;
        Held {
            arrival,
            event,
            cached,
        }
    }

    /// Hold an event until `object_id` resolves
    pub fn buffer_for_object(&mut self, object_id: ObjectId, event: GatewayEvent) {
        let held = self.hold(event, false);
        self.per_object.entry(object_id).or_default().push_back(held);
    }

    /// Hold an event until every awaited object resolves
    pub fn buffer_global(&mut self, event: GatewayEvent, cached: bool) {
        let held = self.hold(event, cached);
        self.global.push_back(held);
    }

    /// Register the pages expected for a large object
    ///
    /// `trigger` is the object's detail payload when it should be released
    /// with the last page rather than from the global queue. Callers must not
    /// re-register an object that [`BufferState::is_chunking`].
    pub fn await_chunks(&mut self, object_id: ObjectId, expected: u64, trigger: Option<GatewayEvent>) {
        let trigger = trigger.map(|event| self.hold(event, true));
        self.chunk_counters.insert(
            object_id,
            ChunkCounter {
                remaining: expected,
                trigger,
            },
        );
    }

    /// Count one membership page against its object
    pub fn accept_chunk(&mut self, object_id: &ObjectId) -> ChunkProgress {
        let Some(counter) = self.chunk_counters.get_mut(object_id) else {
            return ChunkProgress::Untracked;
        };
        counter.remaining = counter.remaining.saturating_sub(1);
        if counter.remaining > 0 {
            return ChunkProgress::Remaining(counter.remaining);
        }
        let trigger = self
            .chunk_counters
            .remove(object_id)
            .and_then(|counter| counter.trigger);
        ChunkProgress::Done(trigger)
    }

    /// Mark an object complete; returns false if it was not awaited
    pub fn receive_object(&mut self, object_id: &ObjectId) -> bool {
        self.awaited.remove(object_id)
    }

    pub fn take_object_events(&mut self, object_id: &ObjectId) -> VecDeque<Held> {
        self.per_object.remove(object_id).unwrap_or_default()
    }

    pub fn take_global(&mut self) -> VecDeque<Held> {
        std::mem::take(&mut self.global)
    }

    /// Everything still held, in arrival order, leaving the state empty
    pub fn drain_all(&mut self) -> Vec<Held> {
        let mut held: Vec<Held> = self.global.drain(..).collect();
        held.extend(self.per_object.drain().flat_map(|(_, queue)| queue));
        held.extend(
            self.chunk_counters
                .drain()
                .filter_map(|(_, counter)| counter.trigger),
        );
        self.awaited.clear();
        held.sort_by_key(|h| h.arrival);
        held
    }

    pub fn pending(&self) -> PendingSnapshot {
        let per_object = self.per_object.values().map(VecDeque::len).sum::<usize>()
            + self
                .chunk_counters
                .values()
                .filter(|counter| counter.trigger.is_some())
                .count();
        PendingSnapshot {
            awaited: self.awaited.len(),
            buffered_per_object: per_object,
            buffered_global: self.global.len(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use shardline_core::{ShardInfo, raw};

    fn event(name: &str, data: Value) -> GatewayEvent {
        GatewayEvent::new(ShardInfo::new(0, 1), name, data)
    }

    fn id(s: &str) -> ObjectId {
        ObjectId::from(s)
    }

    #[test]
    fn test_from_ready_collects_object_ids() {
        let state = BufferState::from_ready(
            3,
            &json!({"guilds": [{"id": "a", "unavailable": true}, {"id": "b"}, {"no_id": 1}]}),
        );
        assert_eq!(state.shard_id(), 3);
        assert!(state.is_awaiting(&id("a")));
        assert!(state.is_awaiting(&id("b")));
        assert_eq!(state.pending().awaited, 2);

        let empty = BufferState::from_ready(0, &json!({}));
        assert!(empty.is_drained());
    }

    #[test]
    fn test_chunk_counter_counts_down_and_releases_trigger() {
        let mut state = BufferState::new(0, [id("b")]);
        let detail = event(raw::GUILD_CREATE, json!({"id": "b"}));
        state.await_chunks(id("b"), 2, Some(detail.clone()));
        assert!(state.is_chunking(&id("b")));
        assert_eq!(state.pending().buffered_per_object, 1);

        assert_eq!(state.accept_chunk(&id("b")), ChunkProgress::Remaining(1));
        match state.accept_chunk(&id("b")) {
            ChunkProgress::Done(Some(held)) => {
                assert_eq!(held.event, detail);
                assert!(held.cached);
            }
            other => panic!("unexpected progress {:?}", other),
        }

        // Counter is gone; further pages are untracked rather than negative
        assert_eq!(state.accept_chunk(&id("b")), ChunkProgress::Untracked);
    }

    #[test]
    fn test_drain_all_restores_arrival_order() {
        let mut state = BufferState::new(0, [id("a"), id("b")]);
        state.buffer_for_object(id("a"), event("E1", json!({})));
        state.buffer_global(event("E2", json!({})), false);
        state.await_chunks(id("b"), 3, Some(event("E3", json!({}))));
        state.buffer_for_object(id("b"), event("E4", json!({})));
        state.buffer_for_object(id("a"), event("E5", json!({})));

        let names: Vec<String> = state.drain_all().into_iter().map(|h| h.event.name).collect();
        assert_eq!(names, vec!["E1", "E2", "E3", "E4", "E5"]);
        assert!(state.is_drained());
    }

    #[test]
    fn test_receive_and_take_object_events() {
        let mut state = BufferState::new(0, [id("a")]);
        state.buffer_for_object(id("a"), event("E1", json!({})));
        state.buffer_for_object(id("a"), event("E2", json!({})));

        assert!(state.receive_object(&id("a")));
        assert!(!state.receive_object(&id("a")));
        let held: Vec<String> = state
            .take_object_events(&id("a"))
            .into_iter()
            .map(|h| h.event.name)
            .collect();
        assert_eq!(held, vec!["E1", "E2"]);
        assert!(state.is_drained());
    }
}
