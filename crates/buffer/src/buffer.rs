//! Event consistency buffer
//!
//! Routing decisions are made while holding the shard's state entry and
//! produce a list of [`Step`]s; the steps (cache writes, dispatch, membership
//! requests) run after the entry is released, in the order they were
//! decided. Sinks and caches can therefore call back into the buffer without
//! deadlocking on the shard map.

use std::sync::Arc;

use dashmap::DashMap;
use log::{debug, info, warn};
use shardline_core::{EventKind, GatewayEvent, ObjectId};
use shardline_ports::{CacheWorker, DispatchSink, EventIngest, GatewayCommands};

use crate::config::{BufferConfig, ReplayMode, member_count};
use crate::state::{BufferState, ChunkProgress, Held, PendingSnapshot};

/// Deferred side effect of routing one event
#[derive(Debug)]
enum Step {
    /// Write to the cache without dispatching
    Apply(GatewayEvent),
    /// Dispatch, applying to the cache first unless already cached
    Deliver(Held),
    /// Ask the gateway for an object's membership pages
    RequestMembers(ObjectId),
}

pub struct EventConsistencyBuffer {
    config: BufferConfig,
    states: DashMap<u32, BufferState>,
    cache: Arc<dyn CacheWorker>,
    sink: Arc<dyn DispatchSink>,
    commands: Arc<dyn GatewayCommands>,
}

impl EventConsistencyBuffer {
    pub fn new(
        config: BufferConfig,
        cache: Arc<dyn CacheWorker>,
        sink: Arc<dyn DispatchSink>,
        commands: Arc<dyn GatewayCommands>,
    ) -> Self {
        Self {
            config,
            states: DashMap::new(),
            cache,
            sink,
            commands,
        }
    }

    pub fn config(&self) -> &BufferConfig {
        &self.config
    }

    /// Single entry point for every event on a shard's stream
    pub fn buffer(&self, event: GatewayEvent) {
        let shard_id = event.shard.id;
        let steps = match event.kind() {
            EventKind::Ready => self.on_ready(shard_id, event),
            kind => {
                let steps = match self.states.get_mut(&shard_id) {
                    Some(mut state) => match kind {
                        EventKind::ObjectCreate => self.on_object_create(Some(&mut *state), event),
                        EventKind::MembersChunk => self.on_members_chunk(&mut *state, event),
                        _ => self.route(&mut *state, event),
                    },
                    None if kind == EventKind::ObjectCreate => self.on_object_create(None, event),
                    None => vec![Step::Deliver(Held::direct(event))],
                };
                if self.states.remove_if(&shard_id, |_, state| state.is_drained()).is_some() {
                    debug!("Shard {}: buffering complete", shard_id);
                }
                steps
            }
        };
        self.run(shard_id, steps);
    }

    /// What is currently withheld for a shard
    pub fn pending(&self, shard_id: u32) -> PendingSnapshot {
        self.states
            .get(&shard_id)
            .map(|state| state.pending())
            .unwrap_or_default()
    }

    pub fn is_buffering(&self, shard_id: u32) -> bool {
        self.states.contains_key(&shard_id)
    }

    // ========================================================================
    // Routing
    // ========================================================================

    fn on_ready(&self, shard_id: u32, ready: GatewayEvent) -> Vec<Step> {
        let mut steps = Vec::new();
        let state = BufferState::from_ready(shard_id, &ready.data);
        info!(
            "Shard {}: READY, awaiting {} objects",
            shard_id,
            state.pending().awaited
        );

        // A previous READY's leftovers go out before the new session's events
        if let Some((_, mut previous)) = self.states.remove(&shard_id) {
            let leftovers = previous.drain_all();
            if !leftovers.is_empty() {
                warn!(
                    "Shard {}: new READY with {} events still held, flushing",
                    shard_id,
                    leftovers.len()
                );
            }
            steps.extend(leftovers.into_iter().map(Step::Deliver));
        }

        steps.push(Step::Deliver(Held::direct(ready)));
        if !state.is_drained() {
            self.states.insert(shard_id, state);
        }
        steps
    }

    fn on_object_create(&self, state: Option<&mut BufferState>, detail: GatewayEvent) -> Vec<Step> {
        let Some(object_id) = detail.own_id() else {
            warn!("Shard {}: {} without an id", detail.shard, detail.name);
            return match state {
                Some(state) => self.route(state, detail),
                None => vec![Step::Deliver(Held::direct(detail))],
            };
        };

        let expected = if self.config.is_large(&detail.data) {
            self.config.expected_chunks(member_count(&detail.data))
        } else {
            0
        };

        let state = match state {
            Some(state) if state.is_awaiting(&object_id) => state,
            state => {
                // Already known, or joined after READY: nothing to hold for it
                let mut steps = match state {
                    Some(state) if self.config.replay_mode == ReplayMode::ArrivalOrder => {
                        self.route(state, detail)
                    }
                    _ => vec![Step::Deliver(Held::direct(detail))],
                };
                if expected > 0 {
                    steps.push(Step::RequestMembers(object_id));
                }
                return steps;
            }
        };

        if state.is_chunking(&object_id) {
            // Pages are already on the way; the repeat waits behind the first
            debug!(
                "Shard {}: repeated {} for chunking object {}",
                state.shard_id(),
                detail.name,
                object_id
            );
            return self.route(state, detail);
        }

        let mut steps = Vec::new();
        if expected > 0 {
            debug!(
                "Shard {}: object {} is large, awaiting {} chunks",
                state.shard_id(),
                object_id,
                expected
            );
            steps.push(Step::Apply(detail.clone()));
            match self.config.replay_mode {
                ReplayMode::PerObject => {
                    state.await_chunks(object_id.clone(), expected, Some(detail));
                }
                ReplayMode::ArrivalOrder => {
                    state.buffer_global(detail, true);
                    state.await_chunks(object_id.clone(), expected, None);
                }
            }
            steps.push(Step::RequestMembers(object_id));
            return steps;
        }

        match self.config.replay_mode {
            ReplayMode::PerObject => steps.push(Step::Deliver(Held::direct(detail))),
            ReplayMode::ArrivalOrder => {
                steps.push(Step::Apply(detail.clone()));
                state.buffer_global(detail, true);
            }
        }
        self.resolve(state, &object_id, &mut steps);
        steps
    }

    /// A membership page is applied and routed once; it never continues into
    /// generic routing
    fn on_members_chunk(&self, state: &mut BufferState, chunk: GatewayEvent) -> Vec<Step> {
        let object_id = match chunk.object_id() {
            Some(id) if state.is_chunking(&id) => id,
            other => {
                debug!(
                    "Shard {}: chunk for untracked object {:?}",
                    state.shard_id(),
                    other.as_ref().map(ObjectId::as_str)
                );
                return self.route(state, chunk);
            }
        };

        let mut steps = Vec::new();
        match self.config.replay_mode {
            ReplayMode::PerObject => steps.push(Step::Deliver(Held::direct(chunk))),
            ReplayMode::ArrivalOrder => {
                steps.push(Step::Apply(chunk.clone()));
                state.buffer_global(chunk, true);
            }
        }

        match state.accept_chunk(&object_id) {
            ChunkProgress::Remaining(left) => {
                debug!(
                    "Shard {}: object {} has {} chunks outstanding",
                    state.shard_id(),
                    object_id,
                    left
                );
            }
            ChunkProgress::Done(trigger) => {
                if let Some(trigger) = trigger {
                    steps.push(Step::Deliver(trigger));
                }
                self.resolve(state, &object_id, &mut steps);
            }
            ChunkProgress::Untracked => {}
        }
        steps
    }

    /// Route an event that does not change what the shard is waiting for
    fn route(&self, state: &mut BufferState, event: GatewayEvent) -> Vec<Step> {
        if !state.has_awaited() {
            return vec![Step::Deliver(Held::direct(event))];
        }
        match self.config.replay_mode {
            ReplayMode::ArrivalOrder => state.buffer_global(event, false),
            ReplayMode::PerObject => match event.object_id() {
                Some(id) if state.is_awaiting(&id) => state.buffer_for_object(id, event),
                Some(_) => return vec![Step::Deliver(Held::direct(event))],
                None => state.buffer_global(event, false),
            },
        }
        Vec::new()
    }

    /// Mark an object complete and release whatever it unblocks
    fn resolve(&self, state: &mut BufferState, object_id: &ObjectId, steps: &mut Vec<Step>) {
        state.receive_object(object_id);
        if self.config.replay_mode == ReplayMode::PerObject {
            steps.extend(state.take_object_events(object_id).into_iter().map(Step::Deliver));
        }
        if !state.has_awaited() {
            info!("Shard {}: every object resolved, replaying", state.shard_id());
            steps.extend(state.drain_all().into_iter().map(Step::Deliver));
        }
    }

    // ========================================================================
    // Side effects
    // ========================================================================

    fn run(&self, shard_id: u32, steps: Vec<Step>) {
        for step in steps {
            match step {
                Step::Apply(event) => self.apply(&event),
                Step::Deliver(held) => self.deliver(held),
                Step::RequestMembers(object_id) => self.commands.request_membership_page(
                    shard_id,
                    &object_id,
                    "",
                    self.config.member_request_limit,
                ),
            }
        }
    }

    /// Cache-then-emit, or emit-then-remove for deletions
    fn deliver(&self, held: Held) {
        let event = held.event;
        if held.cached {
            self.sink.emit(event);
        } else if event.is_deletion() {
            self.sink.emit(event.clone());
            self.apply(&event);
        } else {
            self.apply(&event);
            self.sink.emit(event);
        }
    }

    /// Best-effort cache write; failures never stop dispatch
    fn apply(&self, event: &GatewayEvent) {
        if !event.is_cacheable() {
            return;
        }
        if let Err(e) = self
            .cache
            .apply_event(&event.name, event.shard.id, &event.data)
        {
            warn!(
                "Shard {}: cache update for {} failed: {}",
                event.shard, event.name, e
            );
            debug!("Payload: {}", event.data);
        }
    }
}

impl EventIngest for EventConsistencyBuffer {
    fn ingest(&self, event: GatewayEvent) {
        self.buffer(event);
    }
}
