//! Ordering guarantees of the event consistency buffer

use std::sync::Arc;

use parking_lot::Mutex;
use serde_json::{Value, json};
use shardline_buffer::{BufferConfig, EventConsistencyBuffer, PendingSnapshot, ReplayMode};
use shardline_core::{GatewayEvent, ObjectId, ShardInfo, raw};
use shardline_ports::{CacheError, CacheResult, CacheWorker, DispatchSink, GatewayCommands};

// ============================================================================
// Recorders
// ============================================================================

/// Shared log of cache writes and emissions, in the order they happened
type Journal = Arc<Mutex<Vec<String>>>;

fn label(name: &str, data: &Value) -> String {
    let tag = data
        .get("tag")
        .or_else(|| data.get("id"))
        .and_then(Value::as_str)
        .unwrap_or("-");
    format!("{}:{}", name, tag)
}

struct RecordingCache {
    journal: Journal,
    fail_on: Option<&'static str>,
}

impl CacheWorker for RecordingCache {
    fn apply_event(&self, event_type: &str, _shard_id: u32, payload: &Value) -> CacheResult<()> {
        if self.fail_on == Some(event_type) {
            return Err(CacheError::Malformed {
                event: event_type.to_string(),
                reason: "rejected by test".into(),
            });
        }
        self.journal
            .lock()
            .push(format!("cache {}", label(event_type, payload)));
        Ok(())
    }
}

struct RecordingSink {
    journal: Journal,
    emitted: Mutex<Vec<String>>,
}

impl DispatchSink for RecordingSink {
    fn emit(&self, event: GatewayEvent) {
        let label = label(&event.name, &event.data);
        self.journal.lock().push(format!("emit {}", label));
        self.emitted.lock().push(label);
    }
}

#[derive(Default)]
struct RecordingCommands {
    requests: Mutex<Vec<(u32, ObjectId, String, u32)>>,
}

impl GatewayCommands for RecordingCommands {
    fn send_command(&self, _shard_id: u32, _payload: Value) {}

    fn request_membership_page(&self, shard_id: u32, object_id: &ObjectId, query: &str, limit: u32) {
        self.requests
            .lock()
            .push((shard_id, object_id.clone(), query.to_string(), limit));
    }
}

struct Fixture {
    buffer: EventConsistencyBuffer,
    journal: Journal,
    sink: Arc<RecordingSink>,
    commands: Arc<RecordingCommands>,
}

impl Fixture {
    fn new(config: BufferConfig) -> Self {
        Self::build(config, None)
    }

    fn build(config: BufferConfig, fail_on: Option<&'static str>) -> Self {
        let _ = env_logger::try_init();
        let journal: Journal = Arc::new(Mutex::new(Vec::new()));
        let cache = Arc::new(RecordingCache {
            journal: journal.clone(),
            fail_on,
        });
        let sink = Arc::new(RecordingSink {
            journal: journal.clone(),
            emitted: Mutex::new(Vec::new()),
        });
        let commands = Arc::new(RecordingCommands::default());
        let buffer = EventConsistencyBuffer::new(config, cache, sink.clone(), commands.clone());
        Fixture {
            buffer,
            journal,
            sink,
            commands,
        }
    }

    fn push(&self, name: &str, data: Value) {
        self.push_on(0, name, data);
    }

    fn push_on(&self, shard: u32, name: &str, data: Value) {
        self.buffer
            .buffer(GatewayEvent::new(ShardInfo::new(shard, 2), name, data));
    }

    fn emitted(&self) -> Vec<String> {
        self.sink.emitted.lock().clone()
    }

    fn position(&self, entry: &str) -> usize {
        self.journal
            .lock()
            .iter()
            .position(|e| e == entry)
            .unwrap_or_else(|| panic!("{} never happened", entry))
    }

    fn count(&self, entry: &str) -> usize {
        self.journal.lock().iter().filter(|e| *e == entry).count()
    }
}

fn ready(ids: &[&str]) -> Value {
    let guilds: Vec<Value> = ids.iter().map(|id| json!({"id": id, "unavailable": true})).collect();
    json!({"session_id": "abc", "guilds": guilds})
}

fn member_update(object: &str, tag: &str) -> Value {
    json!({"guild_id": object, "tag": tag, "user": {"id": tag}})
}

fn chunk(object: &str, tag: &str) -> Value {
    json!({"guild_id": object, "tag": tag, "members": []})
}

/// READY {A, B}; A small; three events for A; B with 1500 members; two pages
fn play_startup(fixture: &Fixture) {
    fixture.push(raw::READY, ready(&["A", "B"]));
    fixture.push(raw::GUILD_CREATE, json!({"id": "A", "member_count": 10}));
    for tag in ["a1", "a2", "a3"] {
        fixture.push(raw::GUILD_MEMBER_UPDATE, member_update("A", tag));
    }
    fixture.push(raw::GUILD_CREATE, json!({"id": "B", "member_count": 1500}));
    fixture.push(raw::GUILD_MEMBERS_CHUNK, chunk("B", "c1"));
    fixture.push(raw::GUILD_MEMBERS_CHUNK, chunk("B", "c2"));
}

// ============================================================================
// Replay order
// ============================================================================

#[test]
fn arrival_order_mode_replays_the_stream_as_received() {
    let fixture = Fixture::new(BufferConfig::default().with_replay_mode(ReplayMode::ArrivalOrder));
    play_startup(&fixture);

    assert_eq!(
        fixture.emitted(),
        vec![
            "READY:-",
            "GUILD_CREATE:A",
            "GUILD_MEMBER_UPDATE:a1",
            "GUILD_MEMBER_UPDATE:a2",
            "GUILD_MEMBER_UPDATE:a3",
            "GUILD_CREATE:B",
            "GUILD_MEMBERS_CHUNK:c1",
            "GUILD_MEMBERS_CHUNK:c2",
        ]
    );

    // Both objects and every page are cached before the first A event is seen
    let first_a_event = fixture.position("emit GUILD_MEMBER_UPDATE:a1");
    for entry in [
        "cache GUILD_CREATE:A",
        "cache GUILD_CREATE:B",
        "cache GUILD_MEMBERS_CHUNK:c1",
        "cache GUILD_MEMBERS_CHUNK:c2",
    ] {
        assert!(fixture.position(entry) < first_a_event, "{} came too late", entry);
    }
    assert!(!fixture.buffer.is_buffering(0));
}

#[test]
fn per_object_mode_releases_each_object_when_it_resolves() {
    let fixture = Fixture::new(BufferConfig::default());
    play_startup(&fixture);

    assert_eq!(
        fixture.emitted(),
        vec![
            "READY:-",
            "GUILD_CREATE:A",
            "GUILD_MEMBER_UPDATE:a1",
            "GUILD_MEMBER_UPDATE:a2",
            "GUILD_MEMBER_UPDATE:a3",
            "GUILD_MEMBERS_CHUNK:c1",
            "GUILD_MEMBERS_CHUNK:c2",
            // Held until its membership is complete
            "GUILD_CREATE:B",
        ]
    );

    // Detail was cached on arrival, long before it was dispatched
    assert!(fixture.position("cache GUILD_CREATE:B") < fixture.position("emit GUILD_MEMBERS_CHUNK:c1"));

    let requests = fixture.commands.requests.lock().clone();
    assert_eq!(requests, vec![(0, ObjectId::from("B"), String::new(), 0)]);
}

#[test]
fn object_events_wait_for_their_object() {
    let fixture = Fixture::new(BufferConfig::default());
    fixture.push(raw::READY, ready(&["A", "B"]));
    fixture.push(raw::GUILD_MEMBER_UPDATE, member_update("A", "a1"));

    assert_eq!(fixture.emitted(), vec!["READY:-"]);
    assert_eq!(
        fixture.buffer.pending(0),
        PendingSnapshot {
            awaited: 2,
            buffered_per_object: 1,
            buffered_global: 0,
        }
    );
    // Held events are not cached yet
    assert_eq!(fixture.count("cache GUILD_MEMBER_UPDATE:a1"), 0);

    fixture.push(raw::GUILD_CREATE, json!({"id": "A"}));
    assert_eq!(
        fixture.emitted(),
        vec!["READY:-", "GUILD_CREATE:A", "GUILD_MEMBER_UPDATE:a1"]
    );
    assert!(fixture.position("cache GUILD_MEMBER_UPDATE:a1") < fixture.position("emit GUILD_MEMBER_UPDATE:a1"));

    // A is resolved now; its events flow while B is still awaited
    fixture.push(raw::GUILD_MEMBER_UPDATE, member_update("A", "a2"));
    assert_eq!(fixture.emitted().last().map(String::as_str), Some("GUILD_MEMBER_UPDATE:a2"));
    assert_eq!(fixture.buffer.pending(0).awaited, 1);
}

#[test]
fn key_less_events_wait_for_every_object() {
    let fixture = Fixture::new(BufferConfig::default());
    fixture.push(raw::READY, ready(&["A", "B"]));
    fixture.push(raw::USER_UPDATE, json!({"tag": "u1"}));
    fixture.push(raw::GUILD_CREATE, json!({"id": "A"}));

    assert_eq!(fixture.emitted(), vec!["READY:-", "GUILD_CREATE:A"]);
    assert_eq!(fixture.buffer.pending(0).buffered_global, 1);

    fixture.push(raw::GUILD_CREATE, json!({"id": "B"}));
    assert_eq!(
        fixture.emitted(),
        vec!["READY:-", "GUILD_CREATE:A", "GUILD_CREATE:B", "USER_UPDATE:u1"]
    );
    assert_eq!(fixture.buffer.pending(0), PendingSnapshot::default());
    assert!(!fixture.buffer.is_buffering(0));
}

// ============================================================================
// Membership chunks
// ============================================================================

#[test]
fn chunk_is_cached_and_emitted_exactly_once() {
    for mode in [ReplayMode::PerObject, ReplayMode::ArrivalOrder] {
        let fixture = Fixture::new(BufferConfig::default().with_replay_mode(mode));
        fixture.push(raw::READY, ready(&["B"]));
        fixture.push(raw::GUILD_CREATE, json!({"id": "B", "member_count": 2000}));
        fixture.push(raw::GUILD_MEMBERS_CHUNK, chunk("B", "c1"));
        fixture.push(raw::GUILD_MEMBERS_CHUNK, chunk("B", "c2"));
        // A late page after completion is routed like any object event
        fixture.push(raw::GUILD_MEMBERS_CHUNK, chunk("B", "c3"));

        for page in ["c1", "c2", "c3"] {
            assert_eq!(fixture.count(&format!("cache GUILD_MEMBERS_CHUNK:{}", page)), 1, "{:?}", mode);
            assert_eq!(fixture.count(&format!("emit GUILD_MEMBERS_CHUNK:{}", page)), 1, "{:?}", mode);
        }
        assert_eq!(fixture.count("emit GUILD_CREATE:B"), 1);
        assert_eq!(fixture.count("cache GUILD_CREATE:B"), 1);
    }
}

#[test]
fn member_count_on_a_page_boundary_expects_one_chunk() {
    let fixture = Fixture::new(BufferConfig::default());
    fixture.push(raw::READY, ready(&["B"]));
    fixture.push(raw::GUILD_CREATE, json!({"id": "B", "member_count": 1000}));
    fixture.push(raw::GUILD_MEMBERS_CHUNK, chunk("B", "c1"));

    assert_eq!(
        fixture.emitted(),
        vec!["READY:-", "GUILD_MEMBERS_CHUNK:c1", "GUILD_CREATE:B"]
    );
    assert!(!fixture.buffer.is_buffering(0));
}

#[test]
fn forced_large_object_without_members_is_already_done() {
    let fixture = Fixture::new(BufferConfig::default());
    fixture.push(raw::READY, ready(&["B"]));
    fixture.push(raw::GUILD_CREATE, json!({"id": "B", "member_count": 0, "large": true}));

    assert_eq!(fixture.emitted(), vec!["READY:-", "GUILD_CREATE:B"]);
    assert!(fixture.commands.requests.lock().is_empty());
    assert!(!fixture.buffer.is_buffering(0));
}

#[test]
fn repeated_detail_while_chunking_keeps_the_first_trigger() {
    let fixture = Fixture::new(BufferConfig::default());
    fixture.push(raw::READY, ready(&["B"]));
    fixture.push(raw::GUILD_CREATE, json!({"id": "B", "member_count": 1500, "tag": "first"}));
    fixture.push(raw::GUILD_CREATE, json!({"id": "B", "member_count": 1500, "tag": "second"}));
    fixture.push(raw::GUILD_MEMBERS_CHUNK, chunk("B", "c1"));
    assert!(fixture.buffer.is_buffering(0));
    fixture.push(raw::GUILD_MEMBERS_CHUNK, chunk("B", "c2"));

    assert_eq!(
        fixture.emitted(),
        vec![
            "READY:-",
            "GUILD_MEMBERS_CHUNK:c1",
            "GUILD_MEMBERS_CHUNK:c2",
            "GUILD_CREATE:first",
            "GUILD_CREATE:second",
        ]
    );
    assert_eq!(fixture.commands.requests.lock().len(), 1);
    assert_eq!(fixture.count("cache GUILD_CREATE:first"), 1);
    assert!(!fixture.buffer.is_buffering(0));
}

#[test]
fn repeated_detail_in_arrival_order_mode_is_replayed_in_place() {
    let fixture = Fixture::new(BufferConfig::default().with_replay_mode(ReplayMode::ArrivalOrder));
    fixture.push(raw::READY, ready(&["B"]));
    fixture.push(raw::GUILD_CREATE, json!({"id": "B", "member_count": 1500, "tag": "first"}));
    fixture.push(raw::GUILD_CREATE, json!({"id": "B", "member_count": 1500, "tag": "second"}));
    fixture.push(raw::GUILD_MEMBERS_CHUNK, chunk("B", "c1"));
    fixture.push(raw::GUILD_MEMBERS_CHUNK, chunk("B", "c2"));

    assert_eq!(
        fixture.emitted(),
        vec![
            "READY:-",
            "GUILD_CREATE:first",
            "GUILD_CREATE:second",
            "GUILD_MEMBERS_CHUNK:c1",
            "GUILD_MEMBERS_CHUNK:c2",
        ]
    );
    assert_eq!(fixture.commands.requests.lock().len(), 1);
}

#[test]
fn disabled_chunking_never_holds_large_objects() {
    let fixture = Fixture::new(BufferConfig::default().with_chunk_members(false));
    fixture.push(raw::READY, ready(&["B"]));
    fixture.push(raw::GUILD_CREATE, json!({"id": "B", "member_count": 5000}));

    assert_eq!(fixture.emitted(), vec!["READY:-", "GUILD_CREATE:B"]);
    assert!(fixture.commands.requests.lock().is_empty());
}

#[test]
fn object_joined_after_startup_still_requests_members() {
    let fixture = Fixture::new(BufferConfig::default().with_member_request_limit(50));
    fixture.push(raw::READY, ready(&[]));
    fixture.push(raw::GUILD_CREATE, json!({"id": "C", "member_count": 300}));
    fixture.push(raw::GUILD_MEMBERS_CHUNK, chunk("C", "c1"));

    assert_eq!(
        fixture.emitted(),
        vec!["READY:-", "GUILD_CREATE:C", "GUILD_MEMBERS_CHUNK:c1"]
    );
    let requests = fixture.commands.requests.lock().clone();
    assert_eq!(requests, vec![(0, ObjectId::from("C"), String::new(), 50)]);
}

// ============================================================================
// Cache interaction
// ============================================================================

#[test]
fn deletion_is_emitted_before_the_cache_forgets() {
    let fixture = Fixture::new(BufferConfig::default());
    fixture.push(raw::GUILD_ROLE_DELETE, json!({"guild_id": "A", "tag": "r1"}));
    fixture.push(raw::GUILD_ROLE_UPDATE, json!({"guild_id": "A", "tag": "r2"}));

    let journal = fixture.journal.lock().clone();
    assert_eq!(
        journal,
        vec![
            "emit GUILD_ROLE_DELETE:r1",
            "cache GUILD_ROLE_DELETE:r1",
            "cache GUILD_ROLE_UPDATE:r2",
            "emit GUILD_ROLE_UPDATE:r2",
        ]
    );
}

#[test]
fn replayed_deletion_keeps_emit_then_remove() {
    let fixture = Fixture::new(BufferConfig::default());
    fixture.push(raw::READY, ready(&["A"]));
    fixture.push(raw::CHANNEL_DELETE, json!({"guild_id": "A", "tag": "ch"}));
    fixture.push(raw::GUILD_CREATE, json!({"id": "A"}));

    assert!(fixture.position("emit CHANNEL_DELETE:ch") < fixture.position("cache CHANNEL_DELETE:ch"));
}

#[test]
fn cache_failure_does_not_stop_dispatch() {
    let fixture = Fixture::build(BufferConfig::default(), Some(raw::GUILD_CREATE));
    fixture.push(raw::READY, ready(&["A"]));
    fixture.push(raw::GUILD_MEMBER_UPDATE, member_update("A", "a1"));
    fixture.push(raw::GUILD_CREATE, json!({"id": "A"}));

    assert_eq!(
        fixture.emitted(),
        vec!["READY:-", "GUILD_CREATE:A", "GUILD_MEMBER_UPDATE:a1"]
    );
    assert_eq!(fixture.count("cache GUILD_CREATE:A"), 0);
    assert!(!fixture.buffer.is_buffering(0));
}

#[test]
fn uncacheable_events_skip_the_cache() {
    let fixture = Fixture::new(BufferConfig::default());
    fixture.push(raw::MESSAGE_CREATE, json!({"tag": "m1", "channel_id": "9"}));

    assert_eq!(fixture.journal.lock().clone(), vec!["emit MESSAGE_CREATE:m1"]);
}

// ============================================================================
// Shard state lifecycle
// ============================================================================

#[test]
fn events_before_ready_dispatch_directly() {
    let fixture = Fixture::new(BufferConfig::default());
    fixture.push(raw::GUILD_MEMBER_ADD, member_update("A", "early"));

    assert_eq!(fixture.emitted(), vec!["GUILD_MEMBER_ADD:early"]);
    assert!(!fixture.buffer.is_buffering(0));
}

#[test]
fn second_ready_flushes_what_the_first_still_held() {
    let fixture = Fixture::new(BufferConfig::default());
    fixture.push(raw::READY, json!({"tag": "r1", "guilds": [{"id": "A"}, {"id": "B"}]}));
    fixture.push(raw::USER_UPDATE, json!({"tag": "u0"}));
    fixture.push(raw::GUILD_MEMBER_UPDATE, member_update("A", "a1"));
    fixture.push(raw::GUILD_CREATE, json!({"id": "B", "member_count": 1500}));
    fixture.push(raw::USER_UPDATE, json!({"tag": "u1"}));
    fixture.push(raw::READY, json!({"tag": "r2", "guilds": [{"id": "C"}]}));

    assert_eq!(
        fixture.emitted(),
        vec![
            "READY:r1",
            // Leftovers keep their arrival order across queues
            "USER_UPDATE:u0",
            "GUILD_MEMBER_UPDATE:a1",
            "GUILD_CREATE:B",
            "USER_UPDATE:u1",
            "READY:r2",
        ]
    );
    assert_eq!(
        fixture.buffer.pending(0),
        PendingSnapshot {
            awaited: 1,
            buffered_per_object: 0,
            buffered_global: 0,
        }
    );
}

#[test]
fn shards_buffer_independently() {
    let fixture = Fixture::new(BufferConfig::default());
    fixture.push_on(1, raw::READY, ready(&["A"]));
    fixture.push_on(1, raw::USER_UPDATE, json!({"tag": "held"}));
    fixture.push_on(0, raw::USER_UPDATE, json!({"tag": "free"}));

    assert_eq!(fixture.emitted(), vec!["READY:-", "USER_UPDATE:free"]);
    assert!(fixture.buffer.is_buffering(1));
    assert!(!fixture.buffer.is_buffering(0));
}
