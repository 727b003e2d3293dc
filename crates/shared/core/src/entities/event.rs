use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::ShardInfo;
use crate::values::ObjectId;

/// Dispatch event names as they appear in the `t` field of a payload
pub mod raw {
    // Lifecycle
    pub const READY: &str = "READY";
    pub const RESUMED: &str = "RESUMED";
    // Channels
    pub const CHANNEL_CREATE: &str = "CHANNEL_CREATE";
    pub const CHANNEL_UPDATE: &str = "CHANNEL_UPDATE";
    pub const CHANNEL_DELETE: &str = "CHANNEL_DELETE";
    // Guilds
    pub const GUILD_CREATE: &str = "GUILD_CREATE";
    pub const GUILD_UPDATE: &str = "GUILD_UPDATE";
    pub const GUILD_DELETE: &str = "GUILD_DELETE";
    // Roles
    pub const GUILD_ROLE_CREATE: &str = "GUILD_ROLE_CREATE";
    pub const GUILD_ROLE_UPDATE: &str = "GUILD_ROLE_UPDATE";
    pub const GUILD_ROLE_DELETE: &str = "GUILD_ROLE_DELETE";
    // Emoji
    pub const GUILD_EMOJIS_UPDATE: &str = "GUILD_EMOJIS_UPDATE";
    // Members
    pub const GUILD_MEMBER_ADD: &str = "GUILD_MEMBER_ADD";
    pub const GUILD_MEMBER_REMOVE: &str = "GUILD_MEMBER_REMOVE";
    pub const GUILD_MEMBER_UPDATE: &str = "GUILD_MEMBER_UPDATE";
    pub const GUILD_MEMBERS_CHUNK: &str = "GUILD_MEMBERS_CHUNK";
    // Users
    pub const USER_UPDATE: &str = "USER_UPDATE";
    pub const PRESENCE_UPDATE: &str = "PRESENCE_UPDATE";
    // Voice
    pub const VOICE_STATE_UPDATE: &str = "VOICE_STATE_UPDATE";
    // Messages (dispatched, never cached)
    pub const MESSAGE_CREATE: &str = "MESSAGE_CREATE";

    /// Events whose payload is applied to the cache before dispatch
    pub const CACHE_EVENTS: &[&str] = &[
        READY,
        CHANNEL_CREATE,
        CHANNEL_UPDATE,
        CHANNEL_DELETE,
        GUILD_CREATE,
        GUILD_UPDATE,
        GUILD_DELETE,
        GUILD_ROLE_CREATE,
        GUILD_ROLE_UPDATE,
        GUILD_ROLE_DELETE,
        GUILD_EMOJIS_UPDATE,
        GUILD_MEMBER_ADD,
        GUILD_MEMBER_REMOVE,
        GUILD_MEMBER_UPDATE,
        GUILD_MEMBERS_CHUNK,
        USER_UPDATE,
        PRESENCE_UPDATE,
        VOICE_STATE_UPDATE,
    ];

    /// Events that remove state; dispatched before the cache forgets the object
    pub const DELETE_EVENTS: &[&str] = &[
        CHANNEL_DELETE,
        GUILD_DELETE,
        GUILD_ROLE_DELETE,
        GUILD_MEMBER_REMOVE,
    ];
}

/// Payload field names the core reads
pub mod fields {
    /// Array of objects known at bulk time, each with an `id`
    pub const GUILDS: &str = "guilds";
    pub const ID: &str = "id";
    /// Foreign key naming the object an event belongs to
    pub const GUILD_ID: &str = "guild_id";
    pub const MEMBER_COUNT: &str = "member_count";
    pub const LARGE: &str = "large";
    pub const SESSION_ID: &str = "session_id";
    pub const TRACE: &str = "_trace";
}

/// How the consistency buffer treats an event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    /// Bulk initial payload listing every object the shard will describe
    Ready,
    /// Detail payload for one object
    ObjectCreate,
    /// One page of a paginated membership delivery
    MembersChunk,
    /// Anything else; may carry an object foreign key
    Other,
}

/// One dispatch received on a shard's stream, tagged with its origin
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GatewayEvent {
    pub shard: ShardInfo,
    /// Event name (`t`)
    pub name: String,
    /// Sequence number (`s`), if the payload carried one
    pub sequence: Option<u64>,
    /// Event body (`d`)
    pub data: Value,
}

impl GatewayEvent {
    pub fn new(shard: ShardInfo, name: impl Into<String>, data: Value) -> Self {
        GatewayEvent {
            shard,
            name: name.into(),
            sequence: None,
            data,
        }
    }

    pub fn with_sequence(mut self, sequence: u64) -> Self {
        self.sequence = Some(sequence);
        self
    }

    pub fn kind(&self) -> EventKind {
        match self.name.as_str() {
            raw::READY => EventKind::Ready,
            raw::GUILD_CREATE => EventKind::ObjectCreate,
            raw::GUILD_MEMBERS_CHUNK => EventKind::MembersChunk,
            _ => EventKind::Other,
        }
    }

    /// Object this event refers to through its foreign key, if any
    pub fn object_id(&self) -> Option<ObjectId> {
        self.data
            .get(fields::GUILD_ID)
            .and_then(Value::as_str)
            .map(ObjectId::from)
    }

    /// Identity of the object a detail payload describes
    pub fn own_id(&self) -> Option<ObjectId> {
        self.data
            .get(fields::ID)
            .and_then(Value::as_str)
            .map(ObjectId::from)
    }

    pub fn is_cacheable(&self) -> bool {
        raw::CACHE_EVENTS.contains(&self.name.as_str())
    }

    pub fn is_deletion(&self) -> bool {
        raw::DELETE_EVENTS.contains(&self.name.as_str())
    }
}
