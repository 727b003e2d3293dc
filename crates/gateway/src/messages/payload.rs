use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use shardline_core::{ObjectId, ShardInfo};

/// Gateway opcodes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GatewayOp {
    Dispatch,
    Heartbeat,
    Identify,
    PresenceUpdate,
    VoiceStateUpdate,
    Resume,
    Reconnect,
    RequestMembers,
    InvalidSession,
    Hello,
    HeartbeatAck,
}

impl GatewayOp {
    pub fn code(&self) -> u8 {
        match self {
            GatewayOp::Dispatch => 0,
            GatewayOp::Heartbeat => 1,
            GatewayOp::Identify => 2,
            GatewayOp::PresenceUpdate => 3,
            GatewayOp::VoiceStateUpdate => 4,
            GatewayOp::Resume => 6,
            GatewayOp::Reconnect => 7,
            GatewayOp::RequestMembers => 8,
            GatewayOp::InvalidSession => 9,
            GatewayOp::Hello => 10,
            GatewayOp::HeartbeatAck => 11,
        }
    }

    pub fn from_code(code: u8) -> Option<Self> {
        Some(match code {
            0 => GatewayOp::Dispatch,
            1 => GatewayOp::Heartbeat,
            2 => GatewayOp::Identify,
            3 => GatewayOp::PresenceUpdate,
            4 => GatewayOp::VoiceStateUpdate,
            6 => GatewayOp::Resume,
            7 => GatewayOp::Reconnect,
            8 => GatewayOp::RequestMembers,
            9 => GatewayOp::InvalidSession,
            10 => GatewayOp::Hello,
            11 => GatewayOp::HeartbeatAck,
            _ => return None,
        })
    }
}

/// One gateway frame
///
/// The opcode is kept as a raw number so frames with opcodes this client
/// does not know still decode and can be logged.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GatewayPayload {
    pub op: u8,
    #[serde(default)]
    pub d: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub s: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub t: Option<String>,
}

impl GatewayPayload {
    pub fn new(op: GatewayOp, d: Value) -> Self {
        GatewayPayload {
            op: op.code(),
            d,
            s: None,
            t: None,
        }
    }

    pub fn opcode(&self) -> Option<GatewayOp> {
        GatewayOp::from_code(self.op)
    }

    pub fn from_json(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    // ========================================================================
    // Outbound builders
    // ========================================================================

    pub fn identify(
        token: &str,
        shard: ShardInfo,
        large_threshold: u32,
        presence: Option<&Value>,
    ) -> Self {
        let mut d = json!({
            "token": token,
            "properties": {
                "os": std::env::consts::OS,
                "browser": "shardline",
                "device": "shardline",
            },
            "compress": false,
            "large_threshold": large_threshold,
            "shard": [shard.id, shard.count],
        });
        if let Some(presence) = presence {
            d["presence"] = presence.clone();
        }
        Self::new(GatewayOp::Identify, d)
    }

    pub fn resume(token: &str, session_id: &str, sequence: u64) -> Self {
        Self::new(
            GatewayOp::Resume,
            json!({
                "token": token,
                "session_id": session_id,
                "seq": sequence,
            }),
        )
    }

    /// Heartbeat carrying the last sequence seen, `null` before any dispatch
    pub fn heartbeat(sequence: Option<u64>) -> Self {
        Self::new(GatewayOp::Heartbeat, json!(sequence))
    }

    pub fn presence_update(presence: Value) -> Self {
        Self::new(GatewayOp::PresenceUpdate, presence)
    }

    pub fn voice_state_update(state: Value) -> Self {
        Self::new(GatewayOp::VoiceStateUpdate, state)
    }

    /// Ask for an object's membership; `limit` 0 means every member
    pub fn request_members(object_id: &ObjectId, query: &str, limit: u32) -> Self {
        Self::new(
            GatewayOp::RequestMembers,
            json!({
                "guild_id": object_id.as_str(),
                "query": query,
                "limit": limit,
            }),
        )
    }
}
