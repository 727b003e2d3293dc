use std::time::Duration;

use serde_json::Value;
use shardline_core::{ConnectOutcome, ObjectId, SessionState, ShardInfo};
use tokio::sync::{mpsc, oneshot};
use uuid::Uuid;

use crate::error::ControlError;

/// Requests a shard session serves
#[derive(Debug)]
pub enum ControlMessage {
    /// Open the connection and answer once READY, RESUMED or failure is known
    Connect {
        reply: oneshot::Sender<Result<ConnectOutcome, ControlError>>,
    },
    Latency {
        reply: oneshot::Sender<Option<Duration>>,
    },
    Trace {
        reply: oneshot::Sender<Vec<String>>,
    },
    State {
        reply: oneshot::Sender<SessionState>,
    },
    /// Raw gateway frame, via the send throttle
    Send { payload: Value },
    /// Presence update, via the presence throttle
    Presence { presence: Value },
    /// Voice state update, via the send throttle
    VoiceState { state: Value },
    /// Membership request, via the send throttle
    RequestMembers {
        object_id: ObjectId,
        query: String,
        limit: u32,
    },
    /// Close the connection and stop the session
    Shutdown,
}

/// Address of one deployed shard session
#[derive(Debug, Clone)]
pub struct ShardSessionHandle {
    id: Uuid,
    shard: ShardInfo,
    control: mpsc::UnboundedSender<ControlMessage>,
}

impl ShardSessionHandle {
    pub fn new(id: Uuid, shard: ShardInfo, control: mpsc::UnboundedSender<ControlMessage>) -> Self {
        ShardSessionHandle { id, shard, control }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn shard(&self) -> ShardInfo {
        self.shard
    }

    /// Whether the session task is still running
    pub fn is_alive(&self) -> bool {
        !self.control.is_closed()
    }

    /// Ask the session to connect and wait for the terminal outcome
    pub async fn connect(&self) -> Result<ConnectOutcome, ControlError> {
        let (reply, rx) = oneshot::channel();
        self.post(ControlMessage::Connect { reply })?;
        rx.await.map_err(|_| ControlError::SessionGone)?
    }

    pub async fn is_connected(&self) -> bool {
        self.state().await.is_ok_and(|state| state.is_live())
    }

    /// Round trip of the last acknowledged heartbeat
    pub async fn latency(&self) -> Option<Duration> {
        let (reply, rx) = oneshot::channel();
        self.post(ControlMessage::Latency { reply }).ok()?;
        rx.await.ok().flatten()
    }

    /// Gateway servers that handled the session
    pub async fn trace(&self) -> Vec<String> {
        let (reply, rx) = oneshot::channel();
        if self.post(ControlMessage::Trace { reply }).is_err() {
            return Vec::new();
        }
        rx.await.unwrap_or_default()
    }

    pub async fn state(&self) -> Result<SessionState, ControlError> {
        let (reply, rx) = oneshot::channel();
        self.post(ControlMessage::State { reply })?;
        rx.await.map_err(|_| ControlError::SessionGone)
    }

    pub fn send(&self, payload: Value) -> Result<(), ControlError> {
        self.post(ControlMessage::Send { payload })
    }

    pub fn update_presence(&self, presence: Value) -> Result<(), ControlError> {
        self.post(ControlMessage::Presence { presence })
    }

    pub fn update_voice_state(&self, state: Value) -> Result<(), ControlError> {
        self.post(ControlMessage::VoiceState { state })
    }

    pub fn request_members(&self, object_id: ObjectId, query: String, limit: u32) -> Result<(), ControlError> {
        self.post(ControlMessage::RequestMembers {
            object_id,
            query,
            limit,
        })
    }

    /// Stop the session; queued outbound commands are discarded
    pub fn shutdown(&self) {
        let _ = self.post(ControlMessage::Shutdown);
    }

    fn post(&self, message: ControlMessage) -> Result<(), ControlError> {
        self.control
            .send(message)
            .map_err(|_| ControlError::SessionGone)
    }
}
