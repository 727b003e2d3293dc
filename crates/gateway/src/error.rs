//! Error types for the gateway crate

use thiserror::Error;

/// Socket-level errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("Connection failed: {0}")]
    Connection(String),

    #[error("Send failed: {0}")]
    Send(String),

    #[error("Serialization failed: {0}")]
    Serialization(String),

    #[error("Channel closed")]
    ChannelClosed,
}

impl From<serde_json::Error> for TransportError {
    fn from(e: serde_json::Error) -> Self {
        TransportError::Serialization(e.to_string())
    }
}

/// Errors answering a control message sent to a shard session
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ControlError {
    #[error("Cannot connect shard twice, redeploy it")]
    AlreadyConnected,

    #[error("Shard session is gone")]
    SessionGone,

    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),
}

/// Failure bringing up a shard session
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LaunchError {
    #[error("Shard {0} could not be deployed: {1}")]
    Deploy(u32, String),

    #[error("No runtime available to host shard {0}")]
    NoRuntime(u32),
}
