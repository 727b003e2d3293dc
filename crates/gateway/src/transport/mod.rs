//! Transport abstraction layer
//!
//! A connection is a pair of channels: commands going out and frames coming
//! in. The session actor only sees these channels, so any socket library (or
//! an in-memory fake) can sit behind a [`GatewayConnector`].

pub mod ws;

pub use ws::WsConnector;

use async_trait::async_trait;
use shardline_core::ShardInfo;
use tokio::sync::mpsc;

use crate::error::TransportError;

/// Something received from the socket
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SocketFrame {
    Text(String),
    /// The peer closed the connection
    Close { code: u16, reason: String },
    /// The connection broke without a close frame
    Error(String),
}

/// Something to write to the socket
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SocketCommand {
    Text(String),
    /// Close with this code and stop
    Close(u16),
}

/// Both halves of one open connection
pub struct SocketHandle {
    pub outgoing: mpsc::Sender<SocketCommand>,
    pub incoming: mpsc::Receiver<SocketFrame>,
}

impl SocketHandle {
    /// Create a connected pair: the handle for the session plus the far ends
    ///
    /// Useful for transports that pump frames from their own task.
    pub fn pair(capacity: usize) -> (Self, mpsc::Receiver<SocketCommand>, mpsc::Sender<SocketFrame>) {
        let (out_tx, out_rx) = mpsc::channel(capacity);
        let (in_tx, in_rx) = mpsc::channel(capacity);
        (
            SocketHandle {
                outgoing: out_tx,
                incoming: in_rx,
            },
            out_rx,
            in_tx,
        )
    }
}

/// Opens gateway connections for shards
#[async_trait]
pub trait GatewayConnector: Send + Sync {
    async fn connect(&self, shard: ShardInfo) -> Result<SocketHandle, TransportError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    // Ensure the connector is object-safe
    fn _assert_connector_object_safe(_: &dyn GatewayConnector) {}

    #[tokio::test]
    async fn test_pair_is_wired() {
        let (mut handle, mut out_rx, in_tx) = SocketHandle::pair(4);

        handle.outgoing.send(SocketCommand::Text("ping".into())).await.unwrap();
        assert_eq!(out_rx.recv().await, Some(SocketCommand::Text("ping".into())));

        in_tx.send(SocketFrame::Text("pong".into())).await.unwrap();
        assert_eq!(handle.incoming.recv().await, Some(SocketFrame::Text("pong".into())));
    }
}
