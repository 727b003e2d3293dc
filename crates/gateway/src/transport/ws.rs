use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use log::{debug, trace, warn};
use shardline_core::ShardInfo;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use url::Url;

use super::{GatewayConnector, SocketCommand, SocketFrame, SocketHandle};
use crate::error::TransportError;

const CHANNEL_CAPACITY: usize = 1024;

/// WebSocket connector for the gateway
///
/// Each connection is split into a writer task draining [`SocketCommand`]s
/// and a reader task forwarding text and close frames as [`SocketFrame`]s.
pub struct WsConnector {
    url: Url,
}

impl WsConnector {
    pub fn new(url: &str) -> Result<Self, TransportError> {
        let url = Url::parse(url).map_err(|e| TransportError::Connection(e.to_string()))?;
        Ok(WsConnector { url })
    }

    pub fn url(&self) -> &Url {
        &self.url
    }
}

#[async_trait]
impl GatewayConnector for WsConnector {
    async fn connect(&self, shard: ShardInfo) -> Result<SocketHandle, TransportError> {
        debug!("Shard {}: connecting to {}", shard, self.url);
        let (ws_stream, _) = connect_async(self.url.as_str())
            .await
            .map_err(|e| TransportError::Connection(e.to_string()))?;
        let (mut write, mut read) = ws_stream.split();

        let (handle, mut commands, frames) = SocketHandle::pair(CHANNEL_CAPACITY);

        // Outgoing
        let error_tx = frames.clone();
        tokio::spawn(async move {
            while let Some(command) = commands.recv().await {
                let result = match command {
                    SocketCommand::Text(text) => write.send(Message::Text(text.into())).await,
                    SocketCommand::Close(code) => {
                        let frame = CloseFrame {
                            code: CloseCode::from(code),
                            reason: "".into(),
                        };
                        let _ = write.send(Message::Close(Some(frame))).await;
                        break;
                    }
                };
                if let Err(e) = result {
                    let _ = error_tx.send(SocketFrame::Error(e.to_string())).await;
                    break;
                }
            }
            let _ = write.close().await;
        });

        // Incoming
        tokio::spawn(async move {
            while let Some(msg) = read.next().await {
                let frame = match msg {
                    Ok(Message::Text(text)) => SocketFrame::Text(text.as_str().to_string()),
                    Ok(Message::Close(close)) => {
                        let (code, reason) = close
                            .map(|c| (u16::from(c.code), c.reason.as_str().to_string()))
                            .unwrap_or((1005, String::new()));
                        let _ = frames.send(SocketFrame::Close { code, reason }).await;
                        break;
                    }
                    Ok(Message::Ping(data)) => {
                        trace!("Shard {}: received ping: {:?}", shard, data);
                        continue;
                    }
                    Ok(_) => continue,
                    Err(e) => {
                        warn!("Shard {}: socket error: {}", shard, e);
                        let _ = frames.send(SocketFrame::Error(e.to_string())).await;
                        break;
                    }
                };
                if frames.send(frame).await.is_err() {
                    break;
                }
            }
        });

        Ok(handle)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejects_bad_url() {
        assert!(WsConnector::new("not a url").is_err());
        let connector = WsConnector::new("wss://gateway.example.invalid/?v=10").unwrap();
        assert_eq!(connector.url().scheme(), "wss");
    }
}
