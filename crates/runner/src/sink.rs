use log::trace;
use shardline_core::GatewayEvent;
use shardline_ports::DispatchSink;
use tokio::sync::broadcast;

/// Dispatch sink fanning post-buffering events out to subscribers
///
/// Never blocks: a subscriber that falls more than `capacity` events behind
/// observes `RecvError::Lagged` instead of slowing the shard down.
pub struct BroadcastSink {
    tx: broadcast::Sender<GatewayEvent>,
}

impl BroadcastSink {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        BroadcastSink { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<GatewayEvent> {
        self.tx.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl DispatchSink for BroadcastSink {
    fn emit(&self, event: GatewayEvent) {
        if self.tx.send(event).is_err() {
            trace!("No subscribers, event dropped");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use shardline_core::ShardInfo;

    #[tokio::test]
    async fn test_subscribers_see_events_in_order() {
        let sink = BroadcastSink::new(8);
        let mut rx = sink.subscribe();
        assert_eq!(sink.subscriber_count(), 1);

        for n in 0..3 {
            sink.emit(GatewayEvent::new(ShardInfo::new(0, 1), "MESSAGE_CREATE", json!({"n": n})));
        }
        for n in 0..3 {
            assert_eq!(rx.recv().await.unwrap().data["n"], n);
        }
    }

    #[test]
    fn test_emit_without_subscribers() {
        let sink = BroadcastSink::new(1);
        sink.emit(GatewayEvent::new(ShardInfo::new(0, 1), "READY", json!({})));
    }
}
