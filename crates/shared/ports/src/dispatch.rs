use shardline_core::GatewayEvent;

/// Downstream callback receiving every event in its final, post-buffering order
///
/// Runs on the shard's event stream, so implementations must be cheap and
/// must never block.
pub trait DispatchSink: Send + Sync {
    fn emit(&self, event: GatewayEvent);
}

/// Entry point for raw dispatches leaving a shard session
pub trait EventIngest: Send + Sync {
    fn ingest(&self, event: GatewayEvent);
}
