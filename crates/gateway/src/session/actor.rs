use std::sync::Arc;
use std::time::Duration;

use log::{debug, info, trace, warn};
use parking_lot::Mutex;
use serde_json::Value;
use shardline_core::{ConnectOutcome, GatewayEvent, SessionState, fields, raw};
use tokio::sync::{mpsc, oneshot};
use tokio::time::{Instant, Interval, MissedTickBehavior};

use super::control::{ControlMessage, ShardSessionHandle};
use super::lifecycle::{LifecycleEvent, LifecycleKind};
use super::SessionContext;
use crate::error::ControlError;
use crate::messages::{GatewayOp, GatewayPayload, NORMAL_CLOSURE, RESUMABLE_CLOSURE, clears_session};
use crate::throttle::{CommandThrottle, presence_identity, send_identity};
use crate::transport::{SocketCommand, SocketFrame};

const DEFAULT_HEARTBEAT_INTERVAL_MS: u64 = 41_250;

type ConnectReply = oneshot::Sender<Result<ConnectOutcome, ControlError>>;

/// Writer side of the current socket, shared with the throttles
type SocketSlot = Arc<Mutex<Option<mpsc::Sender<SocketCommand>>>>;

/// The state machine for one physical gateway connection
///
/// Runs as its own task. A session connects at most once; after a fatal
/// close it stays `Closed` and only answers queries until it is shut down.
/// Transient loss of a live connection triggers a single in-place resume.
pub struct ShardSession {
    ctx: SessionContext,
    control: mpsc::UnboundedReceiver<ControlMessage>,
    state: SessionState,
    connect_requested: bool,
    pending_connect: Option<ConnectReply>,

    // Socket
    outgoing: SocketSlot,
    incoming: Option<mpsc::Receiver<SocketFrame>>,

    // Heartbeat
    heartbeat: Option<Interval>,
    heartbeat_acked: bool,
    heartbeat_sent_at: Option<Instant>,
    latency: Option<Duration>,
    trace: Vec<String>,

    send_throttle: CommandThrottle<String>,
    presence_throttle: CommandThrottle<String>,
}

impl ShardSession {
    /// Spawn a session task and return its handle
    ///
    /// Must be called from within a tokio runtime.
    pub fn spawn(ctx: SessionContext) -> ShardSessionHandle {
        let (control_tx, control_rx) = mpsc::unbounded_channel();
        let handle = ShardSessionHandle::new(ctx.handle_id, ctx.shard, control_tx);
        let session = Self::new(ctx, control_rx);
        tokio::spawn(session.run());
        handle
    }

    fn new(ctx: SessionContext, control: mpsc::UnboundedReceiver<ControlMessage>) -> Self {
        let outgoing: SocketSlot = Arc::new(Mutex::new(None));
        let shard_id = ctx.shard.id;
        let throttle = &ctx.config.throttle;

        let send_throttle = CommandThrottle::new(
            send_identity(shard_id),
            throttle.send_limit,
            throttle.send_period,
            throttle.recheck,
            Arc::clone(&ctx.windows),
            socket_writer(Arc::clone(&outgoing), shard_id),
        );
        let presence_throttle = CommandThrottle::new(
            presence_identity(shard_id),
            throttle.presence_limit,
            throttle.presence_period,
            throttle.recheck,
            Arc::clone(&ctx.windows),
            socket_writer(Arc::clone(&outgoing), shard_id),
        );

        ShardSession {
            ctx,
            control,
            state: SessionState::Disconnected,
            connect_requested: false,
            pending_connect: None,
            outgoing,
            incoming: None,
            heartbeat: None,
            heartbeat_acked: true,
            heartbeat_sent_at: None,
            latency: None,
            trace: Vec::new(),
            send_throttle,
            presence_throttle,
        }
    }

    async fn run(mut self) {
        debug!("Shard {}: session {} deployed", self.ctx.shard, self.ctx.handle_id);
        loop {
            tokio::select! {
                message = self.control.recv() => match message {
                    Some(message) => {
                        if !self.on_control(message).await {
                            break;
                        }
                    }
                    None => break,
                },
                frame = next_frame(&mut self.incoming) => self.on_frame(frame).await,
                _ = next_tick(&mut self.heartbeat) => self.on_heartbeat_tick().await,
            }
        }
        self.close(NORMAL_CLOSURE);
        debug!("Shard {}: session {} stopped", self.ctx.shard, self.ctx.handle_id);
    }

    // ========================================================================
    // Control
    // ========================================================================

    /// Returns false once the session should stop
    async fn on_control(&mut self, message: ControlMessage) -> bool {
        match message {
            ControlMessage::Connect { reply } => {
                if self.connect_requested {
                    let _ = reply.send(Err(ControlError::AlreadyConnected));
                    return true;
                }
                self.connect_requested = true;
                self.pending_connect = Some(reply);
                self.transition(SessionState::Connecting);
                self.open_socket().await;
            }
            ControlMessage::Latency { reply } => {
                let _ = reply.send(self.latency);
            }
            ControlMessage::Trace { reply } => {
                let _ = reply.send(self.trace.clone());
            }
            ControlMessage::State { reply } => {
                let _ = reply.send(self.state);
            }
            ControlMessage::Send { payload } => {
                self.send_throttle.enqueue(payload.to_string());
            }
            ControlMessage::Presence { presence } => {
                self.queue(&self.presence_throttle, GatewayPayload::presence_update(presence));
            }
            ControlMessage::VoiceState { state } => {
                self.queue(&self.send_throttle, GatewayPayload::voice_state_update(state));
            }
            ControlMessage::RequestMembers {
                object_id,
                query,
                limit,
            } => {
                self.queue(
                    &self.send_throttle,
                    GatewayPayload::request_members(&object_id, &query, limit),
                );
            }
            ControlMessage::Shutdown => {
                info!("Shard {}: shutting down", self.ctx.shard);
                return false;
            }
        }
        true
    }

    fn queue(&self, throttle: &CommandThrottle<String>, payload: GatewayPayload) {
        match payload.to_json() {
            Ok(text) => throttle.enqueue(text),
            Err(e) => warn!("Shard {}: cannot encode command: {}", self.ctx.shard, e),
        }
    }

    // ========================================================================
    // Socket
    // ========================================================================

    async fn open_socket(&mut self) {
        self.publish(LifecycleKind::Connecting);
        match self.ctx.connector.connect(self.ctx.shard).await {
            Ok(handle) => {
                *self.outgoing.lock() = Some(handle.outgoing);
                self.incoming = Some(handle.incoming);
            }
            Err(e) => self.fail(&format!("connect failed: {}", e)),
        }
    }

    /// Write a frame directly, bypassing the throttles
    fn write(&self, payload: &GatewayPayload) {
        let text = match payload.to_json() {
            Ok(text) => text,
            Err(e) => {
                warn!("Shard {}: cannot encode frame: {}", self.ctx.shard, e);
                return;
            }
        };
        if let Some(outgoing) = self.outgoing.lock().as_ref() {
            if outgoing.try_send(SocketCommand::Text(text)).is_err() {
                warn!("Shard {}: socket writer unavailable", self.ctx.shard);
            }
        }
    }

    fn drop_socket(&mut self, code: u16) {
        if let Some(outgoing) = self.outgoing.lock().take() {
            let _ = outgoing.try_send(SocketCommand::Close(code));
        }
        self.incoming = None;
        self.heartbeat = None;
        self.heartbeat_sent_at = None;
    }

    async fn on_frame(&mut self, frame: SocketFrame) {
        match frame {
            SocketFrame::Text(text) => match GatewayPayload::from_json(&text) {
                Ok(payload) => self.on_payload(payload).await,
                Err(e) => warn!("Shard {}: undecodable frame: {}", self.ctx.shard, e),
            },
            SocketFrame::Close { code, reason } => {
                self.incoming = None;
                if clears_session(code) {
                    info!("Shard {}: close code {} invalidates the session", self.ctx.shard, code);
                    self.ctx.store.clear_session(self.ctx.shard.id);
                    self.ctx.store.clear_sequence(self.ctx.shard.id);
                }
                self.connection_lost(&format!("closed by gateway ({} {})", code, reason))
                    .await;
            }
            SocketFrame::Error(e) => self.connection_lost(&e).await,
        }
    }

    // ========================================================================
    // Protocol
    // ========================================================================

    async fn on_payload(&mut self, payload: GatewayPayload) {
        match payload.opcode() {
            Some(GatewayOp::Hello) => self.on_hello(&payload.d),
            Some(GatewayOp::HeartbeatAck) => {
                self.heartbeat_acked = true;
                if let Some(sent_at) = self.heartbeat_sent_at {
                    self.latency = Some(sent_at.elapsed());
                }
            }
            Some(GatewayOp::Heartbeat) => {
                self.write(&GatewayPayload::heartbeat(self.last_sequence()));
            }
            Some(GatewayOp::Dispatch) => self.on_dispatch(payload),
            Some(GatewayOp::Reconnect) => self.connection_lost("reconnect requested").await,
            Some(GatewayOp::InvalidSession) => {
                if payload.d.as_bool() == Some(true) {
                    self.connection_lost("session invalidated (resumable)").await;
                } else {
                    let shard_id = self.ctx.shard.id;
                    self.ctx.store.clear_session(shard_id);
                    self.ctx.store.clear_sequence(shard_id);
                    self.ctx.cache.invalidate_shard(shard_id);
                    self.fail("session invalidated");
                }
            }
            Some(other) => debug!("Shard {}: ignoring {:?}", self.ctx.shard, other),
            None => debug!("Shard {}: unknown opcode {}", self.ctx.shard, payload.op),
        }
    }

    fn on_hello(&mut self, d: &Value) {
        let interval = d
            .get("heartbeat_interval")
            .and_then(Value::as_u64)
            .unwrap_or(DEFAULT_HEARTBEAT_INTERVAL_MS);
        let period = Duration::from_millis(interval.max(1));
        let mut heartbeat = tokio::time::interval_at(Instant::now() + period, period);
        heartbeat.set_missed_tick_behavior(MissedTickBehavior::Delay);
        self.heartbeat = Some(heartbeat);
        self.heartbeat_acked = true;
        self.record_trace(d);
        self.publish(LifecycleKind::Connected);

        let shard_id = self.ctx.shard.id;
        let resumable = self
            .ctx
            .store
            .session(shard_id)
            .filter(|_| self.ctx.store.can_resume(shard_id));

        match resumable {
            Some(session_id) => {
                info!("Shard {}: resuming session {}", self.ctx.shard, session_id);
                let sequence = self.ctx.store.sequence(shard_id);
                self.write(&GatewayPayload::resume(
                    &self.ctx.config.token,
                    &session_id,
                    sequence,
                ));
            }
            None if self.state == SessionState::Resuming => {
                self.fail("no session left to resume");
            }
            None => {
                info!("Shard {}: identifying", self.ctx.shard);
                self.write(&GatewayPayload::identify(
                    &self.ctx.config.token,
                    self.ctx.shard,
                    self.ctx.config.large_threshold,
                    self.ctx.config.initial_presence.as_ref(),
                ));
            }
        }
    }

    fn on_dispatch(&mut self, payload: GatewayPayload) {
        if let Some(sequence) = payload.s {
            self.ctx.store.set_sequence(self.ctx.shard.id, sequence);
        }
        let Some(name) = payload.t else {
            warn!("Shard {}: dispatch without event name", self.ctx.shard);
            return;
        };

        match name.as_str() {
            raw::READY => {
                if let Some(session_id) = payload.d.get(fields::SESSION_ID).and_then(Value::as_str) {
                    self.ctx
                        .store
                        .set_session(self.ctx.shard.id, session_id.to_string());
                }
                self.record_trace(&payload.d);
                self.transition(SessionState::Connected);
                self.publish(LifecycleKind::Identified);
                self.resolve_connect(ConnectOutcome::Ready);
            }
            raw::RESUMED => {
                self.record_trace(&payload.d);
                self.transition(SessionState::Connected);
                self.publish(LifecycleKind::Resumed);
                self.resolve_connect(ConnectOutcome::Resumed);
            }
            _ => {}
        }

        let mut event = GatewayEvent::new(self.ctx.shard, name, payload.d);
        if let Some(sequence) = payload.s {
            event = event.with_sequence(sequence);
        }
        trace!("Shard {}: dispatch {}", self.ctx.shard, event.name);
        self.ctx.ingest.ingest(event);
    }

    async fn on_heartbeat_tick(&mut self) {
        if !self.heartbeat_acked {
            warn!("Shard {}: heartbeat not acknowledged, zombie connection", self.ctx.shard);
            self.connection_lost("zombie connection").await;
            return;
        }
        self.heartbeat_acked = false;
        self.heartbeat_sent_at = Some(Instant::now());
        self.write(&GatewayPayload::heartbeat(self.last_sequence()));
    }

    fn last_sequence(&self) -> Option<u64> {
        Some(self.ctx.store.sequence(self.ctx.shard.id)).filter(|s| *s > 0)
    }

    fn record_trace(&mut self, d: &Value) {
        if let Some(servers) = d.get(fields::TRACE).and_then(Value::as_array) {
            self.trace = servers
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect();
        }
    }

    // ========================================================================
    // Transitions
    // ========================================================================

    /// Transient loss: a live session gets one resume attempt, anything else closes
    async fn connection_lost(&mut self, reason: &str) {
        if self.state != SessionState::Connected {
            self.fail(reason);
            return;
        }

        warn!("Shard {}: connection lost ({}), resuming", self.ctx.shard, reason);
        self.drop_socket(RESUMABLE_CLOSURE);
        self.transition(SessionState::Resuming);
        self.publish(LifecycleKind::Disconnected);

        if !self.ctx.store.can_resume(self.ctx.shard.id) {
            self.fail("no session left to resume");
            return;
        }
        self.open_socket().await;
    }

    /// Terminal failure of the current connection
    fn fail(&mut self, reason: &str) {
        if self.state.is_terminal() {
            return;
        }
        warn!("Shard {}: {}", self.ctx.shard, reason);
        if let Some(reply) = self.pending_connect.take() {
            let _ = reply.send(Ok(ConnectOutcome::Failed));
        }
        self.close(RESUMABLE_CLOSURE);
    }

    fn close(&mut self, code: u16) {
        self.drop_socket(code);
        self.send_throttle.shutdown();
        self.presence_throttle.shutdown();
        if let Some(reply) = self.pending_connect.take() {
            let _ = reply.send(Ok(ConnectOutcome::Failed));
        }
        if self.transition(SessionState::Closed) {
            self.publish(LifecycleKind::Closed);
        }
    }

    fn resolve_connect(&mut self, outcome: ConnectOutcome) {
        if let Some(reply) = self.pending_connect.take() {
            let _ = reply.send(Ok(outcome));
        }
    }

    fn transition(&mut self, next: SessionState) -> bool {
        if self.state == next {
            return false;
        }
        if !self.state.can_transition_to(next) {
            debug!(
                "Shard {}: ignoring transition {:?} -> {:?}",
                self.ctx.shard, self.state, next
            );
            return false;
        }
        info!("Shard {}: {:?} -> {:?}", self.ctx.shard, self.state, next);
        self.state = next;
        true
    }

    fn publish(&self, kind: LifecycleKind) {
        let _ = self
            .ctx
            .lifecycle
            .send(LifecycleEvent::new(self.ctx.shard, self.ctx.handle_id, kind));
    }
}

/// Throttle handler writing into whichever socket is current
fn socket_writer(slot: SocketSlot, shard_id: u32) -> impl Fn(String) + Send + Sync + 'static {
    move |text| match slot.lock().as_ref() {
        Some(outgoing) => {
            if outgoing.try_send(SocketCommand::Text(text)).is_err() {
                warn!("Shard {}: socket writer unavailable, command dropped", shard_id);
            }
        }
        None => debug!("Shard {}: no socket, command dropped", shard_id),
    }
}

async fn next_frame(incoming: &mut Option<mpsc::Receiver<SocketFrame>>) -> SocketFrame {
    match incoming {
        Some(rx) => match rx.recv().await {
            Some(frame) => frame,
            None => {
                *incoming = None;
                SocketFrame::Error("socket closed".to_string())
            }
        },
        None => std::future::pending().await,
    }
}

async fn next_tick(heartbeat: &mut Option<Interval>) {
    match heartbeat {
        Some(interval) => {
            interval.tick().await;
        }
        None => std::future::pending::<()>().await,
    }
}
