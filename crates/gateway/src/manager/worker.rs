use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use futures_util::future::join_all;
use log::{debug, error, info, warn};
use shardline_core::{ConnectOutcome, ShardInfo};
use shardline_ports::ShardCondition;
use tokio::sync::{broadcast, mpsc, oneshot};
use uuid::Uuid;

use super::launcher::{LaunchContext, ShardLauncher};
use super::queue::ShardConnectQueue;
use super::registry::ShardRegistry;
use super::ShardManagerConfig;
use crate::error::{ControlError, LaunchError};
use crate::session::{LifecycleEvent, LifecycleKind, ShardSessionHandle};

// ============================================================================
// Commands
// ============================================================================

enum ManagerCommand {
    Offer(u32),
    RestartShard(u32),
    /// Gating conditions evaluated for an attempt
    ConditionsChecked { shard: u32, attempt: Uuid, passed: bool },
    /// Launcher finished deploying an attempt
    Launched {
        shard: u32,
        attempt: Uuid,
        result: Result<ShardSessionHandle, LaunchError>,
    },
    /// A deployed session answered CONNECT
    ConnectResult {
        shard: u32,
        attempt: Uuid,
        outcome: Result<ConnectOutcome, ControlError>,
    },
    /// Identify spacing has elapsed
    CooldownElapsed,
    Status { reply: oneshot::Sender<ManagerStatus> },
    Shutdown { reply: oneshot::Sender<()> },
}

/// Where the connect pipeline currently is
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Idle,
    /// `attempt` doubles as the handle id of the session being deployed
    Connecting { shard: u32, attempt: Uuid },
    CoolingDown,
}

/// Snapshot of the connect pipeline
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManagerStatus {
    /// Shards waiting, in connect order
    pub queued: Vec<u32>,
    /// Shard whose connect attempt is in progress
    pub in_flight: Option<u32>,
    pub cooling_down: bool,
}

// ============================================================================
// Public handle
// ============================================================================

/// Sequential, gated shard bring-up
///
/// All queue state lives in a single worker task. Each step of a connect
/// attempt (gating, deploy, connect) runs in its own task and reports back
/// to the worker as a command, so the queue never recurses and never blocks
/// on a slow shard. Replies are tagged with the attempt's handle id; a reply
/// for an attempt that is no longer in flight is ignored.
pub struct ShardManager {
    commands: mpsc::UnboundedSender<ManagerCommand>,
    registry: Arc<ShardRegistry>,
    observers: broadcast::Sender<LifecycleEvent>,
    config: ShardManagerConfig,
}

impl ShardManager {
    /// Start the manager's worker task
    ///
    /// Must be called from within a tokio runtime. Nothing connects until ids
    /// are added with [`ShardManager::add_to_connect_queue`].
    pub fn start(
        config: ShardManagerConfig,
        launcher: Arc<dyn ShardLauncher>,
        conditions: Vec<Arc<dyn ShardCondition>>,
        registry: Arc<ShardRegistry>,
    ) -> Self {
        let (commands_tx, commands_rx) = mpsc::unbounded_channel();
        let (lifecycle_tx, lifecycle_rx) = mpsc::unbounded_channel();
        let (observers, _) = broadcast::channel(config.lifecycle_capacity.max(1));

        let worker = ManagerWorker {
            config: config.clone(),
            launcher,
            conditions: Arc::new(conditions),
            registry: Arc::clone(&registry),
            queue: ShardConnectQueue::new(),
            phase: Phase::Idle,
            commands: commands_tx.downgrade(),
            lifecycle: lifecycle_tx,
            observers: observers.clone(),
        };
        tokio::spawn(worker.run(commands_rx, lifecycle_rx));

        ShardManager {
            commands: commands_tx,
            registry,
            observers,
            config,
        }
    }

    pub fn config(&self) -> &ShardManagerConfig {
        &self.config
    }

    pub fn registry(&self) -> &Arc<ShardRegistry> {
        &self.registry
    }

    /// Queue a shard for connection; duplicates are ignored
    pub fn add_to_connect_queue(&self, shard_id: u32) {
        self.post(ManagerCommand::Offer(shard_id));
    }

    /// Tear down a shard's session and queue it again
    pub fn restart_shard(&self, shard_id: u32) {
        self.post(ManagerCommand::RestartShard(shard_id));
    }

    pub async fn is_connected(&self, shard_id: u32) -> bool {
        match self.registry.get(shard_id) {
            Some(handle) => handle.is_connected().await,
            None => false,
        }
    }

    pub async fn latency(&self, shard_id: u32) -> Option<Duration> {
        self.registry.get(shard_id)?.latency().await
    }

    pub async fn trace(&self, shard_id: u32) -> Vec<String> {
        match self.registry.get(shard_id) {
            Some(handle) => handle.trace().await,
            None => Vec::new(),
        }
    }

    /// Lifecycle milestones of every session, current and replaced
    pub fn subscribe_lifecycle(&self) -> broadcast::Receiver<LifecycleEvent> {
        self.observers.subscribe()
    }

    pub async fn status(&self) -> Option<ManagerStatus> {
        let (reply, rx) = oneshot::channel();
        self.post(ManagerCommand::Status { reply });
        rx.await.ok()
    }

    /// Stop the worker and shut every session down
    pub async fn shutdown(&self) {
        let (reply, rx) = oneshot::channel();
        self.post(ManagerCommand::Shutdown { reply });
        let _ = rx.await;
    }

    fn post(&self, command: ManagerCommand) {
        if self.commands.send(command).is_err() {
            debug!("Shard manager stopped, command dropped");
        }
    }
}

// ============================================================================
// Worker
// ============================================================================

struct ManagerWorker {
    config: ShardManagerConfig,
    launcher: Arc<dyn ShardLauncher>,
    conditions: Arc<Vec<Arc<dyn ShardCondition>>>,
    registry: Arc<ShardRegistry>,
    queue: ShardConnectQueue,
    phase: Phase,
    /// Weak so dropping the last `ShardManager` stops the worker
    commands: mpsc::WeakUnboundedSender<ManagerCommand>,
    lifecycle: mpsc::UnboundedSender<LifecycleEvent>,
    observers: broadcast::Sender<LifecycleEvent>,
}

impl ManagerWorker {
    async fn run(
        mut self,
        mut commands: mpsc::UnboundedReceiver<ManagerCommand>,
        mut lifecycle: mpsc::UnboundedReceiver<LifecycleEvent>,
    ) {
        loop {
            tokio::select! {
                command = commands.recv() => match command {
                    Some(ManagerCommand::Shutdown { reply }) => {
                        self.stop();
                        let _ = reply.send(());
                        break;
                    }
                    Some(command) => self.handle(command),
                    None => {
                        self.stop();
                        break;
                    }
                },
                Some(event) = lifecycle.recv() => self.on_lifecycle(event),
            }
        }
        debug!("Shard manager stopped");
    }

    fn handle(&mut self, command: ManagerCommand) {
        match command {
            ManagerCommand::Offer(shard) => {
                if shard >= self.config.shard_count {
                    warn!(
                        "Shard {} out of range (count {}), ignoring",
                        shard, self.config.shard_count
                    );
                    return;
                }
                self.queue.offer(shard);
                self.run_next();
            }
            ManagerCommand::RestartShard(shard) => self.restart(shard),
            ManagerCommand::ConditionsChecked {
                shard,
                attempt,
                passed,
            } => self.on_conditions(shard, attempt, passed),
            ManagerCommand::Launched {
                shard,
                attempt,
                result,
            } => self.on_launched(shard, attempt, result),
            ManagerCommand::ConnectResult {
                shard,
                attempt,
                outcome,
            } => self.on_connect_result(shard, attempt, outcome),
            ManagerCommand::CooldownElapsed => {
                if self.phase == Phase::CoolingDown {
                    self.phase = Phase::Idle;
                }
                self.run_next();
            }
            ManagerCommand::Status { reply } => {
                let in_flight = match self.phase {
                    Phase::Connecting { shard, .. } => Some(shard),
                    _ => None,
                };
                let _ = reply.send(ManagerStatus {
                    queued: self.queue.snapshot(),
                    in_flight,
                    cooling_down: self.phase == Phase::CoolingDown,
                });
            }
            ManagerCommand::Shutdown { .. } => {}
        }
    }

    // ========================================================================
    // Connect procedure
    // ========================================================================

    /// No-op unless idle
    fn run_next(&mut self) {
        if self.phase != Phase::Idle {
            return;
        }
        let Some(shard) = self.queue.pop() else {
            return;
        };
        let attempt = Uuid::new_v4();
        debug!("Shard {}: starting connect attempt {}", shard, attempt);
        self.phase = Phase::Connecting { shard, attempt };
        self.check_conditions(shard, attempt, None);
    }

    fn check_conditions(&self, shard: u32, attempt: Uuid, delay: Option<Duration>) {
        let conditions = Arc::clone(&self.conditions);
        self.spawn_step(async move {
            if let Some(delay) = delay {
                tokio::time::sleep(delay).await;
            }
            let checks = join_all(conditions.iter().map(|c| c.pre_check(shard))).await;
            let mut passed = true;
            for check in checks {
                match check {
                    Ok(true) => {}
                    Ok(false) => passed = false,
                    Err(e) => {
                        warn!("Shard {}: gating condition failed: {}", shard, e);
                        passed = false;
                    }
                }
            }
            ManagerCommand::ConditionsChecked {
                shard,
                attempt,
                passed,
            }
        });
    }

    fn on_conditions(&mut self, shard: u32, attempt: Uuid, passed: bool) {
        if !self.is_in_flight(shard, attempt) {
            debug!("Shard {}: stale gating result ignored", shard);
            return;
        }
        if !passed {
            debug!(
                "Shard {}: gating conditions not met, retrying in {:?}",
                shard, self.config.condition_retry
            );
            self.check_conditions(shard, attempt, Some(self.config.condition_retry));
            return;
        }

        self.undeploy(shard);
        let ctx = LaunchContext {
            shard: ShardInfo::new(shard, self.config.shard_count),
            handle_id: attempt,
            lifecycle: self.lifecycle.clone(),
        };
        let launcher = Arc::clone(&self.launcher);
        self.spawn_step(async move {
            let result = launcher.launch(ctx).await;
            ManagerCommand::Launched {
                shard,
                attempt,
                result,
            }
        });
    }

    fn on_launched(
        &mut self,
        shard: u32,
        attempt: Uuid,
        result: Result<ShardSessionHandle, LaunchError>,
    ) {
        if !self.is_in_flight(shard, attempt) {
            if let Ok(handle) = result {
                debug!("Shard {}: discarding session for abandoned attempt", shard);
                handle.shutdown();
            }
            return;
        }

        match result {
            Ok(handle) => {
                self.registry.insert(handle.clone());
                self.spawn_step(async move {
                    let outcome = handle.connect().await;
                    ManagerCommand::ConnectResult {
                        shard,
                        attempt,
                        outcome,
                    }
                });
            }
            Err(e) => {
                error!("Shard {}: {}", shard, e);
                self.requeue_and_advance(shard);
            }
        }
    }

    fn on_connect_result(
        &mut self,
        shard: u32,
        attempt: Uuid,
        outcome: Result<ConnectOutcome, ControlError>,
    ) {
        if !self.is_in_flight(shard, attempt) {
            warn!("Shard {}: ignoring reply from replaced session {}", shard, attempt);
            return;
        }

        let outcome = match outcome {
            Ok(outcome) => outcome,
            Err(e) => {
                warn!("Shard {}: connect failed: {}", shard, e);
                ConnectOutcome::Failed
            }
        };
        if outcome.needs_requeue() {
            // Conditions only hear about attempts that reached the gateway
            warn!("Shard {}: connect failed, re-queueing", shard);
            self.undeploy(shard);
            self.requeue_and_advance(shard);
            return;
        }
        for condition in self.conditions.iter() {
            condition.on_result(shard, &outcome);
        }

        match &outcome {
            ConnectOutcome::Ready => {
                info!("Shard {}: connected, identify spacing {:?}", shard, self.config.identify_spacing);
                self.phase = Phase::CoolingDown;
                let spacing = self.config.identify_spacing;
                self.spawn_step(async move {
                    tokio::time::sleep(spacing).await;
                    ManagerCommand::CooldownElapsed
                });
                return;
            }
            ConnectOutcome::Unrecognized(state) => {
                warn!("Shard {}: unrecognized connect state {}, continuing", shard, state);
            }
            _ => info!("Shard {}: resumed", shard),
        }
        self.phase = Phase::Idle;
        self.run_next();
    }

    fn requeue_and_advance(&mut self, shard: u32) {
        self.queue.offer(shard);
        self.phase = Phase::Idle;
        self.run_next();
    }

    // ========================================================================
    // Restarts and lifecycle
    // ========================================================================

    fn restart(&mut self, shard: u32) {
        info!("Shard {}: restart requested", shard);
        self.undeploy(shard);
        if let Phase::Connecting { shard: in_flight, .. } = self.phase {
            if in_flight == shard {
                // Releases the slot; the late reply will not match any attempt
                self.phase = Phase::Idle;
            }
        }
        self.queue.offer(shard);
        self.run_next();
    }

    fn on_lifecycle(&mut self, event: LifecycleEvent) {
        let _ = self.observers.send(event.clone());
        if event.kind != LifecycleKind::Closed {
            return;
        }
        let shard = event.shard.id;
        if !self.registry.is_current(shard, event.handle_id) {
            debug!("Shard {}: close of replaced session ignored", shard);
            return;
        }
        if matches!(self.phase, Phase::Connecting { shard: s, .. } if s == shard) {
            // The connect reply decides what happens next
            return;
        }
        info!("Shard {}: session closed, re-queueing", shard);
        self.queue.offer(shard);
        self.run_next();
    }

    fn undeploy(&self, shard: u32) {
        if let Some(previous) = self.registry.remove(shard) {
            debug!("Shard {}: undeploying session {}", shard, previous.id());
            previous.shutdown();
        }
    }

    fn stop(&mut self) {
        for handle in self.registry.drain() {
            handle.shutdown();
        }
        info!("Shard manager shut down");
    }

    // ========================================================================
    // Helpers
    // ========================================================================

    fn is_in_flight(&self, shard: u32, attempt: Uuid) -> bool {
        self.phase == Phase::Connecting { shard, attempt }
    }

    /// Run `step` in its own task and feed its result back to the worker
    fn spawn_step<F>(&self, step: F)
    where
        F: Future<Output = ManagerCommand> + Send + 'static,
    {
        let commands = self.commands.clone();
        tokio::spawn(async move {
            let command = step.await;
            if let Some(commands) = commands.upgrade() {
                let _ = commands.send(command);
            }
        });
    }
}
