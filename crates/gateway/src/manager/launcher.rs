use std::sync::Arc;

use async_trait::async_trait;
use shardline_core::ShardInfo;
use shardline_ports::{CacheWorker, EventIngest, SessionStore};
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::error::LaunchError;
use crate::session::{LifecycleEvent, SessionConfig, SessionContext, ShardSession, ShardSessionHandle};
use crate::throttle::WindowRegistry;
use crate::transport::GatewayConnector;

/// What the manager hands a launcher for one deployment
#[derive(Clone)]
pub struct LaunchContext {
    pub shard: ShardInfo,
    /// Identity the new session must carry
    pub handle_id: Uuid,
    /// Where the session reports lifecycle milestones
    pub lifecycle: mpsc::UnboundedSender<LifecycleEvent>,
}

/// Deploys shard sessions for the manager
#[async_trait]
pub trait ShardLauncher: Send + Sync {
    async fn launch(&self, ctx: LaunchContext) -> Result<ShardSessionHandle, LaunchError>;
}

/// Launcher deploying real [`ShardSession`] actors
pub struct SessionLauncher {
    config: SessionConfig,
    connector: Arc<dyn GatewayConnector>,
    store: Arc<dyn SessionStore>,
    ingest: Arc<dyn EventIngest>,
    cache: Arc<dyn CacheWorker>,
    windows: Arc<WindowRegistry>,
}

impl SessionLauncher {
    pub fn new(
        config: SessionConfig,
        connector: Arc<dyn GatewayConnector>,
        store: Arc<dyn SessionStore>,
        ingest: Arc<dyn EventIngest>,
        cache: Arc<dyn CacheWorker>,
        windows: Arc<WindowRegistry>,
    ) -> Self {
        SessionLauncher {
            config,
            connector,
            store,
            ingest,
            cache,
            windows,
        }
    }
}

#[async_trait]
impl ShardLauncher for SessionLauncher {
    async fn launch(&self, ctx: LaunchContext) -> Result<ShardSessionHandle, LaunchError> {
        if tokio::runtime::Handle::try_current().is_err() {
            return Err(LaunchError::NoRuntime(ctx.shard.id));
        }
        Ok(ShardSession::spawn(SessionContext {
            shard: ctx.shard,
            handle_id: ctx.handle_id,
            config: self.config.clone(),
            connector: Arc::clone(&self.connector),
            store: Arc::clone(&self.store),
            ingest: Arc::clone(&self.ingest),
            cache: Arc::clone(&self.cache),
            windows: Arc::clone(&self.windows),
            lifecycle: ctx.lifecycle,
        }))
    }
}
