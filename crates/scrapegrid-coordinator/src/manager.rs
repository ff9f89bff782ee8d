//! Shard pool lifecycle.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tracing::info;

use scrapegrid_core::ScrapegridConfig;
use scrapegrid_shard::{HttpShardClient, ShardClient, ShardHandle};

use crate::error::{CoordinatorError, CoordinatorResult};

/// Owner of the ordered shard pool.
#[async_trait]
pub trait ShardManager: Send + Sync {
    /// The current pool, in placement order.
    fn shards(&self) -> Vec<Arc<ShardHandle>>;

    /// Request a pool of `desired` shards. Returns without waiting for new
    /// shards to become ready.
    async fn change_scale(&self, desired: i32) -> CoordinatorResult<()>;
}

/// A fixed set of configured shards of which a prefix is active.
pub struct StaticShardManager {
    all: Vec<Arc<ShardHandle>>,
    active: AtomicUsize,
}

impl StaticShardManager {
    /// Pool over `handles`, starting with one active shard.
    pub fn new(handles: Vec<Arc<ShardHandle>>) -> CoordinatorResult<Self> {
        if handles.is_empty() {
            return Err(CoordinatorError::Manager("no shards configured".to_string()));
        }
        for extra in &handles[1..] {
            extra.set_ready(false);
        }
        Ok(Self {
            all: handles,
            active: AtomicUsize::new(1),
        })
    }

    /// Build HTTP-backed shards from `[[shards]]`.
    pub fn from_config(config: &ScrapegridConfig, timeout: Duration) -> CoordinatorResult<Self> {
        let handles = config
            .shards
            .iter()
            .map(|shard| {
                let clients = shard
                    .replicas
                    .iter()
                    .map(|addr| Arc::new(HttpShardClient::new(addr.clone(), timeout)) as Arc<dyn ShardClient>)
                    .collect();
                Arc::new(ShardHandle::new(shard.id.clone(), clients))
            })
            .collect();
        Self::new(handles)
    }

    pub fn active_count(&self) -> usize {
        self.active.load(Ordering::Acquire)
    }

    pub fn configured_count(&self) -> usize {
        self.all.len()
    }
}

#[async_trait]
impl ShardManager for StaticShardManager {
    fn shards(&self) -> Vec<Arc<ShardHandle>> {
        self.all[..self.active_count()].to_vec()
    }

    async fn change_scale(&self, desired: i32) -> CoordinatorResult<()> {
        let next = usize::try_from(desired).unwrap_or(0).clamp(1, self.all.len());
        let prev = self.active.swap(next, Ordering::AcqRel);
        if prev == next {
            return Ok(());
        }

        for (idx, shard) in self.all.iter().enumerate() {
            shard.set_ready(idx < next);
        }
        info!(from = prev, to = next, requested = desired, "shard pool rescaled");
        Ok(())
    }
}
