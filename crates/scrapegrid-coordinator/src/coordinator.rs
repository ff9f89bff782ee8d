//! The reconcile loop.

use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::time::Duration;

use futures::future::join_all;
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

use scrapegrid_core::{ScrapeStatusMap, TargetsByJob, epoch_secs};
use scrapegrid_explore::Explorer;
use scrapegrid_rebalance::RebalanceEngine;
use scrapegrid_rebalance::shard_info::ShardSummary;

use crate::collector::collect;
use crate::discovery::Discovery;
use crate::error::{CoordinatorError, CoordinatorResult};
use crate::manager::ShardManager;
use crate::reload::ConfigStore;

/// What the last completed cycle saw and decided.
#[derive(Debug, Clone, Default)]
pub struct CycleSnapshot {
    pub active: TargetsByJob,
    pub dropped: TargetsByJob,
    pub global_status: ScrapeStatusMap,
    pub shards: Vec<ShardSummary>,
    pub desired_shards: i32,
    pub need_space: i64,
    pub transfers: usize,
    /// Completed cycles since start.
    pub cycles: u64,
    /// Unix timestamp (seconds) of the last completed cycle.
    pub last_cycle_at: Option<u64>,
}

pub struct Coordinator {
    manager: Arc<dyn ShardManager>,
    discovery: Arc<dyn Discovery>,
    explorer: Explorer,
    config: ConfigStore,
    engine: Mutex<RebalanceEngine>,
    interval: Duration,
    snapshot: RwLock<Arc<CycleSnapshot>>,
}

impl Coordinator {
    pub fn new(
        manager: Arc<dyn ShardManager>,
        discovery: Arc<dyn Discovery>,
        explorer: Explorer,
        config: ConfigStore,
    ) -> CoordinatorResult<Self> {
        let options = config.current().options()?;
        Ok(Self {
            manager,
            discovery,
            explorer,
            config,
            engine: Mutex::new(RebalanceEngine::new(options)),
            interval: options.reconcile_interval,
            snapshot: RwLock::new(Arc::new(CycleSnapshot::default())),
        })
    }

    pub fn explorer(&self) -> &Explorer {
        &self.explorer
    }

    pub fn config(&self) -> &ConfigStore {
        &self.config
    }

    /// Result of the last completed cycle.
    pub fn snapshot(&self) -> Arc<CycleSnapshot> {
        self.snapshot.read().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// One full cycle: collect, plan, apply, rescale.
    pub async fn run_once(&self) -> CoordinatorResult<Arc<CycleSnapshot>> {
        let config = self.config.current();
        let shards = self.manager.shards();
        if shards.is_empty() {
            return Err(CoordinatorError::Manager("shard pool is empty".to_string()));
        }

        let active = self.discovery.active_targets();
        let dropped = self.discovery.dropped_targets();
        self.explorer.update_targets(&active);

        let mut infos = collect(&shards, &config).await;
        let plan = {
            let mut engine = self.engine.lock().unwrap_or_else(PoisonError::into_inner);
            engine.plan(&mut infos, &active, &self.explorer, epoch_secs())
        };

        let pushes = shards
            .iter()
            .zip(&infos)
            .filter(|(_, info)| info.changeable)
            .map(|(shard, info)| async move {
                if let Err(e) = shard.update_targets(&info.new_targets).await {
                    warn!(shard = %shard.id(), error = %e, "failed to apply targets");
                }
            });
        join_all(pushes).await;

        if let Err(e) = self.manager.change_scale(plan.desired_shards).await {
            warn!(desired = plan.desired_shards, error = %e, "failed to change pool scale");
        }

        let previous = self.snapshot();
        let next = Arc::new(CycleSnapshot {
            active,
            dropped,
            global_status: plan.global_status,
            shards: infos.iter().map(|i| i.summary()).collect(),
            desired_shards: plan.desired_shards,
            need_space: plan.need_space,
            transfers: plan.transfers,
            cycles: previous.cycles + 1,
            last_cycle_at: Some(epoch_secs()),
        });
        *self.snapshot.write().unwrap_or_else(PoisonError::into_inner) = next.clone();
        debug!(cycle = next.cycles, "cycle complete");
        Ok(next)
    }

    /// Run cycles every `reconcile_interval` until `shutdown` fires.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        info!(interval_ms = self.interval.as_millis() as u64, "coordinator started");

        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(e) = self.run_once().await {
                        error!(error = %e, "reconcile cycle failed");
                    }
                }
                _ = shutdown.changed() => {
                    info!("coordinator shutting down");
                    break;
                }
            }
        }
    }
}
