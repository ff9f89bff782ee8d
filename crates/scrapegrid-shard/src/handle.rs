//! One logical shard.
//!
//! `ShardHandle` owns the replica group, the shard's identity and
//! readiness, and the last scrape-status map read from it. The cached map
//! is replaced whole on every successful read and cleared when every
//! replica fails; callers only ever get clones.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::{debug, info};

use scrapegrid_core::{RuntimeInfo, ScrapeStatusMap, ShardId, TargetsByJob};

use crate::client::ShardClient;
use crate::error::ShardResult;
use crate::replica::ReplicaGroup;

pub struct ShardHandle {
    id: ShardId,
    group: ReplicaGroup,
    ready: AtomicBool,
    scraping: Mutex<Option<ScrapeStatusMap>>,
}

impl ShardHandle {
    /// Create a ready shard backed by `clients`.
    pub fn new(id: impl Into<ShardId>, clients: Vec<Arc<dyn ShardClient>>) -> Self {
        Self {
            id: id.into(),
            group: ReplicaGroup::new(clients),
            ready: AtomicBool::new(true),
            scraping: Mutex::new(None),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn replicas(&self) -> Vec<String> {
        self.group.addresses()
    }

    pub fn is_ready(&self) -> bool {
        self.ready.load(Ordering::Acquire)
    }

    pub fn set_ready(&self, ready: bool) {
        let was = self.ready.swap(ready, Ordering::AcqRel);
        if was != ready {
            debug!(shard = %self.id, ready, "shard readiness changed");
        }
    }

    /// Read the shard's runtime; the replica reporting the most head series wins.
    pub async fn runtime(&self) -> ShardResult<RuntimeInfo> {
        let result = self
            .group
            .read(
                |c| async move { c.runtime().await },
                |a, b| a.head_series > b.head_series,
            )
            .await;
        if result.is_err() {
            self.forget_scraping();
        }
        result
    }

    /// Read what the shard scrapes; the replica reporting the most targets wins.
    ///
    /// Refreshes the cached map on success and clears it when all replicas fail.
    pub async fn scrape_status(&self) -> ShardResult<ScrapeStatusMap> {
        let successes = match self
            .group
            .broadcast(|c| async move { c.scrape_status().await })
            .await
        {
            Ok(s) => s,
            Err(e) => {
                self.forget_scraping();
                return Err(e);
            }
        };

        for (idx, reported) in &successes {
            self.group.observe_report(*idx, reported);
        }

        let best = successes
            .into_iter()
            .map(|(_, map)| map)
            .fold(ScrapeStatusMap::new(), |best, map| {
                if map.len() > best.len() { map } else { best }
            });

        *self.scraping() = Some(best.clone());
        Ok(best)
    }

    /// Last successfully read scrape status, empty if unknown.
    pub fn cached_scraping(&self) -> ScrapeStatusMap {
        self.scraping().clone().unwrap_or_default()
    }

    /// Push raw configuration to every replica.
    pub async fn push_config(&self, raw: &[u8]) -> ShardResult<()> {
        let result = self
            .group
            .write(|c| async move { c.push_config(raw).await })
            .await;
        if result.is_err() {
            self.forget_scraping();
        }
        result
    }

    /// Apply a new target assignment to the shard.
    pub async fn update_targets(&self, targets: &TargetsByJob) -> ShardResult<()> {
        match self.group.push_targets(targets).await {
            Ok(0) => Ok(()),
            Ok(pushed) => {
                let count: usize = targets.values().map(Vec::len).sum();
                info!(shard = %self.id, replicas = pushed, targets = count, "targets applied");
                Ok(())
            }
            Err(e) => {
                self.forget_scraping();
                Err(e)
            }
        }
    }

    /// Drop everything cached about this shard.
    pub fn invalidate(&self) {
        self.forget_scraping();
        self.group.invalidate();
    }

    fn scraping(&self) -> MutexGuard<'_, Option<ScrapeStatusMap>> {
        self.scraping.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn forget_scraping(&self) {
        let mut cached = self.scraping();
        if cached.take().is_some() {
            debug!(shard = %self.id, "cached scrape status invalidated");
        }
    }
}

impl std::fmt::Debug for ShardHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ShardHandle")
            .field("id", &self.id)
            .field("replicas", &self.group.addresses())
            .field("ready", &self.is_ready())
            .finish()
    }
}
