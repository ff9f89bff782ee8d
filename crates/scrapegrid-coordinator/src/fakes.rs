//! In-memory shards for coordinator tests.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use scrapegrid_core::{
    RuntimeInfo, ScrapeHealth, ScrapeStatus, ScrapeStatusMap, TargetState, TargetsByJob,
    content_hash,
};
use scrapegrid_shard::{ShardClient, ShardError, ShardHandle, ShardResult};

/// A replica that applies pushed assignments to its own scrape map.
pub struct FakeShard {
    pub address: String,
    pub runtime: Mutex<RuntimeInfo>,
    pub scraping: Mutex<ScrapeStatusMap>,
    pub fail: AtomicBool,
    /// Adopt pushed configs (report their hash afterwards).
    pub accept_config: AtomicBool,
    pub pushes: AtomicUsize,
    pub config_pushes: AtomicUsize,
}

impl FakeShard {
    pub fn new(address: &str, config_hash: &str) -> Arc<Self> {
        Arc::new(Self {
            address: address.to_string(),
            runtime: Mutex::new(RuntimeInfo {
                head_series: 0,
                config_hash: config_hash.to_string(),
                idle_start_at: None,
            }),
            scraping: Mutex::new(ScrapeStatusMap::new()),
            fail: AtomicBool::new(false),
            accept_config: AtomicBool::new(true),
            pushes: AtomicUsize::new(0),
            config_pushes: AtomicUsize::new(0),
        })
    }

    /// Pretend every target has been scraped successfully a few times.
    pub fn settle(&self) {
        for status in self.scraping.lock().unwrap().values_mut() {
            status.health = ScrapeHealth::Good;
            status.scrape_times = 5;
        }
    }

    pub fn set_head(&self, head_series: i64) {
        self.runtime.lock().unwrap().head_series = head_series;
    }

    fn check(&self) -> ShardResult<()> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(ShardError::Transport {
                address: self.address.clone(),
                reason: "connection refused".to_string(),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl ShardClient for FakeShard {
    fn address(&self) -> &str {
        &self.address
    }

    async fn runtime(&self) -> ShardResult<RuntimeInfo> {
        self.check()?;
        Ok(self.runtime.lock().unwrap().clone())
    }

    async fn scrape_status(&self) -> ShardResult<ScrapeStatusMap> {
        self.check()?;
        Ok(self.scraping.lock().unwrap().clone())
    }

    async fn push_config(&self, raw: &[u8]) -> ShardResult<()> {
        self.check()?;
        self.config_pushes.fetch_add(1, Ordering::SeqCst);
        if self.accept_config.load(Ordering::SeqCst) {
            self.runtime.lock().unwrap().config_hash = content_hash(raw);
        }
        Ok(())
    }

    async fn push_targets(&self, targets: &TargetsByJob) -> ShardResult<()> {
        self.check()?;
        self.pushes.fetch_add(1, Ordering::SeqCst);
        let mut scraping = self.scraping.lock().unwrap();
        let mut next = ScrapeStatusMap::new();
        for t in targets.values().flatten() {
            let mut status = scraping
                .remove(&t.hash)
                .unwrap_or_else(|| ScrapeStatus::new(t.series));
            if status.state != t.state && t.state == TargetState::InTransfer {
                status.scrape_times = 0;
            }
            status.state = t.state;
            next.insert(t.hash, status);
        }
        self.runtime.lock().unwrap().head_series = next.values().map(|s| s.series).sum();
        *scraping = next;
        Ok(())
    }
}

/// A shard handle over `replicas` fresh fake replicas.
pub fn handle(id: &str, replicas: usize) -> (Arc<ShardHandle>, Vec<Arc<FakeShard>>) {
    let fakes: Vec<Arc<FakeShard>> = (0..replicas)
        .map(|i| FakeShard::new(&format!("{id}-{i}:8080"), ""))
        .collect();
    let clients = fakes
        .iter()
        .map(|f| f.clone() as Arc<dyn ShardClient>)
        .collect();
    (Arc::new(ShardHandle::new(id, clients)), fakes)
}
