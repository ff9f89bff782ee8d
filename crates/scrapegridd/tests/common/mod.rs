//! Shared fixtures: in-memory shards, a fixed-answer scraper, and a fully
//! wired coordinator over them.

#![allow(dead_code)]

use std::io::Write;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::watch;

use scrapegrid_coordinator::{
    ConfigStore, Coordinator, Reloader, StaticDiscovery, StaticShardManager,
};
use scrapegrid_core::{
    LoadedConfig, RuntimeInfo, ScrapeHealth, ScrapeStatus, ScrapeStatusMap, Target, TargetState,
    TargetsByJob, content_hash,
};
use scrapegrid_explore::{Explorer, ScrapeError, Scraper};
use scrapegrid_shard::{ShardClient, ShardError, ShardHandle, ShardResult};

pub const CONFIG: &str = r#"
[coordinator]
max_series_per_shard = 100
max_shard_count = 3
reconcile_interval = "1s"

[explore]
retry_interval = "1s"

[[shards]]
id = "shard-0"
replicas = ["127.0.0.1:1"]

[[jobs]]
name = "node"

[[jobs.targets]]
url = "http://10.0.0.1:9100/metrics"
labels = { env = "prod" }

[[jobs.targets]]
url = "http://10.0.0.2:9100/metrics"
labels = { env = "prod" }

[[jobs.targets]]
url = "http://10.0.0.3:9100/metrics"
labels = { env = "dev" }

[[jobs.relabel]]
source_labels = ["env"]
regex = "prod"
action = "keep"
"#;

/// One shard replica living in memory. Pushed assignments become its scrape
/// set; `settle` simulates a few successful scrapes of everything.
pub struct MemoryShard {
    pub address: String,
    pub runtime: Mutex<RuntimeInfo>,
    pub scraping: Mutex<ScrapeStatusMap>,
    pub down: AtomicBool,
    pub target_pushes: AtomicUsize,
    pub config_pushes: AtomicUsize,
}

impl MemoryShard {
    pub fn new(address: &str) -> Arc<Self> {
        Arc::new(Self {
            address: address.to_string(),
            runtime: Mutex::new(RuntimeInfo::default()),
            scraping: Mutex::new(ScrapeStatusMap::new()),
            down: AtomicBool::new(false),
            target_pushes: AtomicUsize::new(0),
            config_pushes: AtomicUsize::new(0),
        })
    }

    pub fn settle(&self) {
        for status in self.scraping.lock().unwrap().values_mut() {
            status.health = ScrapeHealth::Good;
            status.scrape_times += 3;
        }
    }

    pub fn targets(&self) -> usize {
        self.scraping.lock().unwrap().len()
    }

    fn check(&self) -> ShardResult<()> {
        if self.down.load(Ordering::SeqCst) {
            return Err(ShardError::Transport {
                address: self.address.clone(),
                reason: "connection refused".to_string(),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl ShardClient for MemoryShard {
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
        self.runtime.lock().unwrap().config_hash = content_hash(raw);
        Ok(())
    }

    async fn push_targets(&self, targets: &TargetsByJob) -> ShardResult<()> {
        self.check()?;
        self.target_pushes.fetch_add(1, Ordering::SeqCst);
        let mut scraping = self.scraping.lock().unwrap();
        let mut next = ScrapeStatusMap::new();
        for t in targets.values().flatten() {
            let mut status = scraping
                .remove(&t.hash)
                .unwrap_or_else(|| ScrapeStatus::new(t.series));
            if t.state == TargetState::InTransfer && status.state != t.state {
                status.scrape_times = 0;
            }
            status.state = t.state;
            next.insert(t.hash, status);
        }
        let mut runtime = self.runtime.lock().unwrap();
        runtime.head_series = next.values().map(|s| s.series).sum();
        runtime.idle_start_at = None;
        *scraping = next;
        Ok(())
    }
}

/// Scraper that reports the same series count for every target.
pub struct FixedScraper(pub i64);

#[async_trait]
impl Scraper for FixedScraper {
    async fn scrape(&self, _target: &Target) -> Result<i64, ScrapeError> {
        Ok(self.0)
    }
}

pub struct Harness {
    pub coordinator: Arc<Coordinator>,
    pub reloader: Arc<Reloader>,
    pub manager: Arc<StaticShardManager>,
    pub shards: Vec<Arc<MemoryShard>>,
    pub config_file: tempfile::NamedTempFile,
    pub shutdown: watch::Sender<bool>,
}

/// A coordinator over `shard_count` single-replica memory shards, with its
/// explorer workers running.
pub fn harness(series: i64, shard_count: usize) -> Harness {
    let mut config_file = tempfile::NamedTempFile::new().unwrap();
    config_file.write_all(CONFIG.as_bytes()).unwrap();
    config_file.flush().unwrap();

    let loaded = LoadedConfig::from_file(config_file.path()).unwrap();
    let discovery = Arc::new(StaticDiscovery::from_config(&loaded.config).unwrap());

    let shards: Vec<Arc<MemoryShard>> = (0..shard_count)
        .map(|i| MemoryShard::new(&format!("shard-{i}:8080")))
        .collect();
    let handles: Vec<Arc<ShardHandle>> = shards
        .iter()
        .enumerate()
        .map(|(i, shard)| {
            let client: Arc<dyn ShardClient> = shard.clone();
            Arc::new(ShardHandle::new(format!("shard-{i}"), vec![client]))
        })
        .collect();
    let manager = Arc::new(StaticShardManager::new(handles).unwrap());

    let explorer = Explorer::new(Arc::new(FixedScraper(series)), 64, Duration::from_secs(1));
    let (shutdown, rx) = watch::channel(false);
    let workers = explorer.clone();
    tokio::spawn(async move { workers.run(2, rx).await });

    let store = ConfigStore::new(loaded);
    let coordinator = Arc::new(
        Coordinator::new(manager.clone(), discovery.clone(), explorer.clone(), store.clone()).unwrap(),
    );
    let reloader = Arc::new(Reloader::new(config_file.path(), store, discovery, explorer));

    Harness {
        coordinator,
        reloader,
        manager,
        shards,
        config_file,
        shutdown,
    }
}

impl Harness {
    /// Run cycles until the explorer has estimated every active target and
    /// they have been placed.
    pub async fn run_until_placed(&self) {
        for _ in 0..100 {
            let snap = self.coordinator.run_once().await.unwrap();
            let placed = snap
                .global_status
                .values()
                .all(|s| !s.shards.is_empty());
            if placed && !snap.global_status.is_empty() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        panic!("targets were never placed");
    }

    pub fn settle_all(&self) {
        for shard in &self.shards {
            shard.settle();
        }
    }
}
