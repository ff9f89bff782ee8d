//! The target explorer.
//!
//! Tracks every discovered target the coordinator has asked about and
//! samples each one up to [`MAX_EXPLORE_TIMES`] times through a bounded
//! worker pool. The engine reads results synchronously through
//! [`Explorer::get`]; workers are the only writers of scrape results.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use serde::Serialize;
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

use scrapegrid_core::{
    ConfigResult, ScrapeStatus, ScrapegridConfig, Target, TargetHash, TargetsByJob, epoch_millis,
};

use crate::scraper::Scraper;

/// Successful samples taken per target before its estimate is final.
pub const MAX_EXPLORE_TIMES: u32 = 2;

/// Per-job exploration counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct JobStats {
    pub explored: u64,
    pub failed: u64,
}

struct ExploringTarget {
    target: Target,
    status: ScrapeStatus,
    explored: u32,
    /// Sitting in the queue or waiting out a retry back-off.
    queued: bool,
}

impl ExploringTarget {
    fn new(target: Target) -> Self {
        Self {
            target,
            status: ScrapeStatus::new(0),
            explored: 0,
            queued: false,
        }
    }
}

#[derive(Default)]
struct ExplorerState {
    jobs: HashMap<String, HashMap<TargetHash, ExploringTarget>>,
    stats: BTreeMap<String, JobStats>,
}

type QueueItem = (String, TargetHash);

/// Bounded-concurrency cardinality sampler. Cheap to clone.
#[derive(Clone)]
pub struct Explorer {
    scraper: Arc<dyn Scraper>,
    state: Arc<Mutex<ExplorerState>>,
    queue_tx: mpsc::Sender<QueueItem>,
    queue_rx: Arc<tokio::sync::Mutex<mpsc::Receiver<QueueItem>>>,
    retry_interval: Duration,
}

impl Explorer {
    pub fn new(scraper: Arc<dyn Scraper>, queue_size: usize, retry_interval: Duration) -> Self {
        let (queue_tx, queue_rx) = mpsc::channel(queue_size.max(1));
        Self {
            scraper,
            state: Arc::new(Mutex::new(ExplorerState::default())),
            queue_tx,
            queue_rx: Arc::new(tokio::sync::Mutex::new(queue_rx)),
            retry_interval,
        }
    }

    fn lock(&self) -> MutexGuard<'_, ExplorerState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Latest estimate for `target`.
    ///
    /// The first lookup registers the target, enqueues it and returns
    /// `None`. Later lookups return the current status, re-attempting the
    /// enqueue if the queue was full the last time.
    pub fn get(&self, job: &str, target: &Target) -> Option<ScrapeStatus> {
        let mut state = self.lock();
        let entries = state.jobs.entry(job.to_string()).or_default();

        let known = entries.contains_key(&target.hash);
        if !known {
            debug!(job, hash = target.hash, url = %target.url, "exploring new target");
        }
        let entry = entries
            .entry(target.hash)
            .or_insert_with(|| ExploringTarget::new(target.clone()));
        let status = known.then(|| entry.status.clone());

        if !entry.queued && entry.explored < MAX_EXPLORE_TIMES {
            entry.queued = self.queue_tx.try_send((job.to_string(), target.hash)).is_ok();
        }
        status
    }

    /// Current status without registering or enqueueing anything.
    pub fn estimate(&self, job: &str, hash: TargetHash) -> Option<ScrapeStatus> {
        let state = self.lock();
        state
            .jobs
            .get(job)
            .and_then(|entries| entries.get(&hash))
            .map(|entry| entry.status.clone())
    }

    /// Replace the known target set. Progress on targets that survive is
    /// kept; everything else is forgotten, which also cancels its retries.
    pub fn update_targets(&self, active: &TargetsByJob) {
        let mut state = self.lock();
        let mut previous = std::mem::take(&mut state.jobs);

        for (job, targets) in active {
            let mut old = previous.remove(job).unwrap_or_default();
            let next: HashMap<_, _> = targets
                .iter()
                .map(|t| {
                    let entry = old
                        .remove(&t.hash)
                        .unwrap_or_else(|| ExploringTarget::new(t.clone()));
                    (t.hash, entry)
                })
                .collect();
            state.jobs.insert(job.clone(), next);
        }
    }

    /// Pick up a new configuration and drop state for jobs it no longer has.
    pub fn apply_config(&self, config: &ScrapegridConfig) -> ConfigResult<()> {
        self.scraper.apply_config(config)?;

        let mut state = self.lock();
        state.jobs.retain(|job, _| config.job(job).is_some());
        state.stats.retain(|job, _| config.job(job).is_some());
        Ok(())
    }

    /// Snapshot of the per-job counters.
    pub fn job_stats(&self) -> BTreeMap<String, JobStats> {
        self.lock().stats.clone()
    }

    /// Run `concurrency` workers until `shutdown` fires.
    pub async fn run(&self, concurrency: usize, shutdown: watch::Receiver<bool>) {
        let workers = concurrency.max(1);
        info!(workers, "explorer started");

        let handles = (0..workers).map(|_| {
            let this = self.clone();
            let shutdown = shutdown.clone();
            tokio::spawn(async move { this.worker(shutdown).await })
        });
        futures::future::join_all(handles).await;

        info!("explorer stopped");
    }

    async fn worker(&self, mut shutdown: watch::Receiver<bool>) {
        loop {
            let next = {
                let mut rx = self.queue_rx.lock().await;
                tokio::select! {
                    item = rx.recv() => item,
                    _ = shutdown.changed() => None,
                }
            };
            match next {
                Some((job, hash)) => self.explore_once(&job, hash, &shutdown).await,
                None => break,
            }
        }
    }

    /// Sample one target and record the outcome. A failed target is
    /// requeued after `retry_interval` unless `shutdown` fires first.
    async fn explore_once(&self, job: &str, hash: TargetHash, shutdown: &watch::Receiver<bool>) {
        let target = {
            let state = self.lock();
            match state.jobs.get(job).and_then(|e| e.get(&hash)) {
                Some(entry) => entry.target.clone(),
                None => return,
            }
        };

        let started_ms = epoch_millis();
        let started = tokio::time::Instant::now();
        let result = self.scraper.scrape(&target).await;
        let duration_ms = started.elapsed().as_millis() as u64;

        let mut state = self.lock();
        let ExplorerState { jobs, stats } = &mut *state;
        let Some(entry) = jobs.get_mut(job).and_then(|e| e.get_mut(&hash)) else {
            return;
        };
        let counters = stats.entry(job.to_string()).or_default();

        match result {
            Ok(series) => {
                let estimate = series.max(entry.status.series);
                entry.status.record_scrape(started_ms, duration_ms, Ok(estimate));
                entry.explored += 1;
                counters.explored += 1;
                debug!(job, hash, series, estimate, explored = entry.explored, "target explored");

                entry.queued = entry.explored < MAX_EXPLORE_TIMES
                    && self.queue_tx.try_send((job.to_string(), hash)).is_ok();
            }
            Err(e) => {
                warn!(job, hash, url = %target.url, error = %e, "explore failed");
                entry.status.record_scrape(started_ms, duration_ms, Err(e.to_string()));
                counters.failed += 1;

                entry.queued = true;
                let this = self.clone();
                let job = job.to_string();
                let mut shutdown = shutdown.clone();
                tokio::spawn(async move {
                    if *shutdown.borrow_and_update() {
                        return;
                    }
                    tokio::select! {
                        _ = tokio::time::sleep(this.retry_interval) => this.requeue(&job, hash),
                        _ = shutdown.changed() => debug!(job, hash, "retry cancelled by shutdown"),
                    }
                });
            }
        }
    }

    fn requeue(&self, job: &str, hash: TargetHash) {
        let mut state = self.lock();
        if let Some(entry) = state.jobs.get_mut(job).and_then(|e| e.get_mut(&hash)) {
            entry.queued = self.queue_tx.try_send((job.to_string(), hash)).is_ok();
        }
    }
}
