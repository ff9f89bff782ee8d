//! Per-cycle aggregation of one shard's state.

use serde::Serialize;
use tracing::debug;

use scrapegrid_core::{
    RuntimeInfo, ScrapeStatus, ScrapeStatusMap, ShardId, TargetHash, TargetState, TargetsByJob,
};

/// What the engine knows about one shard during a single cycle.
#[derive(Debug, Clone, Default)]
pub struct ShardInfo {
    pub id: ShardId,
    /// Reachable, ready, and running the expected config.
    pub changeable: bool,
    pub runtime: RuntimeInfo,
    /// The shard's own view of what it scrapes; the engine edits this copy.
    pub scraping: ScrapeStatusMap,
    /// Assignment to push to the shard after planning.
    pub new_targets: TargetsByJob,
}

/// Lightweight per-shard summary for the read API.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ShardSummary {
    pub id: ShardId,
    pub changeable: bool,
    pub head_series: i64,
    pub targets: usize,
}

impl ShardInfo {
    pub fn new(
        id: impl Into<ShardId>,
        changeable: bool,
        runtime: RuntimeInfo,
        scraping: ScrapeStatusMap,
    ) -> Self {
        Self {
            id: id.into(),
            changeable,
            runtime,
            scraping,
            new_targets: TargetsByJob::new(),
        }
    }

    /// Series carried by targets that count toward load shedding.
    pub fn movable_series(&self) -> i64 {
        self.scraping
            .values()
            .filter(|s| s.is_movable())
            .map(|s| s.series)
            .sum()
    }

    /// Whether `series` more would still keep the shard under `max`.
    pub fn has_room(&self, series: i64, max: i64) -> bool {
        self.runtime.head_series + series < max
    }

    /// Idle (no targets) for longer than `max_idle_secs` as of `now_secs`.
    pub fn idle_longer_than(&self, max_idle_secs: u64, now_secs: u64) -> bool {
        self.scraping.is_empty()
            && self
                .runtime
                .idle_start_at
                .is_some_and(|since| now_secs.saturating_sub(since) > max_idle_secs)
    }

    pub fn summary(&self) -> ShardSummary {
        ShardSummary {
            id: self.id.clone(),
            changeable: self.changeable,
            head_series: self.runtime.head_series,
            targets: self.scraping.len(),
        }
    }
}

/// Move `hash` from shard `from` to shard `to`.
///
/// The source copy enters `InTransfer` with its stability counter reset;
/// the destination gains a fresh `Normal` copy and the series it carries.
/// This is the only place a target leaves `Normal`.
pub fn transfer(shards: &mut [ShardInfo], from: usize, to: usize, hash: TargetHash) -> bool {
    let Some(source) = shards[from].scraping.get_mut(&hash) else {
        return false;
    };
    if source.state != TargetState::Normal {
        return false;
    }
    source.state = TargetState::InTransfer;
    source.scrape_times = 0;
    let series = source.series;

    let dest = &mut shards[to];
    dest.scraping.insert(hash, ScrapeStatus::new(series));
    dest.runtime.head_series += series;

    debug!(hash, series, from = %shards[from].id, to = %shards[to].id, "target transfer");
    true
}
