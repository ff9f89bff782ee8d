//! Domain types shared by the coordinator, the shards, and the explorer.
//!
//! A target's `hash` is the join key across the whole system: discovery
//! produces it, shards report status under it, the explorer keys its
//! estimates by it.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::time::{SystemTime, UNIX_EPOCH};

use crate::hash::target_hash;

/// Stable fingerprint of a target (pre-relabel labels + final URL).
pub type TargetHash = u64;

/// Identifier of a logical shard.
pub type ShardId = String;

/// Label set, ordered so fingerprints and listings are deterministic.
pub type Labels = BTreeMap<String, String>;

/// Targets grouped by job name.
pub type TargetsByJob = BTreeMap<String, Vec<Target>>;

/// Scrape status keyed by target hash.
pub type ScrapeStatusMap = BTreeMap<TargetHash, ScrapeStatus>;

/// Number of scrapes a target needs on its current shard before it counts
/// toward that shard's load or may be moved again.
pub const MIN_WAIT_SCRAPE_TIMES: u64 = 3;

// ── Target ────────────────────────────────────────────────────────

/// Assignment state of a target on a shard.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TargetState {
    /// Actively scraped by the owning shard.
    #[default]
    Normal,
    /// Still scraped, but a destination has been chosen; dropped once the
    /// destination has settled.
    InTransfer,
}

/// One scrape endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Target {
    pub hash: TargetHash,
    /// Job (scrape pool) the target belongs to.
    pub job: String,
    /// Final scrape URL.
    pub url: String,
    /// Labels as produced by discovery, before relabeling.
    #[serde(default)]
    pub discovered_labels: Labels,
    /// Final labels after relabeling.
    #[serde(default)]
    pub labels: Labels,
    /// Best known series estimate.
    #[serde(default)]
    pub series: i64,
    #[serde(default)]
    pub state: TargetState,
}

impl Target {
    /// Build a target and compute its fingerprint.
    pub fn new(job: &str, url: &str, discovered_labels: Labels, labels: Labels) -> Self {
        Self {
            hash: target_hash(&discovered_labels, url),
            job: job.to_string(),
            url: url.to_string(),
            discovered_labels,
            labels,
            series: 0,
            state: TargetState::Normal,
        }
    }
}

// ── Scrape status ─────────────────────────────────────────────────

/// Health of a target as last observed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScrapeHealth {
    #[default]
    Unknown,
    Good,
    Bad,
}

impl ScrapeHealth {
    /// Prometheus-style label for listings ("up", "down", "unknown").
    pub fn as_str(&self) -> &'static str {
        match self {
            ScrapeHealth::Unknown => "unknown",
            ScrapeHealth::Good => "up",
            ScrapeHealth::Bad => "down",
        }
    }
}

/// Runtime observation of one target.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ScrapeStatus {
    #[serde(default)]
    pub health: ScrapeHealth,
    #[serde(default)]
    pub series: i64,
    /// Scrapes completed since the last reset.
    #[serde(default)]
    pub scrape_times: u64,
    #[serde(default)]
    pub last_error: Option<String>,
    /// Unix timestamp (milliseconds) of the last scrape.
    #[serde(default)]
    pub last_scrape: Option<u64>,
    #[serde(default)]
    pub last_scrape_duration_ms: u64,
    #[serde(default)]
    pub state: TargetState,
    /// Shards currently reporting this target.
    #[serde(default)]
    pub shards: BTreeSet<ShardId>,
}

impl ScrapeStatus {
    /// A fresh, unknown-health status.
    pub fn new(series: i64) -> Self {
        Self {
            series,
            ..Self::default()
        }
    }

    /// Whether the target has settled on its current shard.
    pub fn is_stable(&self) -> bool {
        self.scrape_times >= MIN_WAIT_SCRAPE_TIMES
    }

    /// Whether the target is a candidate for load accounting and transfer.
    pub fn is_movable(&self) -> bool {
        self.is_stable() && self.state == TargetState::Normal && self.health == ScrapeHealth::Good
    }

    /// Record the outcome of one scrape.
    pub fn record_scrape(&mut self, started_ms: u64, duration_ms: u64, result: Result<i64, String>) {
        self.last_scrape = Some(started_ms);
        self.last_scrape_duration_ms = duration_ms;
        self.scrape_times += 1;
        match result {
            Ok(series) => {
                self.health = ScrapeHealth::Good;
                self.last_error = None;
                self.series = series;
            }
            Err(e) => {
                self.health = ScrapeHealth::Bad;
                self.last_error = Some(e);
            }
        }
    }

    /// Whether `self` should win over `other` when both describe one target:
    /// good health first, then the higher series count.
    pub fn outranks(&self, other: &ScrapeStatus) -> bool {
        let self_good = self.health == ScrapeHealth::Good;
        let other_good = other.health == ScrapeHealth::Good;
        if self_good != other_good {
            return self_good;
        }
        self.series > other.series
    }
}

// ── Shard runtime ─────────────────────────────────────────────────

/// Load report of one shard replica.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RuntimeInfo {
    /// Active series count (the shard's load metric).
    pub head_series: i64,
    /// Hash of the configuration the shard is running.
    pub config_hash: String,
    /// Unix timestamp (seconds) since which the shard has had no targets.
    #[serde(default)]
    pub idle_start_at: Option<u64>,
}

/// Current unix time in seconds.
pub fn epoch_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

/// Current unix time in milliseconds.
pub fn epoch_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

#[cfg(test)]
mod tests {
    use super::*;

    fn status(health: ScrapeHealth, series: i64) -> ScrapeStatus {
        ScrapeStatus {
            health,
            series,
            ..ScrapeStatus::default()
        }
    }

    #[test]
    fn new_status_is_unknown_and_unstable() {
        let s = ScrapeStatus::new(0);
        assert_eq!(s.health, ScrapeHealth::Unknown);
        assert_eq!(s.state, TargetState::Normal);
        assert!(!s.is_stable());
    }

    #[test]
    fn stable_after_min_wait_scrapes() {
        let mut s = ScrapeStatus::new(0);
        for i in 0..MIN_WAIT_SCRAPE_TIMES {
            s.record_scrape(1000 + i, 5, Ok(10));
        }
        assert!(s.is_stable());
        assert!(s.is_movable());
    }

    #[test]
    fn in_transfer_is_not_movable() {
        let mut s = status(ScrapeHealth::Good, 10);
        s.scrape_times = 10;
        s.state = TargetState::InTransfer;
        assert!(!s.is_movable());
    }

    #[test]
    fn record_failure_keeps_last_series() {
        let mut s = ScrapeStatus::new(0);
        s.record_scrape(1, 1, Ok(42));
        s.record_scrape(2, 1, Err("connection refused".to_string()));
        assert_eq!(s.health, ScrapeHealth::Bad);
        assert_eq!(s.series, 42);
        assert_eq!(s.last_error.as_deref(), Some("connection refused"));
        assert_eq!(s.scrape_times, 2);
    }

    #[test]
    fn good_health_outranks_higher_series() {
        let good = status(ScrapeHealth::Good, 10);
        let bad = status(ScrapeHealth::Bad, 1000);
        assert!(good.outranks(&bad));
        assert!(!bad.outranks(&good));
    }

    #[test]
    fn higher_series_breaks_health_tie() {
        let a = status(ScrapeHealth::Good, 20);
        let b = status(ScrapeHealth::Good, 10);
        assert!(a.outranks(&b));
        assert!(!b.outranks(&a));
        assert!(!a.outranks(&a.clone()));
    }

    #[test]
    fn target_new_computes_hash() {
        let mut labels = Labels::new();
        labels.insert("instance".to_string(), "a:9100".to_string());
        let t1 = Target::new("node", "http://a:9100/metrics", labels.clone(), labels.clone());
        let t2 = Target::new("node", "http://a:9100/metrics", labels.clone(), Labels::new());
        assert_eq!(t1.hash, t2.hash);
    }

    #[test]
    fn status_map_json_roundtrips_integer_keys() {
        let mut map = ScrapeStatusMap::new();
        map.insert(42, status(ScrapeHealth::Good, 7));
        let json = serde_json::to_string(&map).unwrap();
        let back: ScrapeStatusMap = serde_json::from_str(&json).unwrap();
        assert_eq!(back.get(&42).map(|s| s.series), Some(7));
    }
}
