//! scrapegrid.toml configuration parser.
//!
//! The file is loaded once per (re)load. Its exact bytes are what the
//! coordinator pushes to shards, and their SHA-256 is the config hash the
//! shards must report back before they receive placement decisions.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;

use crate::error::{ConfigError, ConfigResult};
use crate::hash::content_hash;
use crate::relabel::{RelabelRule, compile_rules};
use crate::types::Labels;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ScrapegridConfig {
    #[serde(default)]
    pub coordinator: CoordinatorConfig,
    #[serde(default)]
    pub explore: ExploreConfig,
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub shards: Vec<ShardConfig>,
    #[serde(default)]
    pub jobs: Vec<JobConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoordinatorConfig {
    #[serde(default = "default_max_series")]
    pub max_series_per_shard: i64,
    #[serde(default = "default_max_shards")]
    pub max_shard_count: i32,
    /// How long a shard may sit idle before it is scaled away. "0s" disables.
    #[serde(default = "default_max_idle")]
    pub max_idle: String,
    #[serde(default = "default_reconcile_interval")]
    pub reconcile_interval: String,
}

fn default_max_series() -> i64 {
    1_000_000
}
fn default_max_shards() -> i32 {
    16
}
fn default_max_idle() -> String {
    "0s".to_string()
}
fn default_reconcile_interval() -> String {
    "15s".to_string()
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            max_series_per_shard: default_max_series(),
            max_shard_count: default_max_shards(),
            max_idle: default_max_idle(),
            reconcile_interval: default_reconcile_interval(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExploreConfig {
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
    #[serde(default = "default_queue_size")]
    pub queue_size: usize,
    #[serde(default = "default_retry_interval")]
    pub retry_interval: String,
    #[serde(default = "default_scrape_timeout")]
    pub scrape_timeout: String,
}

fn default_concurrency() -> usize {
    16
}
fn default_queue_size() -> usize {
    1024
}
fn default_retry_interval() -> String {
    "5s".to_string()
}
fn default_scrape_timeout() -> String {
    "10s".to_string()
}

impl Default for ExploreConfig {
    fn default() -> Self {
        Self {
            concurrency: default_concurrency(),
            queue_size: default_queue_size(),
            retry_interval: default_retry_interval(),
            scrape_timeout: default_scrape_timeout(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    #[serde(default = "default_listen")]
    pub listen: SocketAddr,
}

fn default_listen() -> SocketAddr {
    SocketAddr::from(([0, 0, 0, 0], 9090))
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            listen: default_listen(),
        }
    }
}

/// A statically configured shard and its redundant replicas.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShardConfig {
    pub id: String,
    /// Replica endpoints (`host:port`).
    pub replicas: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobConfig {
    pub name: String,
    #[serde(default)]
    pub scrape_timeout: Option<String>,
    #[serde(default)]
    pub targets: Vec<StaticTargetConfig>,
    /// Target-level keep/drop rules.
    #[serde(default)]
    pub relabel: Vec<RelabelRule>,
    /// Series-level keep/drop rules applied before counting.
    #[serde(default)]
    pub metric_relabel: Vec<RelabelRule>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StaticTargetConfig {
    pub url: String,
    #[serde(default)]
    pub labels: Labels,
}

/// Rebalancing policy derived from `[coordinator]`; immutable per run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CoordinatorOptions {
    pub max_series_per_shard: i64,
    pub max_shard_count: i32,
    /// Zero disables idle-drain (and switches placement to first-fit).
    pub max_idle: Duration,
    pub reconcile_interval: Duration,
}

impl CoordinatorConfig {
    /// Validate and convert into runtime options.
    pub fn options(&self) -> ConfigResult<CoordinatorOptions> {
        if self.max_series_per_shard <= 0 {
            return Err(ConfigError::Invalid(
                "coordinator.max_series_per_shard must be positive".to_string(),
            ));
        }
        if self.max_shard_count < 1 {
            return Err(ConfigError::Invalid(
                "coordinator.max_shard_count must be at least 1".to_string(),
            ));
        }
        let max_idle = required_duration("coordinator.max_idle", &self.max_idle)?;
        let reconcile_interval =
            required_duration("coordinator.reconcile_interval", &self.reconcile_interval)?;
        if reconcile_interval.is_zero() {
            return Err(ConfigError::Invalid(
                "coordinator.reconcile_interval must be non-zero".to_string(),
            ));
        }
        Ok(CoordinatorOptions {
            max_series_per_shard: self.max_series_per_shard,
            max_shard_count: self.max_shard_count,
            max_idle,
            reconcile_interval,
        })
    }
}

impl ExploreConfig {
    pub fn retry_interval(&self) -> ConfigResult<Duration> {
        required_duration("explore.retry_interval", &self.retry_interval)
    }

    pub fn scrape_timeout(&self) -> ConfigResult<Duration> {
        required_duration("explore.scrape_timeout", &self.scrape_timeout)
    }
}

impl ScrapegridConfig {
    /// Check every field that could otherwise fail later at runtime.
    pub fn validate(&self) -> ConfigResult<()> {
        self.coordinator.options()?;

        if self.explore.concurrency == 0 || self.explore.queue_size == 0 {
            return Err(ConfigError::Invalid(
                "explore.concurrency and explore.queue_size must be positive".to_string(),
            ));
        }
        self.explore.retry_interval()?;
        self.explore.scrape_timeout()?;

        let mut shard_ids = HashSet::new();
        for shard in &self.shards {
            if !shard_ids.insert(shard.id.as_str()) {
                return Err(ConfigError::Invalid(format!("duplicate shard id {:?}", shard.id)));
            }
            if shard.replicas.is_empty() {
                return Err(ConfigError::Invalid(format!("shard {:?} has no replicas", shard.id)));
            }
        }

        let mut job_names = HashSet::new();
        for job in &self.jobs {
            if !job_names.insert(job.name.as_str()) {
                return Err(ConfigError::Invalid(format!("duplicate job {:?}", job.name)));
            }
            if let Some(timeout) = &job.scrape_timeout {
                required_duration(&format!("jobs.{}.scrape_timeout", job.name), timeout)?;
            }
            compile_rules(&job.relabel)?;
            compile_rules(&job.metric_relabel)?;
        }

        Ok(())
    }

    pub fn job(&self, name: &str) -> Option<&JobConfig> {
        self.jobs.iter().find(|j| j.name == name)
    }

    /// Scrape timeout for a job, falling back to the explorer default.
    pub fn job_scrape_timeout(&self, name: &str) -> Duration {
        self.job(name)
            .and_then(|j| j.scrape_timeout.as_deref())
            .and_then(parse_duration)
            .or_else(|| parse_duration(&self.explore.scrape_timeout))
            .unwrap_or(Duration::from_secs(10))
    }
}

/// A parsed config together with the raw bytes it came from.
#[derive(Debug, Clone)]
pub struct LoadedConfig {
    pub config: ScrapegridConfig,
    pub raw: Vec<u8>,
    /// Hex SHA-256 of `raw`.
    pub hash: String,
}

impl LoadedConfig {
    pub fn from_file(path: &Path) -> ConfigResult<Self> {
        let raw = std::fs::read(path)?;
        Self::from_bytes(raw)
    }

    pub fn from_bytes(raw: Vec<u8>) -> ConfigResult<Self> {
        let text = std::str::from_utf8(&raw)
            .map_err(|e| ConfigError::Invalid(format!("config is not utf-8: {e}")))?;
        let config: ScrapegridConfig = toml::from_str(text)?;
        config.validate()?;
        let hash = content_hash(&raw);
        Ok(Self { config, raw, hash })
    }

    pub fn options(&self) -> ConfigResult<CoordinatorOptions> {
        self.config.coordinator.options()
    }
}

fn required_duration(field: &str, value: &str) -> ConfigResult<Duration> {
    parse_duration(value)
        .ok_or_else(|| ConfigError::Invalid(format!("{field}: invalid duration {value:?}")))
}

/// Parse a duration string like "5s", "500ms", "2m", "1h".
///
/// A bare number is taken as seconds.
pub fn parse_duration(s: &str) -> Option<Duration> {
    let s = s.trim();
    if let Some(ms) = s.strip_suffix("ms") {
        ms.parse::<u64>().ok().map(Duration::from_millis)
    } else if let Some(secs) = s.strip_suffix('s') {
        secs.parse::<u64>().ok().map(Duration::from_secs)
    } else if let Some(mins) = s.strip_suffix('m') {
        mins.parse::<u64>().ok().map(|m| Duration::from_secs(m * 60))
    } else if let Some(hours) = s.strip_suffix('h') {
        hours.parse::<u64>().ok().map(|h| Duration::from_secs(h * 3600))
    } else {
        s.parse::<u64>().ok().map(Duration::from_secs)
    }
}
