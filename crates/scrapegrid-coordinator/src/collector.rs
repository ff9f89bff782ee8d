//! Per-cycle shard state collection.

use std::sync::Arc;

use futures::future::join_all;
use tracing::{debug, warn};

use scrapegrid_core::{LoadedConfig, RuntimeInfo, ScrapeStatusMap};
use scrapegrid_rebalance::ShardInfo;
use scrapegrid_shard::ShardHandle;

/// Read every shard concurrently and decide which ones the engine may
/// change this cycle. One shard failing never affects the others.
pub async fn collect(shards: &[Arc<ShardHandle>], config: &LoadedConfig) -> Vec<ShardInfo> {
    join_all(shards.iter().map(|shard| collect_one(shard, config))).await
}

async fn collect_one(shard: &ShardHandle, config: &LoadedConfig) -> ShardInfo {
    let unchangeable = |runtime: RuntimeInfo, scraping: ScrapeStatusMap| {
        ShardInfo::new(shard.id(), false, runtime, scraping)
    };

    if !shard.is_ready() {
        debug!(shard = %shard.id(), "shard not ready");
        return unchangeable(RuntimeInfo::default(), shard.cached_scraping());
    }

    let scraping = match shard.scrape_status().await {
        Ok(scraping) => scraping,
        Err(e) => {
            warn!(shard = %shard.id(), error = %e, "failed to read scrape status");
            return unchangeable(RuntimeInfo::default(), shard.cached_scraping());
        }
    };

    let mut runtime = match shard.runtime().await {
        Ok(runtime) => runtime,
        Err(e) => {
            warn!(shard = %shard.id(), error = %e, "failed to read runtime");
            return unchangeable(RuntimeInfo::default(), shard.cached_scraping());
        }
    };

    if runtime.config_hash != config.hash {
        warn!(
            shard = %shard.id(),
            running = %runtime.config_hash,
            expected = %config.hash,
            "shard config out of date, pushing"
        );
        if let Err(e) = shard.push_config(&config.raw).await {
            warn!(shard = %shard.id(), error = %e, "config push failed");
            return unchangeable(runtime, scraping);
        }
        runtime = match shard.runtime().await {
            Ok(runtime) => runtime,
            Err(e) => {
                warn!(shard = %shard.id(), error = %e, "failed to re-read runtime");
                return unchangeable(RuntimeInfo::default(), shard.cached_scraping());
            }
        };
        if runtime.config_hash != config.hash {
            warn!(shard = %shard.id(), running = %runtime.config_hash, "shard still on old config");
            return unchangeable(runtime, scraping);
        }
    }

    debug!(
        shard = %shard.id(),
        head_series = runtime.head_series,
        targets = scraping.len(),
        "shard collected"
    );
    ShardInfo::new(shard.id(), true, runtime, scraping)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fakes::handle;
    use scrapegrid_core::ScrapeStatus;
    use std::sync::atomic::Ordering;

    fn config() -> LoadedConfig {
        LoadedConfig::from_bytes(b"[coordinator]\nmax_series_per_shard = 100\n".to_vec()).unwrap()
    }

    #[tokio::test]
    async fn healthy_shard_is_changeable() {
        let cfg = config();
        let (shard, fakes) = handle("s0", 2);
        for f in &fakes {
            f.runtime.lock().unwrap().config_hash = cfg.hash.clone();
        }
        fakes[1].set_head(40);
        fakes[0].scraping.lock().unwrap().insert(1, ScrapeStatus::new(3));

        let infos = collect(&[shard], &cfg).await;
        assert!(infos[0].changeable);
        assert_eq!(infos[0].runtime.head_series, 40);
        assert_eq!(infos[0].scraping.len(), 1);
        assert_eq!(fakes[0].config_pushes.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn stale_config_is_pushed_then_accepted() {
        let cfg = config();
        let (shard, fakes) = handle("s0", 1);

        let infos = collect(&[shard], &cfg).await;
        assert!(infos[0].changeable);
        assert_eq!(fakes[0].config_pushes.load(Ordering::SeqCst), 1);
        assert_eq!(infos[0].runtime.config_hash, cfg.hash);
    }

    #[tokio::test]
    async fn shard_that_keeps_old_config_is_unchangeable() {
        let cfg = config();
        let (shard, fakes) = handle("s0", 1);
        fakes[0].accept_config.store(false, Ordering::SeqCst);

        let infos = collect(&[shard], &cfg).await;
        assert!(!infos[0].changeable);
    }

    #[tokio::test]
    async fn failed_shard_is_isolated_and_forgotten() {
        let cfg = config();
        let (good, good_fakes) = handle("s0", 1);
        let (bad, bad_fakes) = handle("s1", 2);
        good_fakes[0].runtime.lock().unwrap().config_hash = cfg.hash.clone();
        for f in &bad_fakes {
            f.runtime.lock().unwrap().config_hash = cfg.hash.clone();
            f.scraping.lock().unwrap().insert(9, ScrapeStatus::new(1));
        }

        // First cycle caches s1's scrape set, then every replica goes away.
        collect(&[good.clone(), bad.clone()], &cfg).await;
        assert_eq!(bad.cached_scraping().len(), 1);
        for f in &bad_fakes {
            f.fail.store(true, Ordering::SeqCst);
        }

        let infos = collect(&[good, bad], &cfg).await;
        assert!(infos[0].changeable);
        assert!(!infos[1].changeable);
        assert!(infos[1].scraping.is_empty());
    }

    #[tokio::test]
    async fn not_ready_shard_keeps_cached_set() {
        let cfg = config();
        let (shard, fakes) = handle("s0", 1);
        fakes[0].runtime.lock().unwrap().config_hash = cfg.hash.clone();
        fakes[0].scraping.lock().unwrap().insert(4, ScrapeStatus::new(1));
        collect(&[shard.clone()], &cfg).await;

        shard.set_ready(false);
        fakes[0].scraping.lock().unwrap().clear();
        let infos = collect(&[shard], &cfg).await;
        assert!(!infos[0].changeable);
        assert!(infos[0].scraping.contains_key(&4));
    }
}
