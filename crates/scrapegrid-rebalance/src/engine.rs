//! One planning cycle over the collected shard state.

use std::collections::HashSet;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::info;

use scrapegrid_core::{CoordinatorOptions, ScrapeStatusMap, TargetHash, TargetsByJob};

use crate::alleviate::alleviate;
use crate::assign::{Placement, assign};
use crate::gc::gc;
use crate::lookup::ExploreLookup;
use crate::scale::{scale_down, scale_up};
use crate::shard_info::ShardInfo;
use crate::status::{build_assignments, merge_global_status};

/// Result of one planning cycle. The per-shard assignments are written
/// into each changeable [`ShardInfo::new_targets`].
#[derive(Debug, Clone, Default)]
pub struct RebalancePlan {
    /// Pool size to request from the shard manager.
    pub desired_shards: i32,
    /// Series demand no changeable shard could absorb.
    pub need_space: i64,
    pub removed: usize,
    pub transfers: usize,
    pub placed: usize,
    pub global_status: ScrapeStatusMap,
}

/// The placement algorithm, parameterised by its random source so weighted
/// placement is reproducible under test.
pub struct RebalanceEngine<R = StdRng> {
    options: CoordinatorOptions,
    rng: R,
    /// Global status merged by the previous cycle.
    last_status: ScrapeStatusMap,
}

impl RebalanceEngine<StdRng> {
    pub fn new(options: CoordinatorOptions) -> Self {
        Self::with_rng(options, StdRng::from_entropy())
    }
}

impl<R: Rng> RebalanceEngine<R> {
    pub fn with_rng(options: CoordinatorOptions, rng: R) -> Self {
        Self {
            options,
            rng,
            last_status: ScrapeStatusMap::new(),
        }
    }

    pub fn options(&self) -> &CoordinatorOptions {
        &self.options
    }

    /// Run gc, alleviate, assign, scale-down, scale-up and the status
    /// merge, in that order.
    pub fn plan(
        &mut self,
        shards: &mut [ShardInfo],
        active: &TargetsByJob,
        explorer: &dyn ExploreLookup,
        now_secs: u64,
    ) -> RebalancePlan {
        let max = self.options.max_series_per_shard;
        let max_idle = self.options.max_idle;
        let active_hashes: HashSet<TargetHash> = active
            .values()
            .flat_map(|targets| targets.iter().map(|t| t.hash))
            .collect();

        let removed = gc(shards, &active_hashes);
        let shed = alleviate(shards, max);

        let placement = if max_idle.is_zero() {
            Placement::FirstFit
        } else {
            Placement::Weighted
        };
        let assigned = assign(
            shards,
            active,
            &self.last_status,
            explorer,
            max,
            placement,
            &mut self.rng,
        );

        let need_space = shed.need_space + assigned.need_space;
        let mut transfers = shed.transfers;
        let total = shards.len();
        let mut desired = total as i32;

        if !max_idle.is_zero() && need_space == 0 {
            let down = scale_down(shards, max, max_idle.as_secs(), now_secs);
            desired = down.desired as i32;
            transfers += down.transfers;
        }
        if need_space > 0 {
            let changeable = shards.iter().filter(|s| s.changeable).count();
            desired = scale_up(changeable, total, need_space, max, self.options.max_shard_count);
        }

        let global_status = merge_global_status(shards, active, explorer);
        build_assignments(shards, active);
        self.last_status = global_status.clone();

        info!(
            shards = total,
            desired,
            need_space,
            removed,
            transfers,
            placed = assigned.placed,
            "rebalance planned"
        );

        RebalancePlan {
            desired_shards: desired,
            need_space,
            removed,
            transfers,
            placed: assigned.placed,
            global_status,
        }
    }
}
