//! Placement of targets no shard is scraping yet.

use std::collections::HashSet;

use rand::Rng;
use rand::distributions::{Distribution, WeightedIndex};
use tracing::{debug, warn};

use scrapegrid_core::{ScrapeHealth, ScrapeStatus, ScrapeStatusMap, TargetHash, TargetsByJob};

use crate::lookup::ExploreLookup;
use crate::shard_info::ShardInfo;

/// How a destination shard is chosen among those with room.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Placement {
    /// The first changeable shard with room, in pool order.
    FirstFit,
    /// Random among shards with room, weighted by free capacity.
    Weighted,
}

/// Outcome of a placement pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AssignOutcome {
    pub placed: usize,
    /// Series of estimated targets that fit nowhere.
    pub need_space: i64,
}

/// Place every active target missing from all shards' scrape sets.
///
/// A target needs a good estimate before it is placed: the previous
/// cycle's global status when that was healthy, otherwise the explorer's.
/// A target whose estimate exceeds `max` is never placed.
pub fn assign<R: Rng>(
    shards: &mut [ShardInfo],
    active: &TargetsByJob,
    known: &ScrapeStatusMap,
    explorer: &dyn ExploreLookup,
    max: i64,
    placement: Placement,
    rng: &mut R,
) -> AssignOutcome {
    let mut outcome = AssignOutcome::default();
    let mut scraped: HashSet<TargetHash> = shards
        .iter()
        .flat_map(|s| s.scraping.keys().copied())
        .collect();

    for (job, targets) in active {
        for target in targets {
            if scraped.contains(&target.hash) {
                continue;
            }
            let estimate = match known.get(&target.hash) {
                Some(status) if status.health == ScrapeHealth::Good => status.clone(),
                _ => match explorer.explore(job, target) {
                    Some(status) => status,
                    None => continue,
                },
            };
            if estimate.health != ScrapeHealth::Good {
                continue;
            }
            let series = estimate.series;
            if series > max {
                warn!(job = %job, hash = target.hash, series, max, "target exceeds shard capacity, not placing");
                continue;
            }

            let Some(j) = pick_destination(shards, series, max, placement, rng) else {
                outcome.need_space += series;
                debug!(job = %job, hash = target.hash, series, "no shard has room");
                continue;
            };

            let dest = &mut shards[j];
            dest.scraping.insert(target.hash, ScrapeStatus::new(series));
            dest.runtime.head_series += series;
            scraped.insert(target.hash);
            outcome.placed += 1;
            debug!(job = %job, hash = target.hash, series, shard = %dest.id, "target placed");
        }
    }

    outcome
}

fn pick_destination<R: Rng>(
    shards: &[ShardInfo],
    series: i64,
    max: i64,
    placement: Placement,
    rng: &mut R,
) -> Option<usize> {
    let fits = |s: &ShardInfo| s.changeable && s.has_room(series, max);

    match placement {
        Placement::FirstFit => shards.iter().position(fits),
        Placement::Weighted => {
            let candidates: Vec<usize> = (0..shards.len()).filter(|&i| fits(&shards[i])).collect();
            weighted_choice(shards, &candidates, max, rng)
        }
    }
}

fn weighted_choice<R: Rng>(shards: &[ShardInfo], pool: &[usize], max: i64, rng: &mut R) -> Option<usize> {
    let weights = pool
        .iter()
        .map(|&i| (max - shards[i].runtime.head_series).max(1) as u64);
    let dist = WeightedIndex::new(weights).ok()?;
    pool.get(dist.sample(rng)).copied()
}
