//! Global scrape status and the outgoing per-shard assignment.

use std::collections::HashMap;

use scrapegrid_core::{ScrapeHealth, ScrapeStatus, ScrapeStatusMap, Target, TargetHash, TargetsByJob};

use crate::lookup::ExploreLookup;
use crate::shard_info::ShardInfo;

/// One authoritative status per active target.
///
/// Among changeable shards reporting a known health, good health wins,
/// then the higher series count. Every changeable shard reporting the
/// target is recorded regardless of which status wins. Targets no shard
/// knows about fall back to the explorer's estimate, then to a blank one.
pub fn merge_global_status(
    shards: &[ShardInfo],
    active: &TargetsByJob,
    explorer: &dyn ExploreLookup,
) -> ScrapeStatusMap {
    let mut global = ScrapeStatusMap::new();

    for (job, targets) in active {
        for target in targets {
            let mut best: Option<&ScrapeStatus> = None;
            let mut reporting = Vec::new();

            for shard in shards.iter().filter(|s| s.changeable) {
                let Some(status) = shard.scraping.get(&target.hash) else {
                    continue;
                };
                reporting.push(shard.id.clone());
                if status.health == ScrapeHealth::Unknown {
                    continue;
                }
                if best.is_none_or(|b| status.outranks(b)) {
                    best = Some(status);
                }
            }

            let mut merged = match best {
                Some(status) => status.clone(),
                None => explorer
                    .estimate(job, target.hash)
                    .unwrap_or_else(|| ScrapeStatus::new(0)),
            };
            merged.shards = reporting.into_iter().collect();
            global.insert(target.hash, merged);
        }
    }

    global
}

/// Fill each changeable shard's `new_targets` from its post-planning scrape
/// set. Entries for targets that are no longer active are left out.
pub fn build_assignments(shards: &mut [ShardInfo], active: &TargetsByJob) {
    let index: HashMap<TargetHash, &Target> = active
        .values()
        .flat_map(|targets| targets.iter().map(|t| (t.hash, t)))
        .collect();

    for shard in shards.iter_mut().filter(|s| s.changeable) {
        let mut out = TargetsByJob::new();
        for (hash, status) in &shard.scraping {
            let Some(target) = index.get(hash) else {
                continue;
            };
            let mut target = (*target).clone();
            target.state = status.state;
            target.series = status.series;
            out.entry(target.job.clone()).or_default().push(target);
        }
        shard.new_targets = out;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::{FakeLookup, active, shard, stable};
    use scrapegrid_core::TargetState;

    #[test]
    fn good_beats_bad_then_higher_series() {
        let mut bad = stable(500);
        bad.health = ScrapeHealth::Bad;
        let shards = vec![
            shard("s0", 0, &[(1, bad)]),
            shard("s1", 0, &[(1, stable(10))]),
            shard("s2", 0, &[(1, stable(20))]),
        ];
        let global = merge_global_status(&shards, &active(&[1]), &FakeLookup::default());
        let st = &global[&1];
        assert_eq!(st.health, ScrapeHealth::Good);
        assert_eq!(st.series, 20);
        assert_eq!(st.shards.len(), 3);
    }

    #[test]
    fn unknown_health_falls_back_to_explorer() {
        let shards = vec![shard("s0", 0, &[(1, ScrapeStatus::new(0))])];
        let lookup = FakeLookup::with(&[(1, stable(42))]);
        let global = merge_global_status(&shards, &active(&[1, 2]), &lookup);

        assert_eq!(global[&1].series, 42);
        assert!(global[&1].shards.contains("s0"));
        assert_eq!(global[&2], ScrapeStatus::new(0));
        assert!(lookup.explored.borrow().is_empty());
    }

    #[test]
    fn unchangeable_shards_do_not_contribute() {
        let mut down = shard("s1", 0, &[(1, stable(99))]);
        down.changeable = false;
        let shards = vec![shard("s0", 0, &[(1, stable(5))]), down];
        let global = merge_global_status(&shards, &active(&[1]), &FakeLookup::default());
        assert_eq!(global[&1].series, 5);
        assert_eq!(global[&1].shards.len(), 1);
    }

    #[test]
    fn assignments_carry_state_and_skip_inactive() {
        let moving = ScrapeStatus {
            state: TargetState::InTransfer,
            ..stable(7)
        };
        let mut down = shard("s1", 0, &[(1, stable(1))]);
        down.changeable = false;
        let mut shards = vec![shard("s0", 0, &[(1, moving), (2, stable(3))]), down];
        build_assignments(&mut shards, &active(&[1]));

        let node = &shards[0].new_targets["node"];
        assert_eq!(node.len(), 1);
        assert_eq!(node[0].state, TargetState::InTransfer);
        assert_eq!(node[0].series, 7);
        assert!(shards[1].new_targets.is_empty());
    }
}
