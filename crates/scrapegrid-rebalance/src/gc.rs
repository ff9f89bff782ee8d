//! Duplicate and stale assignment cleanup.

use std::collections::HashSet;

use tracing::debug;

use scrapegrid_core::{ScrapeStatus, TargetHash, TargetState};

use crate::shard_info::ShardInfo;

/// Remove entries that should no longer be scraped from every changeable
/// shard, returning how many were removed.
///
/// An entry goes when its target is no longer discovered, or when it is
/// stable and a stable copy on another changeable shard wins: `Normal`
/// beats `InTransfer`, and between two `Normal` copies the less loaded
/// shard keeps the target (the earlier shard on equal load).
pub fn gc(shards: &mut [ShardInfo], active: &HashSet<TargetHash>) -> usize {
    let mut removed = 0;

    for i in 0..shards.len() {
        if !shards[i].changeable {
            continue;
        }

        let doomed: Vec<TargetHash> = shards[i]
            .scraping
            .iter()
            .filter(|(hash, status)| {
                !active.contains(*hash) || loses_duplicate(shards, i, **hash, status)
            })
            .map(|(hash, _)| *hash)
            .collect();

        let shard = &mut shards[i];
        for hash in doomed {
            shard.scraping.remove(&hash);
            removed += 1;
            debug!(shard = %shard.id, hash, "assignment dropped");
        }
    }

    removed
}

fn loses_duplicate(
    shards: &[ShardInfo],
    i: usize,
    hash: TargetHash,
    status: &ScrapeStatus,
) -> bool {
    if !status.is_stable() {
        return false;
    }
    let head = shards[i].runtime.head_series;

    shards.iter().enumerate().any(|(j, other)| {
        if j == i || !other.changeable {
            return false;
        }
        let Some(theirs) = other.scraping.get(&hash) else {
            return false;
        };
        if !theirs.is_stable() {
            return false;
        }
        match (status.state, theirs.state) {
            (TargetState::InTransfer, TargetState::Normal) => true,
            (TargetState::Normal, TargetState::Normal) => {
                let other_head = other.runtime.head_series;
                other_head < head || (other_head == head && j < i)
            }
            _ => false,
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::{shard, stable};

    fn active(hashes: &[TargetHash]) -> HashSet<TargetHash> {
        hashes.iter().copied().collect()
    }

    fn in_transfer(series: i64) -> ScrapeStatus {
        ScrapeStatus {
            state: TargetState::InTransfer,
            ..stable(series)
        }
    }

    fn normal_owners(shards: &[ShardInfo], hash: TargetHash) -> Vec<&str> {
        shards
            .iter()
            .filter(|s| s.changeable)
            .filter(|s| s.scraping.get(&hash).is_some_and(|st| st.state == TargetState::Normal))
            .map(|s| s.id.as_str())
            .collect()
    }

    #[test]
    fn undiscovered_targets_are_dropped() {
        let mut shards = vec![shard("s0", 10, &[(1, stable(5)), (2, stable(5))])];
        assert_eq!(gc(&mut shards, &active(&[1])), 1);
        assert!(shards[0].scraping.contains_key(&1));
        assert!(!shards[0].scraping.contains_key(&2));
    }

    #[test]
    fn duplicate_stays_on_less_loaded_shard() {
        let mut shards = vec![
            shard("shard-0", 50, &[(7, stable(10))]),
            shard("shard-1", 80, &[(7, stable(10))]),
        ];
        gc(&mut shards, &active(&[7]));
        assert!(shards[0].scraping.contains_key(&7));
        assert!(!shards[1].scraping.contains_key(&7));
    }

    #[test]
    fn equal_load_keeps_earlier_shard() {
        let mut shards = vec![
            shard("shard-0", 50, &[(7, stable(10))]),
            shard("shard-1", 50, &[(7, stable(10))]),
        ];
        gc(&mut shards, &active(&[7]));
        assert_eq!(normal_owners(&shards, 7), vec!["shard-0"]);
    }

    #[test]
    fn in_transfer_loses_to_settled_normal() {
        let mut shards = vec![
            shard("shard-0", 10, &[(7, in_transfer(10))]),
            shard("shard-1", 90, &[(7, stable(10))]),
        ];
        gc(&mut shards, &active(&[7]));
        assert!(!shards[0].scraping.contains_key(&7));
        assert!(shards[1].scraping.contains_key(&7));
    }

    #[test]
    fn in_transfer_waits_for_destination_to_settle() {
        let mut fresh = stable(10);
        fresh.scrape_times = 1;
        let mut shards = vec![
            shard("shard-0", 10, &[(7, in_transfer(10))]),
            shard("shard-1", 90, &[(7, fresh)]),
        ];
        assert_eq!(gc(&mut shards, &active(&[7])), 0);
    }

    #[test]
    fn unstable_copies_are_not_deduplicated() {
        let mut fresh = stable(10);
        fresh.scrape_times = 2;
        let mut shards = vec![
            shard("shard-0", 10, &[(7, fresh.clone())]),
            shard("shard-1", 90, &[(7, fresh)]),
        ];
        assert_eq!(gc(&mut shards, &active(&[7])), 0);
    }

    #[test]
    fn unchangeable_shard_is_neither_cleaned_nor_compared() {
        let mut stale = shard("shard-2", 1, &[(7, stable(10)), (8, stable(1))]);
        stale.changeable = false;
        let mut shards = vec![shard("shard-0", 50, &[(7, stable(10))]), stale];

        assert_eq!(gc(&mut shards, &active(&[7])), 0);
        assert!(shards[0].scraping.contains_key(&7));
        assert!(shards[1].scraping.contains_key(&8));
    }

    #[test]
    fn at_most_one_normal_owner_after_gc() {
        let mut shards = vec![
            shard("s0", 70, &[(1, stable(1)), (2, stable(1)), (3, in_transfer(1))]),
            shard("s1", 30, &[(1, stable(1)), (3, stable(1))]),
            shard("s2", 30, &[(1, stable(1)), (2, stable(1)), (3, stable(1))]),
        ];
        gc(&mut shards, &active(&[1, 2, 3]));
        for hash in [1, 2, 3] {
            assert_eq!(normal_owners(&shards, hash).len(), 1, "hash {hash}");
        }
    }
}
