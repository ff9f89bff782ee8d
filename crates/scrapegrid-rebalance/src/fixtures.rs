//! Hand-built shard fixtures shared by the engine tests.

use std::cell::RefCell;
use std::collections::BTreeMap;

use scrapegrid_core::{
    Labels, RuntimeInfo, ScrapeHealth, ScrapeStatus, Target, TargetHash, TargetsByJob,
};

use crate::lookup::ExploreLookup;
use crate::shard_info::ShardInfo;

pub const MAX: i64 = 100;

/// A stable, healthy, `Normal` status carrying `series`.
pub fn stable(series: i64) -> ScrapeStatus {
    ScrapeStatus {
        health: ScrapeHealth::Good,
        series,
        scrape_times: 5,
        ..ScrapeStatus::default()
    }
}

/// A changeable shard at `head` series reporting `targets`.
pub fn shard(id: &str, head: i64, targets: &[(TargetHash, ScrapeStatus)]) -> ShardInfo {
    ShardInfo::new(
        id,
        true,
        RuntimeInfo {
            head_series: head,
            config_hash: "cfg".to_string(),
            idle_start_at: None,
        },
        targets.iter().cloned().collect(),
    )
}

/// Discovered target with a fixed hash, so fixtures can refer to it by number.
pub fn target(hash: TargetHash) -> Target {
    let mut t = Target::new("node", &format!("http://t{hash}:9100/metrics"), Labels::new(), Labels::new());
    t.hash = hash;
    t
}

/// Active set for job `node` with the given hashes.
pub fn active(hashes: &[TargetHash]) -> TargetsByJob {
    let mut map = TargetsByJob::new();
    map.insert("node".to_string(), hashes.iter().map(|h| target(*h)).collect());
    map
}

/// In-memory explorer: fixed answers, records which hashes were explored.
#[derive(Default)]
pub struct FakeLookup {
    pub answers: BTreeMap<TargetHash, ScrapeStatus>,
    pub explored: RefCell<Vec<TargetHash>>,
}

impl FakeLookup {
    pub fn with(answers: &[(TargetHash, ScrapeStatus)]) -> Self {
        Self {
            answers: answers.iter().cloned().collect(),
            explored: RefCell::new(Vec::new()),
        }
    }
}

impl ExploreLookup for FakeLookup {
    fn explore(&self, _job: &str, target: &Target) -> Option<ScrapeStatus> {
        self.explored.borrow_mut().push(target.hash);
        self.answers.get(&target.hash).cloned()
    }

    fn estimate(&self, _job: &str, hash: TargetHash) -> Option<ScrapeStatus> {
        self.answers.get(&hash).cloned()
    }
}
