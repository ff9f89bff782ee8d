//! Pool sizing.
//!
//! Shrinking only ever removes shards from the tail of the pool, and only
//! once they have drained and sat idle; growing is driven by series demand
//! nobody could absorb this cycle.

use tracing::{debug, info};

use scrapegrid_core::{TargetHash, TargetState};

use crate::shard_info::{ShardInfo, transfer};

/// Outcome of a scale-down pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScaleDown {
    /// Proposed pool size after removing idle tail shards.
    pub desired: usize,
    /// Targets moved off draining tail shards.
    pub transfers: usize,
}

/// Walk the pool from its tail.
///
/// Idle changeable shards are counted out. The first busy shard is drained
/// into earlier shards if every one of its stable targets fits there; the
/// walk continues past a drained shard and stops at the first one that is
/// unchangeable, still settling, or too big to drain.
pub fn scale_down(shards: &mut [ShardInfo], max: i64, max_idle_secs: u64, now_secs: u64) -> ScaleDown {
    let mut desired = shards.len();
    let mut transfers = 0;

    for i in (0..shards.len()).rev() {
        let shard = &shards[i];
        if !shard.changeable {
            break;
        }
        if shard.idle_longer_than(max_idle_secs, now_secs) {
            debug!(shard = %shard.id, "idle shard can be removed");
            desired -= 1;
            continue;
        }

        let settling = shard
            .scraping
            .values()
            .any(|s| s.state == TargetState::Normal && !s.is_stable());
        if settling {
            break;
        }

        let Some(moves) = plan_drain(shards, i, max) else {
            break;
        };
        for (hash, to) in &moves {
            if transfer(shards, i, *to, *hash) {
                transfers += 1;
            }
        }
        if !moves.is_empty() {
            info!(shard = %shards[i].id, targets = moves.len(), "draining tail shard");
        }
    }

    ScaleDown { desired, transfers }
}

/// First-fit every stable `Normal` target of shard `i` into the changeable
/// shards before it. `None` if any of them would not fit.
fn plan_drain(shards: &[ShardInfo], i: usize, max: i64) -> Option<Vec<(TargetHash, usize)>> {
    let mut heads: Vec<i64> = shards[..i].iter().map(|s| s.runtime.head_series).collect();
    let mut moves = Vec::new();

    for (hash, status) in &shards[i].scraping {
        if status.state != TargetState::Normal {
            continue;
        }
        let to = (0..i).find(|&j| shards[j].changeable && heads[j] + status.series < max)?;
        heads[to] += status.series;
        moves.push((*hash, to));
    }
    Some(moves)
}

/// Grow the pool by the unmet series demand.
///
/// `changeable + ceil(need_space / max)`, never below the current pool
/// size and never above `max_shards`.
pub fn scale_up(changeable: usize, total: usize, need_space: i64, max: i64, max_shards: i32) -> i32 {
    let extra = (need_space.max(0) + max - 1) / max;
    let wanted = (changeable as i64 + extra).max(total as i64);
    wanted.min(i64::from(max_shards)) as i32
}
