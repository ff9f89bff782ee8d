//! Load shedding for over-capacity shards.

use tracing::{info, warn};

use scrapegrid_core::TargetHash;

use crate::shard_info::{ShardInfo, transfer};

/// A load threshold and the occupancy to shed down to once it is crossed.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Tier {
    /// Head series as a multiple of the per-shard maximum.
    pub rate: f64,
    /// Movable series to keep, as a fraction of the maximum.
    pub expected: f64,
}

/// Most severe first; the first tier met applies.
pub const TIERS: [Tier; 4] = [
    Tier { rate: 1.8, expected: 0.0 },
    Tier { rate: 1.6, expected: 0.2 },
    Tier { rate: 1.4, expected: 0.5 },
    Tier { rate: 1.1, expected: 1.0 },
];

/// The tier a shard at `head` series falls into, if any.
pub fn tier_for(head: i64, max: i64) -> Option<Tier> {
    let ratio = head as f64 / max as f64;
    TIERS.iter().copied().find(|t| ratio >= t.rate)
}

/// Outcome of a shedding pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AlleviateOutcome {
    pub transfers: usize,
    /// Series that could not be shed anywhere.
    pub need_space: i64,
}

/// Shed load from every changeable shard over a tier, moving stable,
/// healthy `Normal` targets to the first other changeable shard with room.
pub fn alleviate(shards: &mut [ShardInfo], max: i64) -> AlleviateOutcome {
    let mut outcome = AlleviateOutcome::default();

    for i in 0..shards.len() {
        if !shards[i].changeable {
            continue;
        }
        let head = shards[i].runtime.head_series;
        let Some(tier) = tier_for(head, max) else {
            continue;
        };

        let expected = (tier.expected * max as f64) as i64;
        let mut total = shards[i].movable_series();
        if total <= expected {
            continue;
        }
        info!(shard = %shards[i].id, head, total, expected, "shard over capacity, shedding");

        let candidates: Vec<(TargetHash, i64)> = shards[i]
            .scraping
            .iter()
            .filter(|(_, s)| s.is_movable())
            .map(|(h, s)| (*h, s.series))
            .collect();

        for (hash, series) in candidates {
            if total <= expected {
                break;
            }
            if series > max {
                warn!(shard = %shards[i].id, hash, series, max, "target larger than any shard, abandoning shedding");
                break;
            }
            let dest = (0..shards.len())
                .find(|&j| j != i && shards[j].changeable && shards[j].has_room(series, max));
            if let Some(j) = dest {
                if transfer(shards, i, j, hash) {
                    total -= series;
                    outcome.transfers += 1;
                }
            }
        }

        if total > expected {
            outcome.need_space += total - expected;
            warn!(shard = %shards[i].id, unmet = total - expected, "could not shed enough load");
        }
    }

    outcome
}
