//! scrapegrid-rebalance — the placement algorithm.
//!
//! Runs once per reconciliation cycle over the freshly collected
//! [`ShardInfo`] list. Everything here is synchronous and side-effect free
//! apart from the shard infos it is handed; the coordinator decides what
//! to do with the result.
//!
//! # Steps (strictly in order)
//!
//! ```text
//! gc          drop dead and duplicate assignments
//! alleviate   shed load from shards over a threshold tier
//! assign      place unscraped targets that have a good estimate
//! scale down  drain the pool tail when idle-drain is enabled
//! scale up    grow by the unmet series demand
//! status      merge one authoritative ScrapeStatus per target
//! ```

pub mod alleviate;
pub mod assign;
pub mod engine;
pub mod gc;
pub mod lookup;
pub mod scale;
pub mod shard_info;
pub mod status;

#[cfg(test)]
pub(crate) mod fixtures;

pub use engine::{RebalanceEngine, RebalancePlan};
pub use lookup::ExploreLookup;
pub use shard_info::ShardInfo;
