//! scrapegrid-coordinator — the reconciliation driver.
//!
//! Every `reconcile_interval` the coordinator pulls state from each shard,
//! hands it to the rebalance engine, pushes the resulting assignments back
//! and asks the shard manager for the desired pool size.
//!
//! # Architecture
//!
//! ```text
//! Coordinator::run (ticker + watch shutdown)
//!   ├── Discovery           active / dropped targets
//!   ├── collect()           one task per shard: status, runtime, config check
//!   ├── RebalanceEngine     gc → alleviate → assign → scale → status
//!   ├── ShardHandle::update_targets   concurrent, failures logged
//!   ├── ShardManager::change_scale
//!   └── CycleSnapshot       published for the read API
//! ```

pub mod collector;
pub mod coordinator;
pub mod discovery;
pub mod error;
pub mod manager;
pub mod reload;

pub use collector::collect;
pub use coordinator::{Coordinator, CycleSnapshot};
pub use discovery::{Discovery, StaticDiscovery};
pub use error::{CoordinatorError, CoordinatorResult};
pub use manager::{ShardManager, StaticShardManager};
pub use reload::{ConfigStore, Reloader};

#[cfg(test)]
pub(crate) mod fakes;
