//! scrapegrid-shard — the coordinator's view of one logical shard.
//!
//! A shard is backed by one or more replicas serving the same assignment.
//! Reads and writes fan out to every replica and succeed if any replica
//! does; when all of them fail, the shard's cached state is dropped so the
//! next cycle starts from nothing rather than from stale numbers.
//!
//! # Architecture
//!
//! ```text
//! ShardHandle (id, ready flag, cached scrape status)
//!   └── ReplicaGroup
//!       ├── Replica 0 ── Arc<dyn ShardClient> + last-applied targets
//!       ├── Replica 1 ── ...
//!       └── broadcast(): join_all, comparator picks the best success
//! ```

pub mod client;
pub mod error;
pub mod handle;
pub mod replica;

pub use client::{HttpShardClient, ShardClient};
pub use error::{ShardError, ShardResult};
pub use handle::ShardHandle;
pub use replica::ReplicaGroup;
