//! scrapegrid-core — shared model for the scrapegrid control plane.
//!
//! Everything that crosses a crate boundary lives here: targets and their
//! scrape status, shard runtime reports, the TOML config model, relabel
//! rules, and the JSON envelope used on every HTTP surface.

pub mod config;
pub mod error;
pub mod hash;
pub mod relabel;
pub mod types;
pub mod wire;

pub use config::{
    ApiConfig, CoordinatorConfig, CoordinatorOptions, ExploreConfig, JobConfig, LoadedConfig,
    ScrapegridConfig, ShardConfig, StaticTargetConfig, parse_duration,
};
pub use error::{ConfigError, ConfigResult};
pub use hash::{content_hash, target_hash};
pub use relabel::{CompiledRule, RelabelAction, RelabelRule, compile_rules, keeps_all};
pub use types::*;
pub use wire::ApiResponse;
