//! Live configuration and reloading.

use std::path::PathBuf;
use std::sync::{Arc, PoisonError, RwLock};

use tracing::info;

use scrapegrid_core::LoadedConfig;
use scrapegrid_explore::Explorer;

use crate::discovery::StaticDiscovery;
use crate::error::CoordinatorResult;

/// The configuration currently in force. Readers get a cheap `Arc`; a
/// reload swaps the whole thing at once.
#[derive(Debug, Clone)]
pub struct ConfigStore {
    current: Arc<RwLock<Arc<LoadedConfig>>>,
}

impl ConfigStore {
    pub fn new(config: LoadedConfig) -> Self {
        Self {
            current: Arc::new(RwLock::new(Arc::new(config))),
        }
    }

    pub fn current(&self) -> Arc<LoadedConfig> {
        self.current.read().unwrap_or_else(PoisonError::into_inner).clone()
    }

    pub fn replace(&self, config: LoadedConfig) -> Arc<LoadedConfig> {
        let next = Arc::new(config);
        *self.current.write().unwrap_or_else(PoisonError::into_inner) = next.clone();
        next
    }
}

/// Re-reads the config file and pushes it into every consumer.
///
/// Nothing changes unless the new file parses, validates and yields a
/// usable target set. Shard membership and coordinator options are fixed
/// for the life of the process.
pub struct Reloader {
    path: PathBuf,
    store: ConfigStore,
    discovery: Arc<StaticDiscovery>,
    explorer: Explorer,
}

impl Reloader {
    pub fn new(
        path: impl Into<PathBuf>,
        store: ConfigStore,
        discovery: Arc<StaticDiscovery>,
        explorer: Explorer,
    ) -> Self {
        Self {
            path: path.into(),
            store,
            discovery,
            explorer,
        }
    }

    pub fn store(&self) -> &ConfigStore {
        &self.store
    }

    pub fn reload(&self) -> CoordinatorResult<Arc<LoadedConfig>> {
        let loaded = LoadedConfig::from_file(&self.path)?;
        let targets = StaticDiscovery::from_config(&loaded.config)?;
        self.explorer.apply_config(&loaded.config)?;

        self.discovery.replace(targets);
        let hash = loaded.hash.clone();
        let current = self.store.replace(loaded);
        info!(path = %self.path.display(), %hash, "configuration reloaded");
        Ok(current)
    }
}
