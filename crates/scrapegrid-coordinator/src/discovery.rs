//! Discovery feed.
//!
//! The coordinator only needs the current active and dropped target sets;
//! `StaticDiscovery` derives both from the `[[jobs]]` section of the
//! config, applying each job's target relabel rules.

use std::sync::{PoisonError, RwLock};

use http::Uri;
use tracing::debug;

use scrapegrid_core::{Labels, ScrapegridConfig, Target, TargetsByJob, compile_rules, keeps_all};

use crate::error::{CoordinatorError, CoordinatorResult};

/// Source of the authoritative target set, read once per cycle.
pub trait Discovery: Send + Sync {
    fn active_targets(&self) -> TargetsByJob;
    fn dropped_targets(&self) -> TargetsByJob;
}

#[derive(Debug, Clone, Default)]
struct TargetSets {
    active: TargetsByJob,
    dropped: TargetsByJob,
}

/// Targets listed in the config file.
#[derive(Debug, Default)]
pub struct StaticDiscovery {
    sets: RwLock<TargetSets>,
}

impl StaticDiscovery {
    pub fn from_config(config: &ScrapegridConfig) -> CoordinatorResult<Self> {
        let mut sets = TargetSets::default();

        for job in &config.jobs {
            let rules = compile_rules(&job.relabel)?;
            for static_target in &job.targets {
                let target = build_target(&job.name, &static_target.url, &static_target.labels)?;
                let bucket = if keeps_all(&rules, &target.discovered_labels) {
                    &mut sets.active
                } else {
                    debug!(job = %job.name, url = %target.url, "target dropped by relabel");
                    &mut sets.dropped
                };
                bucket.entry(job.name.clone()).or_default().push(target);
            }
        }

        Ok(Self {
            sets: RwLock::new(sets),
        })
    }

    /// Take over the target sets of `other` in one step.
    pub fn replace(&self, other: StaticDiscovery) {
        let next = other.sets.into_inner().unwrap_or_else(PoisonError::into_inner);
        *self.sets.write().unwrap_or_else(PoisonError::into_inner) = next;
    }

    fn read(&self) -> TargetSets {
        self.sets.read().unwrap_or_else(PoisonError::into_inner).clone()
    }
}

impl Discovery for StaticDiscovery {
    fn active_targets(&self) -> TargetsByJob {
        self.read().active
    }

    fn dropped_targets(&self) -> TargetsByJob {
        self.read().dropped
    }
}

/// Discovered labels carry the address, scheme, metrics path and job next
/// to the configured labels; final labels are the configured ones plus
/// `job` and `instance`.
fn build_target(job: &str, url: &str, configured: &Labels) -> CoordinatorResult<Target> {
    let uri: Uri = url
        .parse()
        .map_err(|e| CoordinatorError::Discovery(format!("job {job}: invalid url {url:?}: {e}")))?;
    let address = uri
        .authority()
        .map(|a| a.as_str().to_string())
        .ok_or_else(|| CoordinatorError::Discovery(format!("job {job}: url {url:?} has no host")))?;

    let mut discovered = configured.clone();
    discovered.insert("__address__".to_string(), address.clone());
    discovered.insert("__scheme__".to_string(), uri.scheme_str().unwrap_or("http").to_string());
    discovered.insert("__metrics_path__".to_string(), uri.path().to_string());
    discovered.insert("job".to_string(), job.to_string());

    let mut labels: Labels = configured
        .iter()
        .filter(|(k, _)| !k.starts_with("__"))
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect();
    labels.insert("job".to_string(), job.to_string());
    labels.entry("instance".to_string()).or_insert(address);

    Ok(Target::new(job, url, discovered, labels))
}
