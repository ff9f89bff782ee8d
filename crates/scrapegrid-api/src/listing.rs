//! Prometheus-shaped target listing.

use serde::{Deserialize, Serialize};

use scrapegrid_core::{Labels, ScrapeStatus};
use scrapegrid_coordinator::CycleSnapshot;

/// Which half of the listing to return.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StateFilter {
    Active,
    Dropped,
    #[default]
    Any,
}

#[derive(Debug, Default, Deserialize)]
pub struct TargetsQuery {
    #[serde(default)]
    pub state: StateFilter,
}

/// `{"status": "success", "data": ...}`, as Prometheus answers.
#[derive(Debug, Serialize)]
pub struct PromResponse<T> {
    pub status: &'static str,
    pub data: T,
}

impl<T> PromResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            status: "success",
            data,
        }
    }
}

#[derive(Debug, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TargetListing {
    pub active_targets: Vec<ActiveTarget>,
    pub dropped_targets: Vec<DroppedTarget>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ActiveTarget {
    pub discovered_labels: Labels,
    pub labels: Labels,
    pub scrape_pool: String,
    pub scrape_url: String,
    pub health: &'static str,
    pub last_error: String,
    /// Unix milliseconds.
    pub last_scrape: Option<u64>,
    /// Seconds.
    pub last_scrape_duration: f64,
    pub series: i64,
    pub shards: Vec<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DroppedTarget {
    pub discovered_labels: Labels,
}

/// Assemble the listing from the last cycle's snapshot.
pub fn build_listing(snapshot: &CycleSnapshot, filter: StateFilter) -> TargetListing {
    let mut listing = TargetListing::default();

    if filter != StateFilter::Dropped {
        for (job, targets) in &snapshot.active {
            for target in targets {
                let blank = ScrapeStatus::default();
                let status = snapshot.global_status.get(&target.hash).unwrap_or(&blank);
                listing.active_targets.push(ActiveTarget {
                    discovered_labels: target.discovered_labels.clone(),
                    labels: target.labels.clone(),
                    scrape_pool: job.clone(),
                    scrape_url: target.url.clone(),
                    health: status.health.as_str(),
                    last_error: status.last_error.clone().unwrap_or_default(),
                    last_scrape: status.last_scrape,
                    last_scrape_duration: status.last_scrape_duration_ms as f64 / 1000.0,
                    series: status.series,
                    shards: status.shards.iter().cloned().collect(),
                });
            }
        }
    }

    if filter != StateFilter::Active {
        listing.dropped_targets = snapshot
            .dropped
            .values()
            .flatten()
            .map(|t| DroppedTarget {
                discovered_labels: t.discovered_labels.clone(),
            })
            .collect();
    }

    listing
}
