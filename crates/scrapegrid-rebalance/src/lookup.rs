//! Cardinality estimates as seen by the engine.

use scrapegrid_core::{ScrapeStatus, Target, TargetHash};
use scrapegrid_explore::Explorer;

/// Source of series estimates for targets no shard is scraping yet.
pub trait ExploreLookup {
    /// Estimate for a placement candidate; may start sampling it.
    fn explore(&self, job: &str, target: &Target) -> Option<ScrapeStatus>;

    /// Estimate for status reporting only; never starts sampling.
    fn estimate(&self, job: &str, hash: TargetHash) -> Option<ScrapeStatus>;
}

impl ExploreLookup for Explorer {
    fn explore(&self, job: &str, target: &Target) -> Option<ScrapeStatus> {
        self.get(job, target)
    }

    fn estimate(&self, job: &str, hash: TargetHash) -> Option<ScrapeStatus> {
        Explorer::estimate(self, job, hash)
    }
}
