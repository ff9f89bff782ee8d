//! scrapegrid-explore — cardinality estimation for unplaced targets.
//!
//! Before a newly discovered target can be placed, the coordinator needs
//! to know roughly how many series it will produce. The explorer scrapes
//! such targets speculatively and keeps the largest count it has seen.
//!
//! # Architecture
//!
//! ```text
//! Explorer
//!   ├── job → hash → ExploringTarget (replaced whole on discovery update)
//!   ├── bounded queue of (job, hash)
//!   ├── N workers: recv → Scraper::scrape → record status
//!   │   ├── success: keep max(series); requeue until MAX_EXPLORE_TIMES
//!   │   └── failure: requeue after retry_interval while still known
//!   └── per-job counters (explored, failed)
//! ```

pub mod error;
pub mod explorer;
pub mod exposition;
pub mod scraper;

pub use error::ScrapeError;
pub use explorer::{Explorer, JobStats, MAX_EXPLORE_TIMES};
pub use exposition::count_series;
pub use scraper::{HttpScraper, Scraper};
