//! scrapegrid-api — the coordinator's HTTP surface.
//!
//! Thin axum handlers over the last cycle snapshot and the live config.
//!
//! # API Routes
//!
//! | Method | Path | Description |
//! |---|---|---|
//! | GET | `/api/v1/targets?state=active\|dropped\|any` | Target listing with merged scrape status |
//! | GET | `/api/v1/status/config` | Raw config and its hash |
//! | GET | `/api/v1/shards` | Per-shard summary of the last cycle |
//! | POST | `/-/reload` | Reload the config file |
//! | GET | `/metrics` | Prometheus exposition |
//! | GET | `/healthz` | Liveness |

pub mod handlers;
pub mod listing;
pub mod prometheus;

use std::sync::Arc;

use axum::Router;
use axum::routing::{get, post};

use scrapegrid_coordinator::{Coordinator, Reloader};

/// Shared state for API handlers.
#[derive(Clone)]
pub struct ApiState {
    pub coordinator: Arc<Coordinator>,
    pub reloader: Arc<Reloader>,
}

/// Build the complete API router.
pub fn build_router(coordinator: Arc<Coordinator>, reloader: Arc<Reloader>) -> Router {
    let state = ApiState {
        coordinator,
        reloader,
    };

    let api_routes = Router::new()
        .route("/targets", get(handlers::list_targets))
        .route("/status/config", get(handlers::get_config))
        .route("/shards", get(handlers::list_shards))
        .with_state(state.clone());

    Router::new()
        .nest("/api/v1", api_routes)
        .route("/-/reload", post(handlers::reload))
        .route("/metrics", get(handlers::prometheus_metrics))
        .route("/healthz", get(handlers::healthz))
        .with_state(state)
}
