// src/lib.rs
// Public library surface for the binary and integration tests.

pub mod api;
pub mod config;
pub mod criteria;
pub mod decision;
pub mod engine;
pub mod error;
pub mod fusion;
pub mod history;
pub mod ingest;
pub mod keywords;
pub mod metrics;
pub mod opportunity;
pub mod scoring;
pub mod source_weights;
pub mod store;

pub use crate::api::{router, AppState};
pub use crate::config::WorkbenchConfig;
pub use crate::error::{DecisionError, ImportError, LifecycleError, StoreError};

use anyhow::Context;
use axum::Router;
use tracing::info;

/// Build the full application router from the environment: config, store,
/// fusion trust table, and `/metrics` when `METRICS_ENABLED=1`.
pub async fn app() -> anyhow::Result<Router> {
    let cfg = WorkbenchConfig::load().context("loading workbench config")?;
    app_with_config(cfg).await
}

pub async fn app_with_config(cfg: WorkbenchConfig) -> anyhow::Result<Router> {
    let store = store::build_store(&cfg.storage).context("building opportunity store")?;
    let quota = cfg.storage.quota_bytes;
    let state = AppState::new(cfg, store);
    let mut router = api::router(state);

    if crate::metrics::Metrics::enabled_from_env() {
        let m = crate::metrics::Metrics::init(quota)?;
        router = router.merge(m.router());
        info!(target: "api", "metrics route enabled");
    }
    Ok(router)
}
