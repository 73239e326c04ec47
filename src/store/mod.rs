// src/store/mod.rs
//! Opportunity persistence.
//!
//! The core only needs four operations (save, get_all, get_by_id, delete).
//! Backends: a local JSON file with a byte quota, a remote HTTP store, and a
//! fallback wrapper that degrades remote failures to the local file.
//! Writes are last-writer-wins; concurrent edits of the same id from
//! different clients are not coordinated.

pub mod handoff;
pub mod local;
pub mod remote;

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use metrics::{counter, describe_counter};
use once_cell::sync::OnceCell;
use tracing::{info, warn};

use crate::config::{StorageBackend, StorageConfig};
use crate::error::StoreError;
use crate::opportunity::Opportunity;

pub use handoff::{HandoffSlot, PREFILLED_SCORING_DATA};
pub use local::LocalStore;
pub use remote::RemoteStore;

fn ensure_metrics_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!(
            "store_fallback_total",
            "Remote store failures answered from the local store."
        );
        describe_counter!("store_errors_total", "Store operations that failed.");
    });
}

#[async_trait]
pub trait OpportunityStore: Send + Sync {
    /// Write the opportunity as-is (insert or replace by id).
    async fn put(&self, opp: &Opportunity) -> Result<(), StoreError>;
    async fn get_all(&self) -> Result<Vec<Opportunity>, StoreError>;
    async fn get_by_id(&self, id: &str) -> Result<Option<Opportunity>, StoreError>;
    /// Deleting a missing id is not an error.
    async fn delete(&self, id: &str) -> Result<(), StoreError>;
    fn backend(&self) -> &'static str;

    /// Refresh `updated_at`, then write.
    async fn save(&self, opp: &mut Opportunity) -> Result<(), StoreError> {
        opp.touch(Utc::now());
        self.put(opp).await
    }
}

/// Remote first; any remote error is logged and the call is answered from
/// the local store instead. Local errors are returned.
pub struct FallbackStore {
    remote: Arc<dyn OpportunityStore>,
    local: Arc<dyn OpportunityStore>,
}

impl FallbackStore {
    pub fn new(remote: Arc<dyn OpportunityStore>, local: Arc<dyn OpportunityStore>) -> Self {
        ensure_metrics_described();
        Self { remote, local }
    }

    fn note_fallback(&self, op: &'static str, err: &StoreError) {
        counter!("store_fallback_total").increment(1);
        warn!(
            target: "store",
            op,
            remote = self.remote.backend(),
            error = %err,
            "remote store failed, falling back to local"
        );
    }
}

#[async_trait]
impl OpportunityStore for FallbackStore {
    async fn put(&self, opp: &Opportunity) -> Result<(), StoreError> {
        match self.remote.put(opp).await {
            Ok(()) => Ok(()),
            Err(e) => {
                self.note_fallback("put", &e);
                self.local.put(opp).await
            }
        }
    }

    async fn get_all(&self) -> Result<Vec<Opportunity>, StoreError> {
        match self.remote.get_all().await {
            Ok(v) => Ok(v),
            Err(e) => {
                self.note_fallback("get_all", &e);
                self.local.get_all().await
            }
        }
    }

    async fn get_by_id(&self, id: &str) -> Result<Option<Opportunity>, StoreError> {
        match self.remote.get_by_id(id).await {
            Ok(v) => Ok(v),
            Err(e) => {
                self.note_fallback("get_by_id", &e);
                self.local.get_by_id(id).await
            }
        }
    }

    async fn delete(&self, id: &str) -> Result<(), StoreError> {
        match self.remote.delete(id).await {
            Ok(()) => Ok(()),
            Err(e) => {
                self.note_fallback("delete", &e);
                self.local.delete(id).await
            }
        }
    }

    fn backend(&self) -> &'static str {
        "remote+local"
    }
}

/// Build the store for a configuration. `remote` without a URL degrades to
/// local with a warning.
pub fn build_store(cfg: &StorageConfig) -> Result<Arc<dyn OpportunityStore>, StoreError> {
    ensure_metrics_described();
    let local: Arc<dyn OpportunityStore> =
        Arc::new(LocalStore::new(&cfg.data_dir, cfg.quota_bytes));

    let store: Arc<dyn OpportunityStore> = match (cfg.backend, cfg.remote_url.as_deref()) {
        (StorageBackend::Local, _) => local,
        (StorageBackend::Remote, None) => {
            warn!(target: "store", "remote backend selected without remote_url, using local");
            local
        }
        (StorageBackend::Remote, Some(url)) => {
            let remote = RemoteStore::new(url, cfg.timeout_ms)?;
            Arc::new(FallbackStore::new(Arc::new(remote), local))
        }
    };
    info!(target: "store", backend = store.backend(), "opportunity store ready");
    Ok(store)
}

/// Copy every opportunity from `from` to `to`; returns how many were copied.
pub async fn migrate(
    from: &dyn OpportunityStore,
    to: &dyn OpportunityStore,
) -> Result<usize, StoreError> {
    let all = from.get_all().await.inspect_err(|_| {
        counter!("store_errors_total").increment(1);
    })?;
    for opp in &all {
        to.put(opp).await.inspect_err(|_| {
            counter!("store_errors_total").increment(1);
        })?;
    }
    info!(
        target: "store",
        from = from.backend(),
        to = to.backend(),
        count = all.len(),
        "migrated opportunities"
    );
    Ok(all.len())
}
