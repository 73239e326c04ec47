// src/store/local.rs
//! Local JSON-file store.
//!
//! All opportunities live in one `opportunities.json` document under the data
//! directory. Every write re-serializes the document, checks it against the
//! quota and replaces the file through a temp file + rename.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use metrics::counter;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::debug;

use super::OpportunityStore;
use crate::error::StoreError;
use crate::opportunity::Opportunity;

pub const FILE_NAME: &str = "opportunities.json";

#[derive(Debug)]
pub struct LocalStore {
    path: PathBuf,
    quota_bytes: usize,
    // serializes read-modify-write cycles within this process
    lock: Mutex<()>,
}

impl LocalStore {
    pub fn new(data_dir: impl AsRef<Path>, quota_bytes: usize) -> Self {
        Self {
            path: data_dir.as_ref().join(FILE_NAME),
            quota_bytes,
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn read_all(&self) -> Result<BTreeMap<String, Opportunity>, StoreError> {
        match fs::read(&self.path).await {
            Ok(bytes) if bytes.iter().all(u8::is_ascii_whitespace) => Ok(BTreeMap::new()),
            Ok(bytes) => Ok(serde_json::from_slice(&bytes)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(BTreeMap::new()),
            Err(e) => Err(e.into()),
        }
    }

    async fn write_all(&self, all: &BTreeMap<String, Opportunity>) -> Result<(), StoreError> {
        let bytes = serde_json::to_vec_pretty(all)?;
        if bytes.len() > self.quota_bytes {
            counter!("store_errors_total").increment(1);
            return Err(StoreError::QuotaExceeded {
                needed: bytes.len(),
                quota: self.quota_bytes,
            });
        }

        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).await?;
        }
        let temp_path = self.path.with_file_name(format!(
            ".{}.{}.{}.tmp",
            FILE_NAME,
            std::process::id(),
            bytes.len()
        ));

        let mut file = fs::File::create(&temp_path).await?;
        file.write_all(&bytes).await?;
        file.flush().await?;
        drop(file);

        if let Err(e) = fs::rename(&temp_path, &self.path).await {
            let _ = fs::remove_file(&temp_path).await;
            counter!("store_errors_total").increment(1);
            return Err(e.into());
        }
        debug!(target: "store", bytes = bytes.len(), count = all.len(), "local store written");
        Ok(())
    }
}

#[async_trait]
impl OpportunityStore for LocalStore {
    async fn put(&self, opp: &Opportunity) -> Result<(), StoreError> {
        let _guard = self.lock.lock().await;
        let mut all = self.read_all().await?;
        all.insert(opp.id.clone(), opp.clone());
        self.write_all(&all).await
    }

    async fn get_all(&self) -> Result<Vec<Opportunity>, StoreError> {
        let _guard = self.lock.lock().await;
        let mut v: Vec<Opportunity> = self.read_all().await?.into_values().collect();
        v.sort_by(|a, b| b.updated_at.cmp(&a.updated_at).then_with(|| a.id.cmp(&b.id)));
        Ok(v)
    }

    async fn get_by_id(&self, id: &str) -> Result<Option<Opportunity>, StoreError> {
        let _guard = self.lock.lock().await;
        Ok(self.read_all().await?.remove(id))
    }

    async fn delete(&self, id: &str) -> Result<(), StoreError> {
        let _guard = self.lock.lock().await;
        let mut all = self.read_all().await?;
        if all.remove(id).is_some() {
            self.write_all(&all).await?;
        }
        Ok(())
    }

    fn backend(&self) -> &'static str {
        "local"
    }
}
