// src/store/remote.rs
//! HTTP opportunity store.
//!
//! Expects a small REST surface under `base_url`:
//! `GET /opportunities`, `GET|PUT|DELETE /opportunities/{id}`.
//! 404 on read means "absent"; 404 on delete is success.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};

use super::OpportunityStore;
use crate::error::StoreError;
use crate::opportunity::Opportunity;

#[derive(Debug, Clone)]
pub struct RemoteStore {
    client: Client,
    base_url: String,
}

impl RemoteStore {
    pub fn new(base_url: &str, timeout_ms: u64) -> Result<Self, StoreError> {
        let client = Client::builder()
            .timeout(Duration::from_millis(timeout_ms))
            .build()?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    fn collection_url(&self) -> String {
        format!("{}/opportunities", self.base_url)
    }

    fn item_url(&self, id: &str) -> String {
        format!("{}/opportunities/{}", self.base_url, id)
    }
}

fn check(status: StatusCode, op: &str) -> Result<(), StoreError> {
    if status.is_success() {
        Ok(())
    } else {
        Err(StoreError::Remote(format!("{op}: HTTP {status}")))
    }
}

#[async_trait]
impl OpportunityStore for RemoteStore {
    async fn put(&self, opp: &Opportunity) -> Result<(), StoreError> {
        let resp = self.client.put(self.item_url(&opp.id)).json(opp).send().await?;
        check(resp.status(), "put")
    }

    async fn get_all(&self) -> Result<Vec<Opportunity>, StoreError> {
        let resp = self.client.get(self.collection_url()).send().await?;
        check(resp.status(), "get_all")?;
        Ok(resp.json::<Vec<Opportunity>>().await?)
    }

    async fn get_by_id(&self, id: &str) -> Result<Option<Opportunity>, StoreError> {
        let resp = self.client.get(self.item_url(id)).send().await?;
        if resp.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        check(resp.status(), "get_by_id")?;
        Ok(Some(resp.json::<Opportunity>().await?))
    }

    async fn delete(&self, id: &str) -> Result<(), StoreError> {
        let resp = self.client.delete(self.item_url(id)).send().await?;
        if resp.status() == StatusCode::NOT_FOUND {
            return Ok(());
        }
        check(resp.status(), "delete")
    }

    fn backend(&self) -> &'static str {
        "remote"
    }
}
