//! The remote write API used to push resolved merges back to the server.

use crate::error::{SyncError, SyncResult};
use async_trait::async_trait;
use drift_resolver::MergeMetadata;
use drift_types::FieldMap;
use reqwest::Client;
use serde::Serialize;
use std::sync::RwLock;
use std::time::Duration;
use tracing::debug;

/// Pushes a resolved write to the authoritative store.
#[async_trait]
pub trait RemoteApi: Send + Sync {
    /// `PUT /{entityType}/{entityId}` with the merged data and the
    /// resolution bookkeeping.
    async fn put_entity(
        &self,
        entity_type: &str,
        entity_id: &str,
        data: &FieldMap,
        metadata: &MergeMetadata,
    ) -> SyncResult<()>;
}

#[derive(Serialize)]
#[serde(rename_all = "snake_case")]
struct ResolvedWrite<'a> {
    data: &'a FieldMap,
    resolution_metadata: &'a MergeMetadata,
}

/// HTTP implementation of [`RemoteApi`].
pub struct HttpRemoteApi {
    base_url: String,
    client: Client,
    auth_token: RwLock<Option<String>>,
}

impl HttpRemoteApi {
    /// Creates a client for the given API base URL.
    pub fn new(base_url: impl Into<String>) -> SyncResult<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()?;
        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client,
            auth_token: RwLock::new(None),
        })
    }

    /// Sets (or clears) the bearer token attached to requests.
    pub fn set_auth_token(&self, token: Option<String>) {
        *self.auth_token.write().unwrap_or_else(|e| e.into_inner()) = token;
    }
}

#[async_trait]
impl RemoteApi for HttpRemoteApi {
    async fn put_entity(
        &self,
        entity_type: &str,
        entity_id: &str,
        data: &FieldMap,
        metadata: &MergeMetadata,
    ) -> SyncResult<()> {
        let url = format!("{}/{entity_type}/{entity_id}", self.base_url);
        debug!(%url, "pushing resolved write");

        let mut request = self.client.put(&url).json(&ResolvedWrite {
            data,
            resolution_metadata: metadata,
        });
        if let Some(token) = &*self.auth_token.read().unwrap_or_else(|e| e.into_inner()) {
            request = request.bearer_auth(token);
        }

        let response = request.send().await?;
        if !response.status().is_success() {
            return Err(SyncError::Api(format!(
                "PUT {url} returned {}",
                response.status()
            )));
        }
        Ok(())
    }
}
