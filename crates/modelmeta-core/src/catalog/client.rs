//! HTTP client for the registry catalog API.
//!
//! Every failure on the fetch path (network error, timeout, non-2xx status,
//! malformed body, missing versions) is logged here and surfaces to callers
//! of [`CatalogClient::fetch_entry`] as `None`. Nothing is retried.

use super::auth::resolve_token;
use super::types::{ApiModel, RegistryEntry};
use crate::config::NetworkConfig;
use crate::error::{ModelMetaError, Result};
use reqwest::{Client, RequestBuilder, StatusCode};
use std::path::Path;
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Runtime configuration for [`CatalogClient`].
#[derive(Clone)]
pub struct CatalogClientConfig {
    /// API base, e.g. `https://civitai.com/api/v1`. Collections live under `/models/{id}`.
    pub api_base: String,
    pub token: Option<String>,
    pub metadata_timeout: Duration,
    pub preview_timeout: Duration,
}

impl Default for CatalogClientConfig {
    fn default() -> Self {
        Self {
            api_base: NetworkConfig::REGISTRY_API_BASE.to_string(),
            token: None,
            metadata_timeout: NetworkConfig::METADATA_TIMEOUT,
            preview_timeout: NetworkConfig::PREVIEW_TIMEOUT,
        }
    }
}

impl std::fmt::Debug for CatalogClientConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CatalogClientConfig")
            .field("api_base", &self.api_base)
            .field("token", &self.token.as_ref().map(|_| "<redacted>"))
            .field("metadata_timeout", &self.metadata_timeout)
            .field("preview_timeout", &self.preview_timeout)
            .finish()
    }
}

impl CatalogClientConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_token(mut self, token: Option<String>) -> Self {
        self.token = token.filter(|t| !t.trim().is_empty());
        self
    }

    /// Resolve the token from `explicit`, the token file, or the environment.
    pub fn with_resolved_token(mut self, explicit: Option<&str>) -> Self {
        match resolve_token(explicit) {
            Some((token, source)) => {
                debug!("Using registry token from {:?}", source);
                self.token = Some(token);
            }
            None => self.token = None,
        }
        self
    }

    pub fn with_metadata_timeout(mut self, timeout: Duration) -> Self {
        self.metadata_timeout = timeout;
        self
    }

    pub fn with_preview_timeout(mut self, timeout: Duration) -> Self {
        self.preview_timeout = timeout;
        self
    }
}

/// Client for registry lookups and preview downloads.
pub struct CatalogClient {
    /// Client carrying the short metadata timeout
    metadata_client: Client,
    /// Client carrying the longer preview timeout
    preview_client: Client,
    config: CatalogClientConfig,
}

impl std::fmt::Debug for CatalogClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CatalogClient")
            .field("config", &self.config)
            .finish()
    }
}

impl CatalogClient {
    /// Build a client from `config`.
    pub fn new(config: CatalogClientConfig) -> Result<Self> {
        let metadata_client = build_http_client(config.metadata_timeout)?;
        let preview_client = build_http_client(config.preview_timeout)?;
        Ok(Self {
            metadata_client,
            preview_client,
            config,
        })
    }

    pub fn config(&self) -> &CatalogClientConfig {
        &self.config
    }

    /// Whether requests carry a bearer token.
    pub fn has_token(&self) -> bool {
        self.config.token.is_some()
    }

    // ========================================
    // Catalog lookups
    // ========================================

    /// Fetch a registry entry, selecting `version_id` or the latest version.
    ///
    /// Returns `None` on any failure; the cause is logged.
    pub async fn fetch_entry(
        &self,
        collection_id: u64,
        version_id: Option<u64>,
    ) -> Option<RegistryEntry> {
        match self.lookup_entry(collection_id, version_id).await {
            Ok(entry) => {
                info!(
                    "Fetched registry metadata for collection {}: {}",
                    collection_id,
                    entry.name.as_deref().unwrap_or("<unnamed>")
                );
                Some(entry)
            }
            Err(e) => {
                error!(
                    "Failed to fetch registry metadata for collection {}: {}",
                    collection_id, e
                );
                None
            }
        }
    }

    /// Like [`fetch_entry`](Self::fetch_entry) but reports why the lookup failed.
    pub async fn lookup_entry(
        &self,
        collection_id: u64,
        version_id: Option<u64>,
    ) -> Result<RegistryEntry> {
        let model = self.fetch_collection(collection_id).await?;
        RegistryEntry::from_api(model, version_id)
            .ok_or(ModelMetaError::RegistryNotFound { collection_id })
    }

    async fn fetch_collection(&self, collection_id: u64) -> Result<ApiModel> {
        let url = format!("{}/models/{}", self.config.api_base, collection_id);
        debug!("GET {}", url);

        let response = self
            .authorize(self.metadata_client.get(&url))
            .send()
            .await
            .map_err(|e| self.map_send_error(e, self.config.metadata_timeout))?;

        match response.status() {
            status if status.is_success() => {}
            StatusCode::NOT_FOUND => return Err(ModelMetaError::RegistryNotFound { collection_id }),
            status => {
                return Err(ModelMetaError::HttpStatus {
                    url,
                    status: status.as_u16(),
                })
            }
        }

        let body = response
            .text()
            .await
            .map_err(|e| self.map_send_error(e, self.config.metadata_timeout))?;
        serde_json::from_str(&body).map_err(|e| ModelMetaError::Json {
            message: format!("Failed to parse registry response for {}: {}", url, e),
            source: Some(e),
        })
    }

    // ========================================
    // Preview download
    // ========================================

    /// Download a preview image to `dest`, creating parent directories.
    ///
    /// The body is buffered in full and written once. Returns the number of
    /// bytes written.
    pub async fn download_preview(&self, url: &str, dest: &Path) -> Result<u64> {
        let response = self
            .authorize(self.preview_client.get(url))
            .send()
            .await
            .map_err(|e| self.map_send_error(e, self.config.preview_timeout))?;

        let status = response.status();
        if !status.is_success() {
            return Err(ModelMetaError::HttpStatus {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| self.map_send_error(e, self.config.preview_timeout))?;

        if let Some(parent) = dest.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| ModelMetaError::io_with_path(e, parent))?;
        }
        tokio::fs::write(dest, &bytes)
            .await
            .map_err(|e| ModelMetaError::io_with_path(e, dest))?;

        info!("Downloaded preview to {}", dest.display());
        Ok(bytes.len() as u64)
    }

    // ========================================
    // Internal
    // ========================================

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.config.token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    fn map_send_error(&self, err: reqwest::Error, timeout: Duration) -> ModelMetaError {
        if err.is_timeout() {
            warn!("Registry request timed out after {:?}", timeout);
            ModelMetaError::Timeout(timeout)
        } else {
            err.into()
        }
    }
}

fn build_http_client(timeout: Duration) -> Result<Client> {
    Client::builder()
        .timeout(timeout)
        .user_agent(NetworkConfig::USER_AGENT)
        .build()
        .map_err(|e| ModelMetaError::Network {
            message: format!("Failed to create HTTP client: {}", e),
            cause: None,
        })
}
