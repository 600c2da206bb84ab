//! Registry API payloads and the translated [`RegistryEntry`].

use crate::config::StoreConfig;
use serde::{Deserialize, Serialize};
use tracing::warn;

/// `GET /models/{id}` response body (only the fields this crate reads).
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiModel {
    pub id: u64,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default, rename = "type")]
    pub kind: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub stats: ApiStats,
    #[serde(default)]
    pub model_versions: Vec<ApiModelVersion>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiStats {
    #[serde(default)]
    pub download_count: Option<u64>,
    #[serde(default)]
    pub rating: Option<f64>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiModelVersion {
    pub id: u64,
    #[serde(default)]
    pub base_model: Option<String>,
    #[serde(default)]
    pub trained_words: Vec<String>,
    #[serde(default)]
    pub files: Vec<ApiFile>,
    #[serde(default)]
    pub images: Vec<ApiImage>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiFile {
    #[serde(default)]
    pub hashes: ApiFileHashes,
    #[serde(default)]
    pub size: Option<f64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ApiFileHashes {
    #[serde(default, rename = "AUTOV2")]
    pub autov2: Option<String>,
    #[serde(default, rename = "SHA256")]
    pub sha256: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiImage {
    #[serde(default)]
    pub url: Option<String>,
}

/// One registry version, flattened from [`ApiModel`].
///
/// Transient: the synchronizer translates it into record fields and never
/// persists it as-is.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegistryEntry {
    pub collection_id: u64,
    pub version_id: u64,
    pub name: Option<String>,
    pub kind: Option<String>,
    /// Partial (AUTOV2) hash of the version's primary file.
    pub hash_partial: Option<String>,
    /// Full SHA256 hash of the version's primary file.
    pub hash_full: Option<String>,
    pub preview_url: Option<String>,
    pub trigger_words: Vec<String>,
    pub base_model: Option<String>,
    pub file_size: Option<f64>,
    pub download_count: Option<u64>,
    pub rating: Option<f64>,
    pub description: Option<String>,
}

impl RegistryEntry {
    /// Select a version of `model` and flatten it.
    ///
    /// Picks `version_id` when the collection lists it, else the first
    /// (latest) version. Returns `None` when the collection has no versions.
    pub fn from_api(model: ApiModel, version_id: Option<u64>) -> Option<Self> {
        let ApiModel {
            id,
            name,
            kind,
            description,
            stats,
            model_versions,
        } = model;

        let index = version_id
            .and_then(|wanted| model_versions.iter().position(|v| v.id == wanted))
            .unwrap_or(0);
        let Some(version) = model_versions.into_iter().nth(index) else {
            warn!("No versions found for collection {}", id);
            return None;
        };

        // Only the primary (first) file carries the hashes we record
        let primary = version.files.into_iter().next();
        let (hash_partial, hash_full, file_size) = match primary {
            Some(file) => (file.hashes.autov2, file.hashes.sha256, file.size),
            None => (None, None, None),
        };

        Some(Self {
            collection_id: id,
            version_id: version.id,
            name,
            kind,
            hash_partial,
            hash_full,
            preview_url: version.images.into_iter().next().and_then(|image| image.url),
            trigger_words: version.trained_words,
            base_model: version.base_model,
            file_size,
            download_count: stats.download_count,
            rating: stats.rating,
            description: description.map(|d| truncate_chars(&d, StoreConfig::DESCRIPTION_MAX_CHARS)),
        })
    }
}

fn truncate_chars(value: &str, max: usize) -> String {
    match value.char_indices().nth(max) {
        Some((cut, _)) => value[..cut].to_string(),
        None => value.to_string(),
    }
}
