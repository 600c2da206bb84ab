//! Side-record schema.
//!
//! An [`ArtifactRecord`] is an open record: a fixed set of typed fields plus
//! an `extra` map that carries any other keys verbatim, so records written by
//! other tools (or a newer version) survive a load/save cycle untouched.

use crate::config::SyncConfig;
use crate::fingerprint::HashAlgo;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Extension fields filled from registry entries and owned by them.
pub const REGISTRY_EXTRA_FIELDS: [&str; 3] = ["download_count", "rating", "file_size"];

/// Metadata persisted next to one artifact file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ArtifactRecord {
    /// Canonical `"<ALGO>: <HEX>"` hash. Absent means "unprocessed".
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hash: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hash_algo: Option<HashAlgo>,
    /// Raw partial (AUTOV2) digest, when known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hash_partial: Option<String>,
    /// Raw full SHA256 digest, when known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hash_full: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub registry_id: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub registry_version_id: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    /// Free-form category (folder kind such as `LoRA`, or the registry type).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub artifact_kind: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub trigger_words: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_model: Option<String>,
    /// Local path of the downloaded preview image.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preview_path: Option<String>,
    /// Remote preview reference reported by the registry.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preview_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Who produced the record (`auto-detected`, `registry`, ...).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    /// RFC 3339 timestamp stamped by the store on every successful save.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_updated: Option<String>,
    /// Caller-supplied extension fields, preserved verbatim.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ArtifactRecord {
    /// Minimal record written by the watch loop for a freshly hashed artifact.
    pub fn auto_detected(partial_hex: &str, artifact_kind: &str) -> Self {
        Self {
            hash: Some(HashAlgo::PartialContent.canonical(partial_hex)),
            hash_algo: Some(HashAlgo::PartialContent),
            hash_partial: Some(partial_hex.to_uppercase()),
            artifact_kind: Some(artifact_kind.to_string()),
            source: Some(SyncConfig::AUTO_DETECTED_SOURCE.to_string()),
            ..Default::default()
        }
    }

    /// Whether the synchronizer treats this record as already processed.
    ///
    /// Only the presence of a non-empty hash counts; registry linkage is not
    /// required.
    pub fn has_hash(&self) -> bool {
        self.hash
            .as_deref()
            .map(|h| !h.trim().is_empty())
            .unwrap_or(false)
    }

    /// Set the hash group from a raw digest and its algorithm.
    pub fn set_hash(&mut self, hex: &str, algo: HashAlgo) {
        self.hash = Some(algo.canonical(hex));
        self.hash_algo = Some(algo);
        match algo {
            HashAlgo::PartialContent => self.hash_partial = Some(hex.trim().to_uppercase()),
            HashAlgo::FullContent => self.hash_full = Some(hex.trim().to_lowercase()),
        }
    }

    /// Overlay `other` onto this record.
    ///
    /// Typed fields set in `other` win; unset ones keep their current value.
    /// Extension fields merge key by key. The hash group (`hash`, `hash_algo`,
    /// `hash_partial`, `hash_full`) is replaced as a unit whenever `other`
    /// carries a hash, so stale digests never survive next to a new hash.
    pub fn merge(&mut self, other: ArtifactRecord) {
        if other.hash.is_some() {
            self.hash = other.hash;
            self.hash_algo = other.hash_algo;
            self.hash_partial = other.hash_partial;
            self.hash_full = other.hash_full;
        }

        overlay(&mut self.registry_id, other.registry_id);
        overlay(&mut self.registry_version_id, other.registry_version_id);
        overlay(&mut self.display_name, other.display_name);
        overlay(&mut self.artifact_kind, other.artifact_kind);
        overlay(&mut self.base_model, other.base_model);
        overlay(&mut self.preview_path, other.preview_path);
        overlay(&mut self.preview_url, other.preview_url);
        overlay(&mut self.description, other.description);
        overlay(&mut self.source, other.source);
        overlay(&mut self.last_updated, other.last_updated);

        if !other.trigger_words.is_empty() {
            self.trigger_words = other.trigger_words;
        }

        for (key, value) in other.extra {
            self.extra.insert(key, value);
        }
    }

    /// Overlay a record built from a registry entry.
    ///
    /// Registry-owned fields are always replaced, so a version that reports
    /// no trigger words, base model or preview clears the previous
    /// version's values, and [`REGISTRY_EXTRA_FIELDS`] are dropped unless the
    /// entry sets them again. The hash group, other extension fields and the
    /// local `preview_path` follow [`merge`](Self::merge).
    pub fn overlay_registry(&mut self, mut entry: ArtifactRecord) {
        self.registry_id = entry.registry_id.take();
        self.registry_version_id = entry.registry_version_id.take();
        self.display_name = entry.display_name.take();
        self.artifact_kind = entry.artifact_kind.take();
        self.base_model = entry.base_model.take();
        self.preview_url = entry.preview_url.take();
        self.description = entry.description.take();
        self.trigger_words = std::mem::take(&mut entry.trigger_words);
        for key in REGISTRY_EXTRA_FIELDS {
            self.extra.remove(key);
        }
        self.merge(entry);
    }
}

fn overlay<T>(slot: &mut Option<T>, value: Option<T>) {
    if value.is_some() {
        *slot = value;
    }
}
