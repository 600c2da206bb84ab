//! Per-artifact side-record store.
//!
//! Each artifact `foo.safetensors` owns `foo.safetensors.metadata.json` next
//! to it. The store keeps an in-memory cache of loaded records and serializes
//! writes to the same path; writes to different paths proceed in parallel.
//!
//! The cache is never expired on its own. Editing a side-record behind the
//! store's back is only seen after [`MetadataStore::clear_cache`] or a
//! `load(path, false)`.

use crate::config::StoreConfig;
use crate::error::{ModelMetaError, Result};
use crate::fingerprint::HashAlgo;
use crate::metadata::atomic::{atomic_read_json, atomic_write_json};
use crate::metadata::hash_format::normalize_hash;
use crate::metadata::record::ArtifactRecord;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, info, warn};

/// One artifact found by [`MetadataStore::scan_folder`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScannedArtifact {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub path: String,
    #[serde(default)]
    pub size: u64,
    /// Loaded side-record, empty when the artifact has none yet.
    #[serde(default)]
    pub metadata: ArtifactRecord,
}

/// Store for artifact side-records.
///
/// Safe to share across threads; concurrent writers to the same path are
/// serialized, and the last one to save wins.
#[derive(Debug, Default)]
pub struct MetadataStore {
    cache: Mutex<HashMap<PathBuf, ArtifactRecord>>,
    path_locks: Mutex<HashMap<PathBuf, Arc<Mutex<()>>>>,
}

impl MetadataStore {
    /// Create a store with an empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    // ========================================
    // Path helpers
    // ========================================

    /// Side-record path for an artifact: the artifact path plus `.metadata.json`.
    pub fn metadata_path(artifact: &Path) -> PathBuf {
        let mut raw: OsString = artifact.as_os_str().to_owned();
        raw.push(StoreConfig::METADATA_SUFFIX);
        PathBuf::from(raw)
    }

    /// Whether a file name carries a recognized artifact extension.
    ///
    /// Dotfiles never count, whatever their extension.
    pub fn is_artifact_name(path: &Path) -> bool {
        let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
            return false;
        };
        if name.starts_with('.') {
            return false;
        }
        path.extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| {
                let ext = ext.to_lowercase();
                StoreConfig::ARTIFACT_EXTENSIONS.contains(&ext.as_str())
            })
            .unwrap_or(false)
    }

    /// List recognized artifacts directly inside `folder` (non-recursive),
    /// in directory listing order. Directories and dotfiles are skipped.
    pub fn list_artifacts(folder: &Path) -> Result<Vec<PathBuf>> {
        let entries =
            std::fs::read_dir(folder).map_err(|e| ModelMetaError::io_with_path(e, folder))?;

        let mut artifacts = Vec::new();
        for entry in entries {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    warn!("Skipping unreadable entry in {}: {}", folder.display(), e);
                    continue;
                }
            };
            let path = entry.path();
            if !Self::is_artifact_name(&path) || !path.is_file() {
                continue;
            }
            artifacts.push(path);
        }

        Ok(artifacts)
    }

    // ========================================
    // Record operations
    // ========================================

    /// Load the record for an artifact.
    ///
    /// Returns `Ok(None)` when no side-record exists yet.
    pub fn load(&self, artifact: &Path, use_cache: bool) -> Result<Option<ArtifactRecord>> {
        if use_cache {
            if let Some(record) = self.cache().get(artifact) {
                debug!("Metadata cache hit for {}", artifact.display());
                return Ok(Some(record.clone()));
            }
        }

        let path = Self::metadata_path(artifact);
        let Some(record) = atomic_read_json::<ArtifactRecord>(&path)? else {
            debug!("No metadata file found for {}", artifact.display());
            return Ok(None);
        };

        self.cache()
            .insert(artifact.to_path_buf(), record.clone());
        debug!("Loaded metadata for {}", artifact.display());
        Ok(Some(record))
    }

    /// Save a record, overwriting any existing side-record.
    ///
    /// Stamps `last_updated`, normalizes `hash`, and returns the record as
    /// written.
    pub fn save(&self, artifact: &Path, record: ArtifactRecord) -> Result<ArtifactRecord> {
        let lock = self.path_lock(artifact);
        let _guard = lock.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        self.save_locked(artifact, record)
    }

    /// Read-modify-write a record under the path's lock.
    ///
    /// Starts from the existing record (or an empty one) and saves whatever
    /// `modify` leaves behind.
    pub fn update<F>(&self, artifact: &Path, modify: F) -> Result<ArtifactRecord>
    where
        F: FnOnce(&mut ArtifactRecord),
    {
        let lock = self.path_lock(artifact);
        let _guard = lock.lock().unwrap_or_else(|poisoned| poisoned.into_inner());

        let mut record = self.load(artifact, true)?.unwrap_or_default();
        modify(&mut record);
        self.save_locked(artifact, record)
    }

    /// Read-modify-write that `modify` may decline.
    ///
    /// When `modify` returns `false` nothing is written and `Ok(None)` is
    /// returned; the decision is made under the path's lock, so it sees
    /// every save that completed before it.
    pub fn update_if<F>(&self, artifact: &Path, modify: F) -> Result<Option<ArtifactRecord>>
    where
        F: FnOnce(&mut ArtifactRecord) -> bool,
    {
        let lock = self.path_lock(artifact);
        let _guard = lock.lock().unwrap_or_else(|poisoned| poisoned.into_inner());

        let mut record = self.load(artifact, true)?.unwrap_or_default();
        if !modify(&mut record) {
            return Ok(None);
        }
        self.save_locked(artifact, record).map(Some)
    }

    /// Delete an artifact's side-record and cache entry.
    ///
    /// Succeeds when there was nothing to delete.
    pub fn delete(&self, artifact: &Path) -> Result<()> {
        let lock = self.path_lock(artifact);
        let _guard = lock.lock().unwrap_or_else(|poisoned| poisoned.into_inner());

        let path = Self::metadata_path(artifact);
        match std::fs::remove_file(&path) {
            Ok(()) => info!("Deleted metadata for {}", display_name(artifact)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => {
                return Err(ModelMetaError::Io {
                    message: format!("Failed to delete metadata {}", path.display()),
                    path: Some(path),
                    source: Some(e),
                })
            }
        }

        self.cache().remove(artifact);
        Ok(())
    }

    /// Canonical hash of an artifact, if it has a record with one.
    pub fn get_hash(&self, artifact: &Path) -> Result<Option<String>> {
        Ok(self.load(artifact, true)?.and_then(|record| record.hash))
    }

    /// Set the hash fields of an artifact's record, creating it if needed.
    pub fn set_hash(&self, artifact: &Path, hex: &str, algo: HashAlgo) -> Result<ArtifactRecord> {
        self.update(artifact, |record| {
            let mut incoming = ArtifactRecord::default();
            incoming.set_hash(hex, algo);
            record.merge(incoming);
        })
    }

    /// Pair every artifact directly inside `folder` with its record.
    ///
    /// A missing folder yields an empty list. Per-artifact failures are
    /// logged and the artifact is reported with an empty record.
    pub fn scan_folder(&self, folder: &Path) -> Vec<ScannedArtifact> {
        if !folder.is_dir() {
            return Vec::new();
        }

        let artifacts = match Self::list_artifacts(folder) {
            Ok(artifacts) => artifacts,
            Err(e) => {
                warn!("Failed to list {}: {}", folder.display(), e);
                return Vec::new();
            }
        };

        let mut scanned = Vec::with_capacity(artifacts.len());
        for path in artifacts {
            let size = match std::fs::metadata(&path) {
                Ok(meta) => meta.len(),
                Err(e) => {
                    warn!("Skipping {}: {}", path.display(), e);
                    continue;
                }
            };
            let metadata = match self.load(&path, true) {
                Ok(record) => record.unwrap_or_default(),
                Err(e) => {
                    warn!("Unreadable metadata for {}: {}", path.display(), e);
                    ArtifactRecord::default()
                }
            };
            scanned.push(ScannedArtifact {
                name: display_name(&path),
                path: path.to_string_lossy().into_owned(),
                size,
                metadata,
            });
        }

        scanned
    }

    /// Drop the in-memory cache without touching disk.
    pub fn clear_cache(&self) {
        self.cache().clear();
        debug!("Metadata cache cleared");
    }

    /// Number of records currently cached.
    pub fn cached_count(&self) -> usize {
        self.cache().len()
    }

    // ========================================
    // Internal
    // ========================================

    fn save_locked(&self, artifact: &Path, mut record: ArtifactRecord) -> Result<ArtifactRecord> {
        record.last_updated = Some(chrono::Utc::now().to_rfc3339());
        if let Some(hash) = record.hash.as_deref() {
            record.hash = Some(normalize_hash(hash));
        }

        atomic_write_json(&Self::metadata_path(artifact), &record)?;
        self.cache()
            .insert(artifact.to_path_buf(), record.clone());

        info!("Saved metadata for {}", display_name(artifact));
        Ok(record)
    }

    fn cache(&self) -> MutexGuard<'_, HashMap<PathBuf, ArtifactRecord>> {
        // Cached records are plain values; a panic elsewhere cannot leave one half-written.
        self.cache.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn path_lock(&self, artifact: &Path) -> Arc<Mutex<()>> {
        let mut locks = self
            .path_locks
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        locks.entry(artifact.to_path_buf()).or_default().clone()
    }
}

fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}
