//! Folder-level export and import of side-records.
//!
//! An archive is one JSON document:
//! `{exported_at, folder, models: {<artifact path>: {name, path, size, metadata}}}`.

use crate::error::{ModelMetaError, Result};
use crate::metadata::atomic::{atomic_read_json, atomic_write_json};
use crate::metadata::store::{MetadataStore, ScannedArtifact};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Export archive written by [`MetadataStore::export_folder`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetadataArchive {
    pub exported_at: String,
    pub folder: String,
    pub models: BTreeMap<String, ScannedArtifact>,
}

impl MetadataStore {
    /// Write every record in `folder` to a single archive file.
    ///
    /// Returns the number of artifacts exported.
    pub fn export_folder(&self, folder: &Path, archive_path: &Path) -> Result<usize> {
        let models: BTreeMap<String, ScannedArtifact> = self
            .scan_folder(folder)
            .into_iter()
            .map(|artifact| (artifact.path.clone(), artifact))
            .collect();
        let count = models.len();

        let archive = MetadataArchive {
            exported_at: chrono::Utc::now().to_rfc3339(),
            folder: folder.to_string_lossy().into_owned(),
            models,
        };
        atomic_write_json(archive_path, &archive)?;

        info!(
            "Exported metadata for {} models to {}",
            count,
            archive_path.display()
        );
        Ok(count)
    }

    /// Restore records from an archive.
    ///
    /// With `target_folder`, entries whose recorded path is not under it are
    /// re-rooted there by file name. Entries whose artifact does not exist
    /// are skipped, as are malformed entries; both are logged, not errors.
    /// Returns the number of records saved.
    pub fn import_archive(&self, archive_path: &Path, target_folder: Option<&Path>) -> Result<usize> {
        let raw: Value = atomic_read_json(archive_path)?.ok_or_else(|| {
            ModelMetaError::io_with_path(
                std::io::Error::new(std::io::ErrorKind::NotFound, "archive not found"),
                archive_path,
            )
        })?;

        let models: Map<String, Value> = match raw.get("models") {
            Some(Value::Object(models)) => models.clone(),
            Some(_) => {
                return Err(ModelMetaError::Validation {
                    field: "models".into(),
                    message: "expected an object keyed by artifact path".into(),
                })
            }
            None => Map::new(),
        };

        let mut imported = 0;
        for (recorded_path, entry) in models {
            let entry: ScannedArtifact = match serde_json::from_value(entry) {
                Ok(entry) => entry,
                Err(e) => {
                    warn!("Skipping malformed archive entry {}: {}", recorded_path, e);
                    continue;
                }
            };

            let artifact = resolve_target(Path::new(&recorded_path), target_folder);
            if !artifact.exists() {
                warn!("Skipping {}: artifact not found", artifact.display());
                continue;
            }

            match self.save(&artifact, entry.metadata) {
                Ok(_) => imported += 1,
                Err(e) => warn!("Failed to import metadata for {}: {}", artifact.display(), e),
            }
        }

        info!("Imported metadata for {} models", imported);
        Ok(imported)
    }
}

fn resolve_target(recorded: &Path, target_folder: Option<&Path>) -> PathBuf {
    match (target_folder, recorded.file_name()) {
        (Some(target), Some(name)) if !recorded.starts_with(target) => target.join(name),
        _ => recorded.to_path_buf(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::record::ArtifactRecord;
    use serde_json::json;
    use tempfile::TempDir;

    fn artifact(dir: &Path, name: &str) -> PathBuf {
        let path = dir.join(name);
        std::fs::write(&path, b"weights").unwrap();
        path
    }

    #[test]
    fn test_resolve_target() {
        let target = Path::new("/new/models");
        assert_eq!(
            resolve_target(Path::new("/old/models/a.ckpt"), Some(target)),
            PathBuf::from("/new/models/a.ckpt")
        );
        assert_eq!(
            resolve_target(Path::new("/new/models/a.ckpt"), Some(target)),
            PathBuf::from("/new/models/a.ckpt")
        );
        assert_eq!(
            resolve_target(Path::new("/old/a.ckpt"), None),
            PathBuf::from("/old/a.ckpt")
        );
    }

    #[test]
    fn test_export_writes_archive_shape() {
        let dir = TempDir::new().unwrap();
        let a = artifact(dir.path(), "a.safetensors");
        let store = MetadataStore::new();
        store
            .save(&a, ArtifactRecord::auto_detected("1234567890", "LoRA"))
            .unwrap();

        let archive_path = dir.path().join("exports").join("archive.json");
        assert_eq!(store.export_folder(dir.path(), &archive_path).unwrap(), 1);

        let raw: Value =
            serde_json::from_str(&std::fs::read_to_string(&archive_path).unwrap()).unwrap();
        assert!(raw["exported_at"].is_string());
        let key = a.to_string_lossy().into_owned();
        assert_eq!(raw["models"][&key]["name"], json!("a.safetensors"));
        assert_eq!(raw["models"][&key]["size"], json!(7));
        assert_eq!(
            raw["models"][&key]["metadata"]["hash"],
            json!("AUTOV2: 1234567890")
        );
    }

    #[test]
    fn test_export_then_import_into_other_folder() {
        let source = TempDir::new().unwrap();
        let target = TempDir::new().unwrap();
        let a = artifact(source.path(), "a.safetensors");
        let b = artifact(source.path(), "b.safetensors");

        let store = MetadataStore::new();
        let mut record_a = ArtifactRecord::auto_detected("AAAAAAAAAA", "LoRA");
        record_a.extra.insert("custom".into(), json!([1, 2]));
        store.save(&a, record_a.clone()).unwrap();
        store
            .save(&b, ArtifactRecord::auto_detected("BBBBBBBBBB", "LoRA"))
            .unwrap();

        let archive_path = source.path().join("archive.json");
        store.export_folder(source.path(), &archive_path).unwrap();

        // Only `a` exists at the destination
        let restored_a = artifact(target.path(), "a.safetensors");

        let fresh = MetadataStore::new();
        let count = fresh
            .import_archive(&archive_path, Some(target.path()))
            .unwrap();
        assert_eq!(count, 1);

        let loaded = fresh.load(&restored_a, false).unwrap().unwrap();
        assert_eq!(loaded.hash, record_a.hash);
        assert_eq!(loaded.extra["custom"], json!([1, 2]));
        assert!(!MetadataStore::metadata_path(&target.path().join("b.safetensors")).exists());
    }

    #[test]
    fn test_import_skips_malformed_entries() {
        let dir = TempDir::new().unwrap();
        let a = artifact(dir.path(), "a.safetensors");
        let b = artifact(dir.path(), "b.safetensors");

        let archive = json!({
            "exported_at": "2024-01-01T00:00:00",
            "folder": dir.path().to_string_lossy(),
            "models": {
                a.to_string_lossy(): {"metadata": {"hash": "AUTOV2:abc"}},
                b.to_string_lossy(): {"metadata": {"hash_algo": "MD5"}}
            }
        });
        let archive_path = dir.path().join("archive.json");
        std::fs::write(&archive_path, archive.to_string()).unwrap();

        let store = MetadataStore::new();
        assert_eq!(store.import_archive(&archive_path, None).unwrap(), 1);
        assert_eq!(store.get_hash(&a).unwrap().as_deref(), Some("AUTOV2: ABC"));
    }

    #[test]
    fn test_import_missing_archive_is_error() {
        let store = MetadataStore::new();
        assert!(store
            .import_archive(Path::new("/no/such/archive.json"), None)
            .is_err());
    }
}
