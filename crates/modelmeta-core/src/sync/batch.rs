//! Recursive batch hashing of a model tree.

use super::kind::infer_artifact_kind;
use crate::fingerprint::{partial_hash, HashAlgo};
use crate::metadata::MetadataStore;
use std::collections::BTreeMap;
use std::path::Path;
use tracing::{debug, error, info, warn};
use walkdir::WalkDir;

/// Compute partial hashes for every artifact under `root`.
///
/// Hidden directories are not descended into. Artifacts whose record
/// already has a hash keep it unless `force` is set. Records without a kind
/// get one inferred from their folder. Returns artifact path to canonical
/// hash; artifacts that fail to hash or save are logged and left out.
pub fn hash_tree(store: &MetadataStore, root: &Path, force: bool) -> BTreeMap<String, String> {
    let mut results = BTreeMap::new();

    if !root.is_dir() {
        error!("Folder not found: {}", root.display());
        return results;
    }

    let artifacts: Vec<_> = WalkDir::new(root)
        .into_iter()
        .filter_entry(|entry| entry.depth() == 0 || !is_hidden_dir(entry))
        .filter_map(|e| e.ok())
        .filter(|entry| entry.file_type().is_file() && MetadataStore::is_artifact_name(entry.path()))
        .map(|entry| entry.into_path())
        .collect();

    info!("Calculating hashes for {} models...", artifacts.len());

    for (idx, path) in artifacts.iter().enumerate() {
        let key = path.to_string_lossy().into_owned();

        if !force {
            match store.get_hash(path) {
                Ok(Some(existing)) if !existing.trim().is_empty() => {
                    debug!(
                        "[{}/{}] Using existing hash for {}",
                        idx + 1,
                        artifacts.len(),
                        path.display()
                    );
                    results.insert(key, existing);
                    continue;
                }
                Ok(_) => {}
                Err(e) => warn!("Unreadable metadata for {}: {}", path.display(), e),
            }
        }

        let hex = match partial_hash(path) {
            Ok(hex) => hex,
            Err(e) => {
                error!("Error calculating hash for {}: {}", path.display(), e);
                continue;
            }
        };

        let kind = infer_artifact_kind(path);
        let saved = store.update(path, |record| {
            record.set_hash(&hex, HashAlgo::PartialContent);
            if record.artifact_kind.is_none() {
                record.artifact_kind = Some(kind.to_string());
            }
        });
        match saved {
            Ok(record) => {
                if let Some(hash) = record.hash {
                    results.insert(key, hash);
                }
            }
            Err(e) => error!("Failed to save hash for {}: {}", path.display(), e),
        }
    }

    info!("Hash calculation complete. Processed {} models", results.len());
    results
}

fn is_hidden_dir(entry: &walkdir::DirEntry) -> bool {
    entry.file_type().is_dir()
        && entry
            .file_name()
            .to_str()
            .map(|name| name.starts_with('.'))
            .unwrap_or(false)
}
