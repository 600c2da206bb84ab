//! Streaming content fingerprints for model files.
//!
//! Two digests with different semantics:
//! - Partial (AUTOV2): SHA256 over the first 8 MiB only, first 10 hex chars,
//!   uppercased. Mirrors the registry's own convention, so two files that
//!   differ only past the 8 MiB boundary share a fingerprint.
//! - Full (SHA256): SHA256 over the whole file, lowercase hex.
//!
//! Both read in fixed-size chunks and never buffer the whole file.

use crate::config::HashConfig;
use crate::error::{ModelMetaError, Result};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::io::Read;
use std::path::{Path, PathBuf};

/// Hash algorithm recorded alongside a record's `hash` field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum HashAlgo {
    /// Prefix hash over the first 8 MiB.
    #[serde(rename = "AUTOV2")]
    PartialContent,
    /// SHA256 over the full file.
    #[serde(rename = "SHA256")]
    FullContent,
}

impl HashAlgo {
    /// Tag used in the canonical `"<TAG>: <HEX>"` form.
    pub fn tag(&self) -> &'static str {
        match self {
            HashAlgo::PartialContent => "AUTOV2",
            HashAlgo::FullContent => "SHA256",
        }
    }

    /// Render a hex digest in canonical form.
    pub fn canonical(&self, hex: &str) -> String {
        match self {
            HashAlgo::PartialContent => format!("{}: {}", self.tag(), hex.trim().to_uppercase()),
            HashAlgo::FullContent => format!("{}: {}", self.tag(), hex.trim().to_lowercase()),
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.trim().to_uppercase().as_str() {
            "AUTOV2" | "PARTIAL" => Some(HashAlgo::PartialContent),
            "SHA256" | "FULL" => Some(HashAlgo::FullContent),
            _ => None,
        }
    }
}

impl std::fmt::Display for HashAlgo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.tag())
    }
}

/// Compute the partial fingerprint: first 10 uppercase hex chars of the
/// SHA256 of at most the first 8 MiB.
pub fn partial_hash(path: impl AsRef<Path>) -> Result<String> {
    let path = path.as_ref();
    let file = std::fs::File::open(path).map_err(|e| ModelMetaError::io_with_path(e, path))?;

    let digest = digest_reader(file.take(HashConfig::PARTIAL_WINDOW), path)?;
    let mut hex = hex::encode(digest);
    hex.truncate(HashConfig::PARTIAL_HEX_LEN);
    Ok(hex.to_uppercase())
}

/// Compute the full SHA256 of a file as lowercase hex.
pub fn full_hash(path: impl AsRef<Path>) -> Result<String> {
    let path = path.as_ref();
    let file = std::fs::File::open(path).map_err(|e| ModelMetaError::io_with_path(e, path))?;

    let digest = digest_reader(file, path)?;
    Ok(hex::encode(digest))
}

/// Compute a fingerprint with the given algorithm (raw hex, not canonical).
pub fn compute(path: impl AsRef<Path>, algo: HashAlgo) -> Result<String> {
    match algo {
        HashAlgo::PartialContent => partial_hash(path),
        HashAlgo::FullContent => full_hash(path),
    }
}

/// Compute a fingerprint on the blocking pool.
///
/// File reads are blocking; this keeps them off the async workers.
pub async fn compute_async(path: impl Into<PathBuf>, algo: HashAlgo) -> Result<String> {
    let path = path.into();
    tokio::task::spawn_blocking(move || compute(&path, algo))
        .await
        .map_err(|e| ModelMetaError::Other(format!("Hash computation task failed: {}", e)))?
}

fn digest_reader(mut reader: impl Read, path: &Path) -> Result<Vec<u8>> {
    let mut hasher = Sha256::new();
    let mut buffer = vec![0u8; HashConfig::READ_CHUNK_SIZE];

    loop {
        let bytes_read = reader
            .read(&mut buffer)
            .map_err(|e| ModelMetaError::io_with_path(e, path))?;
        if bytes_read == 0 {
            break;
        }
        hasher.update(&buffer[..bytes_read]);
    }

    Ok(hasher.finalize().to_vec())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    const WINDOW: usize = HashConfig::PARTIAL_WINDOW as usize;

    fn file_with(bytes: &[u8]) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(bytes).unwrap();
        file.flush().unwrap();
        file
    }

    #[test]
    fn test_full_hash_empty_file() {
        let file = NamedTempFile::new().unwrap();
        assert_eq!(
            full_hash(file.path()).unwrap(),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    #[test]
    fn test_partial_hash_is_ten_uppercase_hex() {
        let file = file_with(b"Hello, World!");
        let hash = partial_hash(file.path()).unwrap();

        assert_eq!(hash.len(), 10);
        assert!(hash.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_lowercase()));
        // Small file: prefix of the full digest
        let full = full_hash(file.path()).unwrap();
        assert_eq!(hash, full[..10].to_uppercase());
    }

    #[test]
    fn test_partial_hash_ignores_bytes_past_window() {
        let mut content = vec![7u8; WINDOW];
        let base = file_with(&content);
        let base_hash = partial_hash(base.path()).unwrap();

        content.extend_from_slice(b"appended tail");
        let extended = file_with(&content);
        assert_eq!(partial_hash(extended.path()).unwrap(), base_hash);

        // Full hash still sees the tail
        assert_ne!(
            full_hash(base.path()).unwrap(),
            full_hash(extended.path()).unwrap()
        );
    }

    #[test]
    fn test_partial_hash_changes_inside_window() {
        let mut content = vec![0u8; 4096];
        let a = file_with(&content);
        content[4095] = 1;
        let b = file_with(&content);

        assert_ne!(partial_hash(a.path()).unwrap(), partial_hash(b.path()).unwrap());
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let err = partial_hash("/definitely/not/here.safetensors").unwrap_err();
        assert!(matches!(err, ModelMetaError::Io { path: Some(_), .. }));
    }

    #[test]
    fn test_canonical_form() {
        assert_eq!(
            HashAlgo::PartialContent.canonical("90bffafd10"),
            "AUTOV2: 90BFFAFD10"
        );
        assert_eq!(HashAlgo::FullContent.canonical("ABCD"), "SHA256: abcd");
        assert_eq!(HashAlgo::from_str("autov2"), Some(HashAlgo::PartialContent));
        assert_eq!(HashAlgo::from_str("md5"), None);
    }

    #[test]
    fn test_hash_algo_serializes_as_tag() {
        let json = serde_json::to_string(&HashAlgo::PartialContent).unwrap();
        assert_eq!(json, "\"AUTOV2\"");
        let parsed: HashAlgo = serde_json::from_str("\"SHA256\"").unwrap();
        assert_eq!(parsed, HashAlgo::FullContent);
    }

    #[tokio::test]
    async fn test_compute_async_matches_sync() {
        let file = file_with(b"async content");
        let sync = compute(file.path(), HashAlgo::FullContent).unwrap();
        let async_hash = compute_async(file.path(), HashAlgo::FullContent)
            .await
            .unwrap();
        assert_eq!(sync, async_hash);
    }
}
