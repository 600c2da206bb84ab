//! Canonical hash strings stored in side-records.
//!
//! Records carry a single `hash` string such as `AUTOV2: 90BFFAFD10` or a
//! registry reference such as `civitai: 2131974 @ 2411703`. Normalization is
//! applied on every save; classification is used by the RPC surface.

use regex::Regex;
use serde::Serialize;
use std::sync::LazyLock;

const PARTIAL_TAG: &str = "AUTOV2:";
const REGISTRY_TAG: &str = "civitai:";

static AUTOV2_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^AUTOV2:\s+([A-F0-9]+)$").expect("AUTOV2 regex must compile")
});
static SHA256_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^SHA256:\s+([a-fA-F0-9]{64})$").expect("SHA256 regex must compile")
});
static REGISTRY_VERSION_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^civitai:\s+(\d+)\s*@\s*(\d+)$").expect("registry version regex must compile")
});
static REGISTRY_COLLECTION_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^civitai:\s+(\d+)$").expect("registry collection regex must compile")
});
static LEGACY_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-f0-9]{10}$").expect("legacy hash regex must compile"));

/// Normalize a hash value to its canonical form.
///
/// - whitespace is stripped
/// - `AUTOV2:<hex>` becomes `AUTOV2: <HEX>` (uppercased)
/// - `civitai:<ref>` becomes `civitai: <ref>` (trimmed)
/// - anything else passes through unchanged
pub fn normalize_hash(value: &str) -> String {
    let value = value.trim();

    if value.starts_with(PARTIAL_TAG) {
        let parts: Vec<&str> = value.split(':').collect();
        if parts.len() == 2 {
            return format!("AUTOV2: {}", parts[1].trim().to_uppercase());
        }
    }

    if value.starts_with(REGISTRY_TAG) {
        let parts: Vec<&str> = value.split(':').collect();
        if parts.len() == 2 {
            return format!("civitai: {}", parts[1].trim());
        }
    }

    value.to_string()
}

/// Recognized shapes of a stored hash value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "format", rename_all = "snake_case")]
pub enum HashFormat {
    /// `AUTOV2: <HEX>`
    Autov2 { hex: String },
    /// `SHA256: <hex64>`
    Sha256 { hex: String },
    /// `civitai: <collection> @ <version>`
    RegistryVersion { collection_id: u64, version_id: u64 },
    /// `civitai: <collection>`
    RegistryCollection { collection_id: u64 },
    /// Bare 10-char lowercase hex from older tooling.
    Legacy { hex: String },
    Unknown,
}

/// Classify a (normalized or raw) hash value.
pub fn classify_hash(value: &str) -> HashFormat {
    let value = normalize_hash(value);

    if let Some(caps) = AUTOV2_RE.captures(&value) {
        return HashFormat::Autov2 {
            hex: caps[1].to_string(),
        };
    }
    if let Some(caps) = SHA256_RE.captures(&value) {
        return HashFormat::Sha256 {
            hex: caps[1].to_lowercase(),
        };
    }
    if let Some(caps) = REGISTRY_VERSION_RE.captures(&value) {
        if let (Ok(collection_id), Ok(version_id)) = (caps[1].parse(), caps[2].parse()) {
            return HashFormat::RegistryVersion {
                collection_id,
                version_id,
            };
        }
    }
    if let Some(caps) = REGISTRY_COLLECTION_RE.captures(&value) {
        if let Ok(collection_id) = caps[1].parse() {
            return HashFormat::RegistryCollection { collection_id };
        }
    }
    if LEGACY_RE.is_match(&value) {
        return HashFormat::Legacy { hex: value };
    }

    HashFormat::Unknown
}
