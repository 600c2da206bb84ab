//! Registry URL parsing.
//!
//! Accepted shapes:
//! - `https://<host>/models/<id>` (an optional trailing slug segment is ignored)
//! - `https://<host>/models/<id>?modelVersionId=<vid>`
//! - `https://<host>/api/download/models/<id>@<vid>`

use serde::{Deserialize, Serialize};
use tracing::warn;
use url::Url;

/// Collection and optional version referenced by a registry URL.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistryRef {
    pub collection_id: u64,
    pub version_id: Option<u64>,
}

/// Parse a registry URL into a [`RegistryRef`].
///
/// Returns `None` for any other shape; that is "nothing to fetch", not a
/// failure.
pub fn parse_registry_url(raw: &str) -> Option<RegistryRef> {
    let parsed = match Url::parse(raw.trim()) {
        Ok(url) => url,
        Err(e) => {
            warn!("Could not parse registry URL {}: {}", raw, e);
            return None;
        }
    };

    let segments: Vec<&str> = parsed
        .path_segments()?
        .filter(|segment| !segment.is_empty())
        .collect();

    let result = match segments.as_slice() {
        ["api", "download", "models", reference, ..] => parse_download_reference(reference),
        ["models", id, ..] => id.parse().ok().map(|collection_id| RegistryRef {
            collection_id,
            version_id: query_version(&parsed),
        }),
        _ => None,
    };

    if result.is_none() {
        warn!("Could not extract IDs from registry URL: {}", raw);
    }
    result
}

fn parse_download_reference(reference: &str) -> Option<RegistryRef> {
    match reference.split_once('@') {
        Some((id, version)) => Some(RegistryRef {
            collection_id: id.parse().ok()?,
            version_id: Some(version.parse().ok()?),
        }),
        None => Some(RegistryRef {
            collection_id: reference.parse().ok()?,
            version_id: None,
        }),
    }
}

fn query_version(url: &Url) -> Option<u64> {
    url.query_pairs()
        .find(|(key, _)| key == "modelVersionId")
        .and_then(|(_, value)| value.parse().ok())
}
