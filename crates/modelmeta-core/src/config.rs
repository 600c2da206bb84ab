//! Centralized configuration for the model metadata library.
//!
//! Constants for fingerprinting, side-record layout, registry access and the
//! background synchronizer.

use std::time::Duration;

/// Fingerprint engine parameters.
pub struct HashConfig;

impl HashConfig {
    /// Bytes covered by the partial hash. Must match the registry's AUTOV2 convention.
    pub const PARTIAL_WINDOW: u64 = 8 * 1024 * 1024;
    /// Hex characters kept from the partial digest.
    pub const PARTIAL_HEX_LEN: usize = 10;
    /// Read buffer size for streaming digests.
    pub const READ_CHUNK_SIZE: usize = 1024 * 1024;
}

/// Side-record layout and folder scanning.
pub struct StoreConfig;

impl StoreConfig {
    pub const METADATA_SUFFIX: &'static str = ".metadata.json";
    pub const PREVIEWS_DIR_NAME: &'static str = ".previews";
    pub const PREVIEW_EXTENSION: &'static str = "jpg";
    pub const ARTIFACT_EXTENSIONS: &'static [&'static str] =
        &["safetensors", "ckpt", "pt", "pth", "bin"];
    /// Registry descriptions are truncated to this many characters on ingest.
    pub const DESCRIPTION_MAX_CHARS: usize = 500;
}

/// Network-related configuration.
pub struct NetworkConfig;

impl NetworkConfig {
    pub const REGISTRY_API_BASE: &'static str = "https://civitai.com/api/v1";
    pub const METADATA_TIMEOUT: Duration = Duration::from_secs(10);
    pub const PREVIEW_TIMEOUT: Duration = Duration::from_secs(30);
    pub const USER_AGENT: &'static str = "modelmeta/0.3";
    pub const TOKEN_ENV_VAR: &'static str = "CIVITAI_TOKEN";
    pub const TOKEN_FILENAME: &'static str = "registry_token";
    pub const CONFIG_DIR_NAME: &'static str = "modelmeta";
}

/// Background synchronizer configuration.
pub struct SyncConfig;

impl SyncConfig {
    pub const DEFAULT_WATCH_INTERVAL: Duration = Duration::from_secs(30);
    pub const AUTO_DETECTED_SOURCE: &'static str = "auto-detected";
    pub const REGISTRY_SOURCE: &'static str = "registry";
    /// Unread observer updates kept before the oldest are dropped.
    pub const UPDATE_BUFFER: usize = 1024;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_window_is_eight_mib() {
        assert_eq!(HashConfig::PARTIAL_WINDOW, 8_388_608);
        assert_eq!(HashConfig::PARTIAL_WINDOW % HashConfig::READ_CHUNK_SIZE as u64, 0);
    }

    #[test]
    fn test_timeouts_are_reasonable() {
        assert!(NetworkConfig::PREVIEW_TIMEOUT > NetworkConfig::METADATA_TIMEOUT);
        assert!(SyncConfig::DEFAULT_WATCH_INTERVAL > Duration::ZERO);
        assert!(SyncConfig::UPDATE_BUFFER > 0);
    }
}
