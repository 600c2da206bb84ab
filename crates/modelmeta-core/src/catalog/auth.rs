//! Registry bearer token resolution.
//!
//! A token is optional: without one, public entries are still fetched
//! anonymously.

use crate::config::NetworkConfig;
use crate::error::{ModelMetaError, Result};
use serde::Serialize;
use std::path::{Path, PathBuf};

/// Where a resolved token came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenSource {
    Explicit,
    ConfigFile,
    EnvVar,
}

/// Path of the token file (`<config dir>/modelmeta/registry_token`).
pub fn token_path() -> Result<PathBuf> {
    let config_dir = dirs::config_dir().ok_or_else(|| ModelMetaError::Config {
        message: "Could not determine platform config directory".to_string(),
    })?;
    Ok(config_dir
        .join(NetworkConfig::CONFIG_DIR_NAME)
        .join(NetworkConfig::TOKEN_FILENAME))
}

/// Resolve a registry token.
///
/// Checks in order:
/// 1. The explicitly configured value
/// 2. The token file in the config directory
/// 3. The `CIVITAI_TOKEN` environment variable
///
/// Blank values at any step are ignored.
pub fn resolve_token(explicit: Option<&str>) -> Option<(String, TokenSource)> {
    resolve_token_from(
        explicit,
        token_path().ok().as_deref(),
        std::env::var(NetworkConfig::TOKEN_ENV_VAR).ok(),
    )
}

fn resolve_token_from(
    explicit: Option<&str>,
    token_file: Option<&Path>,
    env_value: Option<String>,
) -> Option<(String, TokenSource)> {
    if let Some(token) = explicit.and_then(non_blank) {
        return Some((token, TokenSource::Explicit));
    }

    if let Some(path) = token_file {
        if let Ok(contents) = std::fs::read_to_string(path) {
            if let Some(token) = non_blank(&contents) {
                return Some((token, TokenSource::ConfigFile));
            }
        }
    }

    env_value
        .as_deref()
        .and_then(non_blank)
        .map(|token| (token, TokenSource::EnvVar))
}

fn non_blank(value: &str) -> Option<String> {
    let value = value.trim();
    (!value.is_empty()).then(|| value.to_string())
}
