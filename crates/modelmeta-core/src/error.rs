//! Error types for the model metadata library.
//!
//! Expected absences (no side-record yet, registry collection missing) are
//! modelled as `Option::None` by the public API. The variants below are for
//! genuine failures that a caller may want to report or log.

use std::path::PathBuf;
use thiserror::Error;

/// Main error type for the model metadata library.
#[derive(Debug, Error)]
pub enum ModelMetaError {
    // Network errors
    #[error("Network error: {message}")]
    Network {
        message: String,
        /// Optional cause description
        cause: Option<String>,
    },

    #[error("Request timeout after {0:?}")]
    Timeout(std::time::Duration),

    #[error("Registry returned HTTP {status} for {url}")]
    HttpStatus { url: String, status: u16 },

    #[error("Registry entry not found: collection {collection_id}")]
    RegistryNotFound { collection_id: u64 },

    #[error("Invalid registry URL: {url}")]
    InvalidUrl { url: String },

    // File system errors
    #[error("IO error at {path:?}: {message}")]
    Io {
        message: String,
        path: Option<PathBuf>,
        #[source]
        source: Option<std::io::Error>,
    },

    // Serialization errors
    #[error("JSON error: {message}")]
    Json {
        message: String,
        #[source]
        source: Option<serde_json::Error>,
    },

    // Validation errors
    #[error("Validation error for {field}: {message}")]
    Validation { field: String, message: String },

    #[error("Invalid params: {message}")]
    InvalidParams { message: String },

    // Configuration errors
    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("{0}")]
    Other(String),
}

/// Result type alias for library operations.
pub type Result<T> = std::result::Result<T, ModelMetaError>;

impl From<std::io::Error> for ModelMetaError {
    fn from(err: std::io::Error) -> Self {
        ModelMetaError::Io {
            message: err.to_string(),
            path: None,
            source: Some(err),
        }
    }
}

impl From<serde_json::Error> for ModelMetaError {
    fn from(err: serde_json::Error) -> Self {
        ModelMetaError::Json {
            message: err.to_string(),
            source: Some(err),
        }
    }
}

impl From<reqwest::Error> for ModelMetaError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            ModelMetaError::Timeout(std::time::Duration::from_secs(0))
        } else if let Some(status) = err.status() {
            ModelMetaError::HttpStatus {
                url: err.url().map(|u| u.to_string()).unwrap_or_default(),
                status: status.as_u16(),
            }
        } else {
            ModelMetaError::Network {
                message: err.to_string(),
                cause: std::error::Error::source(&err).map(|s| s.to_string()),
            }
        }
    }
}

impl ModelMetaError {
    /// Create an IO error with path context.
    pub fn io_with_path(err: std::io::Error, path: impl Into<PathBuf>) -> Self {
        ModelMetaError::Io {
            message: err.to_string(),
            path: Some(path.into()),
            source: Some(err),
        }
    }

    /// Convert to a JSON-RPC error code.
    ///
    /// Custom error codes (application-defined, -32000 to -32099):
    /// - -32000: Network/connectivity error
    /// - -32002: Record or registry entry not found
    /// - -32005: Validation error
    ///
    /// Missing or malformed request parameters map to the standard -32602.
    pub fn to_rpc_error_code(&self) -> i32 {
        match self {
            ModelMetaError::Network { .. }
            | ModelMetaError::Timeout(_)
            | ModelMetaError::HttpStatus { .. } => -32000,

            ModelMetaError::RegistryNotFound { .. } => -32002,

            ModelMetaError::Validation { .. } | ModelMetaError::InvalidUrl { .. } => -32005,

            ModelMetaError::InvalidParams { .. } => -32602,

            _ => -32603,
        }
    }
}
