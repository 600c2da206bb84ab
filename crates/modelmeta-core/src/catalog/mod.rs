//! Registry catalog access.
//!
//! URL parsing, the HTTP client, API payload translation, token resolution
//! and generation-parameter parsing for the external model registry.

mod auth;
mod client;
mod params;
mod types;
mod url;

pub use auth::{resolve_token, token_path, TokenSource};
pub use client::{CatalogClient, CatalogClientConfig};
pub use params::{parse_generation_params, GenerationParams};
pub use types::{ApiModel, ApiModelVersion, RegistryEntry};
pub use self::url::{parse_registry_url, RegistryRef};
