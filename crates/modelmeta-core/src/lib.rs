//! Modelmeta Core - Headless library for model artifact metadata.
//!
//! Keeps a JSON side-record next to every model file, fingerprints files the
//! way the registry does, and synchronizes records with the registry's
//! catalog API. It can be used programmatically without any HTTP/RPC layer.
//!
//! # Example
//!
//! ```rust,ignore
//! use modelmeta_core::{CatalogClient, CatalogClientConfig, MetadataStore, Synchronizer};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> modelmeta_core::Result<()> {
//!     let store = Arc::new(MetadataStore::new());
//!     let catalog = Arc::new(CatalogClient::new(
//!         CatalogClientConfig::new().with_resolved_token(None),
//!     )?);
//!     let sync = Synchronizer::new(store, catalog);
//!
//!     let ok = sync
//!         .manual_fetch(
//!             "/models/LoRA/detail.safetensors".as_ref(),
//!             "https://civitai.com/models/58390?modelVersionId=62833",
//!         )
//!         .await;
//!     println!("fetched: {}", ok);
//!     Ok(())
//! }
//! ```

pub mod cancel;
pub mod catalog;
pub mod config;
pub mod error;
pub mod fingerprint;
pub mod metadata;
pub mod sync;

// Re-export commonly used types
pub use cancel::CancellationToken;
pub use catalog::{
    parse_generation_params, parse_registry_url, CatalogClient, CatalogClientConfig,
    GenerationParams, RegistryEntry, RegistryRef,
};
pub use error::{ModelMetaError, Result};
pub use fingerprint::{full_hash, partial_hash, HashAlgo};
pub use metadata::{
    classify_hash, normalize_hash, ArtifactRecord, HashFormat, MetadataArchive, MetadataStore,
    ScannedArtifact,
};
pub use sync::{
    hash_tree, infer_artifact_kind, update_channel, CycleReport, RecordUpdate, SyncStatus,
    Synchronizer, UpdateOrigin, WatchFolder, WatchHandle,
};
