//! Metadata persistence.
//!
//! This module provides:
//! - The open [`ArtifactRecord`] schema and its merge rules
//! - Atomic JSON file operations
//! - The per-artifact side-record store with its cache and path locks
//! - Folder export/import archives
//! - Hash string normalization and classification

mod archive;
mod atomic;
mod hash_format;
mod record;
mod store;

pub use archive::MetadataArchive;
pub use atomic::{atomic_read_json, atomic_write_json};
pub use hash_format::{classify_hash, normalize_hash, HashFormat};
pub use record::{ArtifactRecord, REGISTRY_EXTRA_FIELDS};
pub use store::{MetadataStore, ScannedArtifact};
