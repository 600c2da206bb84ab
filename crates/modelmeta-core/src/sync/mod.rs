//! Synchronization between artifacts on disk, their records, and the registry.
//!
//! - [`Synchronizer`]: periodic watch loop plus on-demand registry fetch
//! - [`hash_tree`]: one-shot recursive hashing of a model tree
//! - [`infer_artifact_kind`]: kind guess from folder layout

mod batch;
mod kind;
mod synchronizer;

pub use batch::hash_tree;
pub use kind::{infer_artifact_kind, UNKNOWN_KIND};
pub use synchronizer::{
    preview_path_for, record_from_entry, update_channel, CycleReport, RecordUpdate, SyncStatus,
    Synchronizer, UpdateOrigin, WatchFolder, WatchHandle,
};
