//! Background watch loop and on-demand registry fetch.
//!
//! The watch loop gives every untracked artifact in the configured folders a
//! partial-hash record. A manual fetch resolves a registry URL, merges the
//! entry into the artifact's record and downloads its preview. Both paths
//! write through the shared [`MetadataStore`], whose per-path lock keeps
//! their read-modify-write cycles from interleaving. The watch loop hashes
//! outside that lock and re-checks the record under it before saving.

use crate::cancel::CancellationToken;
use crate::catalog::{parse_registry_url, CatalogClient, RegistryEntry};
use crate::config::{StoreConfig, SyncConfig};
use crate::error::ModelMetaError;
use crate::fingerprint::{compute_async, HashAlgo};
use crate::metadata::{ArtifactRecord, MetadataStore};
use serde::Serialize;
use serde_json::Value;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// One watched folder and the kind recorded for artifacts found in it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WatchFolder {
    pub kind: String,
    pub path: PathBuf,
}

impl WatchFolder {
    pub fn new(kind: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self {
            kind: kind.into(),
            path: path.into(),
        }
    }
}

impl FromStr for WatchFolder {
    type Err = String;

    /// Parse `KIND=PATH`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.split_once('=') {
            Some((kind, path)) if !kind.trim().is_empty() && !path.trim().is_empty() => {
                Ok(Self::new(kind.trim(), path.trim()))
            }
            _ => Err(format!("expected KIND=PATH, got '{}'", s)),
        }
    }
}

/// Which path produced a [`RecordUpdate`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum UpdateOrigin {
    Watch,
    ManualFetch,
}

/// Observer notification sent once per completed save.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RecordUpdate {
    pub path: PathBuf,
    pub record: ArtifactRecord,
    pub origin: UpdateOrigin,
}

/// Outcome counters for one watch cycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CycleReport {
    /// Recognized artifacts seen in existing folders
    pub scanned: usize,
    /// Artifacts hashed and saved this cycle
    pub detected: usize,
    /// Artifacts already processed or already carrying a hash
    pub skipped: usize,
    /// Artifacts that failed to load, hash or save (retried next cycle)
    pub failed: usize,
}

/// Snapshot of the synchronizer for status reporting.
#[derive(Debug, Clone, Default, Serialize)]
pub struct SyncStatus {
    pub watching: bool,
    pub processed: usize,
    pub cycles_completed: u64,
    pub last_cycle: Option<CycleReport>,
    pub last_cycle_at: Option<String>,
}

#[derive(Debug, Default)]
struct CycleStats {
    cycles_completed: u64,
    last_cycle: Option<CycleReport>,
    last_cycle_at: Option<String>,
}

/// Reconciles artifacts on disk with their side-records and the registry.
#[derive(Debug)]
pub struct Synchronizer {
    store: Arc<MetadataStore>,
    catalog: Arc<CatalogClient>,
    /// Artifacts handled in this session; never persisted
    processed: Mutex<HashSet<PathBuf>>,
    observer: Option<broadcast::Sender<RecordUpdate>>,
    watching: AtomicBool,
    stats: Mutex<CycleStats>,
}

impl Synchronizer {
    pub fn new(store: Arc<MetadataStore>, catalog: Arc<CatalogClient>) -> Self {
        Self {
            store,
            catalog,
            processed: Mutex::new(HashSet::new()),
            observer: None,
            watching: AtomicBool::new(false),
            stats: Mutex::new(CycleStats::default()),
        }
    }

    /// Deliver a [`RecordUpdate`] to `sender` after every completed save.
    ///
    /// Delivery never blocks. The channel is bounded: a receiver that falls
    /// behind loses the oldest updates, and updates sent while no receiver
    /// exists are dropped.
    pub fn with_observer(mut self, sender: broadcast::Sender<RecordUpdate>) -> Self {
        self.observer = Some(sender);
        self
    }

    pub fn store(&self) -> &Arc<MetadataStore> {
        &self.store
    }

    pub fn catalog(&self) -> &Arc<CatalogClient> {
        &self.catalog
    }

    pub fn processed_count(&self) -> usize {
        self.processed().len()
    }

    pub fn status(&self) -> SyncStatus {
        let stats = self.stats.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        SyncStatus {
            watching: self.watching.load(Ordering::SeqCst),
            processed: self.processed_count(),
            cycles_completed: stats.cycles_completed,
            last_cycle: stats.last_cycle,
            last_cycle_at: stats.last_cycle_at.clone(),
        }
    }

    // ========================================
    // Watch loop
    // ========================================

    /// Run one pass over `folders`.
    ///
    /// Artifacts are visited in directory listing order. Cancellation is
    /// observed between artifacts; an artifact already being hashed is
    /// finished first.
    pub async fn scan_once(
        &self,
        folders: &[WatchFolder],
        cancel: &CancellationToken,
    ) -> CycleReport {
        let mut report = CycleReport::default();

        for folder in folders {
            if !folder.path.is_dir() {
                debug!("Watch folder missing, skipping: {}", folder.path.display());
                continue;
            }

            let artifacts = match MetadataStore::list_artifacts(&folder.path) {
                Ok(artifacts) => artifacts,
                Err(e) => {
                    error!("Error processing folder {}: {}", folder.path.display(), e);
                    continue;
                }
            };

            for path in artifacts {
                if cancel.is_cancelled() {
                    return report;
                }
                report.scanned += 1;

                if self.processed().contains(&path) {
                    report.skipped += 1;
                    continue;
                }

                let target = path.clone();
                match self.with_store(move |store| store.load(&target, true)).await {
                    Ok(Some(record)) if record.has_hash() => {
                        self.mark_processed(&path);
                        report.skipped += 1;
                        continue;
                    }
                    Ok(_) => {}
                    Err(e) => {
                        warn!("Unreadable metadata for {}: {}", path.display(), e);
                        report.failed += 1;
                        continue;
                    }
                }

                info!("Detected new model: {}", path.display());
                match self.process_new_artifact(&path, &folder.kind).await {
                    Detection::Saved(record) => {
                        self.mark_processed(&path);
                        report.detected += 1;
                        self.notify(&path, record, UpdateOrigin::Watch);
                    }
                    Detection::AlreadyHashed => {
                        self.mark_processed(&path);
                        report.skipped += 1;
                    }
                    Detection::Failed => report.failed += 1,
                }
            }
        }

        self.record_cycle(report);
        report
    }

    /// Scan `folders` every `interval` until `cancel` fires.
    ///
    /// A failing artifact never ends the loop; only cancellation does. The
    /// inter-cycle sleep wakes up as soon as the token is cancelled.
    pub async fn watch_loop(
        &self,
        folders: Vec<WatchFolder>,
        interval: Duration,
        cancel: CancellationToken,
    ) {
        self.watching.store(true, Ordering::SeqCst);
        info!("Started watching {} folders for models", folders.len());

        while !cancel.is_cancelled() {
            let report = self.scan_once(&folders, &cancel).await;
            if report.detected > 0 || report.failed > 0 {
                info!(
                    "Watch cycle: {} detected, {} skipped, {} failed",
                    report.detected, report.skipped, report.failed
                );
            }

            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(interval) => {}
            }
        }

        self.watching.store(false, Ordering::SeqCst);
        info!("Stopped watching folders");
    }

    /// Run [`watch_loop`](Self::watch_loop) on a background task.
    pub fn start_watching(
        self: &Arc<Self>,
        folders: Vec<WatchFolder>,
        interval: Option<Duration>,
    ) -> WatchHandle {
        let cancel = CancellationToken::new();
        let interval = interval.unwrap_or(SyncConfig::DEFAULT_WATCH_INTERVAL);
        let this = Arc::clone(self);
        let token = cancel.clone();
        let task = tokio::spawn(async move { this.watch_loop(folders, interval, token).await });
        WatchHandle { cancel, task }
    }

    /// Hash an untracked artifact and save its minimal record.
    ///
    /// The hash check is repeated under the path's lock: a record that
    /// gained a hash while this one was computed (say, from a manual fetch)
    /// is left as it is.
    async fn process_new_artifact(&self, path: &Path, kind: &str) -> Detection {
        debug!("Calculating hash for {}...", path.display());
        let hex = match compute_async(path, HashAlgo::PartialContent).await {
            Ok(hex) => hex,
            Err(e) => {
                error!("Error hashing model {}: {}", path.display(), e);
                return Detection::Failed;
            }
        };

        let detected = ArtifactRecord::auto_detected(&hex, kind);
        let target = path.to_path_buf();
        let saved = self
            .with_store(move |store| {
                store.update_if(&target, move |record| {
                    if record.has_hash() {
                        return false;
                    }
                    record.merge(detected);
                    true
                })
            })
            .await;

        match saved {
            Ok(Some(record)) => {
                info!("Saved auto-detected hash for {}: {}", path.display(), hex);
                Detection::Saved(record)
            }
            Ok(None) => {
                debug!("{} was hashed elsewhere meanwhile; keeping that record", path.display());
                Detection::AlreadyHashed
            }
            Err(e) => {
                error!("Error saving metadata for {}: {}", path.display(), e);
                Detection::Failed
            }
        }
    }

    // ========================================
    // Manual fetch
    // ========================================

    /// Fetch registry data for one artifact and merge it into its record.
    ///
    /// Returns `false` when the URL is not a registry reference, the lookup
    /// fails, or the merged record cannot be saved; the existing record is
    /// untouched in all three cases. A failed preview download still
    /// returns `true` with the metadata kept and `preview_path` unset.
    pub async fn manual_fetch(&self, artifact: &Path, registry_url: &str) -> bool {
        let Some(reference) = parse_registry_url(registry_url) else {
            error!("Invalid registry URL: {}", registry_url);
            return false;
        };

        info!(
            "Fetching registry metadata for collection {}...",
            reference.collection_id
        );
        let Some(entry) = self
            .catalog
            .fetch_entry(reference.collection_id, reference.version_id)
            .await
        else {
            error!("Failed to fetch metadata from registry");
            return false;
        };

        let incoming = record_from_entry(&entry);
        let target = artifact.to_path_buf();
        let merged = self
            .with_store(move |store| {
                store.update(&target, move |record| record.overlay_registry(incoming))
            })
            .await;
        let mut record = match merged {
            Ok(record) => record,
            Err(e) => {
                error!("Error saving registry metadata for {}: {}", artifact.display(), e);
                return false;
            }
        };

        if let Some(preview_url) = entry.preview_url.as_deref() {
            let dest = preview_path_for(artifact);
            match self.catalog.download_preview(preview_url, &dest).await {
                Ok(_) => {
                    let preview = dest.to_string_lossy().into_owned();
                    let target = artifact.to_path_buf();
                    let updated = self
                        .with_store(move |store| {
                            store.update(&target, move |record| record.preview_path = Some(preview))
                        })
                        .await;
                    match updated {
                        Ok(updated) => record = updated,
                        Err(e) => warn!("Failed to record preview for {}: {}", artifact.display(), e),
                    }
                }
                Err(e) => warn!("Failed to download preview for {}: {}", artifact.display(), e),
            }
        } else {
            debug!("No preview listed for {}", artifact.display());
        }

        info!("Successfully fetched metadata for {}", artifact.display());
        self.notify(artifact, record, UpdateOrigin::ManualFetch);
        true
    }

    /// Run [`manual_fetch`](Self::manual_fetch) on its own task.
    pub fn spawn_manual_fetch(
        self: &Arc<Self>,
        artifact: PathBuf,
        registry_url: String,
    ) -> JoinHandle<bool> {
        let this = Arc::clone(self);
        tokio::spawn(async move { this.manual_fetch(&artifact, &registry_url).await })
    }

    // ========================================
    // Internal
    // ========================================

    /// Run a store operation on the blocking pool.
    async fn with_store<T, F>(&self, op: F) -> crate::Result<T>
    where
        F: FnOnce(&MetadataStore) -> crate::Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let store = Arc::clone(&self.store);
        tokio::task::spawn_blocking(move || op(&store))
            .await
            .map_err(|e| ModelMetaError::Other(format!("Store task failed: {}", e)))?
    }

    fn processed(&self) -> MutexGuard<'_, HashSet<PathBuf>> {
        self.processed.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn mark_processed(&self, path: &Path) {
        self.processed().insert(path.to_path_buf());
    }

    fn record_cycle(&self, report: CycleReport) {
        let mut stats = self.stats.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        stats.cycles_completed += 1;
        stats.last_cycle = Some(report);
        stats.last_cycle_at = Some(chrono::Utc::now().to_rfc3339());
    }

    fn notify(&self, path: &Path, record: ArtifactRecord, origin: UpdateOrigin) {
        if let Some(observer) = &self.observer {
            let update = RecordUpdate {
                path: path.to_path_buf(),
                record,
                origin,
            };
            if observer.send(update).is_err() {
                debug!("No update receiver; notification for {} discarded", path.display());
            }
        }
    }
}

/// Outcome of hashing one untracked artifact.
#[derive(Debug, PartialEq)]
enum Detection {
    Saved(ArtifactRecord),
    /// The record gained a hash before ours could be saved
    AlreadyHashed,
    Failed,
}

/// Observer channel sized by [`SyncConfig::UPDATE_BUFFER`].
///
/// Pass the sender to [`Synchronizer::with_observer`]. Once the receiver
/// falls that far behind, the oldest updates are dropped and the receiver
/// reports how many it missed.
pub fn update_channel() -> (
    broadcast::Sender<RecordUpdate>,
    broadcast::Receiver<RecordUpdate>,
) {
    broadcast::channel(SyncConfig::UPDATE_BUFFER)
}

/// Handle to a running watch loop.
#[derive(Debug)]
pub struct WatchHandle {
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

impl WatchHandle {
    /// Ask the loop to stop after its current artifact.
    pub fn stop(&self) {
        self.cancel.cancel();
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Stop the loop and wait for it to exit.
    pub async fn stop_and_join(self) {
        self.cancel.cancel();
        if let Err(e) = self.task.await {
            error!("Watch task ended abnormally: {}", e);
        }
    }
}

/// Preview location for an artifact: `<dir>/.previews/<stem>.jpg`.
pub fn preview_path_for(artifact: &Path) -> PathBuf {
    let dir = artifact.parent().unwrap_or_else(|| Path::new("."));
    let stem = artifact
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    dir.join(StoreConfig::PREVIEWS_DIR_NAME)
        .join(format!("{}.{}", stem, StoreConfig::PREVIEW_EXTENSION))
}

/// Translate a registry entry into the record fields it overlays.
///
/// The partial hash is preferred as the canonical `hash`; the full hash is
/// used when the registry reports no partial one. With neither, the record's
/// existing hash group is left alone by [`ArtifactRecord::merge`].
pub fn record_from_entry(entry: &RegistryEntry) -> ArtifactRecord {
    let mut record = ArtifactRecord::default();

    match (entry.hash_partial.as_deref(), entry.hash_full.as_deref()) {
        (Some(partial), full) => {
            record.set_hash(partial, HashAlgo::PartialContent);
            record.hash_full = full.map(|h| h.trim().to_lowercase());
        }
        (None, Some(full)) => record.set_hash(full, HashAlgo::FullContent),
        (None, None) => {}
    }

    record.registry_id = Some(entry.collection_id);
    record.registry_version_id = Some(entry.version_id);
    record.display_name = entry.name.clone();
    record.artifact_kind = entry.kind.clone();
    record.trigger_words = entry.trigger_words.clone();
    record.base_model = entry.base_model.clone();
    record.preview_url = entry.preview_url.clone();
    record.description = entry.description.clone();
    record.source = Some(SyncConfig::REGISTRY_SOURCE.to_string());

    if let Some(count) = entry.download_count {
        record.extra.insert("download_count".into(), Value::from(count));
    }
    if let Some(rating) = entry.rating {
        record.extra.insert("rating".into(), Value::from(rating));
    }
    if let Some(size) = entry.file_size {
        record.extra.insert("file_size".into(), Value::from(size));
    }

    record
}
