//! Indexing synchronization engine.
//!
//! Reconciles a folder's on-disk image set against the index, executes the
//! resulting add/update/remove work through the [`Indexer`], and publishes
//! progress to observers. At most one job runs at a time, system-wide:
//! `is_indexing` is the single source of truth for mutual exclusion, and a
//! competing entry point no-ops instead of queuing.
//!
//! State machine per job:
//!
//! ```text
//! Ready -> Scanning -> (Removing* -> Indexing*) -> Ready
//! Ready -> Unindexing* -> Ready
//! ```
//!
//! with any failure routed through the same finalization step, so the
//! engine can never be left stuck in the indexing state. The engine's
//! public entry points never return errors: every failure becomes a status
//! string (the only channel the observing layer has).
//!
//! Notifications are synchronous and delivered in mutation order, one per
//! state change, never coalesced; an observer re-reads the state via
//! [`SyncEngine::snapshot`] and always sees a consistent view.

use parking_lot::Mutex;
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use tracing::{debug, warn};
use walkdir::WalkDir;

use crate::indexer::Indexer;
use crate::storage::sqlite::MetadataStore;

/// Supported image extensions, matched case-insensitively.
pub const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "bmp", "gif", "tiff", "webp"];

/// How many failed file names the final status spells out.
const MAX_NAMED_FAILURES: usize = 3;

/// A point-in-time view of the engine state, re-read by observers on each
/// notification.
#[derive(Debug, Clone)]
pub struct SyncSnapshot {
    pub is_indexing: bool,
    /// Fraction of the current job's work completed, in `[0, 1]`.
    pub progress: f32,
    /// Free-text, human-readable. The only error channel (see module docs).
    pub status: String,
    pub current_folder: Option<PathBuf>,
}

#[derive(Debug)]
struct SyncFields {
    progress: f32,
    status: String,
    current_folder: Option<PathBuf>,
}

impl Default for SyncFields {
    fn default() -> Self {
        Self {
            progress: 0.0,
            status: "Ready".to_string(),
            current_folder: None,
        }
    }
}

/// Handle returned by [`SyncEngine::subscribe`], used to unsubscribe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ObserverId(u64);

type Observer = Arc<dyn Fn() + Send + Sync>;

pub struct SyncEngine {
    indexer: Arc<Indexer>,
    metadata: Arc<MetadataStore>,
    /// Mutual exclusion guard; checked-and-set atomically so two jobs can
    /// never interleave even when entry points race.
    is_indexing: AtomicBool,
    fields: Mutex<SyncFields>,
    observers: Mutex<Vec<(u64, Observer)>>,
    next_observer_id: AtomicU64,
}

impl SyncEngine {
    pub fn new(indexer: Arc<Indexer>, metadata: Arc<MetadataStore>) -> Self {
        Self {
            indexer,
            metadata,
            is_indexing: AtomicBool::new(false),
            fields: Mutex::new(SyncFields::default()),
            observers: Mutex::new(Vec::new()),
            next_observer_id: AtomicU64::new(1),
        }
    }

    pub fn is_indexing(&self) -> bool {
        self.is_indexing.load(Ordering::SeqCst)
    }

    pub fn snapshot(&self) -> SyncSnapshot {
        let fields = self.fields.lock();
        SyncSnapshot {
            is_indexing: self.is_indexing(),
            progress: fields.progress,
            status: fields.status.clone(),
            current_folder: fields.current_folder.clone(),
        }
    }

    /// Register a no-payload notification callback. Callbacks run
    /// synchronously on the job's thread after each state change.
    pub fn subscribe(&self, callback: impl Fn() + Send + Sync + 'static) -> ObserverId {
        let id = self.next_observer_id.fetch_add(1, Ordering::Relaxed);
        let observer: Observer = Arc::new(callback);
        self.observers.lock().push((id, observer));
        ObserverId(id)
    }

    pub fn unsubscribe(&self, id: ObserverId) {
        self.observers.lock().retain(|(oid, _)| *oid != id.0);
    }

    /// Synchronize `folder` against the index.
    ///
    /// Returns `false` without doing anything if another job is already
    /// running (no queuing, no error). Callers pass absolute paths: the
    /// path string is the identity key in both stores.
    pub fn start_indexing(&self, folder: &Path) -> bool {
        if self
            .is_indexing
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            debug!(folder = %folder.display(), "indexing already in progress; ignoring");
            return false;
        }

        self.publish(|f| {
            f.progress = 0.0;
            f.status = "Scanning folder...".to_string();
            f.current_folder = Some(folder.to_path_buf());
        });

        let outcome = self.run_sync(folder);
        self.finalize(outcome);
        true
    }

    /// Remove every indexed record under `folder` from both stores.
    ///
    /// Shares the mutual exclusion guard with [`Self::start_indexing`].
    pub fn unindex_folder(&self, folder: &Path) -> bool {
        if self
            .is_indexing
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            debug!(folder = %folder.display(), "indexing already in progress; ignoring");
            return false;
        }

        self.publish(|f| {
            f.progress = 0.0;
            f.status = "Scanning indexed records...".to_string();
            f.current_folder = Some(folder.to_path_buf());
        });

        let outcome = self.run_unindex(folder);
        self.finalize(outcome);
        true
    }

    fn run_sync(&self, folder: &Path) -> anyhow::Result<String> {
        if !folder.is_dir() {
            return Ok(format!("Folder not found: {}", folder.display()));
        }

        let on_disk = scan_images(folder)?;
        let indexed: BTreeSet<PathBuf> = self
            .metadata
            .get_images_in_folder(folder)?
            .into_iter()
            .map(|r| r.path)
            .collect();

        let to_remove: Vec<PathBuf> = indexed.difference(&on_disk).cloned().collect();
        // Every on-disk path is (re)processed: adds new images and refreshes
        // existing ones. No mtime change detection; a sync re-embeds
        // everything it finds.
        let to_process: Vec<PathBuf> = on_disk.into_iter().collect();
        let total = to_remove.len() + to_process.len();
        if total == 0 {
            return Ok("Folder already up to date".to_string());
        }

        let mut processed = 0usize;

        for path in &to_remove {
            self.publish(|f| f.status = format!("Removing {}", file_name(path)));
            self.indexer.remove_image(path)?;
            processed += 1;
            self.publish(|f| f.progress = processed as f32 / total as f32);
        }
        let removed = processed;

        let mut failures: Vec<String> = Vec::new();
        for (i, path) in to_process.iter().enumerate() {
            self.publish(|f| {
                f.status = format!("Indexing {}/{}: {}", i + 1, to_process.len(), file_name(path))
            });
            if let Err(err) = self.indexer.index_image(path) {
                // One bad image must not abort the whole folder sync.
                warn!(path = %path.display(), "indexing failed: {err:#}");
                failures.push(file_name(path));
            }
            processed += 1;
            self.publish(|f| f.progress = processed as f32 / total as f32);
        }

        let indexed_ok = to_process.len() - failures.len();
        let mut summary = format!("Indexing complete: {indexed_ok} indexed, {removed} removed");
        if !failures.is_empty() {
            summary.push_str(&format!(", {} failed ({})", failures.len(), name_list(&failures)));
        }
        Ok(summary)
    }

    fn run_unindex(&self, folder: &Path) -> anyhow::Result<String> {
        let records = self.metadata.get_images_in_folder(folder)?;
        if records.is_empty() {
            return Ok(format!("No indexed images under {}", folder.display()));
        }

        let total = records.len();
        for (i, record) in records.iter().enumerate() {
            self.publish(|f| {
                f.status = format!("Removing {}/{}: {}", i + 1, total, file_name(&record.path))
            });
            self.indexer.remove_image(&record.path)?;
            self.publish(|f| f.progress = (i + 1) as f32 / total as f32);
        }
        Ok(format!("Removed {total} images from index"))
    }

    /// The guaranteed-run cleanup step: set the terminal status, clear the
    /// guard, notify. Runs on every path, success or failure, so the system
    /// is never left stuck in the indexing state.
    fn finalize(&self, outcome: anyhow::Result<String>) {
        let status = match outcome {
            Ok(summary) => summary,
            Err(err) => format!("Error: {err:#}"),
        };
        self.fields.lock().status = status;
        self.is_indexing.store(false, Ordering::SeqCst);
        self.notify();
    }

    /// Mutate state, then notify. The lock is released before callbacks run
    /// so observers may re-enter the engine (snapshot, subscribe, even a
    /// competing `start_indexing`, which no-ops on the guard).
    fn publish(&self, mutate: impl FnOnce(&mut SyncFields)) {
        mutate(&mut self.fields.lock());
        self.notify();
    }

    fn notify(&self) {
        let observers: Vec<Observer> = self
            .observers
            .lock()
            .iter()
            .map(|(_, cb)| Arc::clone(cb))
            .collect();
        for observer in observers {
            observer();
        }
    }
}

/// Recursively enumerate supported images under `folder`, set semantics.
fn scan_images(folder: &Path) -> anyhow::Result<BTreeSet<PathBuf>> {
    let mut images = BTreeSet::new();
    for entry in WalkDir::new(folder) {
        let entry = entry?;
        if entry.file_type().is_file() && has_image_extension(entry.path()) {
            images.insert(entry.path().to_path_buf());
        }
    }
    Ok(images)
}

fn has_image_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| {
            let lower = e.to_lowercase();
            IMAGE_EXTENSIONS.iter().any(|known| *known == lower)
        })
        .unwrap_or(false)
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

fn name_list(names: &[String]) -> String {
    let shown: Vec<&str> = names
        .iter()
        .take(MAX_NAMED_FAILURES)
        .map(String::as_str)
        .collect();
    let rest = names.len().saturating_sub(shown.len());
    let mut out = shown.join(", ");
    if rest > 0 {
        out.push_str(&format!(", +{rest} more"));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extension_matching_is_case_insensitive() {
        assert!(has_image_extension(Path::new("/x/a.JPG")));
        assert!(has_image_extension(Path::new("/x/a.webp")));
        assert!(!has_image_extension(Path::new("/x/notes.txt")));
        assert!(!has_image_extension(Path::new("/x/no_extension")));
    }

    #[test]
    fn name_list_caps_named_failures() {
        let names: Vec<String> = ["a", "b", "c", "d", "e"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        assert_eq!(name_list(&names[..2]), "a, b");
        assert_eq!(name_list(&names), "a, b, c, +2 more");
    }
}
