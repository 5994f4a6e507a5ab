//! Inventory cache
//!
//! # Invalidation
//!
//! The key is the tree fingerprint (see [`crate::fingerprint`]). A call with
//! an unchanged key returns the stored snapshot without reading any source.
//! When the key changes, a new snapshot is built and swapped in whole:
//! entries of files whose own fingerprint is unchanged are carried over,
//! everything else is re-read and re-classified, and files that vanished are
//! dropped.
//!
//! # Concurrency
//!
//! Each root has a slot holding `RwLock<Option<Arc<InventorySnapshot>>>`.
//! Readers clone the `Arc` and never observe a partially built snapshot. A
//! per-root build mutex keeps one rebuild in flight; callers that waited on
//! it re-check the key and reuse the winner's snapshot.
//!
//! # Persistence
//!
//! With persistence enabled the snapshot is written to the state directory
//! after every build and loaded by the first call of a fresh process. A
//! snapshot that fails validation is reported as a `CacheCorruption`
//! diagnostic, deleted, and never served.

use crate::config::TallyConfig;
use crate::fingerprint::{config_salt, file_fingerprint, tree_fingerprint};
use crate::inventory::{FileEntry, InventorySnapshot};
use crate::walk::{FsWalker, SourceFile, SourceKind, SourceWalker};
use dashmap::DashMap;
use parking_lot::{Mutex, RwLock};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tally_classify::{classify, classify_document};
use tally_core::{CategoryLayout, Diagnostic, DiagnosticKind, Result};
use tally_durability::{read_snapshot, write_snapshot};
use tally_spec::{parse_str, IdentifierScheme};
use tracing::{debug, info, warn};

/// Snapshot file name inside the state directory
pub const SNAPSHOT_FILE_NAME: &str = "inventory.snap";

/// How the last `get_or_build` call was answered
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuildOutcome {
    /// The stored snapshot was still valid
    Unchanged,
    /// A persisted snapshot with the current key was loaded
    LoadedFromDisk,
    /// A new snapshot was built
    Rebuilt,
}

/// Statistics of the last `get_or_build` call for a root
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BuildStats {
    /// How the call was answered
    pub outcome: BuildOutcome,
    /// Tree fingerprint
    pub fingerprint: u64,
    /// Contributing files
    pub files: usize,
    /// Files read and classified
    pub reparsed: usize,
    /// Files whose entries were carried over
    pub reused: usize,
    /// Test cases in the snapshot
    pub cases: usize,
}

#[derive(Default)]
struct RootSlot {
    current: RwLock<Option<Arc<InventorySnapshot>>>,
    build: Mutex<()>,
    stats: Mutex<Option<BuildStats>>,
}

impl RootSlot {
    fn fresh(&self, fingerprint: u64) -> Option<Arc<InventorySnapshot>> {
        self.current
            .read()
            .as_ref()
            .filter(|s| s.fingerprint() == fingerprint)
            .cloned()
    }
}

/// Cache of classified inventories, one slot per test tree root
pub struct InventoryCache {
    walker: Arc<dyn SourceWalker>,
    layout: CategoryLayout,
    scheme: IdentifierScheme,
    salt: u64,
    state_dir: Option<String>,
    roots: DashMap<PathBuf, Arc<RootSlot>>,
}

impl InventoryCache {
    /// Cache using the filesystem walker
    pub fn new(config: &TallyConfig) -> Self {
        let walker = FsWalker::new(config.cache.ignore.clone());
        Self::with_walker(config, Arc::new(walker))
    }

    /// Cache using a custom walker
    pub fn with_walker(config: &TallyConfig, walker: Arc<dyn SourceWalker>) -> Self {
        InventoryCache {
            walker,
            layout: config.layout.layout(),
            scheme: config.identifiers.scheme(),
            salt: config_salt(config),
            state_dir: config
                .cache
                .persist
                .then(|| config.cache.directory.clone()),
            roots: DashMap::new(),
        }
    }

    /// Current inventory of `root`, rebuilding what changed
    pub fn get_or_build(&self, root: &Path) -> Result<Arc<InventorySnapshot>> {
        let slot = self.slot(root);
        let files = self.walker.walk(root)?;
        let fingerprint = tree_fingerprint(&files, self.salt);

        if let Some(snapshot) = slot.fresh(fingerprint) {
            self.record(&slot, BuildOutcome::Unchanged, &snapshot, files.len(), 0);
            return Ok(snapshot);
        }

        let _build = slot.build.lock();
        if let Some(snapshot) = slot.fresh(fingerprint) {
            self.record(&slot, BuildOutcome::Unchanged, &snapshot, files.len(), 0);
            return Ok(snapshot);
        }

        let mut diagnostics = Vec::new();
        let current = slot.current.read().clone();
        let base = match current {
            Some(snapshot) => Some(snapshot),
            None => self.load_persisted(root, &mut diagnostics),
        };

        if let Some(loaded) = base.as_ref().filter(|s| s.fingerprint() == fingerprint) {
            let snapshot = Arc::clone(loaded);
            info!(
                target: "tally::cache",
                root = %root.display(),
                cases = snapshot.len(),
                "Loaded persisted inventory"
            );
            *slot.current.write() = Some(Arc::clone(&snapshot));
            self.record(&slot, BuildOutcome::LoadedFromDisk, &snapshot, files.len(), 0);
            return Ok(snapshot);
        }

        let snapshot = Arc::new(self.build(
            &slot,
            root,
            &files,
            fingerprint,
            base.as_deref(),
            diagnostics,
        ));
        self.persist(root, &snapshot);
        *slot.current.write() = Some(Arc::clone(&snapshot));
        Ok(snapshot)
    }

    /// Snapshot currently held for `root`, without checking freshness
    pub fn current(&self, root: &Path) -> Option<Arc<InventorySnapshot>> {
        let slot = self.roots.get(root)?;
        let current = slot.current.read().clone();
        current
    }

    /// Statistics of the last `get_or_build` call for `root`
    pub fn last_build_stats(&self, root: &Path) -> Option<BuildStats> {
        let slot = self.roots.get(root)?;
        let stats = *slot.stats.lock();
        stats
    }

    /// Drop the in-memory snapshot of `root`
    pub fn invalidate(&self, root: &Path) {
        if let Some(slot) = self.roots.get(root) {
            *slot.current.write() = None;
        }
    }

    /// Where the snapshot of `root` is persisted, when persistence is on
    pub fn snapshot_path(&self, root: &Path) -> Option<PathBuf> {
        self.state_dir
            .as_ref()
            .map(|dir| root.join(dir).join(SNAPSHOT_FILE_NAME))
    }

    fn slot(&self, root: &Path) -> Arc<RootSlot> {
        Arc::clone(self.roots.entry(root.to_path_buf()).or_default().value())
    }

    fn record(
        &self,
        slot: &RootSlot,
        outcome: BuildOutcome,
        snapshot: &InventorySnapshot,
        files: usize,
        reparsed: usize,
    ) {
        *slot.stats.lock() = Some(BuildStats {
            outcome,
            fingerprint: snapshot.fingerprint(),
            files,
            reparsed,
            reused: files - reparsed,
            cases: snapshot.len(),
        });
    }

    fn build(
        &self,
        slot: &RootSlot,
        root: &Path,
        files: &[SourceFile],
        fingerprint: u64,
        base: Option<&InventorySnapshot>,
        mut diagnostics: Vec<Diagnostic>,
    ) -> InventorySnapshot {
        let mut entries = BTreeMap::new();
        let mut reparsed = 0;
        for file in files {
            let file_fp = file_fingerprint(file, self.salt);
            let carried = base
                .and_then(|b| b.file(&file.rel_path))
                .filter(|e| e.fingerprint == file_fp && e.kind == file.kind);
            let entry = match carried {
                Some(entry) => entry.clone(),
                None => {
                    reparsed += 1;
                    self.classify_file(file, file_fp)
                }
            };
            entries.insert(file.rel_path.clone(), entry);
        }

        let cases: usize = entries.values().map(|e: &FileEntry| e.cases.len()).sum();
        if cases == 0 && !files.is_empty() {
            warn!(
                target: "tally::cache",
                root = %root.display(),
                files = files.len(),
                "Source files exist but no test case was found"
            );
            diagnostics.push(Diagnostic::new(
                DiagnosticKind::EmptyInventory,
                root.display().to_string(),
                None,
                format!("{} source files define no test case", files.len()),
            ));
        }

        let snapshot = InventorySnapshot::new(fingerprint, entries, diagnostics);
        info!(
            target: "tally::cache",
            root = %root.display(),
            fingerprint = format_args!("{:016x}", fingerprint),
            files = files.len(),
            reparsed,
            reused = files.len() - reparsed,
            cases = snapshot.len(),
            built_at = %snapshot.built_at().to_rfc3339(),
            "Rebuilt inventory"
        );
        self.record(slot, BuildOutcome::Rebuilt, &snapshot, files.len(), reparsed);
        snapshot
    }

    fn classify_file(&self, file: &SourceFile, fingerprint: u64) -> FileEntry {
        let mut entry = FileEntry {
            fingerprint,
            kind: file.kind,
            cases: BTreeMap::new(),
            imports: Vec::new(),
            diagnostics: Vec::new(),
        };
        let text = match self.walker.read(file) {
            Ok(text) => text,
            Err(e) => {
                warn!(target: "tally::cache", path = %file.rel_path, error = %e, "Cannot read source");
                entry.diagnostics.push(Diagnostic::new(
                    DiagnosticKind::UnparsableFile,
                    file.rel_path.clone(),
                    None,
                    format!("cannot read: {}", e),
                ));
                return entry;
            }
        };
        debug!(target: "tally::cache", path = %file.rel_path, "Classifying source");

        let classified = match file.kind {
            SourceKind::Python => classify(&file.rel_path, &text, &self.layout),
            SourceKind::Feature => match parse_str(&file.rel_path, &text) {
                Ok(doc) => classify_document(&doc, &self.scheme),
                Err(e) => {
                    warn!(target: "tally::cache", error = %e, "Rejected specification document");
                    entry.diagnostics.push(Diagnostic::new(
                        DiagnosticKind::ParseError,
                        file.rel_path.clone(),
                        e.line(),
                        e.to_string(),
                    ));
                    return entry;
                }
            },
        };
        entry.cases = classified.cases;
        entry.imports = classified.imports;
        entry.diagnostics = classified.diagnostics;
        entry
    }

    fn load_persisted(
        &self,
        root: &Path,
        diagnostics: &mut Vec<Diagnostic>,
    ) -> Option<Arc<InventorySnapshot>> {
        let path = self.snapshot_path(root)?;
        let reason = match read_snapshot::<InventorySnapshot>(&path) {
            Ok(None) => return None,
            Ok(Some(stored)) if stored.fingerprint == stored.value.fingerprint() => {
                return Some(Arc::new(stored.value));
            }
            Ok(Some(stored)) => format!(
                "header fingerprint {:016x} does not match snapshot {:016x}",
                stored.fingerprint,
                stored.value.fingerprint()
            ),
            Err(e) if e.is_corruption() => e.to_string(),
            Err(e) => {
                warn!(target: "tally::cache", path = %path.display(), error = %e, "Cannot read persisted inventory");
                return None;
            }
        };

        warn!(
            target: "tally::cache",
            path = %path.display(),
            reason = %reason,
            "Discarding corrupt inventory snapshot"
        );
        diagnostics.push(Diagnostic::new(
            DiagnosticKind::CacheCorruption,
            path.display().to_string(),
            None,
            reason,
        ));
        if let Err(e) = std::fs::remove_file(&path) {
            warn!(target: "tally::cache", path = %path.display(), error = %e, "Cannot remove corrupt snapshot");
        }
        None
    }

    fn persist(&self, root: &Path, snapshot: &InventorySnapshot) {
        let Some(path) = self.snapshot_path(root) else {
            return;
        };
        if let Err(e) = write_snapshot(&path, snapshot.fingerprint(), snapshot) {
            warn!(target: "tally::cache", path = %path.display(), error = %e, "Cannot persist inventory");
        }
    }
}

impl std::fmt::Debug for InventoryCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InventoryCache")
            .field("roots", &self.roots.len())
            .field("state_dir", &self.state_dir)
            .finish()
    }
}
