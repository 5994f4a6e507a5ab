//! Source discovery
//!
//! A [`SourceWalker`] lists the files that contribute to an inventory along
//! with the metadata the fingerprint is computed from. Contributing files
//! are Python test modules (`test_*.py`, `*_test.py`) and specification
//! documents (`*.feature`).

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;
use tally_core::Result;
use tracing::trace;

/// What a contributing file contains
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    /// Python test module
    Python,
    /// Gherkin specification document
    Feature,
}

impl SourceKind {
    /// Kind of a file, judged by its name
    pub fn of(file_name: &str) -> Option<Self> {
        if file_name.ends_with(".feature") {
            return Some(SourceKind::Feature);
        }
        let stem = file_name.strip_suffix(".py")?;
        if stem.starts_with("test_") || stem.ends_with("_test") {
            Some(SourceKind::Python)
        } else {
            None
        }
    }
}

/// A contributing file and its fingerprint inputs
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceFile {
    /// Path relative to the root, `/`-separated
    pub rel_path: String,
    /// Absolute path used for reading
    pub abs_path: PathBuf,
    /// File kind
    pub kind: SourceKind,
    /// Size in bytes
    pub size: u64,
    /// Modification time, nanoseconds since epoch
    pub mtime_ns: u128,
}

/// Lists contributing files under a root
pub trait SourceWalker: Send + Sync {
    /// Every contributing file, sorted by relative path
    fn walk(&self, root: &Path) -> Result<Vec<SourceFile>>;

    /// Read a file listed by [`SourceWalker::walk`]
    fn read(&self, file: &SourceFile) -> std::io::Result<String> {
        std::fs::read_to_string(&file.abs_path)
    }
}

/// Filesystem walker
#[derive(Debug, Clone)]
pub struct FsWalker {
    ignore: Vec<String>,
}

impl Default for FsWalker {
    fn default() -> Self {
        FsWalker::new(Vec::new())
    }
}

impl FsWalker {
    /// Walker that skips hidden directories and the named ones
    pub fn new(ignore: Vec<String>) -> Self {
        FsWalker { ignore }
    }

    fn skip_dir(&self, name: &str) -> bool {
        name.starts_with('.') || self.ignore.iter().any(|i| i == name)
    }

    fn visit(&self, root: &Path, dir: &Path, out: &mut Vec<SourceFile>) -> std::io::Result<()> {
        for entry in std::fs::read_dir(dir)? {
            let entry = entry?;
            let name = entry.file_name().to_string_lossy().to_string();
            let file_type = entry.file_type()?;
            let path = entry.path();
            if file_type.is_dir() {
                if !self.skip_dir(&name) {
                    self.visit(root, &path, out)?;
                }
                continue;
            }
            let Some(kind) = SourceKind::of(&name) else {
                continue;
            };
            let metadata = entry.metadata()?;
            let mtime_ns = metadata
                .modified()
                .ok()
                .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
                .map(|d| d.as_nanos())
                .unwrap_or(0);
            let rel_path = path
                .strip_prefix(root)
                .unwrap_or(&path)
                .to_string_lossy()
                .replace('\\', "/");
            trace!(target: "tally::cache", path = %rel_path, "Discovered source");
            out.push(SourceFile {
                rel_path,
                abs_path: path,
                kind,
                size: metadata.len(),
                mtime_ns,
            });
        }
        Ok(())
    }
}

impl SourceWalker for FsWalker {
    fn walk(&self, root: &Path) -> Result<Vec<SourceFile>> {
        let mut files = Vec::new();
        self.visit(root, root, &mut files)?;
        files.sort_by(|a, b| a.rel_path.cmp(&b.rel_path));
        Ok(files)
    }
}
