//! Invalidation keys
//!
//! A file's fingerprint covers its relative path, size and modification
//! time, mixed with a salt derived from every setting that changes how files
//! are classified. The tree fingerprint folds the file fingerprints in path
//! order, so adding, removing, renaming or touching any contributing file
//! changes it.

use crate::config::TallyConfig;
use crate::walk::SourceFile;
use xxhash_rust::xxh3::Xxh3;

/// Fingerprint of one contributing file
pub fn file_fingerprint(file: &SourceFile, salt: u64) -> u64 {
    let mut hasher = Xxh3::new();
    hasher.update(&salt.to_le_bytes());
    hasher.update(file.rel_path.as_bytes());
    hasher.update(&[0]);
    hasher.update(&file.size.to_le_bytes());
    hasher.update(&file.mtime_ns.to_le_bytes());
    hasher.digest()
}

/// Fingerprint of a whole tree. `files` must be sorted by path.
pub fn tree_fingerprint(files: &[SourceFile], salt: u64) -> u64 {
    let mut hasher = Xxh3::new();
    hasher.update(&salt.to_le_bytes());
    hasher.update(&(files.len() as u64).to_le_bytes());
    for file in files {
        hasher.update(&file_fingerprint(file, salt).to_le_bytes());
    }
    hasher.digest()
}

/// Salt covering the identifier scheme and category layout
pub fn config_salt(config: &TallyConfig) -> u64 {
    let mut hasher = Xxh3::new();
    hasher.update(&(config.identifiers.ordinal_base as u64).to_le_bytes());
    hasher.update(config.identifiers.function_prefix.as_bytes());
    hasher.update(&[0]);
    hasher.update(config.layout.fallback.as_str().as_bytes());
    for rule in &config.layout.directories {
        hasher.update(&[0]);
        hasher.update(rule.path.as_bytes());
        hasher.update(&[0]);
        hasher.update(rule.category.as_str().as_bytes());
    }
    hasher.digest()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::walk::SourceKind;
    use std::path::PathBuf;

    fn file(path: &str, size: u64, mtime_ns: u128) -> SourceFile {
        SourceFile {
            rel_path: path.to_string(),
            abs_path: PathBuf::from(path),
            kind: SourceKind::Python,
            size,
            mtime_ns,
        }
    }

    #[test]
    fn test_same_inputs_same_fingerprint() {
        let files = vec![file("a/test_a.py", 10, 1), file("b/test_b.py", 20, 2)];
        assert_eq!(tree_fingerprint(&files, 7), tree_fingerprint(&files.clone(), 7));
    }

    #[test]
    fn test_any_change_changes_fingerprint() {
        let base = vec![file("a/test_a.py", 10, 1), file("b/test_b.py", 20, 2)];
        let fp = tree_fingerprint(&base, 0);

        let mut touched = base.clone();
        touched[1].mtime_ns = 3;
        assert_ne!(tree_fingerprint(&touched, 0), fp);

        let mut resized = base.clone();
        resized[0].size = 11;
        assert_ne!(tree_fingerprint(&resized, 0), fp);

        assert_ne!(tree_fingerprint(&base[..1], 0), fp);
        assert_ne!(tree_fingerprint(&base, 1), fp);
    }

    #[test]
    fn test_unrelated_file_fingerprint_stable() {
        let a = file("a/test_a.py", 10, 1);
        let b = file("b/test_b.py", 20, 2);
        let mut b2 = b.clone();
        b2.mtime_ns = 9;
        assert_ne!(file_fingerprint(&b, 0), file_fingerprint(&b2, 0));
        assert_eq!(file_fingerprint(&a, 0), file_fingerprint(&a.clone(), 0));
    }

    #[test]
    fn test_salt_tracks_layout() {
        let base = TallyConfig::default();
        let mut changed = TallyConfig::default();
        changed.layout.fallback = tally_core::Category::Integration;
        assert_eq!(config_salt(&base), config_salt(&TallyConfig::default()));
        assert_ne!(config_salt(&base), config_salt(&changed));
    }
}
