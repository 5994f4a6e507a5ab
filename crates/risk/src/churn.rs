//! Code churn providers
//!
//! Churn is the amount of recent change to a file, normalized to `[0, 1]`:
//!
//! ```text
//! churn = min(1, commits / 10 * 0.5 + lines_changed / 100 * 0.5)
//! ```

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use std::process::Command;
use tracing::{debug, warn};

/// Raw change counts for one path
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChurnStat {
    /// Commits touching the path
    pub commits: u64,
    /// Lines added plus lines deleted
    pub lines: u64,
}

impl ChurnStat {
    /// Normalized churn in `[0, 1]`
    pub fn normalize(&self) -> f64 {
        let score = self.commits as f64 / 10.0 * 0.5 + self.lines as f64 / 100.0 * 0.5;
        score.min(1.0)
    }
}

/// Source of churn statistics
///
/// Providers must be Send + Sync; scoring may run from several threads.
pub trait ChurnProvider: Send + Sync {
    /// Change counts for a repository-relative path, if known
    fn stat(&self, path: &str) -> Option<ChurnStat>;

    /// Normalized churn, 0 when unknown
    fn churn(&self, path: &str) -> f64 {
        self.stat(path).map_or(0.0, |s| s.normalize())
    }

    /// Name for debugging and logging
    fn name(&self) -> &str;
}

// ============================================================================
// StaticChurn
// ============================================================================

/// Churn from a fixed map
#[derive(Debug, Clone, Default)]
pub struct StaticChurn {
    stats: HashMap<String, ChurnStat>,
}

impl StaticChurn {
    /// Empty map
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder: add a path
    pub fn with(mut self, path: impl Into<String>, commits: u64, lines: u64) -> Self {
        self.insert(path, ChurnStat { commits, lines });
        self
    }

    /// Set the counts of a path
    pub fn insert(&mut self, path: impl Into<String>, stat: ChurnStat) {
        self.stats.insert(path.into(), stat);
    }
}

impl ChurnProvider for StaticChurn {
    fn stat(&self, path: &str) -> Option<ChurnStat> {
        self.stats.get(path).copied()
    }

    fn name(&self) -> &str {
        "static"
    }
}

// ============================================================================
// GitChurn
// ============================================================================

/// Churn from `git log --numstat`, cached per path
#[derive(Debug)]
pub struct GitChurn {
    repo: PathBuf,
    since: Option<String>,
    cache: DashMap<String, Option<ChurnStat>>,
}

impl GitChurn {
    /// Provider for the repository containing `repo`
    pub fn new(repo: impl Into<PathBuf>) -> Self {
        GitChurn {
            repo: repo.into(),
            since: None,
            cache: DashMap::new(),
        }
    }

    /// Builder: only count commits newer than `since` (git date syntax)
    pub fn since(mut self, since: impl Into<String>) -> Self {
        self.since = Some(since.into());
        self
    }

    fn query(&self, path: &str) -> Option<ChurnStat> {
        let mut command = Command::new("git");
        command.arg("-C").arg(&self.repo).arg("log");
        if let Some(since) = &self.since {
            command.arg(format!("--since={}", since));
        }
        command
            .arg("--numstat")
            .arg("--pretty=format:%H")
            .arg("--")
            .arg(path);

        let output = match command.output() {
            Ok(output) => output,
            Err(e) => {
                warn!(target: "tally::risk", error = %e, "Cannot run git");
                return None;
            }
        };
        if !output.status.success() {
            debug!(
                target: "tally::risk",
                path,
                status = ?output.status.code(),
                "git log failed"
            );
            return None;
        }
        Some(parse_numstat(&String::from_utf8_lossy(&output.stdout)))
    }
}

impl ChurnProvider for GitChurn {
    fn stat(&self, path: &str) -> Option<ChurnStat> {
        if let Some(cached) = self.cache.get(path) {
            return *cached;
        }
        let stat = self.query(path);
        self.cache.insert(path.to_string(), stat);
        stat
    }

    fn name(&self) -> &str {
        "git"
    }
}

/// Parse `git log --numstat --pretty=format:%H` output.
///
/// Hash lines count commits; `added<TAB>deleted<TAB>path` lines add to the
/// line count. Binary files (`-`) contribute no lines.
pub fn parse_numstat(output: &str) -> ChurnStat {
    let mut stat = ChurnStat::default();
    for line in output.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let mut fields = line.split('\t');
        match (fields.next(), fields.next(), fields.next()) {
            (Some(added), Some(deleted), Some(_)) => {
                let added = added.parse::<u64>().unwrap_or(0);
                let deleted = deleted.parse::<u64>().unwrap_or(0);
                stat.lines += added + deleted;
            }
            (Some(hash), None, None) if hash.chars().all(|c| c.is_ascii_hexdigit()) => {
                stat.commits += 1;
            }
            _ => {}
        }
    }
    stat
}
