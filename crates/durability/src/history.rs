//! Bounded per-test execution history
//!
//! Each test keeps its most recent `depth` entries, oldest first. Entries are
//! only ever dropped from the oldest end. When opened on a file, every append
//! is written to a framed record log before it becomes visible in memory;
//! replay on open re-applies the depth bound, and the log is compacted once
//! it holds more than twice the retained entries.

use crate::error::DurabilityResult;
use crate::log::RecordLog;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, VecDeque};
use std::path::Path;
use tally_core::{HistoryEntry, TestCaseId};
use tracing::{debug, info};

/// Magic bytes: "TALLYHST"
pub const HISTORY_MAGIC: [u8; 8] = *b"TALLYHST";

/// One persisted history append
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryRecord {
    /// Test the entry belongs to
    pub id: TestCaseId,
    /// The entry
    pub entry: HistoryEntry,
}

/// Per-test execution history, optionally backed by a log file
pub struct HistoryStore {
    depth: usize,
    entries: DashMap<TestCaseId, VecDeque<HistoryEntry>>,
    log: Option<RecordLog<HistoryRecord>>,
}

impl HistoryStore {
    /// History that lives only in memory
    pub fn in_memory(depth: usize) -> Self {
        HistoryStore {
            depth: depth.max(1),
            entries: DashMap::new(),
            log: None,
        }
    }

    /// Open history persisted at `path`, replaying existing records
    pub fn open(path: impl AsRef<Path>, depth: usize) -> DurabilityResult<Self> {
        let (log, recovered) = RecordLog::<HistoryRecord>::open(path, HISTORY_MAGIC, 0, false)?;
        let mut store = HistoryStore::in_memory(depth);
        let replayed = recovered.records.len();
        for record in recovered.records {
            store.push(record.id, record.entry);
        }
        store.log = Some(log);

        let retained = store.len_entries();
        info!(
            target: "tally::history",
            tests = store.entries.len(),
            replayed,
            retained,
            torn_bytes = recovered.torn_bytes,
            "Opened history"
        );
        if replayed > retained * 2 {
            store.compact()?;
        }
        Ok(store)
    }

    /// Append one entry.
    ///
    /// The record is durable in the log before it is visible to readers. The
    /// in-memory update holds the entry lock for that test only.
    pub fn append(&self, id: &TestCaseId, entry: HistoryEntry) -> DurabilityResult<()> {
        if let Some(log) = &self.log {
            log.append(&HistoryRecord {
                id: id.clone(),
                entry,
            })?;
        }
        self.push(id.clone(), entry);
        Ok(())
    }

    /// Append entries for several tests
    pub fn append_many<'a, I>(&self, entries: I) -> DurabilityResult<usize>
    where
        I: IntoIterator<Item = (&'a TestCaseId, HistoryEntry)>,
    {
        let mut count = 0;
        for (id, entry) in entries {
            self.append(id, entry)?;
            count += 1;
        }
        debug!(target: "tally::history", count, "Appended history entries");
        Ok(count)
    }

    /// Entries for one test, oldest first
    pub fn history(&self, id: &TestCaseId) -> Vec<HistoryEntry> {
        self.entries
            .get(id)
            .map(|entries| entries.iter().copied().collect())
            .unwrap_or_default()
    }

    /// Every test's entries, ordered by identifier
    pub fn all(&self) -> BTreeMap<TestCaseId, Vec<HistoryEntry>> {
        self.entries
            .iter()
            .map(|item| (item.key().clone(), item.value().iter().copied().collect()))
            .collect()
    }

    /// Rewrite the backing log with only the retained entries
    pub fn compact(&self) -> DurabilityResult<()> {
        let Some(log) = &self.log else {
            return Ok(());
        };
        let records: Vec<HistoryRecord> = self
            .all()
            .into_iter()
            .flat_map(|(id, entries)| {
                entries.into_iter().map(move |entry| HistoryRecord {
                    id: id.clone(),
                    entry,
                })
            })
            .collect();
        log.rewrite(records.iter())?;
        info!(
            target: "tally::history",
            records = records.len(),
            path = %log.path().display(),
            "Compacted history log"
        );
        Ok(())
    }

    /// Number of tests with at least one entry
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether no test has history
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries retained per test
    pub fn depth(&self) -> usize {
        self.depth
    }

    fn push(&self, id: TestCaseId, entry: HistoryEntry) {
        let mut entries = self.entries.entry(id).or_default();
        entries.push_back(entry);
        while entries.len() > self.depth {
            entries.pop_front();
        }
    }

    fn len_entries(&self) -> usize {
        self.entries.iter().map(|item| item.value().len()).sum()
    }
}

impl std::fmt::Debug for HistoryStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HistoryStore")
            .field("depth", &self.depth)
            .field("tests", &self.entries.len())
            .field("persistent", &self.log.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use tally_core::{Outcome, Timestamp};

    fn entry(outcome: Outcome, at: u64) -> HistoryEntry {
        HistoryEntry {
            outcome,
            duration_ms: 10,
            at: Timestamp::from_secs(at),
        }
    }

    #[test]
    fn test_bounded_to_depth_oldest_dropped() {
        let store = HistoryStore::in_memory(3);
        let id = TestCaseId::new("a.py::test_a");
        for i in 0..5 {
            store.append(&id, entry(Outcome::Pass, i)).unwrap();
        }
        let history = store.history(&id);
        assert_eq!(history.len(), 3);
        assert_eq!(history[0].at, Timestamp::from_secs(2));
        assert_eq!(history[2].at, Timestamp::from_secs(4));
    }

    #[test]
    fn test_unknown_id_has_empty_history() {
        let store = HistoryStore::in_memory(10);
        assert!(store.history(&TestCaseId::new("x.py::test_x")).is_empty());
        assert!(store.is_empty());
    }

    #[test]
    fn test_persisted_history_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("history.log");
        let a = TestCaseId::new("a.py::test_a");
        let b = TestCaseId::new("b.py::test_b");
        {
            let store = HistoryStore::open(&path, 2).unwrap();
            store.append(&a, entry(Outcome::Fail, 1)).unwrap();
            store.append(&a, entry(Outcome::Pass, 2)).unwrap();
            store.append(&a, entry(Outcome::Timeout, 3)).unwrap();
            store.append(&b, entry(Outcome::Error, 4)).unwrap();
        }
        let store = HistoryStore::open(&path, 2).unwrap();
        assert_eq!(store.len(), 2);
        let outcomes: Vec<Outcome> = store.history(&a).iter().map(|e| e.outcome).collect();
        assert_eq!(outcomes, vec![Outcome::Pass, Outcome::Timeout]);
        assert_eq!(store.history(&b).len(), 1);
    }

    #[test]
    fn test_unreadable_history_file_starts_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("history.log");
        std::fs::write(&path, b"not a history log, just some stray text").unwrap();
        let id = TestCaseId::new("a.py::test_a");
        let store = HistoryStore::open(&path, 3).unwrap();
        assert!(store.is_empty());
        store.append(&id, entry(Outcome::Fail, 1)).unwrap();
        drop(store);
        let store = HistoryStore::open(&path, 3).unwrap();
        assert_eq!(store.history(&id).len(), 1);
    }

    #[test]
    fn test_compaction_keeps_retained_entries() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("history.log");
        let id = TestCaseId::new("a.py::test_a");
        {
            let store = HistoryStore::open(&path, 2).unwrap();
            for i in 0..20 {
                store.append(&id, entry(Outcome::Pass, i)).unwrap();
            }
        }
        let before = std::fs::metadata(&path).unwrap().len();
        // Reopening replays 20 records for 2 retained entries and compacts.
        let store = HistoryStore::open(&path, 2).unwrap();
        assert!(std::fs::metadata(&path).unwrap().len() < before);
        assert_eq!(store.history(&id)[1].at, Timestamp::from_secs(19));
        drop(store);

        let store = HistoryStore::open(&path, 2).unwrap();
        assert_eq!(store.history(&id).len(), 2);
    }

    #[test]
    fn test_concurrent_appends_to_distinct_ids() {
        let store = Arc::new(HistoryStore::in_memory(10));
        let handles: Vec<_> = (0..8)
            .map(|t| {
                let store = Arc::clone(&store);
                std::thread::spawn(move || {
                    let id = TestCaseId::new(format!("t.py::test_{t}"));
                    for i in 0..10 {
                        store.append(&id, entry(Outcome::Pass, i)).unwrap();
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(store.len(), 8);
        assert!(store.all().values().all(|entries| entries.len() == 10));
    }
}
