//! Run journal for crash-only resumption
//!
//! A run writes one record per finished batch. The journal is tagged with a
//! hash of the batch plan, so a journal left behind by a different plan is
//! discarded on open. Completing the run deletes the journal.

use crate::error::DurabilityResult;
use crate::log::RecordLog;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::path::Path;
use tally_core::TestCaseId;
use tracing::info;
use xxhash_rust::xxh3::Xxh3;

/// Magic bytes: "TALLYJNL"
pub const JOURNAL_MAGIC: [u8; 8] = *b"TALLYJNL";

/// Hash identifying a batch plan: order and membership both count
pub fn plan_hash(batches: &[Vec<TestCaseId>]) -> u64 {
    let mut hasher = Xxh3::new();
    for (index, batch) in batches.iter().enumerate() {
        hasher.update(&(index as u64).to_le_bytes());
        for id in batch {
            hasher.update(id.as_str().as_bytes());
            hasher.update(&[0]);
        }
        hasher.update(&[0xFF]);
    }
    hasher.digest()
}

/// Journal of finished batches for one plan
pub struct RunJournal<R> {
    log: RecordLog<R>,
    recovered: Vec<R>,
}

impl<R: Serialize + DeserializeOwned> RunJournal<R> {
    /// Open the journal for `plan`. Records from an interrupted run of the
    /// same plan are available through [`RunJournal::recovered`].
    pub fn open(path: impl AsRef<Path>, plan: u64) -> DurabilityResult<Self> {
        let (log, recovered) = RecordLog::open(path, JOURNAL_MAGIC, plan, true)?;
        if !recovered.records.is_empty() {
            info!(
                target: "tally::exec",
                path = %log.path().display(),
                finished_batches = recovered.records.len(),
                "Resuming run from journal"
            );
        } else if recovered.replaced {
            info!(
                target: "tally::exec",
                path = %log.path().display(),
                "Discarded journal of a different plan or format"
            );
        }
        Ok(RunJournal {
            log,
            recovered: recovered.records,
        })
    }

    /// Records recovered on open
    pub fn recovered(&self) -> &[R] {
        &self.recovered
    }

    /// Take ownership of the recovered records
    pub fn take_recovered(&mut self) -> Vec<R> {
        std::mem::take(&mut self.recovered)
    }

    /// Durably record a finished batch
    pub fn record(&self, record: &R) -> DurabilityResult<()> {
        self.log.append(record)
    }

    /// Plan hash the journal belongs to
    pub fn plan(&self) -> u64 {
        self.log.tag()
    }

    /// Finish the run and delete the journal
    pub fn complete(self) -> DurabilityResult<()> {
        self.log.remove()
    }
}
