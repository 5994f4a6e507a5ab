//! Append-only record log
//!
//! ```text
//! ┌──────────────┬─────────────┬────────────┬──────────────────────────┐
//! │ Magic (8)    │ Version (2) │ Tag (8)    │ Frames (MessagePack)     │
//! └──────────────┴─────────────┴────────────┴──────────────────────────┘
//! ```
//!
//! The tag identifies what the records belong to (a run plan, for
//! instance). Opening a log whose tag differs starts a new, empty log.
//! A torn tail left by a crash is truncated on open.

use crate::error::DurabilityResult;
use crate::framing;
use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fs::{File, OpenOptions};
use std::io::{Read, Write};
use std::marker::PhantomData;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Current log format version
pub const LOG_FORMAT_VERSION: u16 = 1;

/// Header size: magic (8) + version (2) + tag (8)
pub const LOG_HEADER_SIZE: usize = 18;

/// Append-only log of MessagePack records
pub struct RecordLog<T> {
    path: PathBuf,
    magic: [u8; 8],
    tag: u64,
    sync: bool,
    file: Mutex<File>,
    _records: PhantomData<fn() -> T>,
}

/// Records recovered when a log is opened
#[derive(Debug)]
pub struct Recovered<T> {
    /// Intact records in append order
    pub records: Vec<T>,
    /// Bytes dropped from a torn tail
    pub torn_bytes: u64,
    /// Whether an existing log with a different tag was discarded
    pub replaced: bool,
}

impl<T: Serialize + DeserializeOwned> RecordLog<T> {
    /// Open or create the log at `path`.
    ///
    /// With `sync` set, every append is flushed to stable storage before
    /// returning.
    pub fn open(
        path: impl AsRef<Path>,
        magic: [u8; 8],
        tag: u64,
        sync: bool,
    ) -> DurabilityResult<(Self, Recovered<T>)> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let existing = match File::open(&path) {
            Ok(mut file) => {
                let mut bytes = Vec::new();
                file.read_to_end(&mut bytes)?;
                Some(bytes)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => None,
            Err(e) => return Err(e.into()),
        };

        let mut recovered = Recovered {
            records: Vec::new(),
            torn_bytes: 0,
            replaced: false,
        };

        let reuse = match &existing {
            Some(bytes) if bytes.len() >= LOG_HEADER_SIZE => match parse_header(bytes, &magic) {
                Some((found_tag, LOG_FORMAT_VERSION)) if found_tag == tag => {
                    let body = &bytes[LOG_HEADER_SIZE..];
                    let frames = framing::decode_all(body);
                    let mut valid = 0;
                    for payload in &frames.payloads {
                        match rmp_serde::from_slice::<T>(payload) {
                            Ok(record) => {
                                recovered.records.push(record);
                                valid += payload.len() + framing::FRAME_OVERHEAD;
                            }
                            Err(_) => break,
                        }
                    }
                    recovered.torn_bytes = (body.len() - valid) as u64;
                    Some(LOG_HEADER_SIZE + valid)
                }
                Some((_, LOG_FORMAT_VERSION)) => {
                    recovered.replaced = true;
                    None
                }
                Some((_, version)) => {
                    warn!(
                        target: "tally::durability",
                        path = %path.display(),
                        version,
                        "Discarding record log with unsupported version"
                    );
                    recovered.replaced = true;
                    None
                }
                None => {
                    warn!(
                        target: "tally::durability",
                        path = %path.display(),
                        "Discarding record log with invalid magic"
                    );
                    recovered.replaced = true;
                    None
                }
            },
            // Missing, or a header that never finished writing
            _ => None,
        };

        let file = match reuse {
            Some(valid_len) => {
                let file = OpenOptions::new().read(true).append(true).open(&path)?;
                if recovered.torn_bytes > 0 {
                    warn!(
                        target: "tally::durability",
                        path = %path.display(),
                        torn_bytes = recovered.torn_bytes,
                        "Truncating torn tail of record log"
                    );
                    file.set_len(valid_len as u64)?;
                }
                file
            }
            None => {
                let mut file = OpenOptions::new()
                    .create(true)
                    .write(true)
                    .truncate(true)
                    .open(&path)?;
                file.write_all(&header(&magic, tag))?;
                file.sync_all()?;
                drop(file);
                OpenOptions::new().read(true).append(true).open(&path)?
            }
        };

        debug!(
            target: "tally::durability",
            path = %path.display(),
            records = recovered.records.len(),
            replaced = recovered.replaced,
            "Opened record log"
        );

        Ok((
            RecordLog {
                path,
                magic,
                tag,
                sync,
                file: Mutex::new(file),
                _records: PhantomData,
            },
            recovered,
        ))
    }

    /// Append one record as a single framed write
    pub fn append(&self, record: &T) -> DurabilityResult<()> {
        let frame = framing::encode(&rmp_serde::to_vec(record)?);
        let mut file = self.file.lock();
        file.write_all(&frame)?;
        if self.sync {
            file.sync_data()?;
        }
        Ok(())
    }

    /// Atomically replace the log contents with `records`
    pub fn rewrite<'a, I>(&self, records: I) -> DurabilityResult<()>
    where
        I: IntoIterator<Item = &'a T>,
        T: 'a,
    {
        let mut buffer = header(&self.magic, self.tag).to_vec();
        for record in records {
            buffer.extend(framing::encode(&rmp_serde::to_vec(record)?));
        }

        let mut file = self.file.lock();
        write_atomic(&self.path, &buffer)?;
        *file = OpenOptions::new().read(true).append(true).open(&self.path)?;
        Ok(())
    }

    /// Path of the log file
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Tag the log was opened with
    pub fn tag(&self) -> u64 {
        self.tag
    }

    /// Delete the log file
    pub fn remove(self) -> DurabilityResult<()> {
        drop(self.file);
        match std::fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

fn header(magic: &[u8; 8], tag: u64) -> [u8; LOG_HEADER_SIZE] {
    let mut out = [0u8; LOG_HEADER_SIZE];
    out[..8].copy_from_slice(magic);
    out[8..10].copy_from_slice(&LOG_FORMAT_VERSION.to_le_bytes());
    out[10..18].copy_from_slice(&tag.to_le_bytes());
    out
}

fn parse_header(bytes: &[u8], magic: &[u8; 8]) -> Option<(u64, u16)> {
    if &bytes[..8] != magic {
        return None;
    }
    let version = u16::from_le_bytes([bytes[8], bytes[9]]);
    let mut tag = [0u8; 8];
    tag.copy_from_slice(&bytes[10..18]);
    Some((u64::from_le_bytes(tag), version))
}

/// Write `bytes` to `path` via temp file, fsync and rename
pub fn write_atomic(path: &Path, bytes: &[u8]) -> DurabilityResult<()> {
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();
    let temp = path.with_file_name(format!(".{}.tmp", file_name));
    {
        let mut file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(&temp)?;
        file.write_all(bytes)?;
        file.sync_all()?;
    }
    std::fs::rename(&temp, path)?;
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        // Directory fsync is not supported on every platform.
        if let Ok(dir) = File::open(parent) {
            let _ = dir.sync_all();
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    const MAGIC: [u8; 8] = *b"TESTLOG1";

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Rec {
        n: u32,
        label: String,
    }

    fn rec(n: u32) -> Rec {
        Rec {
            n,
            label: format!("r{n}"),
        }
    }

    #[test]
    fn test_append_and_recover() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.log");
        {
            let (log, rec0) = RecordLog::<Rec>::open(&path, MAGIC, 7, false).unwrap();
            assert!(rec0.records.is_empty());
            log.append(&rec(1)).unwrap();
            log.append(&rec(2)).unwrap();
        }
        let (_, recovered) = RecordLog::<Rec>::open(&path, MAGIC, 7, false).unwrap();
        assert_eq!(recovered.records, vec![rec(1), rec(2)]);
        assert_eq!(recovered.torn_bytes, 0);
    }

    #[test]
    fn test_torn_tail_truncated_on_open() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("t.log");
        {
            let (log, _) = RecordLog::<Rec>::open(&path, MAGIC, 1, true).unwrap();
            log.append(&rec(1)).unwrap();
        }
        let intact = std::fs::metadata(&path).unwrap().len();
        {
            let mut f = OpenOptions::new().append(true).open(&path).unwrap();
            f.write_all(&[9, 0, 0, 0, 1, 2]).unwrap();
        }
        let (log, recovered) = RecordLog::<Rec>::open(&path, MAGIC, 1, true).unwrap();
        assert_eq!(recovered.records, vec![rec(1)]);
        assert_eq!(recovered.torn_bytes, 6);
        assert_eq!(std::fs::metadata(&path).unwrap().len(), intact);

        log.append(&rec(2)).unwrap();
        drop(log);
        let (_, again) = RecordLog::<Rec>::open(&path, MAGIC, 1, true).unwrap();
        assert_eq!(again.records, vec![rec(1), rec(2)]);
    }

    #[test]
    fn test_different_tag_starts_fresh() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("j.log");
        {
            let (log, _) = RecordLog::<Rec>::open(&path, MAGIC, 1, false).unwrap();
            log.append(&rec(1)).unwrap();
        }
        let (_, recovered) = RecordLog::<Rec>::open(&path, MAGIC, 2, false).unwrap();
        assert!(recovered.records.is_empty());
        assert!(recovered.replaced);
    }

    #[test]
    fn test_garbage_header_starts_fresh() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("m.log");
        std::fs::write(&path, [0xAAu8; 64]).unwrap();
        let (log, recovered) = RecordLog::<Rec>::open(&path, MAGIC, 1, false).unwrap();
        assert!(recovered.records.is_empty());
        assert!(recovered.replaced);
        log.append(&rec(1)).unwrap();
        drop(log);
        let (_, again) = RecordLog::<Rec>::open(&path, MAGIC, 1, false).unwrap();
        assert_eq!(again.records, vec![rec(1)]);
        assert!(!again.replaced);
    }

    #[test]
    fn test_unsupported_version_starts_fresh() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("v.log");
        let mut bytes = header(&MAGIC, 1).to_vec();
        bytes[8..10].copy_from_slice(&(LOG_FORMAT_VERSION + 1).to_le_bytes());
        std::fs::write(&path, &bytes).unwrap();
        let (_, recovered) = RecordLog::<Rec>::open(&path, MAGIC, 1, false).unwrap();
        assert!(recovered.replaced);
        assert_eq!(&std::fs::read(&path).unwrap()[..], &header(&MAGIC, 1)[..]);
    }

    #[test]
    fn test_rewrite_replaces_contents() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("c.log");
        let (log, _) = RecordLog::<Rec>::open(&path, MAGIC, 3, false).unwrap();
        for n in 0..5 {
            log.append(&rec(n)).unwrap();
        }
        log.rewrite([rec(4)].iter()).unwrap();
        log.append(&rec(5)).unwrap();
        drop(log);
        let (_, recovered) = RecordLog::<Rec>::open(&path, MAGIC, 3, false).unwrap();
        assert_eq!(recovered.records, vec![rec(4), rec(5)]);
    }
}
